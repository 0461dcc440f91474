//! End-to-end tests of the receiver through the public interface

use float_eq::assert_float_eq;
use rand::{rngs::StdRng, SeedableRng};
use serdes_sim::cdr::CdrType;
use serdes_sim::link::{self, BitSource, LinkConfig};
use serdes_sim::receiver::Receiver;
use serdes_sim::vga::{AgcParams, VgaConfig};
use serdes_sim::waveform::AnalogInput;
use serdes_sim::{metrics, utils};

#[test]
fn prbs_link_from_json_config() {
    let config: LinkConfig = serde_json::from_str(
        r#"{
            "tx": {"bits": {"type": "prbs", "order": 9, "seed": 1}},
            "channel": {"delay": 32, "awgn_sigma": 0.02},
            "rx": {
                "adc": {"v_cm": 0.0},
                "cdr": {"type": "pll", "kp": 0.02, "ki": 0.0005, "phase": 4.0}
            }
        }"#,
    )
    .unwrap();
    assert_eq!(config.rx.cdr.cdr_type, CdrType::DigitalPll);
    let mut rng = StdRng::seed_from_u64(101);
    let output = link::run_link(&config, 1000, &mut rng).unwrap();
    assert_eq!(output.tx_bits, utils::prbs(9, 1000, 1).unwrap());
    let alignment = output.alignment.unwrap();
    assert_eq!(alignment.bit_errors, 0);
    assert!(alignment.bits_compared > 950);
    assert_eq!(alignment.lag, 2);
}

#[test]
fn consecutive_runs_carry_gain() {
    let mut rng = StdRng::seed_from_u64(102);
    let mut config = LinkConfig::default();
    config.tx.swing = 0.1;
    config.tx.bits = BitSource::Prbs { order: 7, seed: 0x5a };
    let (tx_bits, tx_waveform) = link::transmit(&config.tx, 512, &mut rng).unwrap();
    let channel_out = link::simple_channel(&tx_waveform.samples, &config.channel, &mut rng).unwrap();
    let mut rx_config = config.rx.clone();
    rx_config.vga = Some(VgaConfig::default());
    rx_config.agc = AgcParams {
        block_size: 512,
        attack_ms: 1e-6,
        ..AgcParams::default()
    };
    rx_config.cdr.cdr_type = CdrType::Ideal;
    let mut receiver = Receiver::new(rx_config).unwrap();
    let (first, second) = channel_out.split_at(channel_out.len() / 2);
    let sample_rate = tx_waveform.sample_rate;
    let symbol_rate = config.tx.symbol_rate;
    let first_output = receiver
        .run(AnalogInput::SingleEnded(first), sample_rate, symbol_rate, &mut rng)
        .unwrap();
    let gain_after_first = receiver.gain_db().unwrap();
    assert!(gain_after_first > 0.0);
    let second_output = receiver
        .run(AnalogInput::SingleEnded(second), sample_rate, symbol_rate, &mut rng)
        .unwrap();
    // Second run starts from the gain reached by the first
    assert!(second_output.gains_db[0] >= gain_after_first - 1e-9);
    let bits = [first_output.bits, second_output.bits].concat();
    assert_eq!(bits, tx_bits);
}

#[test]
fn eye_of_clean_link_is_open() {
    let mut rng = StdRng::seed_from_u64(103);
    let mut config = LinkConfig::default();
    config.rx.cdr.cdr_type = CdrType::Ideal;
    let output = link::run_link(&config, 400, &mut rng).unwrap();
    let sps = config.rx.adc.samples_per_symbol;
    let eye = metrics::fold_to_eye(&output.rx.ctle_waveform.samples, sps);
    assert_eq!(eye.len(), 400);
    // Recovered symbols sit on the transmitted levels
    let tx_symbols = link::map_symbols(&output.tx_bits, config.tx.modulation);
    let scaled: Vec<f64> = output.rx.symbols.iter().map(|s| 2.0 * s).collect();
    assert!(metrics::evm(&scaled, &tx_symbols).unwrap() < 10.0);
    assert!(metrics::snr_db(&scaled, &tx_symbols).unwrap() > 20.0);
    assert_float_eq!(output.rx.adc_sample_rate, 80e9, rmax <= 1e-12);
}
