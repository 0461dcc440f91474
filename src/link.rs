//! # Transmitter, channel and end-to-end link
//!
//! A deliberately thin harness around the [`Receiver`]: the transmitter maps bits to NRZ or
//! Gray-coded PAM4 symbols, optionally pre-emphasizes them with a symbol-rate FFE, optionally
//! quantizes the levels with a DAC, and holds each symbol for `samples_per_symbol` samples, with
//! symbol edges optionally displaced by random, sinusoidal and duty-cycle jitter. The simple
//! channel applies ISI taps and the copper channel a single-pole roll-off; both then apply a fixed
//! loss, an integer sample delay and white Gaussian noise. None of these stages carries state from
//! one call to the next.
//!
//! # Examples
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use serdes_sim::link::{self, LinkConfig};
//!
//! let mut rng = StdRng::seed_from_u64(3);
//! let output = link::run_link(&LinkConfig::default(), 500, &mut rng)?;
//! let alignment = output.alignment.unwrap();
//! assert_eq!(alignment.bit_errors, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::adc::AdcConfig;
use crate::cdr::{CdrConfig, CdrType};
use crate::common::{check_nonnegative, check_positive};
use crate::receiver::{Receiver, ReceiverConfig, RxOutput};
use crate::utils::{self, Alignment};
use crate::waveform::{convolve_same, AnalogInput, Waveform};
use crate::{Bit, Error};

/// Enumeration of line codes
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modulation {
    /// Two levels, one bit per symbol
    #[default]
    #[serde(alias = "NRZ")]
    Nrz,
    /// Four Gray-coded levels, two bits per symbol
    #[serde(alias = "PAM4")]
    Pam4,
}

impl Modulation {
    /// Returns number of bits per symbol.
    #[must_use]
    pub fn bits_per_symbol(self) -> usize {
        match self {
            Modulation::Nrz => 1,
            Modulation::Pam4 => 2,
        }
    }
}

impl FromStr for Modulation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nrz" => Ok(Modulation::Nrz),
            "pam4" => Ok(Modulation::Pam4),
            _ => Err(Error::InvalidConfiguration(format!(
                "Unknown modulation '{s}'"
            ))),
        }
    }
}

/// Source of transmitted bits
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BitSource {
    /// Independent equiprobable bits drawn from the link's random number generator
    #[default]
    Random,
    /// Pseudo-random binary sequence
    Prbs {
        /// LFSR order
        order: u32,
        /// Initial register contents
        seed: u64,
    },
}

/// Largest supported DAC resolution (bits)
pub const MAX_DAC_RESOLUTION_BITS: u32 = 16;

/// Timing jitter of transmitted symbol edges (all zero for an ideal clock)
#[derive(Clone, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Standard deviation (s) of Gaussian random jitter, drawn independently per edge
    pub rj_sigma: f64,
    /// Amplitude (s) of sinusoidal jitter
    pub sj_amplitude: f64,
    /// Frequency (Hz) of sinusoidal jitter
    pub sj_freq: f64,
    /// Offset (s) added to every other edge, starting with the second
    pub dcd: f64,
}

impl JitterConfig {
    /// Returns `true` if no edge is displaced.
    #[must_use]
    pub fn is_ideal(&self) -> bool {
        self.rj_sigma == 0.0 && self.sj_amplitude == 0.0 && self.dcd == 0.0
    }

    /// Checks that all values are finite, with nonnegative noise level and frequency.
    fn check(&self) -> Result<(), Error> {
        check_nonnegative("Random jitter", self.rj_sigma)?;
        check_nonnegative("Sinusoidal jitter frequency", self.sj_freq)?;
        if !self.sj_amplitude.is_finite() || !self.dcd.is_finite() {
            return Err(Error::InvalidConfiguration(format!(
                "Jitter offsets must be finite (found {self:?})"
            )));
        }
        Ok(())
    }
}

/// Parameters of the transmitter
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TxConfig {
    /// Line code
    pub modulation: Modulation,
    /// Symbol rate (Hz)
    pub symbol_rate: f64,
    /// Samples per symbol of the transmitted waveform
    pub samples_per_symbol: usize,
    /// Peak-to-peak swing (V) between the outermost levels
    pub swing: f64,
    /// Common-mode voltage (V)
    pub v_cm: f64,
    /// Symbol-rate FFE taps, normalized to unit sum before use (empty to bypass)
    pub ffe_taps: Vec<f64>,
    /// Source of transmitted bits
    pub bits: BitSource,
    /// DAC resolution (bits), or `None` for unquantized levels
    pub dac_resolution_bits: Option<u32>,
    /// Jitter of symbol edges
    pub jitter: JitterConfig,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            modulation: Modulation::Nrz,
            symbol_rate: 10e9,
            samples_per_symbol: 16,
            swing: 1.0,
            v_cm: 0.0,
            ffe_taps: Vec::new(),
            bits: BitSource::Random,
            dac_resolution_bits: None,
            jitter: JitterConfig::default(),
        }
    }
}

impl TxConfig {
    /// Returns sample rate (Hz) of the transmitted waveform.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_rate(&self) -> f64 {
        self.samples_per_symbol as f64 * self.symbol_rate
    }
}

/// Enumeration of channel models
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// FIR ISI taps
    #[default]
    Simple,
    /// Single-pole roll-off set by the length and loss of a copper trace
    Copper,
}

/// Parameters of the channel
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel model
    pub channel_type: ChannelType,
    /// ISI taps at the sample rate (simple channel only)
    pub isi_taps: Vec<f64>,
    /// Loss slope (dB per inch per GHz) of a copper trace
    pub alpha_db_per_in_ghz: f64,
    /// Length (inches) of a copper trace
    pub length_in: f64,
    /// Reference frequency (GHz) of a copper trace
    pub f_ref_ghz: f64,
    /// Fixed loss (dB)
    pub fixed_loss_db: f64,
    /// Delay (samples)
    pub delay: usize,
    /// Standard deviation (V) of additive white Gaussian noise
    pub awgn_sigma: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel_type: ChannelType::Simple,
            isi_taps: vec![0.25, 0.5, 0.25],
            alpha_db_per_in_ghz: 0.5,
            length_in: 20.0,
            f_ref_ghz: 10.0,
            fixed_loss_db: 0.0,
            delay: 0,
            awgn_sigma: 0.0,
        }
    }
}

/// Parameters of the end-to-end link
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Transmitter parameters
    pub tx: TxConfig,
    /// Channel parameters
    pub channel: ChannelConfig,
    /// Receiver parameters
    pub rx: ReceiverConfig,
    /// Largest link delay (symbols) searched when aligning received and transmitted bits
    pub max_lag_symbols: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let rx = ReceiverConfig {
            adc: AdcConfig {
                v_cm: 0.0,
                ..AdcConfig::default()
            },
            cdr: CdrConfig {
                cdr_type: CdrType::BangBang,
                kp: 0.05,
                phase: 4.0,
                ..CdrConfig::default()
            },
            ..ReceiverConfig::default()
        };
        Self {
            tx: TxConfig::default(),
            channel: ChannelConfig::default(),
            rx,
            max_lag_symbols: 16,
        }
    }
}

impl LinkConfig {
    /// Returns link configuration read from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or does not hold a valid configuration.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Returns symbols for given bits.
///
/// NRZ maps `0` to `-1` and `1` to `+1`. PAM4 maps bit pairs (MSB first) with Gray coding:
/// `00 -> -3`, `01 -> -1`, `11 -> +1`, `10 -> +3`; a trailing odd bit is ignored.
#[must_use]
pub fn map_symbols(bits: &[Bit], modulation: Modulation) -> Vec<f64> {
    match modulation {
        Modulation::Nrz => bits
            .iter()
            .map(|&b| if b == Bit::One { 1.0 } else { -1.0 })
            .collect(),
        Modulation::Pam4 => bits
            .chunks_exact(2)
            .map(|pair| match (pair[0], pair[1]) {
                (Bit::Zero, Bit::Zero) => -3.0,
                (Bit::Zero, Bit::One) => -1.0,
                (Bit::One, Bit::One) => 1.0,
                (Bit::One, Bit::Zero) => 3.0,
            })
            .collect(),
    }
}

/// Returns symbols pre-emphasized by a symbol-rate FFE whose taps are normalized to unit sum.
///
/// # Errors
///
/// Returns an error if a tap is not finite or the taps sum to zero.
pub fn apply_ffe(symbols: &[f64], taps: &[f64]) -> Result<Vec<f64>, Error> {
    if taps.is_empty() {
        return Ok(symbols.to_vec());
    }
    let sum: f64 = taps.iter().sum();
    if taps.iter().any(|t| !t.is_finite()) || sum == 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "FFE taps must be finite with a nonzero sum (found {taps:?})"
        )));
    }
    let normalized: Vec<f64> = taps.iter().map(|t| t / sum).collect();
    Ok(convolve_same(symbols, &normalized))
}

/// Returns zero-order-hold waveform for given symbols.
///
/// Each symbol is held for `samples_per_symbol` samples and scaled so that the outermost
/// nominal levels span `swing` (by `swing / 2` for NRZ and `swing / 6` for PAM4), then offset by
/// `v_cm`.
#[must_use]
pub fn synthesize(
    symbols: &[f64],
    samples_per_symbol: usize,
    modulation: Modulation,
    swing: f64,
    v_cm: f64,
) -> Vec<f64> {
    symbol_levels(symbols, modulation, swing, v_cm)
        .into_iter()
        .flat_map(|v| std::iter::repeat(v).take(samples_per_symbol))
        .collect()
}

/// Returns voltage of each symbol, scaled and offset as in [`synthesize`].
fn symbol_levels(symbols: &[f64], modulation: Modulation, swing: f64, v_cm: f64) -> Vec<f64> {
    let scale = match modulation {
        Modulation::Nrz => swing / 2.0,
        Modulation::Pam4 => swing / 6.0,
    };
    symbols.iter().map(|&s| v_cm + scale * s).collect()
}

/// Returns voltages quantized by a DAC with `2^resolution_bits` levels spanning
/// `[v_cm - swing/2, v_cm + swing/2]`; voltages outside that range are clipped to it.
///
/// # Errors
///
/// Returns an error if `resolution_bits` is not in `1 ..= MAX_DAC_RESOLUTION_BITS` or if the
/// swing is not positive.
///
/// # Examples
///
/// ```
/// use serdes_sim::link;
///
/// let out = link::dac_quantize(&[-0.7, -0.1, 0.2, 0.45], 2, 1.0, 0.0)?;
/// assert_eq!(out.len(), 4);
/// assert!((out[0] + 0.5).abs() < 1e-12);
/// assert!((out[3] - 0.5).abs() < 1e-12);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn dac_quantize(
    voltages: &[f64],
    resolution_bits: u32,
    swing: f64,
    v_cm: f64,
) -> Result<Vec<f64>, Error> {
    if !(1 ..= MAX_DAC_RESOLUTION_BITS).contains(&resolution_bits) {
        return Err(Error::InvalidConfiguration(format!(
            "DAC resolution must be between 1 and {MAX_DAC_RESOLUTION_BITS} bits (found {resolution_bits})"
        )));
    }
    check_positive("DAC swing", swing)?;
    let max_code = f64::from((1_u32 << resolution_bits) - 1);
    let bottom = v_cm - swing / 2.0;
    Ok(voltages
        .iter()
        .map(|&v| {
            let code = ((v - bottom) / swing * max_code).round().clamp(0.0, max_code);
            bottom + code / max_code * swing
        })
        .collect())
}

/// Returns positions (samples) of the leading edge of each symbol, displaced by jitter.
///
/// Nominal edge `k` sits at `k * samples_per_symbol`. Random jitter is drawn independently per
/// edge, sinusoidal jitter is evaluated at the nominal edge time, and the duty-cycle offset is
/// added to odd edges.
#[allow(clippy::cast_precision_loss)]
pub fn jittered_edges<R: Rng>(
    num_symbols: usize,
    samples_per_symbol: usize,
    symbol_rate: f64,
    jitter: &JitterConfig,
    rng: &mut R,
) -> Vec<f64> {
    let sample_rate = samples_per_symbol as f64 * symbol_rate;
    (0 .. num_symbols)
        .map(|k| {
            let nominal = k as f64 / symbol_rate;
            let mut offset = jitter.sj_amplitude
                * (2.0 * std::f64::consts::PI * jitter.sj_freq * nominal).sin();
            if jitter.rj_sigma > 0.0 {
                offset += jitter.rj_sigma * rng.sample::<f64, _>(StandardNormal);
            }
            if k % 2 == 1 {
                offset += jitter.dcd;
            }
            (k * samples_per_symbol) as f64 + offset * sample_rate
        })
        .collect()
}

/// Returns waveform holding each level from its edge until the next edge.
///
/// The waveform has `levels.len() * samples_per_symbol` samples; sample `n` takes the level of
/// the last symbol whose edge lies at or before `n`, or the first level if there is none.
#[allow(clippy::cast_precision_loss)]
pub fn hold_with_edges(levels: &[f64], edges: &[f64], samples_per_symbol: usize) -> Vec<f64> {
    let mut index = 0;
    (0 .. levels.len() * samples_per_symbol)
        .map(|n| {
            while index + 1 < levels.len().min(edges.len()) && edges[index + 1] <= n as f64 {
                index += 1;
            }
            levels[index]
        })
        .collect()
}

/// Returns transmitted bits and waveform for a given number of symbols.
///
/// # Errors
///
/// Returns an error if the transmitter configuration is invalid.
pub fn transmit<R: Rng>(
    config: &TxConfig,
    num_symbols: usize,
    rng: &mut R,
) -> Result<(Vec<Bit>, Waveform), Error> {
    check_positive("Symbol rate", config.symbol_rate)?;
    check_positive("Transmit swing", config.swing)?;
    if config.samples_per_symbol == 0 {
        return Err(Error::InvalidConfiguration(
            "Transmit samples per symbol cannot be zero".to_string(),
        ));
    }
    config.jitter.check()?;
    let num_bits = num_symbols * config.modulation.bits_per_symbol();
    let bits = match config.bits {
        BitSource::Random => utils::random_bits(num_bits, rng),
        BitSource::Prbs { order, seed } => utils::prbs(order, num_bits, seed)?,
    };
    let symbols = apply_ffe(&map_symbols(&bits, config.modulation), &config.ffe_taps)?;
    let mut levels = symbol_levels(&symbols, config.modulation, config.swing, config.v_cm);
    if let Some(resolution_bits) = config.dac_resolution_bits {
        levels = dac_quantize(&levels, resolution_bits, config.swing, config.v_cm)?;
    }
    let samples = if config.jitter.is_ideal() {
        levels
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(config.samples_per_symbol))
            .collect()
    } else {
        let edges = jittered_edges(
            levels.len(),
            config.samples_per_symbol,
            config.symbol_rate,
            &config.jitter,
            rng,
        );
        hold_with_edges(&levels, &edges, config.samples_per_symbol)
    };
    Ok((bits, Waveform::new(samples, config.sample_rate())))
}

/// Returns waveform at the output of the channel model selected by `config.channel_type`.
///
/// # Errors
///
/// Returns an error if the channel configuration is invalid.
pub fn channel<R: Rng>(
    waveform: &[f64],
    config: &ChannelConfig,
    rng: &mut R,
) -> Result<Vec<f64>, Error> {
    match config.channel_type {
        ChannelType::Simple => simple_channel(waveform, config, rng),
        ChannelType::Copper => copper_channel(waveform, config, rng),
    }
}

/// Returns waveform at the output of a channel with ISI, fixed loss, delay and AWGN.
///
/// The ISI filter keeps the length of the waveform; the delay shifts it right with zero fill.
///
/// # Errors
///
/// Returns an error if the ISI taps are empty or not finite, or if the loss or noise level is
/// invalid.
pub fn simple_channel<R: Rng>(
    waveform: &[f64],
    config: &ChannelConfig,
    rng: &mut R,
) -> Result<Vec<f64>, Error> {
    if config.isi_taps.is_empty() || config.isi_taps.iter().any(|t| !t.is_finite()) {
        return Err(Error::InvalidConfiguration(format!(
            "Channel ISI taps must be nonempty and finite (found {:?})",
            config.isi_taps
        )));
    }
    check_loss_and_noise(config)?;
    let filtered = convolve_same(waveform, &config.isi_taps);
    Ok(lose_delay_and_add_noise(&filtered, config, rng))
}

/// Returns waveform at the output of a copper trace with fixed loss, delay and AWGN.
///
/// The trace is a single-pole lowpass `y[n] = c * x[n] + (1 - c) * y[n - 1]`, starting from
/// rest, with `c = min(0.5, 1 / (2 * (1 + alpha * length)))`: the cutoff `f_ref / (1 + alpha *
/// length)` normalized to twice the reference frequency. Longer or lossier traces roll off more.
///
/// # Errors
///
/// Returns an error if the loss slope or length is negative, if the reference frequency is not
/// positive, or if the loss or noise level is invalid.
pub fn copper_channel<R: Rng>(
    waveform: &[f64],
    config: &ChannelConfig,
    rng: &mut R,
) -> Result<Vec<f64>, Error> {
    check_nonnegative("Copper loss slope", config.alpha_db_per_in_ghz)?;
    check_nonnegative("Copper length", config.length_in)?;
    check_positive("Copper reference frequency", config.f_ref_ghz)?;
    check_loss_and_noise(config)?;
    let coeff = copper_coefficient(config);
    let mut state = 0.0;
    let filtered: Vec<f64> = waveform
        .iter()
        .map(|&x| {
            state = coeff * x + (1.0 - coeff) * state;
            state
        })
        .collect();
    Ok(lose_delay_and_add_noise(&filtered, config, rng))
}

/// Returns feedforward coefficient of the copper roll-off filter.
fn copper_coefficient(config: &ChannelConfig) -> f64 {
    let cutoff_ghz = config.f_ref_ghz / (1.0 + config.alpha_db_per_in_ghz * config.length_in);
    (cutoff_ghz / (2.0 * config.f_ref_ghz)).min(0.5)
}

/// Checks fixed loss and noise level of a channel.
fn check_loss_and_noise(config: &ChannelConfig) -> Result<(), Error> {
    if !config.fixed_loss_db.is_finite() {
        return Err(Error::InvalidConfiguration(
            "Channel loss must be finite".to_string(),
        ));
    }
    check_nonnegative("Channel noise", config.awgn_sigma)
}

/// Returns filtered waveform after fixed loss, delay with zero fill, and AWGN.
fn lose_delay_and_add_noise<R: Rng>(
    filtered: &[f64],
    config: &ChannelConfig,
    rng: &mut R,
) -> Vec<f64> {
    let gain = 10f64.powf(-config.fixed_loss_db / 20.0);
    let delay = config.delay.min(filtered.len());
    let mut out = vec![0.0; delay];
    out.extend(filtered[.. filtered.len() - delay].iter().map(|x| gain * x));
    if config.awgn_sigma > 0.0 {
        for x in &mut out {
            *x += config.awgn_sigma * rng.sample::<f64, _>(StandardNormal);
        }
    }
    out
}

/// Output of one end-to-end link run
#[derive(Clone, PartialEq, Debug)]
pub struct LinkOutput {
    /// Transmitted bits
    pub tx_bits: Vec<Bit>,
    /// Waveform at the channel output
    pub channel_waveform: Waveform,
    /// Receiver output
    pub rx: RxOutput,
    /// Best alignment of received bits against transmitted bits, if any bits overlap
    pub alignment: Option<Alignment>,
}

/// Runs transmitter, channel and a fresh receiver for a given number of symbols.
///
/// # Errors
///
/// Returns an error if any part of the link configuration is invalid.
pub fn run_link<R: Rng>(
    config: &LinkConfig,
    num_symbols: usize,
    rng: &mut R,
) -> Result<LinkOutput, Error> {
    let mut receiver = Receiver::new(config.rx.clone())?;
    let (tx_bits, tx_waveform) = transmit(&config.tx, num_symbols, rng)?;
    let channel_out = channel(&tx_waveform.samples, &config.channel, rng)?;
    let rx = receiver.run(
        AnalogInput::SingleEnded(&channel_out),
        tx_waveform.sample_rate,
        config.tx.symbol_rate,
        rng,
    )?;
    let bits_per_symbol = receiver.slicer().bits_per_symbol();
    let alignment = utils::best_alignment(
        &rx.bits,
        &tx_bits,
        config.max_lag_symbols * bits_per_symbol,
        bits_per_symbol,
    );
    Ok(LinkOutput {
        tx_bits,
        channel_waveform: Waveform::new(channel_out, tx_waveform.sample_rate),
        rx,
        alignment,
    })
}

#[cfg(test)]
mod tests_of_link {
    use float_eq::assert_float_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::slicer::{default_pam4_thresholds, SlicerConfig};
    use Bit::{One, Zero};

    #[test]
    fn test_modulation() {
        assert_eq!("PAM4".parse::<Modulation>().unwrap(), Modulation::Pam4);
        assert_eq!("nrz".parse::<Modulation>().unwrap(), Modulation::Nrz);
        assert!("qam16".parse::<Modulation>().is_err());
        assert_eq!(Modulation::Pam4.bits_per_symbol(), 2);
        let modulation: Modulation = serde_json::from_str(r#""PAM4""#).unwrap();
        assert_eq!(modulation, Modulation::Pam4);
    }

    #[test]
    fn test_map_symbols() {
        assert_float_eq!(
            map_symbols(&[One, Zero, One], Modulation::Nrz),
            vec![1.0, -1.0, 1.0],
            abs_all <= 0.0
        );
        assert_float_eq!(
            map_symbols(&[Zero, Zero, Zero, One, One, One, One, Zero, One], Modulation::Pam4),
            vec![-3.0, -1.0, 1.0, 3.0],
            abs_all <= 0.0
        );
    }

    #[test]
    fn test_apply_ffe() {
        let symbols = [1.0, -1.0, 1.0];
        assert_float_eq!(apply_ffe(&symbols, &[]).unwrap(), symbols.to_vec(), abs_all <= 0.0);
        assert!(apply_ffe(&symbols, &[1.0, -1.0]).is_err());
        // A single tap normalizes to unity
        assert_float_eq!(
            apply_ffe(&symbols, &[4.0]).unwrap(),
            symbols.to_vec(),
            abs_all <= 1e-12
        );
        // One-tap de-emphasis
        assert_float_eq!(
            apply_ffe(&symbols, &[2.0, -1.0]).unwrap(),
            vec![2.0, -3.0, 3.0],
            abs_all <= 1e-12
        );
    }

    #[test]
    fn test_synthesize() {
        assert_float_eq!(
            synthesize(&[1.0, -1.0], 2, Modulation::Nrz, 0.8, 0.5),
            vec![0.9, 0.9, 0.1, 0.1],
            abs_all <= 1e-12
        );
        assert_float_eq!(
            synthesize(&[3.0, -1.0], 1, Modulation::Pam4, 1.2, 0.0),
            vec![0.6, -0.2],
            abs_all <= 1e-12
        );
    }

    #[test]
    fn test_transmit() {
        let mut rng = StdRng::seed_from_u64(31);
        let config = TxConfig {
            modulation: Modulation::Pam4,
            samples_per_symbol: 4,
            bits: BitSource::Prbs { order: 7, seed: 1 },
            ..TxConfig::default()
        };
        let (bits, waveform) = transmit(&config, 10, &mut rng).unwrap();
        assert_eq!(bits, utils::prbs(7, 20, 1).unwrap());
        assert_eq!(waveform.len(), 40);
        assert_float_eq!(waveform.sample_rate, 40e9, abs <= 1e-3);
        assert!(transmit(
            &TxConfig {
                samples_per_symbol: 0,
                ..TxConfig::default()
            },
            10,
            &mut rng
        )
        .is_err());
    }

    #[test]
    fn test_dac_quantize() {
        assert_float_eq!(
            dac_quantize(&[-1.0, 0.05, 0.31, 0.72, 2.0], 2, 1.2, 0.3).unwrap(),
            vec![-0.3, 0.1, 0.5, 0.9, 0.9],
            abs_all <= 1e-12
        );
        assert!(dac_quantize(&[0.0], 0, 1.0, 0.0).is_err());
        assert!(dac_quantize(&[0.0], MAX_DAC_RESOLUTION_BITS + 1, 1.0, 0.0).is_err());
        assert!(dac_quantize(&[0.0], 8, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_transmit_with_dac() {
        let mut rng = StdRng::seed_from_u64(36);
        // A one-bit DAC collapses PAM4 to its outermost levels
        let config = TxConfig {
            modulation: Modulation::Pam4,
            samples_per_symbol: 2,
            dac_resolution_bits: Some(1),
            ..TxConfig::default()
        };
        let (_, waveform) = transmit(&config, 200, &mut rng).unwrap();
        assert!(waveform
            .samples
            .iter()
            .all(|&v| (v.abs() - 0.5).abs() < 1e-12));
        // A fine DAC stays within half a step of the ideal levels
        let config = TxConfig {
            bits: BitSource::Prbs { order: 9, seed: 3 },
            dac_resolution_bits: Some(8),
            ..config
        };
        let ideal = TxConfig {
            dac_resolution_bits: None,
            ..config.clone()
        };
        let (_, quantized) = transmit(&config, 200, &mut rng).unwrap();
        let (_, waveform) = transmit(&ideal, 200, &mut rng).unwrap();
        assert_float_eq!(quantized.samples, waveform.samples, abs_all <= 0.5 / 255.0 + 1e-12);
        let config = TxConfig {
            dac_resolution_bits: Some(0),
            ..config
        };
        assert!(transmit(&config, 10, &mut rng).is_err());
    }

    #[test]
    fn test_jittered_edges() {
        let mut rng = StdRng::seed_from_u64(37);
        let symbol_rate = 1e9;
        assert_float_eq!(
            jittered_edges(4, 4, symbol_rate, &JitterConfig::default(), &mut rng),
            vec![0.0, 4.0, 8.0, 12.0],
            abs_all <= 0.0
        );
        // Quarter-UI duty-cycle offset is one sample at four samples per symbol
        let jitter = JitterConfig {
            dcd: 0.25 / symbol_rate,
            ..JitterConfig::default()
        };
        assert_float_eq!(
            jittered_edges(4, 4, symbol_rate, &jitter, &mut rng),
            vec![0.0, 5.0, 8.0, 13.0],
            abs_all <= 1e-9
        );
        // Sinusoidal jitter at a quarter of the symbol rate
        let jitter = JitterConfig {
            sj_amplitude: 0.125 / symbol_rate,
            sj_freq: symbol_rate / 4.0,
            ..JitterConfig::default()
        };
        assert_float_eq!(
            jittered_edges(4, 4, symbol_rate, &jitter, &mut rng),
            vec![0.0, 4.5, 8.0, 11.5],
            abs_all <= 1e-9
        );
        // Random jitter of a tenth of a UI is 1.6 samples at 16 samples per symbol
        let jitter = JitterConfig {
            rj_sigma: 0.1 / symbol_rate,
            ..JitterConfig::default()
        };
        let edges = jittered_edges(10000, 16, symbol_rate, &jitter, &mut rng);
        let var = edges
            .iter()
            .zip(0_u32 ..)
            .map(|(e, k)| (e - 16.0 * f64::from(k)).powi(2))
            .sum::<f64>()
            / 10000.0;
        assert!(var.sqrt() > 1.5 && var.sqrt() < 1.7);
    }

    #[test]
    fn test_hold_with_edges() {
        assert_float_eq!(
            hold_with_edges(&[1.0, 2.0, 3.0], &[0.0, 2.5, 5.0], 2),
            vec![1.0, 1.0, 1.0, 2.0, 2.0, 3.0],
            abs_all <= 0.0
        );
        // Nominal edges reproduce a plain hold
        assert_float_eq!(
            hold_with_edges(&[1.0, -1.0], &[0.0, 3.0], 3),
            synthesize(&[1.0, -1.0], 3, Modulation::Nrz, 2.0, 0.0),
            abs_all <= 0.0
        );
        // An edge pulled ahead of the first sample
        assert_float_eq!(
            hold_with_edges(&[1.0, 2.0], &[0.0, -0.5], 2),
            vec![2.0; 4],
            abs_all <= 0.0
        );
    }

    #[test]
    fn test_transmit_with_jitter() {
        let mut rng = StdRng::seed_from_u64(38);
        let ideal = TxConfig {
            samples_per_symbol: 8,
            bits: BitSource::Prbs { order: 7, seed: 1 },
            ..TxConfig::default()
        };
        let config = TxConfig {
            jitter: JitterConfig {
                dcd: 0.1875 / ideal.symbol_rate,
                ..JitterConfig::default()
            },
            ..ideal.clone()
        };
        let (bits, waveform) = transmit(&config, 100, &mut rng).unwrap();
        let (ideal_bits, ideal_waveform) = transmit(&ideal, 100, &mut rng).unwrap();
        assert_eq!(bits, ideal_bits);
        assert_eq!(waveform.len(), ideal_waveform.len());
        // Odd edges arrive 1.5 samples late, so only the first two samples of odd symbols differ
        for (n, (x, y)) in waveform.samples.iter().zip(&ideal_waveform.samples).enumerate() {
            if (n / 8) % 2 == 0 || n % 8 >= 2 {
                assert_float_eq!(*x, *y, abs <= 0.0);
            }
        }
        assert_ne!(waveform.samples, ideal_waveform.samples);
        let config = TxConfig {
            jitter: JitterConfig {
                rj_sigma: -1e-12,
                ..JitterConfig::default()
            },
            ..ideal
        };
        assert!(transmit(&config, 10, &mut rng).is_err());
    }

    #[test]
    fn test_copper_channel() {
        let mut rng = StdRng::seed_from_u64(39);
        let config = ChannelConfig {
            channel_type: ChannelType::Copper,
            ..ChannelConfig::default()
        };
        let out = copper_channel(&[1.0; 200], &config, &mut rng).unwrap();
        assert_float_eq!(out[0], 1.0 / 22.0, abs <= 1e-12);
        assert!(out.windows(2).all(|w| w[1] > w[0]));
        assert!(out[199] > 0.999 && out[199] < 1.0);
        // A shorter trace settles faster
        let short = ChannelConfig {
            length_in: 4.0,
            ..config.clone()
        };
        let short_out = copper_channel(&[1.0; 200], &short, &mut rng).unwrap();
        assert_float_eq!(short_out[0], 1.0 / 6.0, abs <= 1e-12);
        assert!(short_out[10] > out[10]);
        // No loss at all passes half of each step
        let lossless = ChannelConfig {
            alpha_db_per_in_ghz: 0.0,
            ..config.clone()
        };
        assert_float_eq!(
            copper_channel(&[1.0, 1.0], &lossless, &mut rng).unwrap(),
            vec![0.5, 0.75],
            abs_all <= 1e-12
        );
        assert!(copper_channel(
            &[1.0],
            &ChannelConfig {
                length_in: -1.0,
                ..config.clone()
            },
            &mut rng
        )
        .is_err());
        assert!(copper_channel(
            &[1.0],
            &ChannelConfig {
                f_ref_ghz: 0.0,
                ..config
            },
            &mut rng
        )
        .is_err());
    }

    #[test]
    fn test_channel_dispatch() {
        let mut rng = StdRng::seed_from_u64(40);
        let waveform: Vec<f64> = (0 .. 50).map(|n| f64::from(n % 7) - 3.0).collect();
        let simple = ChannelConfig::default();
        assert_eq!(
            channel(&waveform, &simple, &mut rng).unwrap(),
            simple_channel(&waveform, &simple, &mut rng).unwrap()
        );
        let copper = ChannelConfig {
            channel_type: ChannelType::Copper,
            delay: 3,
            ..ChannelConfig::default()
        };
        assert_eq!(
            channel(&waveform, &copper, &mut rng).unwrap(),
            copper_channel(&waveform, &copper, &mut rng).unwrap()
        );
    }

    #[test]
    fn test_run_link_copper_with_jitter() {
        let mut rng = StdRng::seed_from_u64(41);
        let mut config = LinkConfig::default();
        config.channel.channel_type = ChannelType::Copper;
        config.channel.length_in = 4.0;
        config.tx.dac_resolution_bits = Some(6);
        config.tx.jitter.rj_sigma = 0.01 / config.tx.symbol_rate;
        let output = run_link(&config, 400, &mut rng).unwrap();
        let alignment = output.alignment.unwrap();
        assert!(alignment.bits_compared > 350);
        assert!(alignment.error_rate() < 0.01);
    }

    #[test]
    fn test_simple_channel() {
        let mut rng = StdRng::seed_from_u64(32);
        let waveform = [1.0, 2.0, 3.0, 4.0];
        let config = ChannelConfig {
            isi_taps: vec![1.0],
            fixed_loss_db: 20.0,
            delay: 1,
            awgn_sigma: 0.0,
            ..ChannelConfig::default()
        };
        assert_float_eq!(
            simple_channel(&waveform, &config, &mut rng).unwrap(),
            vec![0.0, 0.1, 0.2, 0.3],
            abs_all <= 1e-12
        );
        // Delay longer than the waveform
        let config = ChannelConfig {
            delay: 9,
            ..config
        };
        assert_float_eq!(
            simple_channel(&waveform, &config, &mut rng).unwrap(),
            vec![0.0; 4],
            abs_all <= 0.0
        );
        assert!(simple_channel(
            &waveform,
            &ChannelConfig {
                awgn_sigma: -1.0,
                ..ChannelConfig::default()
            },
            &mut rng
        )
        .is_err());
        assert!(simple_channel(
            &waveform,
            &ChannelConfig {
                isi_taps: vec![],
                ..ChannelConfig::default()
            },
            &mut rng
        )
        .is_err());
    }

    #[test]
    fn test_channel_noise() {
        let mut rng = StdRng::seed_from_u64(33);
        let config = ChannelConfig {
            isi_taps: vec![1.0],
            awgn_sigma: 0.1,
            ..ChannelConfig::default()
        };
        let out = simple_channel(&vec![0.0; 20000], &config, &mut rng).unwrap();
        let var = out.iter().map(|x| x * x).sum::<f64>() / 20000.0;
        assert!(var > 0.009 && var < 0.011);
    }

    #[test]
    fn test_run_link_nrz_with_delay() {
        let mut rng = StdRng::seed_from_u64(34);
        let mut config = LinkConfig::default();
        // Three and a half symbols of delay
        config.channel.delay = 56;
        let output = run_link(&config, 400, &mut rng).unwrap();
        let alignment = output.alignment.unwrap();
        assert_eq!(alignment.bit_errors, 0);
        assert!(alignment.lag == 3 || alignment.lag == 4);
        assert!(alignment.bits_compared > 350);
        assert_eq!(output.channel_waveform.len(), 400 * 16);
    }

    #[test]
    fn test_run_link_pam4() {
        let mut rng = StdRng::seed_from_u64(35);
        let mut config = LinkConfig::default();
        config.tx.modulation = Modulation::Pam4;
        config.tx.swing = 1.2;
        config.rx.cdr.cdr_type = CdrType::Ideal;
        config.rx.slicer = SlicerConfig::Pam4 {
            thresholds: default_pam4_thresholds().map(|t| t * 0.2),
        };
        let output = run_link(&config, 300, &mut rng).unwrap();
        let alignment = output.alignment.unwrap();
        assert_eq!(alignment.lag, 0);
        assert_eq!(alignment.bit_errors, 0);
        assert_eq!(alignment.bits_compared, 600);
    }

    #[test]
    fn test_link_config_from_json_file() {
        let path = std::env::temp_dir().join("serdes_sim_test_link_config.json");
        std::fs::write(
            &path,
            r#"{"tx": {"modulation": "pam4"}, "channel": {"awgn_sigma": 0.01}}"#,
        )
        .unwrap();
        let config = LinkConfig::from_json_file(&path).unwrap();
        assert_eq!(config.tx.modulation, Modulation::Pam4);
        assert_eq!(config.tx.dac_resolution_bits, None);
        assert!(config.tx.jitter.is_ideal());
        assert_eq!(config.channel.channel_type, ChannelType::Simple);
        assert_float_eq!(config.channel.awgn_sigma, 0.01, abs <= 0.0);
        assert_eq!(config.max_lag_symbols, 16);
        std::fs::write(
            &path,
            r#"{"tx": {"dac_resolution_bits": 6, "jitter": {"rj_sigma": 1e-12, "dcd": 2e-12}},
                "channel": {"channel_type": "copper", "length_in": 4.0}}"#,
        )
        .unwrap();
        let config = LinkConfig::from_json_file(&path).unwrap();
        assert_eq!(config.tx.dac_resolution_bits, Some(6));
        assert_float_eq!(config.tx.jitter.rj_sigma, 1e-12, abs <= 0.0);
        assert_float_eq!(config.tx.jitter.dcd, 2e-12, abs <= 0.0);
        assert_eq!(config.channel.channel_type, ChannelType::Copper);
        assert_float_eq!(config.channel.length_in, 4.0, abs <= 0.0);
        assert_float_eq!(config.channel.f_ref_ghz, 10.0, abs <= 0.0);
        std::fs::remove_file(&path).unwrap();
        assert!(LinkConfig::from_json_file(&path).is_err());
    }
}
