//! # Receiver pipeline
//!
//! The [`Receiver`] chains the front-end and recovery stages in a fixed order:
//!
//! 1. VGA with AGC, at the simulation sample rate (skipped when no VGA is configured);
//! 2. ADC, which moves the signal onto the receiver's own sample grid;
//! 3. CTLE;
//! 4. CDR;
//! 5. DFE;
//! 6. slicer.
//!
//! All stages are validated once in [`Receiver::new`]. The gain of the VGA and the NCO state of
//! the CDR persist across successive calls to [`Receiver::run`], so a long waveform can be
//! processed in consecutive pieces; the DFE starts every call with an empty history.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adc::{Adc, AdcConfig};
use crate::cdr::{Cdr, CdrConfig, CdrState};
use crate::ctle::{Ctle, CtleConfig};
use crate::dfe::{Dfe, DfeConfig};
use crate::slicer::{Slicer, SlicerConfig};
use crate::vga::{AgcParams, GainState, Vga, VgaConfig};
use crate::waveform::{samples_per_symbol, AnalogInput, Waveform};
use crate::{Bit, Error};

/// Parameters of the receiver
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// ADC parameters
    pub adc: AdcConfig,
    /// Whether the ADC adds its thermal noise
    pub adc_noise: bool,
    /// VGA parameters (`None` to bypass the VGA)
    pub vga: Option<VgaConfig>,
    /// AGC loop parameters (unused without a VGA)
    pub agc: AgcParams,
    /// CTLE parameters
    pub ctle: CtleConfig,
    /// CDR parameters
    pub cdr: CdrConfig,
    /// DFE parameters
    pub dfe: DfeConfig,
    /// Slicer parameters
    pub slicer: SlicerConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            adc: AdcConfig::default(),
            adc_noise: true,
            vga: None,
            agc: AgcParams::default(),
            ctle: CtleConfig::default(),
            cdr: CdrConfig::default(),
            dfe: DfeConfig::default(),
            slicer: SlicerConfig::default(),
        }
    }
}

/// Output of one receiver run
#[derive(Clone, PartialEq, Debug, Default)]
pub struct RxOutput {
    /// Decided bits
    pub bits: Vec<Bit>,
    /// CTLE output at the ADC sample rate
    pub ctle_waveform: Waveform,
    /// Symbols recovered by the CDR
    pub symbols: Vec<f64>,
    /// Symbols after the DFE
    pub dfe_symbols: Vec<f64>,
    /// CDR phase-detector output per recovered symbol
    pub phase_errors: Vec<f64>,
    /// Index into the CTLE output of each recovered symbol
    pub sample_indices: Vec<usize>,
    /// VGA gain (dB) per input sample (empty without a VGA)
    pub gains_db: Vec<f64>,
    /// ADC sample rate (Hz)
    pub adc_sample_rate: f64,
    /// Samples per symbol of the input waveform
    pub sim_samples_per_symbol: usize,
}

/// Receiver with validated stages and persistent loop state
#[derive(Clone, Debug)]
pub struct Receiver {
    /// ADC
    adc: Adc,
    /// Whether the ADC adds its thermal noise
    adc_noise: bool,
    /// Optional VGA
    vga: Option<Vga>,
    /// AGC loop parameters
    agc: AgcParams,
    /// CTLE
    ctle: Ctle,
    /// CDR
    cdr: Cdr,
    /// DFE
    dfe: Dfe,
    /// Slicer
    slicer: Slicer,
    /// Current VGA gain
    gain_state: Option<GainState>,
    /// Current NCO state
    cdr_state: CdrState,
}

impl Receiver {
    /// Returns receiver with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration of any stage is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use rand::{rngs::StdRng, SeedableRng};
    /// use serdes_sim::cdr::{CdrConfig, CdrType};
    /// use serdes_sim::receiver::{Receiver, ReceiverConfig};
    /// use serdes_sim::waveform::AnalogInput;
    /// use serdes_sim::Bit;
    ///
    /// let mut receiver = Receiver::new(ReceiverConfig {
    ///     cdr: CdrConfig {
    ///         cdr_type: CdrType::Ideal,
    ///         phase: 4.0,
    ///         ..CdrConfig::default()
    ///     },
    ///     ..ReceiverConfig::default()
    /// })?;
    /// let symbols = [0.5, -0.5, -0.5, 0.5];
    /// let waveform: Vec<f64> = symbols
    ///     .iter()
    ///     .flat_map(|&s| std::iter::repeat(s + 1.0).take(16))
    ///     .collect();
    /// let mut rng = StdRng::seed_from_u64(1);
    /// let output = receiver.run(AnalogInput::SingleEnded(&waveform), 16e9, 1e9, &mut rng)?;
    /// assert_eq!(output.bits, [Bit::One, Bit::Zero, Bit::Zero, Bit::One]);
    /// assert_eq!(output.adc_sample_rate, 8e9);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: ReceiverConfig) -> Result<Self, Error> {
        let adc = Adc::new(config.adc)?;
        let vga = config.vga.map(Vga::new).transpose()?;
        let ctle = Ctle::new(&config.ctle)?;
        let cdr = Cdr::new(&config.cdr, adc.config().samples_per_symbol)?;
        let dfe = Dfe::new(&config.dfe)?;
        let slicer = Slicer::new(config.slicer)?;
        let gain_state = vga.as_ref().map(GainState::new);
        let cdr_state = cdr.initial_state();
        Ok(Self {
            adc,
            adc_noise: config.adc_noise,
            vga,
            agc: config.agc,
            ctle,
            cdr,
            dfe,
            slicer,
            gain_state,
            cdr_state,
        })
    }

    /// Returns current VGA gain (dB), or `None` without a VGA.
    #[must_use]
    pub fn gain_db(&self) -> Option<f64> {
        self.gain_state.as_ref().map(GainState::gain_db)
    }

    /// Returns current NCO state of the CDR.
    #[must_use]
    pub fn cdr_state(&self) -> &CdrState {
        &self.cdr_state
    }

    /// Returns slicer.
    #[must_use]
    pub fn slicer(&self) -> &Slicer {
        &self.slicer
    }

    /// Restores the VGA gain and the CDR state to their values at construction.
    pub fn reset(&mut self) {
        self.gain_state = self.vga.as_ref().map(GainState::new);
        self.cdr_state = self.cdr.initial_state();
    }

    /// Runs the receiver on an analog waveform.
    ///
    /// # Parameters
    ///
    /// - `input`: Analog input at the simulation sample rate.
    ///
    /// - `sim_sample_rate`: Sample rate (Hz) of `input`.
    ///
    /// - `symbol_rate`: Symbol rate (Hz).
    ///
    /// - `rng`: Random number generator for the noise added by the VGA and the ADC.
    ///
    /// # Returns
    ///
    /// - `output`: Decided bits along with the intermediate signals.
    ///
    /// # Errors
    ///
    /// Returns an error if either rate is not positive, if the rates give less than one sample
    /// per symbol, if the AGC parameters are invalid, or if the input rails cannot be aligned.
    pub fn run<R: Rng>(
        &mut self,
        input: AnalogInput<'_>,
        sim_sample_rate: f64,
        symbol_rate: f64,
        rng: &mut R,
    ) -> Result<RxOutput, Error> {
        let sim_samples_per_symbol = samples_per_symbol(sim_sample_rate, symbol_rate)?;
        let (plus, minus) = input.differential_pair(self.adc.config().v_cm)?;
        let vdiff: Vec<f64> = plus.iter().zip(&minus).map(|(p, m)| p - m).collect();
        let (vdiff, gains_db) = match (&self.vga, &mut self.gain_state) {
            (Some(vga), Some(gain_state)) => {
                vga.process(gain_state, &vdiff, sim_sample_rate, &self.agc, rng)?
            }
            _ => (vdiff, Vec::new()),
        };
        let zeros = vec![0.0; vdiff.len()];
        let (adc_out, adc_sample_rate) = self.adc.process(
            AnalogInput::Differential {
                plus: &vdiff,
                minus: &zeros,
            },
            sim_sample_rate,
            symbol_rate,
            self.adc_noise,
            rng,
        )?;
        let ctle_out = self.ctle.apply(&adc_out);
        let recovered = self.cdr.recover(&ctle_out, &mut self.cdr_state);
        let dfe_symbols = self.dfe.equalize(&recovered.symbols);
        let bits = self.slicer.slice(&dfe_symbols);
        tracing::debug!(
            sim_samples_per_symbol,
            num_samples = vdiff.len(),
            num_symbols = recovered.symbols.len(),
            num_bits = bits.len(),
            "Receiver run complete"
        );
        Ok(RxOutput {
            bits,
            ctle_waveform: Waveform::new(ctle_out, adc_sample_rate),
            symbols: recovered.symbols,
            dfe_symbols,
            phase_errors: recovered.phase_errors,
            sample_indices: recovered.sample_indices,
            gains_db,
            adc_sample_rate,
            sim_samples_per_symbol,
        })
    }
}
