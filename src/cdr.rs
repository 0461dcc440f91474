//! # Clock and data recovery
//!
//! Timing recovery closes a loop around three pieces:
//!
//! - a [`PhaseDetector`] that turns a [`SampleWindow`] (early, mid and late samples around the
//!   current estimate of the symbol center) into a phase error, positive when the sampling
//!   clock is early and the next sampling instant must move later;
//! - an optional [`FirstOrderLoopFilter`] that integrates the raw error;
//! - a numerically-controlled oscillator whose state is held in [`CdrState`], advanced once
//!   per symbol by either the bang-bang rule or the proportional-integral rule of
//!   [`LoopControl`].
//!
//! The [`Cdr`] ties these together according to the configured [`CdrType`] and walks an
//! equalized waveform symbol by symbol. [`CdrType::Ideal`] bypasses the loop and decimates the
//! waveform at a fixed stride.
//!
//! # Examples
//!
//! ```
//! use serdes_sim::cdr::{Cdr, CdrConfig, CdrType};
//!
//! let sps = 8;
//! let waveform: Vec<f64> = (0 .. 40 * sps)
//!     .map(|k| if (k / sps) % 2 == 0 { -1.0 } else { 1.0 })
//!     .collect();
//! let cdr = Cdr::new(
//!     &CdrConfig {
//!         cdr_type: CdrType::BangBang,
//!         kp: 0.5,
//!         phase: 4.0,
//!         ..CdrConfig::default()
//!     },
//!     sps,
//! )?;
//! let mut state = cdr.initial_state();
//! let output = cdr.recover(&waveform, &mut state);
//! assert_eq!(output.symbols.len(), 40);
//! assert!(output.phase_errors.iter().all(|&e| e == 0.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::check_positive;
use crate::Error;

/// Samples observed by a phase detector around the current estimate of the symbol center
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct SampleWindow {
    /// Sample about half a symbol before the center
    pub early: f64,
    /// Sample at the center
    pub mid: f64,
    /// Sample about half a symbol after the center
    pub late: f64,
}

/// Phase detector for timing recovery
pub trait PhaseDetector {
    /// Returns phase error for a window of samples, positive when the sampling clock is early.
    ///
    /// `threshold` is the decision threshold for detectors that slice their inputs.
    fn detect(&self, window: &SampleWindow, threshold: f64) -> f64;
}

/// Bang-bang (Alexander) phase detector with ternary output
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default)]
pub struct BangBangDetector;

impl PhaseDetector for BangBangDetector {
    fn detect(&self, window: &SampleWindow, threshold: f64) -> f64 {
        let early = window.early > threshold;
        let mid = window.mid > threshold;
        let late = window.late > threshold;
        if early != mid {
            1.0
        } else if late != mid {
            -1.0
        } else {
            0.0
        }
    }
}

/// Hogge-style linear phase detector
///
/// The error is the product of the center sample and the difference between the late and early
/// samples, so its magnitude grows with the signal amplitude. The threshold is not used.
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default)]
pub struct HoggeDetector;

impl PhaseDetector for HoggeDetector {
    fn detect(&self, window: &SampleWindow, _threshold: f64) -> f64 {
        (window.late - window.early) * window.mid
    }
}

/// State of a first-order loop filter
#[derive(Clone, PartialEq, Debug, Copy, Default)]
pub struct LoopFilterState {
    /// Integrated phase estimate
    estimate: f64,
}

impl LoopFilterState {
    /// Returns integrated phase estimate.
    #[must_use]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }
}

/// First-order (pure integration) loop filter
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct FirstOrderLoopFilter {
    /// Integration coefficient
    alpha: f64,
}

impl FirstOrderLoopFilter {
    /// Returns loop filter with given integration coefficient.
    ///
    /// # Errors
    ///
    /// Returns an error if `alpha` is not a positive number.
    pub fn new(alpha: f64) -> Result<Self, Error> {
        check_positive("Loop filter coefficient", alpha)?;
        Ok(Self { alpha })
    }

    /// Integrates an error into the state and returns the new phase estimate.
    pub fn filter(&self, state: &mut LoopFilterState, error: f64) -> f64 {
        state.estimate += self.alpha * error;
        state.estimate
    }

    /// Returns running phase estimates for a sequence of errors, starting from zero.
    #[must_use]
    pub fn filter_all(&self, errors: &[f64]) -> Vec<f64> {
        let mut state = LoopFilterState::default();
        errors.iter().map(|&e| self.filter(&mut state, e)).collect()
    }
}

/// Rule by which the NCO is advanced once per symbol
#[derive(Clone, PartialEq, Debug, Copy)]
pub enum LoopControl {
    /// `phase += nominal_freq + kp * error`
    BangBang {
        /// Nominal phase increment (samples per symbol)
        nominal_freq: f64,
        /// Proportional gain
        kp: f64,
    },
    /// `freq += ki * error; phase += freq + kp * error`
    ProportionalIntegral {
        /// Proportional gain
        kp: f64,
        /// Integral gain
        ki: f64,
    },
}

/// State of the NCO driving the sampling instant
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct CdrState {
    /// Phase accumulator (samples), in `[0, phase_modulo)`
    phase: f64,
    /// Phase increment per symbol (samples)
    freq: f64,
    /// Wrap modulus of the phase accumulator (samples)
    phase_modulo: f64,
}

impl CdrState {
    /// Returns NCO state with given initial phase, frequency and wrap modulus.
    ///
    /// The initial phase is wrapped into `[0, phase_modulo)`.
    ///
    /// # Errors
    ///
    /// Returns an error if `phase_modulo` or `freq` is not a positive number, or if `phase` is
    /// not finite.
    pub fn new(phase: f64, freq: f64, phase_modulo: f64) -> Result<Self, Error> {
        check_positive("CDR phase modulus", phase_modulo)?;
        check_positive("CDR frequency", freq)?;
        if !phase.is_finite() {
            return Err(Error::InvalidConfiguration(format!(
                "CDR initial phase must be finite (found {phase})"
            )));
        }
        let mut state = Self {
            phase: 0.0,
            freq,
            phase_modulo,
        };
        state.advance(phase);
        Ok(state)
    }

    /// Returns phase accumulator (samples).
    #[must_use]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Returns phase increment per symbol (samples).
    #[must_use]
    pub fn freq(&self) -> f64 {
        self.freq
    }

    /// Returns wrap modulus of the phase accumulator (samples).
    #[must_use]
    pub fn phase_modulo(&self) -> f64 {
        self.phase_modulo
    }

    /// Returns sample index selected by the phase accumulator (nearest integer, ties to even).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample_index(&self) -> i64 {
        self.phase.round_ties_even() as i64
    }

    /// Advances the NCO by one symbol using the bang-bang rule.
    ///
    /// Returns the number of whole `phase_modulo` periods by which the accumulator wrapped.
    pub fn update_bang_bang(&mut self, phase_error: f64, nominal_freq: f64, kp: f64) -> i64 {
        self.advance(nominal_freq + kp * phase_error)
    }

    /// Advances the NCO by one symbol using the proportional-integral rule.
    ///
    /// Returns the number of whole `phase_modulo` periods by which the accumulator wrapped.
    pub fn update_digital_pll(&mut self, phase_error: f64, kp: f64, ki: f64) -> i64 {
        self.freq += ki * phase_error;
        self.advance(self.freq + kp * phase_error)
    }

    /// Advances the NCO by one symbol using a given rule.
    ///
    /// Returns the number of whole `phase_modulo` periods by which the accumulator wrapped.
    pub fn update(&mut self, control: LoopControl, phase_error: f64) -> i64 {
        match control {
            LoopControl::BangBang { nominal_freq, kp } => {
                self.update_bang_bang(phase_error, nominal_freq, kp)
            }
            LoopControl::ProportionalIntegral { kp, ki } => {
                self.update_digital_pll(phase_error, kp, ki)
            }
        }
    }

    /// Adds a step to the phase accumulator and wraps it into `[0, phase_modulo)`.
    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self, step: f64) -> i64 {
        let unwrapped = self.phase + step;
        let mut periods = (unwrapped / self.phase_modulo).floor();
        let mut phase = unwrapped - periods * self.phase_modulo;
        if phase < 0.0 {
            phase += self.phase_modulo;
            periods -= 1.0;
        }
        if phase >= self.phase_modulo {
            phase -= self.phase_modulo;
            periods += 1.0;
        }
        if !(0.0 .. self.phase_modulo).contains(&phase) {
            phase = 0.0;
        }
        self.phase = phase;
        periods as i64
    }
}

/// Enumeration of timing recovery schemes
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CdrType {
    /// Fixed-stride decimation without feedback
    #[default]
    Ideal,
    /// Bang-bang detector with phase-only NCO update
    #[serde(alias = "bbpd", alias = "bangbang")]
    BangBang,
    /// Hogge detector with proportional-integral NCO update
    Hogge,
    /// Bang-bang detector with proportional-integral NCO update
    #[serde(alias = "pi", alias = "pll")]
    DigitalPll,
}

impl FromStr for CdrType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ideal" => Ok(CdrType::Ideal),
            "bang_bang" | "bangbang" | "bbpd" => Ok(CdrType::BangBang),
            "hogge" => Ok(CdrType::Hogge),
            "digital_pll" | "pi" | "pll" => Ok(CdrType::DigitalPll),
            _ => Err(Error::InvalidConfiguration(format!(
                "Unknown CDR type '{s}'"
            ))),
        }
    }
}

/// Parameters of the CDR
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct CdrConfig {
    /// Timing recovery scheme
    #[serde(rename = "type")]
    pub cdr_type: CdrType,
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Initial phase (samples)
    pub phase: f64,
    /// Initial phase increment per symbol (samples); defaults to the samples per symbol
    pub freq: Option<f64>,
    /// Wrap modulus of the phase accumulator (samples); defaults to the samples per symbol
    pub phase_modulo: Option<f64>,
    /// Decision threshold used by slicing phase detectors
    pub decision_threshold: f64,
    /// Coefficient of a first-order loop filter applied to the detector output, if any
    pub loop_filter_alpha: Option<f64>,
}

impl Default for CdrConfig {
    fn default() -> Self {
        Self {
            cdr_type: CdrType::Ideal,
            kp: 0.01,
            ki: 0.001,
            phase: 0.0,
            freq: None,
            phase_modulo: None,
            decision_threshold: 0.0,
            loop_filter_alpha: None,
        }
    }
}

/// Output of timing recovery
#[derive(Clone, PartialEq, Debug, Default)]
pub struct CdrOutput {
    /// Waveform value at each recovered symbol center
    pub symbols: Vec<f64>,
    /// Raw phase-detector output for each recovered symbol (empty for ideal sampling)
    pub phase_errors: Vec<f64>,
    /// Waveform index of each recovered symbol center
    pub sample_indices: Vec<usize>,
}

/// Timing recovery loop with validated configuration
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct Cdr {
    /// Timing recovery scheme
    cdr_type: CdrType,
    /// Proportional gain
    kp: f64,
    /// Integral gain
    ki: f64,
    /// Decision threshold for slicing detectors
    threshold: f64,
    /// Optional loop filter
    loop_filter: Option<FirstOrderLoopFilter>,
    /// Samples per symbol of the waveform to be recovered
    samples_per_symbol: usize,
    /// NCO state at start of operation
    initial_state: CdrState,
}

impl Cdr {
    /// Returns CDR with given configuration for a waveform with given samples per symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if `samples_per_symbol` is `0`, if it is `1` for a closed-loop scheme,
    /// if a gain or the decision threshold is not finite or a gain is negative, or if the
    /// initial NCO state or loop filter coefficient is invalid.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(config: &CdrConfig, samples_per_symbol: usize) -> Result<Self, Error> {
        if samples_per_symbol < 1 {
            return Err(Error::InvalidConfiguration(
                "CDR samples per symbol must be at least 1".to_string(),
            ));
        }
        if config.cdr_type != CdrType::Ideal && samples_per_symbol < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "CDR type {:?} requires at least 2 samples per symbol",
                config.cdr_type
            )));
        }
        for (name, gain) in [("kp", config.kp), ("ki", config.ki)] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "CDR gain {name} must be a nonnegative number (found {gain})"
                )));
            }
        }
        if !config.decision_threshold.is_finite() {
            return Err(Error::InvalidConfiguration(
                "CDR decision threshold must be finite".to_string(),
            ));
        }
        let loop_filter = config
            .loop_filter_alpha
            .map(FirstOrderLoopFilter::new)
            .transpose()?;
        let sps = samples_per_symbol as f64;
        let initial_state = CdrState::new(
            config.phase,
            config.freq.unwrap_or(sps),
            config.phase_modulo.unwrap_or(sps),
        )?;
        Ok(Self {
            cdr_type: config.cdr_type,
            kp: config.kp,
            ki: config.ki,
            threshold: config.decision_threshold,
            loop_filter,
            samples_per_symbol,
            initial_state,
        })
    }

    /// Returns timing recovery scheme.
    #[must_use]
    pub fn cdr_type(&self) -> CdrType {
        self.cdr_type
    }

    /// Returns NCO state at start of operation.
    #[must_use]
    pub fn initial_state(&self) -> CdrState {
        self.initial_state
    }

    /// Recovers symbols from an equalized waveform.
    ///
    /// # Parameters
    ///
    /// - `waveform`: Equalized waveform, at the samples per symbol given to [`Cdr::new`].
    ///
    /// - `state`: NCO state, advanced once per symbol (left untouched by ideal sampling).
    ///
    /// # Returns
    ///
    /// - `output`: Recovered symbols, phase errors and sampling indices.
    #[must_use]
    pub fn recover(&self, waveform: &[f64], state: &mut CdrState) -> CdrOutput {
        let output = match self.cdr_type {
            CdrType::Ideal => {
                let offset = usize::try_from(state.sample_index()).unwrap_or(0);
                ideal_sampler(waveform, self.samples_per_symbol, offset)
            }
            CdrType::BangBang => self.run_loop(
                waveform,
                state,
                &BangBangDetector,
                LoopControl::BangBang {
                    nominal_freq: state.freq(),
                    kp: self.kp,
                },
            ),
            CdrType::Hogge => self.run_loop(
                waveform,
                state,
                &HoggeDetector,
                LoopControl::ProportionalIntegral {
                    kp: self.kp,
                    ki: self.ki,
                },
            ),
            CdrType::DigitalPll => self.run_loop(
                waveform,
                state,
                &BangBangDetector,
                LoopControl::ProportionalIntegral {
                    kp: self.kp,
                    ki: self.ki,
                },
            ),
        };
        tracing::debug!(
            cdr_type = ?self.cdr_type,
            num_symbols = output.symbols.len(),
            phase = state.phase(),
            freq = state.freq(),
            "CDR recovered symbols"
        );
        output
    }

    /// Runs the closed timing-recovery loop over a waveform.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_possible_wrap)]
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_sign_loss)]
    fn run_loop<D: PhaseDetector>(
        &self,
        waveform: &[f64],
        state: &mut CdrState,
        detector: &D,
        control: LoopControl,
    ) -> CdrOutput {
        let early_offset = (self.samples_per_symbol / 2) as i64;
        let late_offset = (self.samples_per_symbol - 1) as i64 - early_offset;
        let num_samples = waveform.len() as i64;
        let mut output = CdrOutput::default();
        let mut filter_state = LoopFilterState::default();
        // Absolute position (samples) of the start of the current phase period
        let mut origin = 0.0;
        let mut last_index: Option<i64> = None;
        loop {
            let index = (origin + state.phase()).round_ties_even() as i64;
            if last_index.is_some_and(|last| index <= last) {
                tracing::warn!(index, "CDR loop stopped advancing, ending recovery");
                break;
            }
            if index + late_offset >= num_samples {
                break;
            }
            let mut error = 0.0;
            if index - early_offset >= 0 {
                let window = SampleWindow {
                    early: waveform[(index - early_offset) as usize],
                    mid: waveform[index as usize],
                    late: waveform[(index + late_offset) as usize],
                };
                error = detector.detect(&window, self.threshold);
                output.symbols.push(window.mid);
                output.phase_errors.push(error);
                output.sample_indices.push(index as usize);
            }
            let drive = match &self.loop_filter {
                Some(filter) => filter.filter(&mut filter_state, error),
                None => error,
            };
            let periods = state.update(control, drive);
            origin += periods as f64 * state.phase_modulo();
            last_index = Some(index);
        }
        output
    }
}

/// Returns symbols taken from a waveform at a fixed stride (no timing feedback).
///
/// # Parameters
///
/// - `waveform`: Waveform to be sampled.
///
/// - `samples_per_symbol`: Stride between samples. Must be positive.
///
/// - `offset`: Index of the first sample.
///
/// # Returns
///
/// - `output`: Sampled symbols and their indices (no phase errors).
#[must_use]
pub fn ideal_sampler(waveform: &[f64], samples_per_symbol: usize, offset: usize) -> CdrOutput {
    let (sample_indices, symbols) = waveform
        .iter()
        .enumerate()
        .skip(offset)
        .step_by(samples_per_symbol.max(1))
        .map(|(index, &x)| (index, x))
        .unzip();
    CdrOutput {
        symbols,
        phase_errors: Vec::new(),
        sample_indices,
    }
}
