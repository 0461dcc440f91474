//! # Waveforms and sample-domain helpers
//!
//! The [`Waveform`] type pairs a sequence of real-valued samples with its sample rate. The
//! [`AnalogInput`] enum describes the forms in which an analog signal can be handed to the
//! receiver (single-ended, as an explicit pair of rails, or as an array of `[plus, minus]`
//! rows); [`AnalogInput::differential_pair`] normalizes all of them to a pair of equal-length
//! rails.
//!
//! The remaining functions are small building blocks shared by several stages: linear
//! interpolation at a fractional index ([`sample_at`]), centered FIR convolution
//! ([`convolve_same`]) and the canonical derivation of samples per symbol from a pair of rates
//! ([`samples_per_symbol`]).

use serde::{Deserialize, Serialize};

use crate::common::check_positive;
use crate::Error;

/// Real-valued waveform with its sample rate
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Waveform {
    /// Samples
    pub samples: Vec<f64>,
    /// Sample rate (Hz)
    pub sample_rate: f64,
}

impl Waveform {
    /// Returns waveform with given samples and sample rate.
    #[must_use]
    pub fn new(samples: Vec<f64>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the waveform holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns duration (s) spanned by the samples, i.e., the time of the last sample.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.samples.is_empty() || self.sample_rate <= 0.0 {
            0.0
        } else {
            (self.samples.len() - 1) as f64 / self.sample_rate
        }
    }
}

/// Analog signal presented to the receiver front end
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AnalogInput<'a> {
    /// Single-ended signal, taken as differential against the common-mode voltage
    SingleEnded(&'a [f64]),
    /// Explicit pair of rails
    Differential {
        /// Positive rail
        plus: &'a [f64],
        /// Negative rail
        minus: &'a [f64],
    },
    /// Rows of `[plus, minus]` samples
    Rails(&'a [[f64; 2]]),
}

impl AnalogInput<'_> {
    /// Returns the input as a pair of equal-length rails.
    ///
    /// # Parameters
    ///
    /// - `v_cm`: Common-mode voltage used as the negative rail of a single-ended input.
    ///
    /// # Returns
    ///
    /// - `(plus, minus)`: Positive and negative rails. If the rails of a differential input
    ///   differ in length, the shorter one is stretched to the longer length by linear
    ///   interpolation over a common normalized time axis `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if exactly one of the two rails is empty.
    pub fn differential_pair(&self, v_cm: f64) -> Result<(Vec<f64>, Vec<f64>), Error> {
        match *self {
            AnalogInput::SingleEnded(samples) => Ok((samples.to_vec(), vec![v_cm; samples.len()])),
            AnalogInput::Rails(rows) => Ok((
                rows.iter().map(|row| row[0]).collect(),
                rows.iter().map(|row| row[1]).collect(),
            )),
            AnalogInput::Differential { plus, minus } => {
                if plus.len() == minus.len() {
                    return Ok((plus.to_vec(), minus.to_vec()));
                }
                if plus.is_empty() || minus.is_empty() {
                    return Err(Error::InvalidConfiguration(format!(
                        "Cannot align an empty rail with a rail of {} samples",
                        plus.len().max(minus.len())
                    )));
                }
                let len = plus.len().max(minus.len());
                Ok((stretch(plus, len), stretch(minus, len)))
            }
        }
    }
}

/// Returns sequence stretched to a given length by linear interpolation over normalized time.
#[allow(clippy::cast_precision_loss)]
fn stretch(samples: &[f64], len: usize) -> Vec<f64> {
    if samples.len() == len {
        return samples.to_vec();
    }
    if len == 1 {
        return vec![samples[0]];
    }
    let scale = (samples.len() - 1) as f64 / (len - 1) as f64;
    (0 .. len).map(|i| sample_at(samples, i as f64 * scale)).collect()
}

/// Returns linearly interpolated value of a sequence at a fractional index.
///
/// # Parameters
///
/// - `samples`: Sequence to be interpolated. Must not be empty.
///
/// - `position`: Fractional index. Values outside `[0, samples.len() - 1]` are clamped to the
///   nearest edge.
///
/// # Returns
///
/// - `value`: Interpolated value.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_sign_loss)]
pub fn sample_at(samples: &[f64], position: f64) -> f64 {
    let last = samples.len() - 1;
    let position = position.clamp(0.0, last as f64);
    let index = position.floor() as usize;
    if index >= last {
        return samples[last];
    }
    let frac = position - index as f64;
    samples[index] + frac * (samples[index + 1] - samples[index])
}

/// Returns centered ("same"-length) FIR convolution of a signal with given taps.
///
/// # Parameters
///
/// - `signal`: Input signal.
///
/// - `taps`: Filter taps.
///
/// # Returns
///
/// - `output`: Sequence of length `signal.len()`, equal to the full convolution
///   `y[n] = sum_k taps[k] * signal[n - k]` cropped so that it starts at index
///   `(taps.len() - 1) / 2`.
#[must_use]
pub fn convolve_same(signal: &[f64], taps: &[f64]) -> Vec<f64> {
    if signal.is_empty() || taps.is_empty() {
        return vec![0.0; signal.len()];
    }
    let offset = (taps.len() - 1) / 2;
    (0 .. signal.len())
        .map(|n| {
            let full_index = n + offset;
            let k_min = (full_index + 1).saturating_sub(signal.len());
            let k_max = full_index.min(taps.len() - 1);
            (k_min ..= k_max)
                .map(|k| taps[k] * signal[full_index - k])
                .sum()
        })
        .collect()
}

/// Returns number of samples per symbol for a given pair of rates.
///
/// # Parameters
///
/// - `sample_rate`: Sample rate (Hz).
///
/// - `symbol_rate`: Symbol rate (Hz).
///
/// # Returns
///
/// - `sps`: Ratio of the two rates rounded to the nearest integer, with ties going to the even
///   integer.
///
/// # Errors
///
/// Returns an error if either rate is not positive or if the rounded ratio is `0`.
///
/// # Examples
///
/// ```
/// use serdes_sim::waveform::samples_per_symbol;
///
/// assert_eq!(samples_per_symbol(160e9, 10e9)?, 16);
/// assert_eq!(samples_per_symbol(50e9, 20e9)?, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn samples_per_symbol(sample_rate: f64, symbol_rate: f64) -> Result<usize, Error> {
    check_positive("Sample rate", sample_rate)?;
    check_positive("Symbol rate", symbol_rate)?;
    let sps = (sample_rate / symbol_rate).round_ties_even();
    if sps < 1.0 {
        return Err(Error::InvalidConfiguration(format!(
            "Sample rate {sample_rate} Hz is too low for symbol rate {symbol_rate} Hz"
        )));
    }
    Ok(sps as usize)
}
