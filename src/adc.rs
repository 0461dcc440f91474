//! # Differential analog-to-digital converter
//!
//! The [`Adc`] resamples an analog waveform from the simulation rate onto the receiver's own
//! sample grid (`samples_per_symbol` samples per symbol), optionally adds thermal noise, and
//! quantizes the differential voltage uniformly over the full-scale swing. Quantization is
//! performed on `plus - minus`; a single-ended input is taken against the common-mode voltage.
//!
//! # Examples
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use serdes_sim::adc::{Adc, AdcConfig};
//! use serdes_sim::waveform::AnalogInput;
//!
//! let adc = Adc::new(AdcConfig {
//!     resolution_bits: 6,
//!     v_swing: 2.0,
//!     v_cm: 0.0,
//!     thermal_noise_stddev: 0.0,
//!     samples_per_symbol: 4,
//! })?;
//! let mut rng = StdRng::seed_from_u64(1);
//! let input = [0.5; 161];
//! let (vdiff_q, adc_sample_rate) =
//!     adc.process(AnalogInput::SingleEnded(&input), 16e9, 1e9, true, &mut rng)?;
//! assert_eq!(adc_sample_rate, 4e9);
//! assert_eq!(vdiff_q.len(), 41);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::common::{check_nonnegative, check_positive};
use crate::waveform::{sample_at, AnalogInput};
use crate::Error;

/// Largest supported resolution (bits)
const MAX_RESOLUTION_BITS: u32 = 24;

/// Tolerance (in output samples) used when counting the samples spanned by the input
const GRID_TOLERANCE: f64 = 1e-9;

/// Parameters of the ADC
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct AdcConfig {
    /// Resolution (bits); the number of quantization levels is `2^resolution_bits`
    pub resolution_bits: u32,
    /// Full-scale differential swing (V, peak-to-peak)
    pub v_swing: f64,
    /// Common-mode voltage (V)
    pub v_cm: f64,
    /// Standard deviation (V) of thermal noise added before quantization
    pub thermal_noise_stddev: f64,
    /// Number of ADC samples per symbol
    pub samples_per_symbol: usize,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            resolution_bits: 6,
            v_swing: 2.0,
            v_cm: 1.0,
            thermal_noise_stddev: 0.0,
            samples_per_symbol: 8,
        }
    }
}

/// Differential ADC with validated configuration
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct Adc {
    /// Validated configuration
    config: AdcConfig,
    /// Number of quantization levels
    levels: u32,
}

impl Adc {
    /// Returns ADC with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `samples_per_symbol` is `0`, if `resolution_bits` is not in
    /// `[1, 24]`, if `v_swing` is not positive, or if `thermal_noise_stddev` is negative.
    pub fn new(config: AdcConfig) -> Result<Self, Error> {
        if config.samples_per_symbol < 1 {
            return Err(Error::InvalidConfiguration(
                "ADC samples per symbol must be at least 1".to_string(),
            ));
        }
        if !(1 ..= MAX_RESOLUTION_BITS).contains(&config.resolution_bits) {
            return Err(Error::InvalidConfiguration(format!(
                "ADC resolution must be between 1 and {MAX_RESOLUTION_BITS} bits (found {})",
                config.resolution_bits
            )));
        }
        check_positive("ADC swing", config.v_swing)?;
        check_nonnegative("ADC thermal noise", config.thermal_noise_stddev)?;
        Ok(Self {
            config,
            levels: 1 << config.resolution_bits,
        })
    }

    /// Returns configuration.
    #[must_use]
    pub fn config(&self) -> &AdcConfig {
        &self.config
    }

    /// Returns number of quantization levels.
    #[must_use]
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Returns ADC sample rate (Hz) for a given symbol rate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_rate(&self, symbol_rate: f64) -> f64 {
        self.config.samples_per_symbol as f64 * symbol_rate
    }

    /// Returns quantized differential voltage at the ADC sample rate.
    ///
    /// # Parameters
    ///
    /// - `input`: Analog input at the simulation sample rate.
    ///
    /// - `sim_sample_rate`: Sample rate (Hz) of `input`.
    ///
    /// - `symbol_rate`: Symbol rate (Hz).
    ///
    /// - `add_noise`: Whether thermal noise must be added before quantization.
    ///
    /// - `rng`: Random number generator for the thermal noise.
    ///
    /// # Returns
    ///
    /// - `vdiff_q`: Quantized differential voltage. Empty if the input spans zero duration.
    ///
    /// - `adc_sample_rate`: ADC sample rate (Hz).
    ///
    /// # Errors
    ///
    /// Returns an error if either rate is not positive, or if the input rails cannot be
    /// aligned.
    pub fn process<R: Rng>(
        &self,
        input: AnalogInput<'_>,
        sim_sample_rate: f64,
        symbol_rate: f64,
        add_noise: bool,
        rng: &mut R,
    ) -> Result<(Vec<f64>, f64), Error> {
        let (codes, adc_sample_rate) =
            self.process_codes(input, sim_sample_rate, symbol_rate, add_noise, rng)?;
        Ok((self.dequantize(&codes), adc_sample_rate))
    }

    /// Returns quantization codes at the ADC sample rate.
    ///
    /// Identical to [`Adc::process`], except that the integer codes in `[0, levels - 1]` are
    /// returned instead of the reconstructed voltages.
    ///
    /// # Errors
    ///
    /// Returns an error if either rate is not positive, or if the input rails cannot be
    /// aligned.
    pub fn process_codes<R: Rng>(
        &self,
        input: AnalogInput<'_>,
        sim_sample_rate: f64,
        symbol_rate: f64,
        add_noise: bool,
        rng: &mut R,
    ) -> Result<(Vec<u32>, f64), Error> {
        check_positive("Simulation sample rate", sim_sample_rate)?;
        check_positive("Symbol rate", symbol_rate)?;
        let (plus, minus) = input.differential_pair(self.config.v_cm)?;
        let vdiff: Vec<f64> = plus.iter().zip(&minus).map(|(p, m)| p - m).collect();
        let adc_sample_rate = self.sample_rate(symbol_rate);
        let mut vdiff_adc = resample(&vdiff, sim_sample_rate, adc_sample_rate);
        if add_noise && self.config.thermal_noise_stddev > 0.0 {
            for v in &mut vdiff_adc {
                *v += self.config.thermal_noise_stddev * rng.sample::<f64, _>(StandardNormal);
            }
        }
        tracing::debug!(
            input_len = vdiff.len(),
            output_len = vdiff_adc.len(),
            adc_sample_rate,
            "ADC resampled differential input"
        );
        Ok((self.quantize(&vdiff_adc), adc_sample_rate))
    }

    /// Returns quantization codes for given differential voltages.
    ///
    /// Each voltage is clipped to `[-v_swing/2, v_swing/2]`, mapped linearly onto
    /// `[0, levels - 1]` and rounded to the nearest integer (ties to even).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn quantize(&self, vdiff: &[f64]) -> Vec<u32> {
        let half_swing = 0.5 * self.config.v_swing;
        let max_code = f64::from(self.levels - 1);
        vdiff
            .iter()
            .map(|&v| {
                let clipped = v.clamp(-half_swing, half_swing);
                let code = ((clipped + half_swing) / self.config.v_swing * max_code)
                    .round_ties_even()
                    .clamp(0.0, max_code);
                code as u32
            })
            .collect()
    }

    /// Returns differential voltages reconstructed from given quantization codes.
    ///
    /// Code `c` maps to `c / (levels - 1) * v_swing - v_swing / 2`, so the result lies in
    /// `[-v_swing/2, v_swing/2]`. The result is the differential voltage `plus - minus`; `v_cm`
    /// is not added back, whatever its value.
    #[must_use]
    pub fn dequantize(&self, codes: &[u32]) -> Vec<f64> {
        let half_swing = 0.5 * self.config.v_swing;
        let max_code = f64::from(self.levels - 1);
        codes
            .iter()
            .map(|&code| f64::from(code) / max_code * self.config.v_swing - half_swing)
            .collect()
    }
}

/// Returns differential signal linearly interpolated onto the ADC sample grid.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_sign_loss)]
fn resample(vdiff: &[f64], sim_sample_rate: f64, adc_sample_rate: f64) -> Vec<f64> {
    if vdiff.len() < 2 {
        return Vec::new();
    }
    let input_step = sim_sample_rate / adc_sample_rate;
    let last_input_index = (vdiff.len() - 1) as f64;
    let num_output = (last_input_index / input_step + GRID_TOLERANCE).floor() as usize + 1;
    (0 .. num_output)
        .map(|k| sample_at(vdiff, k as f64 * input_step))
        .collect()
}
