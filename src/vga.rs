//! # Variable-gain amplifier with automatic gain control
//!
//! The [`Vga`] holds the static limits of the amplifier, while the current gain lives in a
//! separate [`GainState`] owned by the caller. Each call to [`Vga::process`] walks the waveform
//! in non-overlapping blocks, computes the gain that would map each block onto the target
//! peak-to-peak amplitude, smooths toward it with asymmetric attack/release time constants, and
//! applies the resulting per-sample gain. The state is left at the last block's gain so that
//! the next call continues from where this one stopped.
//!
//! # Examples
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use serdes_sim::vga::{AgcParams, GainState, Vga, VgaConfig};
//!
//! let vga = Vga::new(VgaConfig::default())?;
//! let mut state = GainState::new(&vga);
//! let mut rng = StdRng::seed_from_u64(1);
//! let waveform: Vec<f64> = (0 .. 4096)
//!     .map(|k| if (k / 16) % 2 == 0 { 0.1 } else { -0.1 })
//!     .collect();
//! let params = AgcParams {
//!     block_size: 256,
//!     target_vpp: 1.0,
//!     ..AgcParams::default()
//! };
//! let (scaled, gains_db) = vga.process(&mut state, &waveform, 16e9, &params, &mut rng)?;
//! assert_eq!(scaled.len(), waveform.len());
//! assert_eq!(gains_db.len(), waveform.len());
//! assert!(state.gain_db() > 0.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::str::FromStr;

use itertools::{Itertools, MinMaxResult};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::common::{check_nonnegative, check_positive};
use crate::Error;

/// Smallest time constant (s) used for gain smoothing
const MIN_TIME_CONSTANT: f64 = 1e-6;

/// Amplitude detector used by the AGC
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
pub enum AgcMode {
    /// Peak-to-peak amplitude
    #[default]
    #[serde(rename = "p2p")]
    PeakToPeak,
    /// RMS amplitude, converted to peak-to-peak assuming a sinusoid
    #[serde(rename = "rms")]
    Rms,
}

impl FromStr for AgcMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p2p" => Ok(AgcMode::PeakToPeak),
            "rms" => Ok(AgcMode::Rms),
            _ => Err(Error::InvalidConfiguration(format!(
                "AGC mode must be 'p2p' or 'rms' (found '{s}')"
            ))),
        }
    }
}

/// Expansion of block-level gains to per-sample gains
#[derive(Clone, Eq, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GainExpansion {
    /// Linear interpolation between block centers
    #[default]
    Interpolate,
    /// Gain held constant over each block
    Hold,
}

impl FromStr for GainExpansion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interpolate" => Ok(GainExpansion::Interpolate),
            "hold" => Ok(GainExpansion::Hold),
            _ => Err(Error::InvalidConfiguration(format!(
                "Gain expansion must be 'interpolate' or 'hold' (found '{s}')"
            ))),
        }
    }
}

/// Static parameters of the VGA
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct VgaConfig {
    /// Minimum gain (dB)
    pub min_gain_db: f64,
    /// Maximum gain (dB)
    pub max_gain_db: f64,
    /// Gain (dB) at start of operation
    pub default_gain_db: f64,
    /// Standard deviation (V) of noise added after the gain
    pub noise_std: f64,
}

impl Default for VgaConfig {
    fn default() -> Self {
        Self {
            min_gain_db: -20.0,
            max_gain_db: 40.0,
            default_gain_db: 0.0,
            noise_std: 0.0,
        }
    }
}

/// Per-call parameters of the AGC loop
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct AgcParams {
    /// Number of samples per gain update block
    pub block_size: usize,
    /// Desired peak-to-peak amplitude (V) after the VGA
    pub target_vpp: f64,
    /// Attack time constant (ms), used when the gain must rise
    pub attack_ms: f64,
    /// Release time constant (ms), used when the gain must fall
    pub release_ms: f64,
    /// Headroom (dB) below the target amplitude
    pub margin_db: f64,
    /// Amplitude detector
    pub mode: AgcMode,
    /// Expansion of block gains to sample gains
    pub expansion: GainExpansion,
}

impl Default for AgcParams {
    fn default() -> Self {
        Self {
            block_size: 1024,
            target_vpp: 1.6,
            attack_ms: 0.5,
            release_ms: 5.0,
            margin_db: 1.0,
            mode: AgcMode::PeakToPeak,
            expansion: GainExpansion::Interpolate,
        }
    }
}

/// Current gain of a VGA, persisted across successive calls
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct GainState {
    /// Current gain (dB)
    gain_db: f64,
}

impl GainState {
    /// Returns state holding the default gain of the VGA (clamped to its limits).
    #[must_use]
    pub fn new(vga: &Vga) -> Self {
        Self {
            gain_db: vga.clamp_gain_db(vga.config.default_gain_db),
        }
    }

    /// Returns current gain (dB).
    #[must_use]
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }
}

/// Variable-gain amplifier with validated configuration
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct Vga {
    /// Validated configuration
    config: VgaConfig,
}

impl Vga {
    /// Returns VGA with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the gain limits are not finite, if `min_gain_db > max_gain_db`, or
    /// if `noise_std` is negative.
    pub fn new(config: VgaConfig) -> Result<Self, Error> {
        if !config.min_gain_db.is_finite()
            || !config.max_gain_db.is_finite()
            || !config.default_gain_db.is_finite()
        {
            return Err(Error::InvalidConfiguration(
                "VGA gains must be finite".to_string(),
            ));
        }
        if config.min_gain_db > config.max_gain_db {
            return Err(Error::InvalidConfiguration(format!(
                "Minimum VGA gain ({} dB) exceeds maximum VGA gain ({} dB)",
                config.min_gain_db, config.max_gain_db
            )));
        }
        check_nonnegative("VGA noise", config.noise_std)?;
        Ok(Self { config })
    }

    /// Returns configuration.
    #[must_use]
    pub fn config(&self) -> &VgaConfig {
        &self.config
    }

    /// Sets the gain held in a state, clamped to the limits of the VGA.
    pub fn set_gain_db(&self, state: &mut GainState, gain_db: f64) {
        state.gain_db = self.clamp_gain_db(gain_db);
    }

    /// Returns gain (dB) that maps a block of samples onto a target amplitude.
    ///
    /// # Parameters
    ///
    /// - `block`: Samples whose amplitude must be measured.
    ///
    /// - `target_vpp`: Desired peak-to-peak amplitude (V).
    ///
    /// - `margin_db`: Headroom (dB) subtracted from the target.
    ///
    /// - `mode`: Amplitude detector. For [`AgcMode::Rms`], the peak-to-peak amplitude is taken
    ///   as `2 * sqrt(2)` times the RMS value about the mean.
    ///
    /// # Returns
    ///
    /// - `gain_db`: Desired gain (dB), clamped to the limits of the VGA. If the measured
    ///   amplitude is zero, the minimum gain is returned.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute_agc_gain_db(
        &self,
        block: &[f64],
        target_vpp: f64,
        margin_db: f64,
        mode: AgcMode,
    ) -> f64 {
        let measured_vpp = match mode {
            AgcMode::PeakToPeak => match block.iter().minmax() {
                MinMaxResult::MinMax(min, max) => max - min,
                MinMaxResult::OneElement(_) | MinMaxResult::NoElements => 0.0,
            },
            AgcMode::Rms => {
                if block.is_empty() {
                    0.0
                } else {
                    let num = block.len() as f64;
                    let mean = block.iter().sum::<f64>() / num;
                    let vrms = (block.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / num).sqrt();
                    2.0 * 2f64.sqrt() * vrms
                }
            }
        };
        if measured_vpp <= 0.0 || !measured_vpp.is_finite() {
            tracing::trace!("Degenerate AGC block, falling back to minimum gain");
            return self.config.min_gain_db;
        }
        let desired_lin = target_vpp * db_to_lin(-margin_db) / measured_vpp;
        self.clamp_gain_db(20.0 * desired_lin.log10())
    }

    /// Applies the AGC to a waveform.
    ///
    /// # Parameters
    ///
    /// - `state`: Gain state, updated to the gain of the last block on return.
    ///
    /// - `waveform`: Input samples.
    ///
    /// - `sample_rate`: Sample rate (Hz) of `waveform`.
    ///
    /// - `params`: AGC loop parameters.
    ///
    /// - `rng`: Random number generator for the post-gain noise.
    ///
    /// # Returns
    ///
    /// - `scaled`: Waveform after the per-sample gain (and noise, if configured).
    ///
    /// - `gains_db`: Gain (dB) applied to each sample.
    ///
    /// # Errors
    ///
    /// Returns an error if `sample_rate` or `target_vpp` is not positive, if `block_size` is
    /// `0`, or if either time constant is negative.
    #[allow(clippy::cast_precision_loss)]
    pub fn process<R: Rng>(
        &self,
        state: &mut GainState,
        waveform: &[f64],
        sample_rate: f64,
        params: &AgcParams,
        rng: &mut R,
    ) -> Result<(Vec<f64>, Vec<f64>), Error> {
        check_agc_params(params, sample_rate)?;
        if waveform.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let tau_attack = (params.attack_ms / 1000.0).max(MIN_TIME_CONSTANT);
        let tau_release = (params.release_ms / 1000.0).max(MIN_TIME_CONSTANT);
        let mut block_gains_db = Vec::with_capacity(waveform.len().div_ceil(params.block_size));
        let mut prev_db = state.gain_db;
        for block in waveform.chunks(params.block_size) {
            let desired_db =
                self.compute_agc_gain_db(block, params.target_vpp, params.margin_db, params.mode);
            let block_time = block.len() as f64 / sample_rate;
            let tau = if desired_db > prev_db {
                tau_attack
            } else {
                tau_release
            };
            let alpha = 1.0 - (-block_time / tau).exp();
            let gain_db = self.clamp_gain_db((1.0 - alpha) * prev_db + alpha * desired_db);
            block_gains_db.push(gain_db);
            prev_db = gain_db;
        }
        let gains_db = expand_block_gains(
            &block_gains_db,
            params.block_size,
            waveform.len(),
            params.expansion,
        );
        let scaled = waveform
            .iter()
            .zip(&gains_db)
            .map(|(&x, &g)| {
                let y = x * db_to_lin(g);
                if self.config.noise_std > 0.0 {
                    y + self.config.noise_std * rng.sample::<f64, _>(StandardNormal)
                } else {
                    y
                }
            })
            .collect();
        state.gain_db = prev_db;
        tracing::debug!(
            num_blocks = block_gains_db.len(),
            gain_db = state.gain_db,
            "AGC updated gain"
        );
        Ok((scaled, gains_db))
    }

    /// Returns gain clamped to the limits of the VGA.
    fn clamp_gain_db(&self, gain_db: f64) -> f64 {
        gain_db.clamp(self.config.min_gain_db, self.config.max_gain_db)
    }
}

/// Checks validity of AGC parameters.
fn check_agc_params(params: &AgcParams, sample_rate: f64) -> Result<(), Error> {
    check_positive("AGC sample rate", sample_rate)?;
    if params.block_size == 0 {
        return Err(Error::InvalidConfiguration(
            "AGC block size cannot be zero".to_string(),
        ));
    }
    check_positive("AGC target amplitude", params.target_vpp)?;
    check_nonnegative("AGC attack time", params.attack_ms)?;
    check_nonnegative("AGC release time", params.release_ms)?;
    if !params.margin_db.is_finite() {
        return Err(Error::InvalidConfiguration(
            "AGC margin must be finite".to_string(),
        ));
    }
    Ok(())
}

/// Returns per-sample gains from block gains.
#[allow(clippy::cast_precision_loss)]
fn expand_block_gains(
    block_gains_db: &[f64],
    block_size: usize,
    num_samples: usize,
    expansion: GainExpansion,
) -> Vec<f64> {
    if expansion == GainExpansion::Hold || block_gains_db.len() < 2 {
        return block_gains_db
            .iter()
            .flat_map(|&g| std::iter::repeat(g).take(block_size))
            .take(num_samples)
            .collect();
    }
    let half_block = 0.5 * block_size as f64;
    let last = block_gains_db.len() - 1;
    (0 .. num_samples)
        .map(|n| {
            // Block `i` is centered at `i * block_size + block_size / 2`
            let position = (n as f64 - half_block) / block_size as f64;
            if position <= 0.0 {
                block_gains_db[0]
            } else {
                #[allow(clippy::cast_possible_truncation)]
                #[allow(clippy::cast_sign_loss)]
                let i = position.floor() as usize;
                if i >= last {
                    block_gains_db[last]
                } else {
                    let frac = position - i as f64;
                    block_gains_db[i] + frac * (block_gains_db[i + 1] - block_gains_db[i])
                }
            }
        })
        .collect()
}

/// Returns linear amplitude ratio for a gain in dB.
fn db_to_lin(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0)
}
