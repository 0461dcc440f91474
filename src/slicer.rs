//! # Symbol slicer
//!
//! Converts equalized symbols to bits. NRZ symbols are compared against a single threshold;
//! PAM4 symbols are compared against three increasing thresholds and mapped to Gray-coded bit
//! pairs, most significant bit first:
//!
//! | Region                     | Bits     |
//! |----------------------------|----------|
//! | `s < thresholds[0]`        | `(0, 0)` |
//! | `s < thresholds[1]`        | `(0, 1)` |
//! | `s < thresholds[2]`        | `(1, 1)` |
//! | otherwise                  | `(1, 0)` |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Bit;
use crate::Error;

/// Parameters of the slicer
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
#[serde(tag = "slicer_type", rename_all = "snake_case")]
pub enum SlicerConfig {
    /// Binary decisions
    #[serde(alias = "NRZ")]
    Nrz {
        /// Decision threshold; symbols strictly above it decide `1`
        #[serde(default)]
        threshold: f64,
    },
    /// Four-level decisions with Gray coding
    #[serde(alias = "PAM4")]
    Pam4 {
        /// Decision thresholds, strictly increasing
        #[serde(default = "default_pam4_thresholds")]
        thresholds: [f64; 3],
    },
}

impl Default for SlicerConfig {
    fn default() -> Self {
        SlicerConfig::Nrz { threshold: 0.0 }
    }
}

impl FromStr for SlicerConfig {
    type Err = Error;

    /// Returns slicer configuration with default thresholds for a named slicer type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nrz" => Ok(SlicerConfig::Nrz { threshold: 0.0 }),
            "pam4" => Ok(SlicerConfig::Pam4 {
                thresholds: default_pam4_thresholds(),
            }),
            _ => Err(Error::InvalidConfiguration(format!(
                "Unknown slicer type '{s}'"
            ))),
        }
    }
}

/// Returns default PAM4 thresholds, midway between nominal levels `-3, -1, 1, 3`.
#[must_use]
pub fn default_pam4_thresholds() -> [f64; 3] {
    [-2.0, 0.0, 2.0]
}

/// Slicer with validated thresholds
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct Slicer {
    /// Validated configuration
    config: SlicerConfig,
}

impl Slicer {
    /// Returns slicer with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a threshold is not finite or if the PAM4 thresholds are not strictly
    /// increasing.
    pub fn new(config: SlicerConfig) -> Result<Self, Error> {
        match config {
            SlicerConfig::Nrz { threshold } => {
                if !threshold.is_finite() {
                    return Err(Error::InvalidConfiguration(format!(
                        "Slicer threshold must be finite (found {threshold})"
                    )));
                }
            }
            SlicerConfig::Pam4 { thresholds } => {
                if thresholds.iter().any(|t| !t.is_finite())
                    || thresholds.windows(2).any(|w| w[0] >= w[1])
                {
                    return Err(Error::InvalidConfiguration(format!(
                        "PAM4 thresholds must be finite and strictly increasing (found \
                         {thresholds:?})"
                    )));
                }
            }
        }
        Ok(Self { config })
    }

    /// Returns configuration.
    #[must_use]
    pub fn config(&self) -> SlicerConfig {
        self.config
    }

    /// Returns number of bits decided per symbol.
    #[must_use]
    pub fn bits_per_symbol(&self) -> usize {
        match self.config {
            SlicerConfig::Nrz { .. } => 1,
            SlicerConfig::Pam4 { .. } => 2,
        }
    }

    /// Returns bits decided from symbols, two per symbol (MSB first) for PAM4.
    ///
    /// # Examples
    ///
    /// ```
    /// use serdes_sim::slicer::{default_pam4_thresholds, Slicer, SlicerConfig};
    /// use serdes_sim::Bit;
    ///
    /// let slicer = Slicer::new(SlicerConfig::Pam4 {
    ///     thresholds: default_pam4_thresholds(),
    /// })?;
    /// assert_eq!(slicer.slice(&[3.0, -3.0]), [Bit::One, Bit::Zero, Bit::Zero, Bit::Zero]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    #[must_use]
    pub fn slice(&self, symbols: &[f64]) -> Vec<Bit> {
        match self.config {
            SlicerConfig::Nrz { threshold } => slice_nrz(symbols, threshold),
            SlicerConfig::Pam4 { thresholds } => slice_pam4(symbols, thresholds)
                .into_iter()
                .flat_map(|(msb, lsb)| [msb, lsb])
                .collect(),
        }
    }
}

/// Returns NRZ decisions: `1` for symbols strictly above the threshold, `0` otherwise.
#[must_use]
pub fn slice_nrz(symbols: &[f64], threshold: f64) -> Vec<Bit> {
    symbols.iter().map(|&s| Bit::from(s > threshold)).collect()
}

/// Returns Gray-coded PAM4 decisions as `(msb, lsb)` pairs.
#[must_use]
pub fn slice_pam4(symbols: &[f64], thresholds: [f64; 3]) -> Vec<(Bit, Bit)> {
    symbols
        .iter()
        .map(|&s| {
            if s < thresholds[0] {
                (Bit::Zero, Bit::Zero)
            } else if s < thresholds[1] {
                (Bit::Zero, Bit::One)
            } else if s < thresholds[2] {
                (Bit::One, Bit::One)
            } else {
                (Bit::One, Bit::Zero)
            }
        })
        .collect()
}
