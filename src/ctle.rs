//! Continuous-time linear equalizer, modelled as a fixed FIR filter

use serde::{Deserialize, Serialize};

use crate::waveform::convolve_same;
use crate::Error;

/// Parameters of the CTLE
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CtleConfig {
    /// FIR taps (a single unit tap passes the signal through unchanged)
    pub taps: Vec<f64>,
}

impl Default for CtleConfig {
    fn default() -> Self {
        Self { taps: vec![1.0] }
    }
}

/// CTLE with validated taps
#[derive(Clone, PartialEq, Debug)]
pub struct Ctle {
    /// FIR taps
    taps: Vec<f64>,
}

impl Ctle {
    /// Returns CTLE with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the taps are empty or not all finite.
    ///
    /// # Examples
    ///
    /// ```
    /// use serdes_sim::ctle::{Ctle, CtleConfig};
    ///
    /// let ctle = Ctle::new(&CtleConfig {
    ///     taps: vec![-0.25, 1.5, -0.25],
    /// })?;
    /// assert_eq!(ctle.apply(&[0.0, 1.0, 0.0]), [-0.25, 1.5, -0.25]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: &CtleConfig) -> Result<Self, Error> {
        if config.taps.is_empty() {
            return Err(Error::InvalidConfiguration(
                "CTLE taps cannot be empty".to_string(),
            ));
        }
        if config.taps.iter().any(|t| !t.is_finite()) {
            return Err(Error::InvalidConfiguration(format!(
                "CTLE taps must be finite (found {:?})",
                config.taps
            )));
        }
        Ok(Self {
            taps: config.taps.clone(),
        })
    }

    /// Returns taps.
    #[must_use]
    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    /// Returns equalized signal, of the same length as the input signal.
    #[must_use]
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        convolve_same(signal, &self.taps)
    }
}
