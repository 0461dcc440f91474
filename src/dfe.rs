//! Decision-feedback equalizer
//!
//! Each output symbol is the input symbol minus a weighted sum of the most recent *outputs*,
//! newest first: `out[i] = x[i] - sum_j taps[j] * out[i - j - 1]`. History does not carry over
//! from one call to the next.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Parameters of the DFE
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DfeConfig {
    /// Feedback taps, newest output first (empty to bypass)
    pub taps: Vec<f64>,
}

/// DFE with validated taps
#[derive(Clone, PartialEq, Debug)]
pub struct Dfe {
    /// Feedback taps
    taps: Vec<f64>,
}

impl Dfe {
    /// Returns DFE with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any tap is not finite.
    pub fn new(config: &DfeConfig) -> Result<Self, Error> {
        if config.taps.iter().any(|t| !t.is_finite()) {
            return Err(Error::InvalidConfiguration(format!(
                "DFE taps must be finite (found {:?})",
                config.taps
            )));
        }
        Ok(Self {
            taps: config.taps.clone(),
        })
    }

    /// Returns feedback taps.
    #[must_use]
    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    /// Returns equalized symbols.
    ///
    /// # Examples
    ///
    /// ```
    /// use serdes_sim::dfe::{Dfe, DfeConfig};
    ///
    /// let dfe = Dfe::new(&DfeConfig { taps: vec![0.5] })?;
    /// assert_eq!(dfe.equalize(&[1.0, 1.0, 1.0]), [1.0, 0.5, 0.75]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    #[must_use]
    pub fn equalize(&self, symbols: &[f64]) -> Vec<f64> {
        if self.taps.is_empty() {
            return symbols.to_vec();
        }
        let mut history = VecDeque::with_capacity(self.taps.len() + 1);
        symbols
            .iter()
            .map(|&x| {
                let feedback: f64 = self.taps.iter().zip(&history).map(|(t, y)| t * y).sum();
                let y = x - feedback;
                history.push_front(y);
                history.truncate(self.taps.len());
                y
            })
            .collect()
    }
}

#[cfg(test)]
mod tests_of_dfe {
    use float_eq::assert_float_eq;

    use super::*;

    #[test]
    fn test_new() {
        assert!(Dfe::new(&DfeConfig {
            taps: vec![0.1, f64::INFINITY]
        })
        .is_err());
        assert!(Dfe::new(&DfeConfig::default()).unwrap().taps().is_empty());
    }

    #[test]
    fn test_bypass() {
        let dfe = Dfe::new(&DfeConfig::default()).unwrap();
        assert_float_eq!(
            dfe.equalize(&[0.3, -1.2, 0.7]),
            vec![0.3, -1.2, 0.7],
            abs_all <= 0.0
        );
        assert!(dfe.equalize(&[]).is_empty());
    }

    #[test]
    fn test_single_tap() {
        let dfe = Dfe::new(&DfeConfig { taps: vec![0.5] }).unwrap();
        assert_float_eq!(
            dfe.equalize(&[1.0, 1.0, 1.0]),
            vec![1.0, 0.5, 0.75],
            abs_all <= 1e-12
        );
    }

    #[test]
    fn test_multiple_taps() {
        let dfe = Dfe::new(&DfeConfig {
            taps: vec![0.5, 0.25],
        })
        .unwrap();
        assert_float_eq!(
            dfe.equalize(&[1.0, 1.0, 1.0, 1.0]),
            vec![1.0, 0.5, 0.5, 0.625],
            abs_all <= 1e-12
        );
    }

    #[test]
    fn test_removes_postcursor() {
        // Channel with a single postcursor of 0.4 on +-1 symbols
        let symbols = [1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
        let received: Vec<f64> = (0 .. symbols.len())
            .map(|i| symbols[i] + if i > 0 { 0.4 * symbols[i - 1] } else { 0.0 })
            .collect();
        let dfe = Dfe::new(&DfeConfig { taps: vec![0.4] }).unwrap();
        assert_float_eq!(dfe.equalize(&received), symbols.to_vec(), abs_all <= 1e-12);
    }

    #[test]
    fn test_output_depends_only_on_earlier_symbols() {
        let dfe = Dfe::new(&DfeConfig {
            taps: vec![0.7, -0.3, 0.2],
        })
        .unwrap();
        let symbols = [0.9, -1.1, 0.4, 1.3, -0.6, -0.8, 1.0];
        let out = dfe.equalize(&symbols);
        for k in 0 .. symbols.len() {
            let mut perturbed = symbols;
            perturbed[k] += 5.0;
            let perturbed_out = dfe.equalize(&perturbed);
            assert_float_eq!(perturbed_out[.. k], out[.. k], abs_all <= 0.0);
            assert_float_eq!(perturbed_out[k], out[k] + 5.0, abs <= 1e-12);
        }
    }

    #[test]
    fn test_history_resets_between_calls() {
        let dfe = Dfe::new(&DfeConfig { taps: vec![0.5] }).unwrap();
        let first = dfe.equalize(&[1.0, 1.0]);
        let second = dfe.equalize(&[1.0, 1.0]);
        assert_float_eq!(first, second, abs_all <= 0.0);
    }
}
