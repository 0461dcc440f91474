//! Simulator to evaluate bit-error performance of the receiver over an AWGN sweep
//!
//! Each [`SimParams`] value describes one operating point. The points are simulated in parallel,
//! each with its own receiver and its own seeded random number generator, so the results do not
//! depend on the order in which the points are scheduled.

use std::fs::File;
use std::io::BufWriter;

use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::link::{self, LinkConfig};
use crate::metrics;
use crate::Error;

/// Parameters for one simulated operating point
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SimParams {
    /// Number of symbols to be transmitted
    pub num_symbols: usize,
    /// Standard deviation (V) of additive white Gaussian noise in the channel
    pub awgn_sigma: f64,
    /// Seed of the random number generator for this point
    pub seed: u64,
}

/// Results for one simulated operating point
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SimResults {
    /// Simulation parameters
    pub params: SimParams,
    /// Number of bits compared after alignment
    pub bits_compared: usize,
    /// Number of bit errors after alignment
    pub bit_errors: usize,
    /// Bit error rate
    pub ber: f64,
    /// Lag (bits) of the received bits relative to the transmitted bits
    pub best_lag: Option<isize>,
    /// VGA gain (dB) at the end of the run, if the receiver has a VGA
    pub final_gain_db: Option<f64>,
    /// Eye height of the CTLE output
    pub eye_height: Option<f64>,
    /// Eye width (fraction of symbols) of the CTLE output
    pub eye_width: Option<f64>,
}

/// Runs simulations of a link for several operating points and saves results to a JSON file.
///
/// # Parameters
///
/// - `link_config`: Link configuration shared by all points; the channel noise is replaced by
///   the noise level of each point.
///
/// - `all_params`: Parameters for each point.
///
/// - `json_filename`: Name of JSON file to which results must be saved.
///
/// # Returns
///
/// - `all_results`: Results for each point, in the order of `all_params`.
///
/// # Errors
///
/// Returns an error if any parameters or the link configuration are invalid, or if the results
/// cannot be saved.
///
/// # Examples
///
/// ```no_run
/// use serdes_sim::link::LinkConfig;
/// use serdes_sim::sim::{self, SimParams};
///
/// let all_params: Vec<SimParams> = (0_u32 .. 4)
///     .map(|n| SimParams {
///         num_symbols: 10000,
///         awgn_sigma: 0.05 * f64::from(n),
///         seed: 1000 + u64::from(n),
///     })
///     .collect();
/// sim::run_link_sims(&LinkConfig::default(), &all_params, "results.json")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_link_sims(
    link_config: &LinkConfig,
    all_params: &[SimParams],
    json_filename: &str,
) -> Result<Vec<SimResults>, Error> {
    for params in all_params {
        check_sim_params(params)?;
    }
    let all_results = all_params
        .par_iter()
        .map(|params| run_condition(link_config, params))
        .collect::<Result<Vec<SimResults>, Error>>()?;
    let writer = BufWriter::new(File::create(json_filename)?);
    serde_json::to_writer_pretty(writer, &all_results)?;
    Ok(all_results)
}

/// Returns results of a link simulation for one operating point.
///
/// # Errors
///
/// Returns an error if the parameters or the link configuration are invalid.
pub fn run_condition(link_config: &LinkConfig, params: &SimParams) -> Result<SimResults, Error> {
    check_sim_params(params)?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut config = link_config.clone();
    config.channel.awgn_sigma = params.awgn_sigma;
    let output = link::run_link(&config, params.num_symbols, &mut rng)?;
    let (bits_compared, bit_errors, ber, best_lag) = match output.alignment {
        Some(alignment) => (
            alignment.bits_compared,
            alignment.bit_errors,
            alignment.error_rate(),
            Some(alignment.lag),
        ),
        None => (0, 0, 0.0, None),
    };
    let eye = metrics::fold_to_eye(
        &output.rx.ctle_waveform.samples,
        config.rx.adc.samples_per_symbol,
    );
    let eye_metrics = metrics::eye_height_width(&eye);
    let results = SimResults {
        params: *params,
        bits_compared,
        bit_errors,
        ber,
        best_lag,
        final_gain_db: output.rx.gains_db.last().copied(),
        eye_height: eye_metrics.map(|(height, _)| height),
        eye_width: eye_metrics.map(|(_, width)| width),
    };
    tracing::info!(
        awgn_sigma = params.awgn_sigma,
        seed = params.seed,
        bits_compared,
        bit_errors,
        ber,
        "Operating point complete"
    );
    Ok(results)
}

/// Checks validity of simulation parameters.
fn check_sim_params(params: &SimParams) -> Result<(), Error> {
    if params.num_symbols == 0 {
        return Err(Error::InvalidConfiguration(
            "Number of symbols cannot be zero".to_string(),
        ));
    }
    if !params.awgn_sigma.is_finite() || params.awgn_sigma < 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "Noise standard deviation must be finite and nonnegative (found {})",
            params.awgn_sigma
        )));
    }
    Ok(())
}
