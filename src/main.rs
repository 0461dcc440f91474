//! This crate simulates the bit-error performance of a SerDes receiver (VGA, ADC, CTLE, CDR, DFE
//! and slicer) over a channel with ISI and additive white Gaussian noise, for a sweep of noise
//! levels. The link is described by an optional JSON configuration file, sweep parameters are
//! specified on the command line, and simulation results are saved to a JSON file.
//!
//! Build the executable with `cargo build --release` and then run `./target/release/serdes-sim -h`
//! for help on the command-line interface. Set `RUST_LOG` or pass `-v` (repeatable) for logging.

#![warn(
    clippy::complexity,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_allocation,
    unused_import_braces,
    unused_qualifications
)]

use anyhow::Result;
use clap::{crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use serdes_sim::link::LinkConfig;
use serdes_sim::sim;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main function
fn main() -> Result<()> {
    let timer = Instant::now();
    let matches = command_line_parser().get_matches();
    init_logging(verbosity_from_matches(&matches));
    let link_config = match config_filename_from_matches(&matches) {
        Some(filename) => {
            tracing::info!("Loading link configuration from {filename}");
            LinkConfig::from_json_file(&filename)?
        }
        None => LinkConfig::default(),
    };
    let json_filename = &json_filename_from_matches(&matches);
    sim::run_link_sims(&link_config, &all_sim_params(&matches), json_filename)?;
    tracing::info!("Results saved to {json_filename}");
    eprintln!("Elapsed time: {:.3?}", timer.elapsed());
    Ok(())
}

/// Installs log subscriber, with `RUST_LOG` taking precedence over the verbosity count.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

/// Returns command line parser.
fn command_line_parser() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about("Evaluates the bit-error performance of a SerDes receiver over an AWGN sweep")
        .arg(config_filename())
        .arg(num_symbols())
        .arg(first_sigma())
        .arg(sigma_step())
        .arg(num_sigma())
        .arg(base_seed())
        .arg(json_filename())
        .arg(verbosity())
}

/// Returns argument for name of JSON file holding the link configuration.
fn config_filename() -> Arg {
    Arg::new("config_filename")
        .short('c')
        .help("Name of JSON file holding the link configuration (defaults used if absent)")
}

/// Returns argument for number of symbols per noise level.
fn num_symbols() -> Arg {
    Arg::new("num_symbols")
        .short('n')
        .value_parser(value_parser!(usize))
        .default_value("10000")
        .help("Number of symbols to be transmitted per noise level")
}

/// Returns argument for first noise standard deviation (V).
fn first_sigma() -> Arg {
    Arg::new("first_sigma")
        .short('r')
        .value_parser(value_parser!(f64))
        .default_value("0.0")
        .help("First noise standard deviation (V)")
}

/// Returns argument for noise standard deviation step (V).
fn sigma_step() -> Arg {
    Arg::new("sigma_step")
        .short('p')
        .value_parser(value_parser!(f64))
        .allow_negative_numbers(true)
        .default_value("0.05")
        .help("Noise standard deviation step (V)")
}

/// Returns argument for number of noise levels.
fn num_sigma() -> Arg {
    Arg::new("num_sigma")
        .short('s')
        .value_parser(value_parser!(u32))
        .default_value("6")
        .help("Number of noise levels")
}

/// Returns argument for seed of first noise level.
fn base_seed() -> Arg {
    Arg::new("base_seed")
        .short('S')
        .value_parser(value_parser!(u64))
        .default_value("0")
        .help("Seed of random number generator for first noise level (incremented per level)")
}

/// Returns argument for name of JSON file to which results must be saved.
fn json_filename() -> Arg {
    Arg::new("json_filename")
        .short('f')
        .default_value("results.json")
        .help("Name of JSON file to which results must be saved")
}

/// Returns argument for logging verbosity.
fn verbosity() -> Arg {
    Arg::new("verbosity")
        .short('v')
        .action(ArgAction::Count)
        .help("Logging verbosity (repeat for more detail)")
}

/// Returns simulation parameters based on command-line arguments.
fn all_sim_params(matches: &ArgMatches) -> Vec<sim::SimParams> {
    let num_symbols = num_symbols_from_matches(matches);
    let base_seed = base_seed_from_matches(matches);
    all_sigma_from_matches(matches)
        .into_iter()
        .zip(0 ..)
        .map(|(awgn_sigma, index)| sim::SimParams {
            num_symbols,
            awgn_sigma,
            seed: base_seed.wrapping_add(index),
        })
        .collect()
}

// OK to unwrap in the functions below: All command-line arguments that are unwrapped have default
// values, so an error cannot occur.

/// Returns name of JSON file holding the link configuration, if given.
fn config_filename_from_matches(matches: &ArgMatches) -> Option<String> {
    matches.get_one::<String>("config_filename").cloned()
}

/// Returns number of symbols per noise level.
fn num_symbols_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("num_symbols").unwrap()
}

/// Returns all noise standard deviations (V).
fn all_sigma_from_matches(matches: &ArgMatches) -> Vec<f64> {
    let first_sigma: f64 = *matches.get_one("first_sigma").unwrap();
    let sigma_step: f64 = *matches.get_one("sigma_step").unwrap();
    let num_sigma: u32 = *matches.get_one("num_sigma").unwrap();
    (0 .. num_sigma)
        .map(|n| first_sigma + sigma_step * f64::from(n))
        .collect()
}

/// Returns seed of random number generator for first noise level.
fn base_seed_from_matches(matches: &ArgMatches) -> u64 {
    *matches.get_one("base_seed").unwrap()
}

/// Returns name of JSON file to which simulation results must be saved.
fn json_filename_from_matches(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("json_filename")
        .unwrap()
        .to_string()
}

/// Returns logging verbosity.
fn verbosity_from_matches(matches: &ArgMatches) -> u8 {
    matches.get_count("verbosity")
}
