//! This crate models the receive side of a serial link (SerDes): an analog waveform passes
//! through a variable-gain amplifier with automatic gain control, an analog-to-digital converter,
//! a continuous-time linear equalizer, a clock and data recovery loop, a decision-feedback
//! equalizer and a slicer that decides NRZ or PAM4 bits. Each stage is configured once and then
//! applied to whole waveforms; the gain of the amplifier and the phase of the recovered clock
//! carry over from one waveform to the next in a [`receiver::Receiver`].
//!
//! A thin transmitter and channel model in [`link`], signal-quality measures in [`metrics`] and a
//! parallel noise sweep in [`sim`] turn the receiver into a complete link simulator.
//!
//! # Examples
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use serdes_sim::link::{self, LinkConfig};
//!
//! let mut config = LinkConfig::default();
//! config.channel.awgn_sigma = 0.05;
//! let mut rng = StdRng::seed_from_u64(12);
//! let output = link::run_link(&config, 400, &mut rng)?;
//! let alignment = output.alignment.unwrap();
//! assert!(alignment.error_rate() < 0.01);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

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

pub mod adc;
pub mod cdr;
pub mod ctle;
pub mod dfe;
pub mod link;
pub mod metrics;
pub mod receiver;
pub mod sim;
pub mod slicer;
pub mod utils;
pub mod vga;
pub mod waveform;

mod common;
pub use common::{Bit, Error};
