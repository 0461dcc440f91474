//! # Some useful functions for simulating link performance
//!
//! The [`random_bits`] and [`prbs`] functions generate test patterns; the [`error_count`]
//! function returns the number of errors in a sequence with respect to a reference sequence; and
//! the [`aligned_error_count`] and [`best_alignment`] functions compare received bits against
//! transmitted bits when the link delay is not known in advance.
//!
//! # Examples
//!
//! The code below illustrates the usage of the functions in this module.
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use serdes_sim::utils;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let bits = utils::random_bits(40, &mut rng);
//! let pattern = utils::prbs(7, 40, 0x7f)?;
//! let err_count = utils::error_count(&bits, &pattern);
//! let delayed: Vec<_> = [&pattern[.. 3], &pattern[.. 37]].concat();
//! let alignment = utils::best_alignment(&delayed, &pattern, 8, 1).unwrap();
//! assert_eq!(alignment.lag, 3);
//! assert_eq!(alignment.bit_errors, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Bit, Error};

/// Returns given number of random bits.
///
/// # Parameters
///
/// - `num_bits`: Number of random bits to be generated.
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `bits`: Random bits.
#[must_use]
pub fn random_bits<R: Rng>(num_bits: usize, rng: &mut R) -> Vec<Bit> {
    (0 .. num_bits)
        .map(|_| Bit::from(rng.random_bool(0.5)))
        .collect()
}

/// Returns feedback taps of the maximal-length LFSR of a given order.
fn prbs_taps(order: u32) -> [u32; 2] {
    match order {
        7 => [7, 6],
        9 => [9, 5],
        15 => [15, 14],
        23 => [23, 18],
        31 => [31, 28],
        _ => [order, order - 1],
    }
}

/// Returns pseudo-random binary sequence generated by a Fibonacci LFSR.
///
/// # Parameters
///
/// - `order`: Number of bits in the shift register. Orders `7`, `9`, `15`, `23` and `31` use the
///   standard PRBS polynomials; other orders in `2 ..= 63` feed back the last two stages.
///
/// - `num_bits`: Number of bits to be generated.
///
/// - `seed`: Initial register contents. The least significant bit of `seed` is the last stage,
///   whose value is output at each shift; stage `t` of the polynomial is bit `order - t`.
///
/// # Returns
///
/// - `bits`: Sequence of register output bits, one per shift.
///
/// # Errors
///
/// Returns an error if `order` is outside `2 ..= 63`, or if `seed` is `0` or does not fit in
/// `order` bits.
pub fn prbs(order: u32, num_bits: usize, seed: u64) -> Result<Vec<Bit>, Error> {
    if !(2 ..= 63).contains(&order) {
        return Err(Error::InvalidConfiguration(format!(
            "PRBS order must be between 2 and 63 (found {order})"
        )));
    }
    if seed == 0 || seed >> order != 0 {
        return Err(Error::InvalidConfiguration(format!(
            "PRBS seed must be a nonzero {order}-bit value (found {seed:#x})"
        )));
    }
    let [tap1, tap2] = prbs_taps(order);
    let mut state = seed;
    Ok((0 .. num_bits)
        .map(|_| {
            let out = state & 1;
            let feedback = ((state >> (order - tap1)) ^ (state >> (order - tap2))) & 1;
            state = (state >> 1) | (feedback << (order - 1));
            Bit::from(out == 1)
        })
        .collect())
}

/// Returns number of errors in a sequence with respect to a reference sequence.
///
/// # Parameters
///
/// - `seq`: Sequence in which errors must be counted.
///
/// - `ref_seq`: Reference sequence to which the given sequence is compared.
///
/// # Returns
///
/// - `err_count`: Number of positions in which the two sequences differ. If they are of different
///   lengths, then the longer sequence is effectively truncated to the length of the shorter one.
pub fn error_count<T: PartialEq>(seq: &[T], ref_seq: &[T]) -> usize {
    ref_seq
        .iter()
        .zip(seq.iter())
        .filter(|&(x, y)| x != y)
        .count()
}

/// Returns number of errors and number of compared positions when a received sequence lags a
/// transmitted sequence by a given number of positions.
///
/// Position `i` of `tx_seq` is compared with position `i + lag` of `rx_seq`, for all `i` for which
/// both positions exist. A negative `lag` means that the received sequence leads.
pub fn aligned_error_count<T: PartialEq>(
    rx_seq: &[T],
    tx_seq: &[T],
    lag: isize,
) -> (usize, usize) {
    let (rx_part, tx_part) = if lag >= 0 {
        (rx_seq.get(lag.unsigned_abs() ..).unwrap_or(&[]), tx_seq)
    } else {
        (rx_seq, tx_seq.get(lag.unsigned_abs() ..).unwrap_or(&[]))
    };
    let num_compared = rx_part.len().min(tx_part.len());
    (error_count(rx_part, tx_part), num_compared)
}

/// Result of an alignment search between received and transmitted bits
#[derive(Clone, Eq, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct Alignment {
    /// Lag of the received sequence relative to the transmitted sequence
    pub lag: isize,
    /// Number of errors at this lag
    pub bit_errors: usize,
    /// Number of positions compared at this lag
    pub bits_compared: usize,
}

impl Alignment {
    /// Returns fraction of compared positions in error (`0.0` if nothing was compared).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        if self.bits_compared == 0 {
            0.0
        } else {
            self.bit_errors as f64 / self.bits_compared as f64
        }
    }
}

/// Returns the lag with the lowest error rate among lags `-max_lag ..= max_lag` in steps of `step`.
///
/// # Parameters
///
/// - `rx_seq`: Received sequence.
///
/// - `tx_seq`: Transmitted sequence.
///
/// - `max_lag`: Largest lag magnitude to be tried.
///
/// - `step`: Spacing between tried lags (for example, `2` for PAM4 bit pairs). A value of `0` is
///   treated as `1`.
///
/// # Returns
///
/// - `alignment`: Best alignment, with ties going to the smallest lag magnitude, or `None` if no
///   tried lag compares any position.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn best_alignment<T: PartialEq>(
    rx_seq: &[T],
    tx_seq: &[T],
    max_lag: usize,
    step: usize,
) -> Option<Alignment> {
    let step = step.max(1);
    (0 ..= max_lag)
        .step_by(step)
        .flat_map(|magnitude| {
            let lag = magnitude as isize;
            if lag == 0 {
                vec![0]
            } else {
                vec![lag, -lag]
            }
        })
        .map(|lag| {
            let (bit_errors, bits_compared) = aligned_error_count(rx_seq, tx_seq, lag);
            Alignment {
                lag,
                bit_errors,
                bits_compared,
            }
        })
        .filter(|alignment| alignment.bits_compared > 0)
        .reduce(|best, candidate| {
            if candidate.error_rate() < best.error_rate() {
                candidate
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests_of_functions {
    use float_eq::assert_float_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use Bit::{One, Zero};

    #[test]
    fn test_random_bits() {
        let mut rng = StdRng::seed_from_u64(11);
        let num_bits = 0;
        assert!(random_bits(num_bits, &mut rng).is_empty());
        let num_bits = 10000;
        let bits = random_bits(num_bits, &mut rng);
        let num_zeros = bits.iter().filter(|&b| *b == Zero).count();
        let num_ones = bits.iter().filter(|&b| *b == One).count();
        assert!(num_zeros > 9 * num_bits / 20 && num_ones > 9 * num_bits / 20);
        // Reproducible from seed
        let bits_a = random_bits(64, &mut StdRng::seed_from_u64(3));
        let bits_b = random_bits(64, &mut StdRng::seed_from_u64(3));
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_prbs_invalid() {
        assert!(prbs(1, 10, 1).is_err());
        assert!(prbs(64, 10, 1).is_err());
        assert!(prbs(7, 10, 0).is_err());
        assert!(prbs(7, 10, 0x80).is_err());
    }

    #[test]
    fn test_prbs_first_bits() {
        // Feedback from the last two stages enters at the far end of the register
        let bits = prbs(7, 7, 1).unwrap();
        assert_eq!(bits, [One, Zero, Zero, Zero, Zero, Zero, Zero]);
        assert!(prbs(7, 0, 1).unwrap().is_empty());
    }

    #[test]
    fn test_prbs_period() {
        for order in [7, 9] {
            let period = (1 << order) - 1;
            let bits = prbs(order, 2 * period, 1).unwrap();
            assert_eq!(bits[.. period], bits[period ..]);
            // Maximal-length sequence: one more one than zeros per period
            let num_ones = bits[.. period].iter().filter(|&&b| b == One).count();
            assert_eq!(num_ones, (period + 1) / 2);
            // No shorter period
            assert_ne!(bits[.. period / 3], bits[period / 3 .. 2 * (period / 3)]);
        }
    }

    #[test]
    fn test_error_count() {
        assert_eq!(error_count(&[], &[One, Zero]), 0);
        assert_eq!(error_count(&[One, Zero], &[]), 0);
        // Longer `seq`
        let ref_seq = [One, Zero, Zero, One, One, One, Zero, Zero];
        let seq = [One, One, Zero, Zero, One, One, Zero, Zero, Zero, One];
        assert_eq!(error_count(&seq, &ref_seq), 2);
        // Shorter `seq`
        let ref_seq = [One, Zero, Zero, One, One, One, Zero, Zero, Zero, One];
        let seq = [One, One, Zero, Zero, One, One, Zero, Zero];
        assert_eq!(error_count(&seq, &ref_seq), 2);
    }

    #[test]
    fn test_aligned_error_count() {
        let tx_seq = [One, Zero, Zero, One, One];
        let rx_seq = [Zero, Zero, One, Zero, Zero, One, One];
        assert_eq!(aligned_error_count(&rx_seq, &tx_seq, 2), (0, 5));
        assert_eq!(aligned_error_count(&rx_seq, &tx_seq, 0), (4, 5));
        assert_eq!(aligned_error_count(&tx_seq, &rx_seq, -2), (0, 5));
        assert_eq!(aligned_error_count(&rx_seq, &tx_seq, 9), (0, 0));
        assert_eq!(aligned_error_count(&rx_seq, &tx_seq, -9), (0, 0));
    }

    #[test]
    fn test_best_alignment() {
        let tx_seq = prbs(7, 200, 0x55).unwrap();
        // Received sequence delayed by 5 with one error
        let mut rx_seq = [vec![Zero; 5], tx_seq[.. 195].to_vec()].concat();
        rx_seq[50] = if rx_seq[50] == One { Zero } else { One };
        let alignment = best_alignment(&rx_seq, &tx_seq, 16, 1).unwrap();
        assert_eq!(alignment.lag, 5);
        assert_eq!(alignment.bit_errors, 1);
        assert_eq!(alignment.bits_compared, 195);
        assert_float_eq!(alignment.error_rate(), 1.0 / 195.0, abs <= 1e-12);
        // Received sequence leading by 4
        let rx_seq = tx_seq[4 ..].to_vec();
        let alignment = best_alignment(&rx_seq, &tx_seq, 16, 2).unwrap();
        assert_eq!(alignment.lag, -4);
        assert_eq!(alignment.bit_errors, 0);
        assert!(best_alignment::<Bit>(&[], &tx_seq, 4, 1).is_none());
    }
}
