//! Signal-quality metrics for eye diagrams and recovered symbols

/// Returns eye diagram of a waveform: one row of `samples_per_symbol` samples per whole symbol.
///
/// Trailing samples that do not fill a whole symbol are dropped.
#[must_use]
pub fn fold_to_eye(waveform: &[f64], samples_per_symbol: usize) -> Vec<Vec<f64>> {
    if samples_per_symbol == 0 {
        return Vec::new();
    }
    waveform
        .chunks_exact(samples_per_symbol)
        .map(<[f64]>::to_vec)
        .collect()
}

/// Returns height and width of an NRZ eye diagram.
///
/// # Parameters
///
/// - `eye`: Eye diagram with rows of equal length, as returned by [`fold_to_eye`].
///
/// # Returns
///
/// - `(height, width)`: The height is the mean of the second half of every row minus the mean
///   of the first half. The width is the fraction of rows whose center sample lies within half
///   the height of the midpoint of those two means. `None` if the eye has no rows or rows of
///   fewer than two samples.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn eye_height_width(eye: &[Vec<f64>]) -> Option<(f64, f64)> {
    let num_cols = eye.first()?.len();
    if num_cols < 2 {
        return None;
    }
    let center = num_cols / 2;
    let mean = |cols: std::ops::Range<usize>| {
        let values: Vec<f64> = eye
            .iter()
            .flat_map(|row| row[cols.clone()].iter().copied())
            .collect();
        values.iter().sum::<f64>() / values.len() as f64
    };
    let top = mean(center .. num_cols);
    let bottom = mean(0 .. center);
    let height = top - bottom;
    let threshold = 0.5 * (top + bottom);
    let num_open = eye
        .iter()
        .filter(|row| (row[center] - threshold).abs() < 0.5 * height)
        .count();
    Some((height, num_open as f64 / eye.len() as f64))
}

/// Returns error vector magnitude (percent) of received symbols relative to transmitted symbols.
///
/// The sequences are compared over the length of the shorter one. Returns `None` if there is
/// nothing to compare or the transmitted symbols are all zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn evm(rx_symbols: &[f64], tx_symbols: &[f64]) -> Option<f64> {
    let num = rx_symbols.len().min(tx_symbols.len());
    if num == 0 {
        return None;
    }
    let (error_power, mean_abs) = rx_symbols
        .iter()
        .zip(tx_symbols)
        .fold((0.0, 0.0), |(power, abs), (r, t)| {
            (power + (r - t) * (r - t), abs + t.abs())
        });
    if mean_abs == 0.0 {
        return None;
    }
    Some(100.0 * (error_power / num as f64).sqrt() / (mean_abs / num as f64))
}

/// Returns signal-to-noise ratio (dB) of received symbols relative to transmitted symbols.
///
/// The sequences are compared over the length of the shorter one. Returns `None` if there is
/// nothing to compare; returns infinity if the symbols match exactly.
#[must_use]
pub fn snr_db(rx_symbols: &[f64], tx_symbols: &[f64]) -> Option<f64> {
    if rx_symbols.is_empty() || tx_symbols.is_empty() {
        return None;
    }
    let (signal_power, noise_power) = rx_symbols
        .iter()
        .zip(tx_symbols)
        .fold((0.0, 0.0), |(signal, noise), (r, t)| {
            (signal + t * t, noise + (r - t) * (r - t))
        });
    Some(10.0 * (signal_power / noise_power).log10())
}
