//! Distortion Transfer Curves
//!
//! Waveshaping curves sampled into lookup tables over x ∈ [−1, 1]. Tables are
//! rebuilt whenever the curve or the amount changes, never per sample.

use crate::config::DistortionCurve;
use std::f64::consts::PI;

/// Default table length
pub const DEFAULT_RESOLUTION: usize = 8192;

/// Clip level of the hard curve
const HARD_THRESHOLD: f64 = 0.5;

/// Smooth saturating curve; `amount` (0–1) sets the drive
pub fn soft(x: f64, amount: f64) -> f64 {
    let k = amount * 100.0;
    let deg = PI / 180.0;
    if x.abs() < 0.001 {
        0.0
    } else {
        (3.0 + k) * x * 20.0 * deg / (PI + k * x.abs())
    }
}

/// Linear below ±0.5, flat above
pub fn hard(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.clamp(-HARD_THRESHOLD, HARD_THRESHOLD)
    }
}

/// Aggressive curve emphasising low-level signal
pub fn fuzz(x: f64) -> f64 {
    libm::tanh(libm::pow(x.abs(), 0.3) * 8.0) * x.signum()
}

/// Evaluate a curve at a single point
pub fn evaluate(curve: DistortionCurve, x: f64, amount: f64) -> f64 {
    match curve {
        DistortionCurve::Soft => soft(x, amount),
        DistortionCurve::Hard => hard(x),
        DistortionCurve::Fuzz => fuzz(x),
    }
}

/// Sample a curve into a table of `resolution` points
///
/// Entry `i` holds the curve at `x = 2i / resolution − 1`.
pub fn build_table(curve: DistortionCurve, amount: f64, resolution: usize) -> Vec<f64> {
    let resolution = resolution.max(2);
    (0..resolution)
        .map(|i| {
            let x = (i as f64 * 2.0) / resolution as f64 - 1.0;
            evaluate(curve, x, amount)
        })
        .collect()
}

/// Look up a sample in a table, interpolating linearly between entries
pub fn shape(table: &[f64], x: f64) -> f64 {
    match table.len() {
        0 => x,
        1 => table[0],
        len => {
            let position = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * (len - 1) as f64;
            let index = position.floor() as usize;
            if index >= len - 1 {
                return table[len - 1];
            }
            let frac = position - index as f64;
            table[index] + frac * (table[index + 1] - table[index])
        }
    }
}
