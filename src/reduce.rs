//! Frequency-range reduction
//!
//! Maps a client-chosen frequency sub-range of a full-resolution spectrum onto
//! a fixed number of output points. Wide selections are downsampled into
//! contiguous bins, narrow ones are linearly interpolated, and the output axis
//! is always evenly spaced over the (clamped) requested range so the row and its
//! axis agree in length at every zoom level.
//!
//! [`reduce`] is pure: pollers call it every cycle and compare its output across
//! cycles, so identical inputs must give bit-identical rows.

use crate::spectrum::{FrequencyAxis, evenly_spaced};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReduceError {
    #[error("Output width must be at least 1")]
    ZeroWidth,
    #[error("Spectrum has {spectrum} samples but the frequency axis has {axis}")]
    LengthMismatch { spectrum: usize, axis: usize },
}

/// How the samples of one output bin are combined when downsampling
///
/// `Max` keeps narrow transient peaks visible, which is what a monitoring
/// waterfall is for; `Mean` shows average power per bin instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BinReduction {
    #[default]
    Max,
    Mean,
}

/// Requested frequency bounds and output width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionRequest {
    f1: f64,
    f2: f64,
    width: NonZeroUsize,
}

impl ReductionRequest {
    /// Build a request; bounds may lie outside any axis, a zero width is rejected
    pub fn new(f1: f64, f2: f64, width: usize) -> Result<Self, ReduceError> {
        let width = NonZeroUsize::new(width).ok_or(ReduceError::ZeroWidth)?;
        Ok(Self { f1, f2, width })
    }

    /// Request covering the whole axis
    pub fn full_range(axis: &FrequencyAxis, width: usize) -> Result<Self, ReduceError> {
        Self::new(axis.min(), axis.max(), width)
    }

    pub fn f1(&self) -> f64 {
        self.f1
    }

    pub fn f2(&self) -> f64 {
        self.f2
    }

    pub fn width(&self) -> usize {
        self.width.get()
    }
}

/// A reduced spectrum and the frequency of each of its points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedRow {
    pub values: Vec<f32>,
    pub axis: Vec<f64>,
}

impl ReducedRow {
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Reduce `spectrum` (sampled at `axis`) to the requested range and width
pub fn reduce(
    spectrum: &[f32],
    axis: &FrequencyAxis,
    request: &ReductionRequest,
    method: BinReduction,
) -> Result<ReducedRow, ReduceError> {
    if spectrum.len() != axis.len() {
        return Err(ReduceError::LengthMismatch {
            spectrum: spectrum.len(),
            axis: axis.len(),
        });
    }

    let (lo, hi) = clamp_range(axis, request.f1, request.f2);
    let width = request.width();
    let freqs = axis.as_slice();

    let start = freqs.partition_point(|&f| f < lo);
    let end = freqs.partition_point(|&f| f <= hi);

    let out_axis = evenly_spaced(lo, hi, width);
    let values = if end - start >= width {
        downsample(&spectrum[start..end], width, method)
    } else {
        // Nothing falls strictly inside the range: interpolate between the
        // samples on either side of it instead.
        let (start, end) = if start == end {
            (start.saturating_sub(1), (end + 1).min(freqs.len()))
        } else {
            (start, end)
        };
        interpolate(&freqs[start..end], &spectrum[start..end], &out_axis)
    };

    Ok(ReducedRow {
        values,
        axis: out_axis,
    })
}

/// Clamp the requested bounds to the axis, falling back to the full axis when
/// nothing usable is left
fn clamp_range(axis: &FrequencyAxis, f1: f64, f2: f64) -> (f64, f64) {
    // f64::max/min ignore NaN, so a NaN bound clamps to the axis edge
    let lo = f1.max(axis.min());
    let hi = f2.min(axis.max());
    if lo < hi {
        (lo, hi)
    } else {
        (axis.min(), axis.max())
    }
}

/// Split `samples` into `width` contiguous bins and combine each one
fn downsample(samples: &[f32], width: usize, method: BinReduction) -> Vec<f32> {
    let n = samples.len();
    (0..width)
        .map(|bin| {
            let group = &samples[bin * n / width..(bin + 1) * n / width];
            match method {
                BinReduction::Max => group.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                BinReduction::Mean => {
                    let sum: f64 = group.iter().map(|&v| f64::from(v)).sum();
                    (sum / group.len() as f64) as f32
                }
            }
        })
        .collect()
}

/// Piecewise-linear interpolation of (`freqs`, `values`) at `queries`
///
/// Queries outside the sampled span take the nearest edge value, so a single
/// sample is replicated across every query.
fn interpolate(freqs: &[f64], values: &[f32], queries: &[f64]) -> Vec<f32> {
    let last = freqs.len() - 1;
    queries
        .iter()
        .map(|&q| {
            if q <= freqs[0] {
                return values[0];
            }
            if q >= freqs[last] {
                return values[last];
            }
            let upper = freqs.partition_point(|&f| f <= q);
            let lower = upper - 1;
            let fraction = (q - freqs[lower]) / (freqs[upper] - freqs[lower]);
            let a = f64::from(values[lower]);
            let b = f64::from(values[upper]);
            (a + (b - a) * fraction) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_axis() -> FrequencyAxis {
        FrequencyAxis::linspace(-400e6, 400e6, 1000).unwrap()
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i % 37) as f32 + i as f32 * 0.01).collect()
    }

    #[test]
    fn test_zero_width_rejected() {
        assert_eq!(
            ReductionRequest::new(0.0, 1.0, 0),
            Err(ReduceError::ZeroWidth)
        );
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let axis = scenario_axis();
        let request = ReductionRequest::full_range(&axis, 10).unwrap();
        let err = reduce(&[0.0; 3], &axis, &request, BinReduction::Max).unwrap_err();
        assert_eq!(
            err,
            ReduceError::LengthMismatch {
                spectrum: 3,
                axis: 1000
            }
        );
    }

    #[test]
    fn test_downsample_scenario_uses_bin_maxima() {
        let axis = scenario_axis();
        let spectrum = ramp(1000);
        let request = ReductionRequest::new(0.0, 400e6, 100).unwrap();

        let row = reduce(&spectrum, &axis, &request, BinReduction::Max).unwrap();

        assert_eq!(row.values.len(), 100);
        assert_eq!(row.axis.len(), 100);
        assert_eq!(row.axis[0], 0.0);
        assert_eq!(row.axis[99], 400e6);

        // Samples 500..1000 are the ones at or above 0 Hz; 5 per output bin
        let selected = &spectrum[500..1000];
        for (bin, value) in row.values.iter().enumerate() {
            let expected = selected[bin * 5..bin * 5 + 5]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            assert_eq!(*value, expected, "bin {}", bin);
        }
    }

    #[test]
    fn test_downsample_mean() {
        let axis = FrequencyAxis::linspace(0.0, 3.0, 4).unwrap();
        let request = ReductionRequest::full_range(&axis, 2).unwrap();
        let row = reduce(&[1.0, 3.0, 10.0, 20.0], &axis, &request, BinReduction::Mean).unwrap();
        assert_eq!(row.values, vec![2.0, 15.0]);
    }

    #[test]
    fn test_upsample_scenario_single_sample_is_constant() {
        let axis = scenario_axis();
        let spectrum = ramp(1000);
        let request = ReductionRequest::new(0.0, 1e6, 50).unwrap();

        let row = reduce(&spectrum, &axis, &request, BinReduction::Max).unwrap();

        assert_eq!(row.values.len(), 50);
        assert_eq!(row.axis.first(), Some(&0.0));
        assert_eq!(row.axis.last(), Some(&1e6));
        // Only sample 500 (~400 kHz) lies inside [0, 1 MHz]
        assert!(row.values.iter().all(|&v| v == spectrum[500]));
    }

    #[test]
    fn test_upsample_interpolates_linearly() {
        let axis = FrequencyAxis::linspace(0.0, 10.0, 3).unwrap();
        let request = ReductionRequest::full_range(&axis, 5).unwrap();
        let row = reduce(&[0.0, 10.0, 0.0], &axis, &request, BinReduction::Max).unwrap();
        assert_eq!(row.axis, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(row.values, vec![0.0, 5.0, 10.0, 5.0, 0.0]);
    }

    #[test]
    fn test_range_between_samples_uses_neighbours() {
        let axis = FrequencyAxis::linspace(0.0, 10.0, 2).unwrap();
        let request = ReductionRequest::new(4.0, 6.0, 3).unwrap();
        let row = reduce(&[0.0, 10.0], &axis, &request, BinReduction::Max).unwrap();
        assert_eq!(row.values, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_out_of_range_bounds_are_clamped() {
        let axis = scenario_axis();
        let spectrum = ramp(1000);
        let request = ReductionRequest::new(-5e9, 100e6, 64).unwrap();

        let row = reduce(&spectrum, &axis, &request, BinReduction::Max).unwrap();

        assert_eq!(row.axis[0], -400e6);
        assert_eq!(row.axis[63], 100e6);
    }

    #[test]
    fn test_empty_range_falls_back_to_full_axis() {
        let axis = scenario_axis();
        let spectrum = ramp(1000);

        for (f1, f2) in [(100e6, 100e6), (200e6, -200e6), (5e9, 6e9), (f64::NAN, f64::NAN)] {
            let request = ReductionRequest::new(f1, f2, 10).unwrap();
            let row = reduce(&spectrum, &axis, &request, BinReduction::Max).unwrap();
            assert_eq!(row.axis[0], axis.min());
            assert_eq!(row.axis[9], axis.max());
        }
    }

    #[test]
    fn test_width_and_range_invariants_hold_across_zoom_levels() {
        let axis = scenario_axis();
        let spectrum = ramp(1000);
        let bounds = [
            (-400e6, 400e6),
            (-1e9, 1e9),
            (0.0, 1e6),
            (123.4e6, 123.5e6),
            (-399e6, -398e6),
            (399.9e6, 2e9),
        ];

        for (f1, f2) in bounds {
            for width in [1, 2, 7, 100, 1000, 4096] {
                let request = ReductionRequest::new(f1, f2, width).unwrap();
                let row = reduce(&spectrum, &axis, &request, BinReduction::Max).unwrap();
                assert_eq!(row.values.len(), width);
                assert_eq!(row.axis.len(), width);

                let lo = f1.max(axis.min());
                let hi = f2.min(axis.max());
                assert!(row.axis[0] >= lo && row.axis[0] <= hi);
                assert!(row.axis[width - 1] >= lo && row.axis[width - 1] <= hi);
            }
        }
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let axis = scenario_axis();
        let spectrum = ramp(1000);
        let request = ReductionRequest::new(-123e6, 321e6, 333).unwrap();

        let first = reduce(&spectrum, &axis, &request, BinReduction::Mean).unwrap();
        for _ in 0..5 {
            let again = reduce(&spectrum, &axis, &request, BinReduction::Mean).unwrap();
            let bits = |row: &ReducedRow| row.values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(&first), bits(&again));
            assert_eq!(first.axis, again.axis);
        }
    }
}
