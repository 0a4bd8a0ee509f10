//! Spectrum data model
//!
//! An [`Integration`] is one full-resolution power spectrum (dB) together with
//! the timestamp that identifies it. A [`FrequencyAxis`] gives the frequency of
//! every spectrum sample and is shared by every integration of a source.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an integration: an integration counter or wall-clock seconds
pub type Timestamp = u64;

/// One power spectrum measurement plus its timestamp
///
/// Integrations are immutable once produced; the store and its readers share
/// them behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    timestamp: Timestamp,
    spectrum: Vec<f32>,
}

impl Integration {
    pub fn new(timestamp: Timestamp, spectrum: Vec<f32>) -> Self {
        Self {
            timestamp,
            spectrum,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum
    }

    /// Number of frequency bins in the spectrum
    pub fn bins(&self) -> usize {
        self.spectrum.len()
    }

    /// Same spectrum under a different timestamp
    pub fn restamped(self, timestamp: Timestamp) -> Self {
        Self { timestamp, ..self }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AxisError {
    #[error("Frequency axis is empty")]
    Empty,
    #[error("Frequency axis has a non-finite value at index {0}")]
    NonFinite(usize),
    #[error("Frequency axis is not strictly increasing at index {0}")]
    NotIncreasing(usize),
    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),
}

/// Frequencies (Hz) of the samples of a spectrum, strictly increasing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FrequencyAxis {
    freqs: Vec<f64>,
}

impl FrequencyAxis {
    pub fn new(freqs: Vec<f64>) -> Result<Self, AxisError> {
        if freqs.is_empty() {
            return Err(AxisError::Empty);
        }
        if let Some(index) = freqs.iter().position(|f| !f.is_finite()) {
            return Err(AxisError::NonFinite(index));
        }
        if let Some(index) = freqs.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(AxisError::NotIncreasing(index + 1));
        }
        Ok(Self { freqs })
    }

    /// `n` evenly spaced frequencies from `start` to `stop` inclusive
    #[cfg(test)]
    pub fn linspace(start: f64, stop: f64, n: usize) -> Result<Self, AxisError> {
        Self::new(evenly_spaced(start, stop, n))
    }

    /// Bin centres of an fft-shifted spectrum of `bins` points
    ///
    /// Zero frequency sits at index `bins / 2`, so for an even bin count the
    /// axis runs from `center - fs/2` to `center + fs/2 - fs/bins`.
    pub fn fft_shifted(sample_rate: f64, bins: usize, center: f64) -> Result<Self, AxisError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AxisError::InvalidSampleRate(sample_rate));
        }
        let resolution = sample_rate / bins as f64;
        let half = (bins / 2) as f64;
        Self::new(
            (0..bins)
                .map(|k| center + (k as f64 - half) * resolution)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.freqs
    }

    /// Lowest frequency on the axis
    pub fn min(&self) -> f64 {
        self.freqs[0]
    }

    /// Highest frequency on the axis
    pub fn max(&self) -> f64 {
        self.freqs[self.freqs.len() - 1]
    }
}

impl TryFrom<Vec<f64>> for FrequencyAxis {
    type Error = AxisError;

    fn try_from(freqs: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(freqs)
    }
}

impl From<FrequencyAxis> for Vec<f64> {
    fn from(axis: FrequencyAxis) -> Self {
        axis.freqs
    }
}

/// `n` evenly spaced points from `start` to `stop`, both ends included exactly
pub fn evenly_spaced(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            points[n - 1] = stop;
            points
        }
    }
}
