//! Spectrum sources
//!
//! A source hands out one full-resolution [`Integration`] per call, either
//! synthesised on the fly or replayed from a pre-generated file.

mod replay;
mod synthetic;

pub use replay::{ReplayHeader, ReplaySource, ReplayWriter};
pub use synthetic::{Sweep, SweepLaw, SyntheticConfig, SyntheticSource};

use crate::spectrum::{AxisError, FrequencyAxis, Integration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Axis(#[from] AxisError),
    #[error("Replay file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid replay file at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Replay file has no header line")]
    MissingHeader,
    #[error("Replay file has no integrations")]
    NoRows,
    #[error("Integration {row} has {found} bins, expected {expected}")]
    BinMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Producer side of the pipeline
pub trait SpectrumSource: Send {
    /// Frequency of every sample of the spectra this source produces
    fn axis(&self) -> &FrequencyAxis;

    /// Next integration, or `None` once a bounded source is exhausted
    fn next_integration(&mut self) -> Option<Integration>;
}

impl<S: SpectrumSource + ?Sized> SpectrumSource for Box<S> {
    fn axis(&self) -> &FrequencyAxis {
        (**self).axis()
    }

    fn next_integration(&mut self) -> Option<Integration> {
        (**self).next_integration()
    }
}
