//! Replay of pre-generated integrations
//!
//! Replay files are NDJSON: one [`ReplayHeader`] line describing the capture,
//! then one [`ReplayRow`] line per integration in production order.

use super::{SourceError, SpectrumSource};
use crate::spectrum::{FrequencyAxis, Integration, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayHeader {
    pub sample_rate: f64,
    pub bins: usize,
    pub noise_power: f64,
    /// Simulated time covered by the file, in seconds
    pub duration: f64,
    pub frequencies: FrequencyAxis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRow {
    pub timestamp: Timestamp,
    pub spectrum: Vec<f32>,
}

/// Loops over a fixed table of integrations forever
#[derive(Debug, Clone)]
pub struct ReplaySource {
    axis: FrequencyAxis,
    rows: Vec<Integration>,
    cursor: usize,
}

impl ReplaySource {
    pub fn new(axis: FrequencyAxis, rows: Vec<Integration>) -> Result<Self, SourceError> {
        if rows.is_empty() {
            return Err(SourceError::NoRows);
        }
        if let Some((row, integration)) = rows
            .iter()
            .enumerate()
            .find(|(_, integration)| integration.bins() != axis.len())
        {
            return Err(SourceError::BinMismatch {
                row,
                found: integration.bins(),
                expected: axis.len(),
            });
        }

        Ok(Self {
            axis,
            rows,
            cursor: 0,
        })
    }

    /// Read a replay file written by [`ReplayWriter`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut header: Option<ReplayHeader> = None;
        let mut rows = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parse_error = |source| SourceError::Json {
                line: index + 1,
                source,
            };

            if header.is_none() {
                header = Some(serde_json::from_str(&line).map_err(parse_error)?);
            } else {
                let row: ReplayRow = serde_json::from_str(&line).map_err(parse_error)?;
                rows.push(Integration::new(row.timestamp, row.spectrum));
            }
        }

        let header = header.ok_or(SourceError::MissingHeader)?;
        if header.bins != header.frequencies.len() {
            return Err(SourceError::InvalidConfig(format!(
                "header declares {} bins but lists {} frequencies",
                header.bins,
                header.frequencies.len()
            )));
        }

        tracing::info!(
            path = %path.as_ref().display(),
            bins = header.bins,
            sample_rate = header.sample_rate,
            duration = header.duration,
            "loaded replay file"
        );

        Self::new(header.frequencies, rows)
    }

    /// Number of distinct integrations before the replay wraps
    pub fn rows(&self) -> usize {
        self.rows.len()
    }
}

impl SpectrumSource for ReplaySource {
    fn axis(&self) -> &FrequencyAxis {
        &self.axis
    }

    fn next_integration(&mut self) -> Option<Integration> {
        let integration = self.rows[self.cursor % self.rows.len()].clone();
        self.cursor = (self.cursor + 1) % self.rows.len();
        Some(integration)
    }
}

/// Streams integrations into a replay file
pub struct ReplayWriter {
    writer: BufWriter<File>,
    bins: usize,
    written: usize,
}

impl ReplayWriter {
    pub fn create<P: AsRef<Path>>(path: P, header: &ReplayHeader) -> Result<Self, SourceError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, header)
            .map_err(|source| SourceError::Json { line: 1, source })?;
        writer.write_all(b"\n")?;

        Ok(Self {
            writer,
            bins: header.bins,
            written: 0,
        })
    }

    pub fn write(&mut self, integration: &Integration) -> Result<(), SourceError> {
        if integration.bins() != self.bins {
            return Err(SourceError::BinMismatch {
                row: self.written,
                found: integration.bins(),
                expected: self.bins,
            });
        }

        let row = ReplayRow {
            timestamp: integration.timestamp(),
            spectrum: integration.spectrum().to_vec(),
        };
        serde_json::to_writer(&mut self.writer, &row).map_err(|source| SourceError::Json {
            line: self.written + 2,
            source,
        })?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush the file and return the number of integrations written
    pub fn finish(mut self) -> Result<usize, SourceError> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file() -> PathBuf {
        std::env::temp_dir().join(format!("rfmon-replay-{}.ndjson", uuid::Uuid::new_v4()))
    }

    fn header(axis: &FrequencyAxis) -> ReplayHeader {
        ReplayHeader {
            sample_rate: 4.0,
            bins: axis.len(),
            noise_power: 1.0,
            duration: 2.0,
            frequencies: axis.clone(),
        }
    }

    #[test]
    fn test_replay_wraps_modulo_row_count() {
        let axis = FrequencyAxis::linspace(0.0, 1.0, 2).unwrap();
        let mut source = ReplaySource::new(
            axis,
            vec![
                Integration::new(10, vec![1.0, 1.0]),
                Integration::new(20, vec![2.0, 2.0]),
                Integration::new(30, vec![3.0, 3.0]),
            ],
        )
        .unwrap();

        let timestamps: Vec<u64> = (0..7)
            .map(|_| source.next_integration().unwrap().timestamp())
            .collect();
        assert_eq!(timestamps, vec![10, 20, 30, 10, 20, 30, 10]);
    }

    #[test]
    fn test_replay_rejects_bad_tables() {
        let axis = FrequencyAxis::linspace(0.0, 1.0, 2).unwrap();
        assert!(matches!(
            ReplaySource::new(axis.clone(), vec![]),
            Err(SourceError::NoRows)
        ));
        assert!(matches!(
            ReplaySource::new(axis, vec![Integration::new(0, vec![1.0; 3])]),
            Err(SourceError::BinMismatch {
                row: 0,
                found: 3,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_file_write_then_load() {
        let path = temp_file();
        let axis = FrequencyAxis::fft_shifted(4.0, 4, 0.0).unwrap();

        let mut writer = ReplayWriter::create(&path, &header(&axis)).unwrap();
        writer.write(&Integration::new(0, vec![0.5, 1.5, -2.0, 3.0])).unwrap();
        writer.write(&Integration::new(1, vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!(writer.write(&Integration::new(2, vec![1.0])).is_err());
        assert_eq!(writer.finish().unwrap(), 2);

        let mut source = ReplaySource::load(&path).unwrap();
        assert_eq!(source.rows(), 2);
        assert_eq!(source.axis(), &axis);
        assert_eq!(
            source.next_integration(),
            Some(Integration::new(0, vec![0.5, 1.5, -2.0, 3.0]))
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_reports_bad_line() {
        let path = temp_file();
        let axis = FrequencyAxis::linspace(0.0, 1.0, 2).unwrap();
        let mut contents = serde_json::to_string(&header(&axis)).unwrap();
        contents.push_str("\n{\"timestamp\":0,\"spectrum\":[1.0,2.0]}\nnot json\n");
        std::fs::write(&path, contents).unwrap();

        let result = ReplaySource::load(&path);
        assert!(matches!(result, Err(SourceError::Json { line: 3, .. })));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ReplaySource::load(temp_file()),
            Err(SourceError::Io(_))
        ));
    }
}
