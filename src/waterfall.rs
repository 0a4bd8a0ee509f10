//! Waterfall history buffer
//!
//! Fixed-height ring of reduced rows with a parallel timestamp history. The
//! buffer always holds exactly `height` rows: it starts zero-filled and every
//! append evicts the oldest row. Snapshots are ordered oldest to newest.

use crate::reduce::ReducedRow;
use crate::spectrum::Timestamp;
use serde::Serialize;
use std::num::NonZeroUsize;

/// Point-in-time copy of the waterfall for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallSnapshot {
    /// `height` rows of `width` values, oldest first
    pub rows: Vec<Vec<f32>>,
    /// Frequency of each column
    pub axis: Vec<f64>,
    /// Timestamp of each row; `None` for rows still holding the startup fill
    pub timestamps: Vec<Option<Timestamp>>,
}

#[derive(Debug)]
pub struct WaterfallBuffer {
    rows: Vec<Vec<f32>>,
    timestamps: Vec<Option<Timestamp>>,
    axis: Vec<f64>,
    /// Slot the next append overwrites, which is also the oldest row
    next: usize,
}

impl WaterfallBuffer {
    /// Zero-filled buffer of `height` rows over `axis`
    pub fn new(height: NonZeroUsize, axis: Vec<f64>) -> Self {
        let height = height.get();
        Self {
            rows: vec![vec![0.0; axis.len()]; height],
            timestamps: vec![None; height],
            axis,
            next: 0,
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.axis.len()
    }

    /// Push a row as the newest, evicting the oldest
    ///
    /// A row of a different width invalidates the history (only reduced rows are
    /// kept, so old rows cannot be re-reduced) and the buffer restarts
    /// zero-filled at the new width.
    pub fn append(&mut self, row: ReducedRow, timestamp: Timestamp) {
        if row.width() != self.width() {
            self.rebuild(row.width());
        }

        let ReducedRow { values, axis } = row;
        self.rows[self.next] = values;
        self.timestamps[self.next] = Some(timestamp);
        self.axis = axis;
        self.next = (self.next + 1) % self.height();
    }

    /// Newest row and its timestamp, if anything has been appended
    #[cfg(test)]
    pub fn newest(&self) -> Option<(&[f32], Timestamp)> {
        let idx = (self.next + self.height() - 1) % self.height();
        self.timestamps[idx].map(|ts| (self.rows[idx].as_slice(), ts))
    }

    pub fn snapshot(&self) -> WaterfallSnapshot {
        let height = self.height();
        let order = (0..height).map(|i| (self.next + i) % height);

        WaterfallSnapshot {
            rows: order.clone().map(|idx| self.rows[idx].clone()).collect(),
            axis: self.axis.clone(),
            timestamps: order.map(|idx| self.timestamps[idx]).collect(),
        }
    }

    fn rebuild(&mut self, width: usize) {
        for row in &mut self.rows {
            *row = vec![0.0; width];
        }
        self.timestamps.fill(None);
        self.next = 0;
    }
}
