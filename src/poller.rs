//! Change-detection poller
//!
//! Periodically compares the store's timestamp with the last one applied to the
//! waterfall. Only on a change is the integration fetched, reduced to the
//! current view and appended. An equal timestamp means "no change" even if the
//! spectrum behind it differs, and an empty store leaves the buffer untouched.

use crate::reduce::{BinReduction, ReduceError, ReducedRow, ReductionRequest, reduce};
use crate::spectrum::{FrequencyAxis, Timestamp};
use crate::store::{LatestValueStore, StoreError};
use crate::waterfall::{WaterfallBuffer, WaterfallSnapshot};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Cannot reduce integration: {0}")]
    Reduce(#[from] ReduceError),
}

/// Newest row appended to the waterfall, for incremental rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowUpdate {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub row: ReducedRow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing has been written to the store yet
    Empty,
    /// The store still holds the last applied timestamp
    Unchanged,
    Applied(RowUpdate),
}

pub struct Poller {
    axis: FrequencyAxis,
    method: BinReduction,
    buffer: WaterfallBuffer,
    last_applied: Option<Timestamp>,
}

impl Poller {
    /// Poller over spectra sampled at `axis`, starting from a zeroed waterfall
    /// laid out for `request`
    pub fn new(
        axis: FrequencyAxis,
        height: NonZeroUsize,
        request: &ReductionRequest,
        method: BinReduction,
    ) -> Result<Self, ReduceError> {
        let blank = vec![0.0; axis.len()];
        let initial = reduce(&blank, &axis, request, method)?;

        Ok(Self {
            buffer: WaterfallBuffer::new(height, initial.axis),
            axis,
            method,
            last_applied: None,
        })
    }

    pub fn last_applied(&self) -> Option<Timestamp> {
        self.last_applied
    }

    pub fn snapshot(&self) -> WaterfallSnapshot {
        self.buffer.snapshot()
    }

    /// One poll cycle
    pub async fn tick<S: LatestValueStore>(
        &mut self,
        store: &S,
        request: &ReductionRequest,
    ) -> Result<PollOutcome, PollError> {
        let Some(timestamp) = store.timestamp().await? else {
            return Ok(PollOutcome::Empty);
        };
        if self.last_applied == Some(timestamp) {
            return Ok(PollOutcome::Unchanged);
        }

        // The slot may have moved on since the timestamp check; what was
        // fetched is what gets applied.
        let Some(integration) = store.read().await? else {
            return Ok(PollOutcome::Empty);
        };
        let timestamp = integration.timestamp();
        if self.last_applied == Some(timestamp) {
            return Ok(PollOutcome::Unchanged);
        }

        // Recorded before reducing so an unusable integration is reported once
        self.last_applied = Some(timestamp);
        let row = reduce(integration.spectrum(), &self.axis, request, self.method)?;
        self.buffer.append(row.clone(), timestamp);

        Ok(PollOutcome::Applied(RowUpdate { timestamp, row }))
    }
}

/// Renderer-facing outputs of a running poller
pub struct Display {
    /// Incremental updates; dropped when the consumer falls behind
    pub rows: mpsc::Sender<RowUpdate>,
    /// Full waterfall after every applied change; only built while a receiver
    /// is subscribed
    pub snapshots: watch::Sender<Arc<WaterfallSnapshot>>,
}

/// Poll `store` every `period` until `shutdown` fires
///
/// The view (range and width) is re-read every cycle, so a new request takes
/// effect on the next change. Returns the poller for inspection.
pub async fn run_poller<S: LatestValueStore>(
    mut poller: Poller,
    store: &S,
    period: Duration,
    view: watch::Receiver<ReductionRequest>,
    display: Display,
    shutdown: CancellationToken,
) -> Poller {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let request = *view.borrow();
        match poller.tick(store, &request).await {
            Ok(PollOutcome::Applied(update)) => {
                tracing::debug!(
                    timestamp = update.timestamp,
                    width = update.row.width(),
                    "applied"
                );
                if !display.snapshots.is_closed() {
                    display.snapshots.send_replace(Arc::new(poller.snapshot()));
                }
                if let Err(mpsc::error::TrySendError::Full(update)) = display.rows.try_send(update)
                {
                    tracing::debug!(timestamp = update.timestamp, "display lagging, row dropped");
                }
            }
            Ok(PollOutcome::Empty | PollOutcome::Unchanged) => {}
            Err(e) => {
                tracing::warn!(error = %e, "poll failed");
            }
        }
    }

    tracing::info!(last_applied = ?poller.last_applied(), "poller stopped");
    poller
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::Integration;
    use crate::store::LatestSlot;

    fn axis() -> FrequencyAxis {
        FrequencyAxis::linspace(0.0, 7.0, 8).unwrap()
    }

    fn poller(width: usize) -> Poller {
        let axis = axis();
        let request = ReductionRequest::full_range(&axis, width).unwrap();
        Poller::new(axis, NonZeroUsize::new(3).unwrap(), &request, BinReduction::Max).unwrap()
    }

    fn ramp(offset: f32) -> Vec<f32> {
        (0..8).map(|i| i as f32 + offset).collect()
    }

    #[tokio::test]
    async fn test_empty_store_is_no_change() {
        let slot = LatestSlot::new();
        let mut poller = poller(4);
        let request = ReductionRequest::full_range(&axis(), 4).unwrap();

        assert_eq!(
            poller.tick(&slot, &request).await.unwrap(),
            PollOutcome::Empty
        );
        let snapshot = poller.snapshot();
        assert_eq!(snapshot.rows, vec![vec![0.0; 4]; 3]);
        assert_eq!(snapshot.timestamps, vec![None; 3]);
        assert_eq!(snapshot.axis.len(), 4);
    }

    #[tokio::test]
    async fn test_repeated_tick_without_write_is_idempotent() {
        let slot = LatestSlot::new();
        slot.write(Integration::new(1, ramp(0.0)));
        let mut poller = poller(4);
        let request = ReductionRequest::full_range(&axis(), 4).unwrap();

        let applied = poller.tick(&slot, &request).await.unwrap();
        match applied {
            PollOutcome::Applied(update) => {
                assert_eq!(update.timestamp, 1);
                assert_eq!(update.row.values, vec![1.0, 3.0, 5.0, 7.0]);
            }
            other => panic!("Expected applied, got {:?}", other),
        }
        let before = poller.snapshot();

        for _ in 0..3 {
            assert_eq!(
                poller.tick(&slot, &request).await.unwrap(),
                PollOutcome::Unchanged
            );
        }
        assert_eq!(poller.snapshot(), before);
    }

    #[tokio::test]
    async fn test_same_timestamp_new_content_is_ignored() {
        let slot = LatestSlot::new();
        let mut poller = poller(8);
        let request = ReductionRequest::full_range(&axis(), 8).unwrap();

        slot.write(Integration::new(7, ramp(0.0)));
        poller.tick(&slot, &request).await.unwrap();
        slot.write(Integration::new(7, ramp(100.0)));

        assert_eq!(
            poller.tick(&slot, &request).await.unwrap(),
            PollOutcome::Unchanged
        );
        let snapshot = poller.snapshot();
        assert_eq!(snapshot.rows[2], ramp(0.0));
    }

    #[tokio::test]
    async fn test_writes_between_polls_apply_only_latest() {
        let slot = LatestSlot::new();
        let mut poller = poller(8);
        let request = ReductionRequest::full_range(&axis(), 8).unwrap();

        slot.write(Integration::new(1, ramp(1.0)));
        slot.write(Integration::new(2, ramp(2.0)));
        poller.tick(&slot, &request).await.unwrap();

        assert_eq!(poller.last_applied(), Some(2));
        let snapshot = poller.snapshot();
        assert_eq!(snapshot.timestamps, vec![None, None, Some(2)]);
        assert_eq!(snapshot.rows[2], ramp(2.0));
    }

    #[tokio::test]
    async fn test_width_change_rebuilds_waterfall() {
        let slot = LatestSlot::new();
        let mut poller = poller(4);

        slot.write(Integration::new(1, ramp(0.0)));
        let narrow = ReductionRequest::full_range(&axis(), 4).unwrap();
        poller.tick(&slot, &narrow).await.unwrap();

        slot.write(Integration::new(2, ramp(0.0)));
        let wide = ReductionRequest::full_range(&axis(), 2).unwrap();
        poller.tick(&slot, &wide).await.unwrap();

        let snapshot = poller.snapshot();
        assert_eq!(snapshot.axis, vec![0.0, 7.0]);
        assert_eq!(snapshot.timestamps, vec![None, None, Some(2)]);
        assert!(snapshot.rows.iter().all(|row| row.len() == 2));
    }

    #[tokio::test]
    async fn test_mismatched_integration_reported_once() {
        let slot = LatestSlot::new();
        let mut poller = poller(4);
        let request = ReductionRequest::full_range(&axis(), 4).unwrap();

        slot.write(Integration::new(1, vec![0.0; 3]));
        assert!(matches!(
            poller.tick(&slot, &request).await,
            Err(PollError::Reduce(ReduceError::LengthMismatch { .. }))
        ));
        assert_eq!(
            poller.tick(&slot, &request).await.unwrap(),
            PollOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn test_run_poller_emits_updates() {
        let slot = Arc::new(LatestSlot::new());
        let request = ReductionRequest::full_range(&axis(), 4).unwrap();
        let (_view_tx, view_rx) = watch::channel(request);
        let (rows_tx, mut rows_rx) = mpsc::channel(8);
        let (snap_tx, mut snap_rx) = watch::channel(Arc::new(poller(4).snapshot()));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let slot = Arc::clone(&slot);
            let shutdown = shutdown.clone();
            async move {
                run_poller(
                    poller(4),
                    &slot,
                    Duration::from_millis(5),
                    view_rx,
                    Display {
                        rows: rows_tx,
                        snapshots: snap_tx,
                    },
                    shutdown,
                )
                .await
            }
        });

        slot.write(Integration::new(42, ramp(0.0)));
        let update = tokio::time::timeout(Duration::from_secs(2), rows_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.timestamp, 42);
        assert_eq!(update.row.axis.len(), 4);

        snap_rx.changed().await.unwrap();
        assert_eq!(snap_rx.borrow().timestamps[2], Some(42));

        shutdown.cancel();
        let poller = task.await.unwrap();
        assert_eq!(poller.last_applied(), Some(42));
    }
}
