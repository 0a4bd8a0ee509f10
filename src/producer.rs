//! Periodic producer loop
//!
//! Pulls one integration from a [`SpectrumSource`] per period and hands it to a
//! [`Transport`]. A failed send is logged and forgotten; the next period's
//! integration supersedes it anyway.

use crate::source::SpectrumSource;
use crate::spectrum::{Integration, Timestamp};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Where published timestamps come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampMode {
    /// The source's own integration counter
    #[default]
    Sequence,
    /// Unix time in whole seconds at send time
    WallClock,
}

impl TimestampMode {
    fn apply(self, integration: Integration) -> Integration {
        match self {
            TimestampMode::Sequence => integration,
            TimestampMode::WallClock => integration.restamped(wall_clock_seconds()),
        }
    }
}

fn wall_clock_seconds() -> Timestamp {
    u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or(0)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSummary {
    pub produced: u64,
    pub sent: u64,
    pub dropped: u64,
}

/// Produce until `shutdown` fires or the source runs dry
pub async fn run_producer<S, T>(
    mut source: S,
    mut transport: T,
    period: Duration,
    timestamps: TimestampMode,
    shutdown: CancellationToken,
) -> ProducerSummary
where
    S: SpectrumSource,
    T: Transport,
{
    let mut summary = ProducerSummary::default();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        period_ms = period.as_millis() as u64,
        bins = source.axis().len(),
        "producer started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(integration) = source.next_integration() else {
            tracing::info!("source exhausted");
            break;
        };
        let integration = timestamps.apply(integration);
        let timestamp = integration.timestamp();
        summary.produced += 1;

        match transport.send(integration).await {
            Ok(()) => {
                summary.sent += 1;
                tracing::debug!(timestamp, "published");
            }
            Err(e) => {
                summary.dropped += 1;
                tracing::warn!(timestamp, error = %e, "failed to publish integration");
            }
        }
    }

    tracing::info!(
        produced = summary.produced,
        sent = summary.sent,
        dropped = summary.dropped,
        "producer stopped"
    );
    summary
}
