//! Renderer-facing edge of the monitor
//!
//! Updates go to stdout, one line each. View changes arrive as JSON lines such
//! as `{"f1": -1e8, "f2": 1e8, "width": 500}`; omitted fields keep their
//! current value.

use crate::poller::RowUpdate;
use crate::reduce::ReductionRequest;
use crate::waterfall::WaterfallSnapshot;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One summary line per new row
    Text,
    /// One JSON row (values + axis) per new row
    Json,
    /// The whole waterfall as JSON after every change
    Snapshot,
}

#[derive(Debug, Deserialize)]
struct ViewUpdate {
    f1: Option<f64>,
    f2: Option<f64>,
    width: Option<usize>,
}

fn format_row(format: OutputFormat, update: &RowUpdate) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => {
            let row = &update.row;
            let peak = row
                .values
                .iter()
                .zip(&row.axis)
                .max_by(|a, b| a.0.total_cmp(b.0));
            Ok(match peak {
                Some((power, freq)) => format!(
                    "{} width={} range={:.3}..{:.3} MHz peak={:.1} dB at {:.3} MHz",
                    update.timestamp,
                    row.width(),
                    row.axis[0] / 1e6,
                    row.axis[row.axis.len() - 1] / 1e6,
                    power,
                    freq / 1e6
                ),
                None => format!("{} width=0", update.timestamp),
            })
        }
        OutputFormat::Json | OutputFormat::Snapshot => serde_json::to_string(update),
    }
}

/// Write updates to stdout until the poller goes away or `shutdown` fires
pub async fn emit_updates(
    format: OutputFormat,
    mut rows: mpsc::Receiver<RowUpdate>,
    snapshots: watch::Receiver<Arc<WaterfallSnapshot>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();

    // Row formats drop the receiver so the poller stops building snapshots
    let mut snapshots = (format == OutputFormat::Snapshot).then_some(snapshots);

    loop {
        let line = if let Some(snapshots) = snapshots.as_mut() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = Arc::clone(&snapshots.borrow_and_update());
                    serde_json::to_string(&*snapshot)?
                }
            }
        } else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                update = rows.recv() => match update {
                    Some(update) => format_row(format, &update)?,
                    None => break,
                },
            }
        };

        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Apply view changes read line by line from `reader`
pub async fn read_view_updates<R: AsyncBufRead + Unpin>(
    reader: R,
    view: watch::Sender<ReductionRequest>,
    shutdown: CancellationToken,
) {
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read view input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let update: ViewUpdate = match serde_json::from_str(&line) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed view update");
                continue;
            }
        };

        let current = *view.borrow();
        match ReductionRequest::new(
            update.f1.unwrap_or(current.f1()),
            update.f2.unwrap_or(current.f2()),
            update.width.unwrap_or(current.width()),
        ) {
            Ok(request) => {
                tracing::info!(
                    f1 = request.f1(),
                    f2 = request.f2(),
                    width = request.width(),
                    "view changed"
                );
                view.send_replace(request);
            }
            Err(e) => tracing::warn!(error = %e, "rejected view update"),
        }
    }
}
