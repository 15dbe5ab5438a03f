// src/history/mod.rs

//! Durable per-file lifecycle log.
//!
//! Every attempt on every file gets one row keyed by (filename, tstart);
//! repeated calls for the same attempt upsert the row instead of
//! duplicating it. The store is the single source of durable truth: mover
//! tasks are evicted from memory after their keep interval, their outcome
//! survives only here.

pub mod store;

pub use store::{HistoryRecord, HistoryStore, RecordStatus};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::now_ts;

/// Background retention purge.
///
/// Runs every `max(15s, retention / 7)` and deletes records whose end
/// timestamp fell out of the retention window.
pub async fn run_purge_loop(
    store: Arc<HistoryStore>,
    retention_secs: f64,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs_f64((retention_secs / 7.0).max(15.0));
    info!(period_secs = period.as_secs(), "history purge loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
        match store.purge_older_than(now_ts() - retention_secs) {
            Ok(purged) if purged > 0 => info!(purged, "purged old history records"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "history purge failed"),
        }
    }

    info!("history purge loop stopped");
}
