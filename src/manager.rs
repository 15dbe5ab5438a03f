// src/manager.rs

//! Task admission, dispatch and bookkeeping.
//!
//! The manager sits between the scanners and the mover workers. Scanners
//! hand it batches of ready files; it deduplicates against in-flight work,
//! enforces per-file cooldowns, and feeds a bounded dispatch queue drained
//! by [`run_dispatch_loop`]. It also carries the operator surface: hold and
//! release, forced retries, and the recent/quarantined task views.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{MoverSettings, ScanTarget, Settings};
use crate::errors::Result;
use crate::history::{HistoryRecord, HistoryStore};
use crate::model::{now_ts, FileDescriptor};
use crate::mover::{MoverContext, MoverOutcome, MoverTask};

/// A file sitting in the quarantine location, annotated with its last
/// history record when one exists.
#[derive(Debug, Clone)]
pub struct QuarantinedFile {
    pub desc: FileDescriptor,
    pub last_record: Option<HistoryRecord>,
}

#[derive(Default)]
struct ManagerState {
    /// Tasks queued or running, by file name.
    active: HashSet<String>,
    /// Most recent task per file name, kept until `keep_until` for the
    /// operator views and the cooldown check.
    recent: HashMap<String, Arc<MoverTask>>,
}

pub struct Manager {
    settings: MoverSettings,
    low_water_mark: usize,
    history: Arc<HistoryStore>,
    ctx: MoverContext,
    tx: mpsc::Sender<Arc<MoverTask>>,
    state: Mutex<ManagerState>,
    held_tx: watch::Sender<bool>,
    scan_now: Notify,
    /// Where quarantined files are listed from: the first scan server plus
    /// the configured quarantine location.
    quarantine_target: Option<ScanTarget>,
}

impl Manager {
    /// Build the manager and the receiving end of its dispatch queue. The
    /// caller owns the receiver and passes it to [`run_dispatch_loop`].
    pub fn new(
        settings: &Settings,
        history: Arc<HistoryStore>,
        ctx: MoverContext,
        held: bool,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<MoverTask>>) {
        let (tx, rx) = mpsc::channel(settings.mover.queue_capacity);
        let (held_tx, _) = watch::channel(held);

        let quarantine_target = settings.mover.quarantine_location.as_ref().and_then(|loc| {
            settings.scanner.targets.first().map(|t| ScanTarget {
                server: t.server.clone(),
                location: loc.trim_end_matches('/').to_string(),
            })
        });

        let manager = Arc::new(Self {
            settings: settings.mover.clone(),
            low_water_mark: settings.scanner.low_water_mark,
            history,
            ctx,
            tx,
            state: Mutex::new(ManagerState::default()),
            held_tx,
            scan_now: Notify::new(),
            quarantine_target,
        });
        (manager, rx)
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a batch of discovered files to the dispatch queue.
    ///
    /// Files already queued or running are skipped, as are files still in
    /// their cooldown from a previous attempt. Admission never blocks: when
    /// the queue is full the remainder of the batch is left for the next
    /// scan, without starting a cooldown.
    pub fn add_files(&self, files: Vec<FileDescriptor>) -> usize {
        let now = now_ts();
        let mut queued = 0;
        let mut state = self.lock();

        for desc in files {
            let name = desc.name.clone();
            if state.active.contains(&name) {
                continue;
            }
            if let Some(prev) = state.recent.get(&name) {
                if prev.retry_after() > now {
                    debug!(file = %name, "still in cooldown; skipped");
                    continue;
                }
            }

            let task = Arc::new(MoverTask::new(desc));
            match self.tx.try_send(task.clone()) {
                Ok(()) => {
                    task.mark_queued(
                        now,
                        now + self.settings.keep_interval_secs,
                        now + self.settings.retry_cooldown_secs,
                    );
                    if let Err(e) = self.history.file_queued(&name, task.desc.size, now) {
                        warn!(file = %name, error = %e, "could not record queued attempt");
                    }
                    state.active.insert(name.clone());
                    state.recent.insert(name, task);
                    queued += 1;
                }
                Err(TrySendError::Full(_)) => {
                    debug!("dispatch queue full; leaving remaining files for the next scan");
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("dispatch queue closed; dropping batch");
                    break;
                }
            }
        }
        queued
    }

    /// Queued plus running task count.
    pub fn queue_depth(&self) -> usize {
        self.lock().active.len()
    }

    /// Tasks currently queued or running.
    pub fn current_tasks(&self) -> Vec<Arc<MoverTask>> {
        let state = self.lock();
        state
            .active
            .iter()
            .filter_map(|name| state.recent.get(name).cloned())
            .collect()
    }

    /// All remembered tasks, newest activity first.
    pub fn recent_tasks(&self) -> Vec<Arc<MoverTask>> {
        let mut tasks: Vec<Arc<MoverTask>> = self.lock().recent.values().cloned().collect();
        tasks.sort_by(|a, b| {
            b.last_event_at()
                .partial_cmp(&a.last_event_at())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        tasks
    }

    pub fn task(&self, name: &str) -> Option<Arc<MoverTask>> {
        self.lock().recent.get(name).cloned()
    }

    /// Lift a file's cooldown so the next scan requeues it immediately.
    /// Returns false when the file is unknown or still in flight.
    pub fn retry_now(&self, name: &str) -> bool {
        let state = self.lock();
        if state.active.contains(name) {
            return false;
        }
        match state.recent.get(name) {
            Some(task) => {
                task.clear_cooldown();
                info!(file = name, "cooldown lifted; file eligible on next scan");
                true
            }
            None => false,
        }
    }

    /// Pause scanning. In-flight tasks run to completion; no new files are
    /// discovered or queued until [`release`](Self::release).
    pub fn hold(&self) {
        info!("scanning held");
        self.held_tx.send_replace(true);
    }

    pub fn release(&self) {
        info!("scanning released");
        self.held_tx.send_replace(false);
    }

    pub fn is_held(&self) -> bool {
        *self.held_tx.borrow()
    }

    /// Resolve when the hold is lifted.
    pub async fn wait_released(&self) {
        let mut rx = self.held_tx.subscribe();
        // The sender lives in self, so changed() cannot fail while the
        // manager exists.
        let _ = rx.wait_for(|held| !held).await;
    }

    /// Resolve on the next low-water wakeup.
    pub async fn scan_wakeup(&self) {
        self.scan_now.notified().await
    }

    /// List the quarantine location and annotate each file with its last
    /// history record.
    pub async fn quarantined(&self) -> Result<Vec<QuarantinedFile>> {
        let Some(target) = &self.quarantine_target else {
            return Ok(Vec::new());
        };
        let listing = self
            .ctx
            .lister
            .list(&target.server, &target.location)
            .await?;

        let names: Vec<String> = listing.files.iter().map(|f| f.name.clone()).collect();
        let mut records = self.history.latest_records_bulk(&names)?;

        Ok(listing
            .files
            .into_iter()
            .map(|desc| {
                let last_record = records.remove(&desc.name);
                QuarantinedFile { desc, last_record }
            })
            .collect())
    }

    /// Terminal bookkeeping for a finished task.
    fn task_ended(&self, task: &Arc<MoverTask>, outcome: MoverOutcome) {
        let now = now_ts();
        let name = task.name().to_string();

        self.lock().active.remove(&name);
        task.extend_retention(
            now + self.settings.keep_interval_secs,
            now + self.settings.retry_cooldown_secs,
        );

        let result = match outcome {
            MoverOutcome::Complete => {
                self.history
                    .file_done(&name, task.desc.size, task.started_at(), Some(now))
            }
            MoverOutcome::Failed => self.history.file_failed(
                &name,
                task.desc.size,
                task.started_at(),
                &task.error().unwrap_or_default(),
                Some(now),
            ),
            MoverOutcome::Quarantined => self.history.file_quarantined(
                &name,
                task.started_at(),
                &task.error().unwrap_or_default(),
                Some(now),
            ),
        };
        if let Err(e) = result {
            warn!(file = %name, error = %e, "could not record task outcome");
        }

        self.maybe_request_scan();
    }

    fn maybe_request_scan(&self) {
        if self.low_water_mark > 0 && self.queue_depth() < self.low_water_mark {
            debug!(
                depth = self.queue_depth(),
                mark = self.low_water_mark,
                "below low-water mark; requesting scan"
            );
            self.scan_now.notify_waiters();
        }
    }

    /// Drop remembered terminal tasks whose retention expired.
    fn purge_memory(&self) {
        let now = now_ts();
        let mut state = self.lock();
        let active = std::mem::take(&mut state.active);
        state
            .recent
            .retain(|name, task| active.contains(name) || task.keep_until() > now);
        state.active = active;
    }
}

/// Drain the dispatch queue, running up to `max_movers` tasks at once with
/// a stagger between dispatches. Runs until cancelled, then waits for
/// in-flight workers to finish.
pub async fn run_dispatch_loop(
    manager: Arc<Manager>,
    mut rx: mpsc::Receiver<Arc<MoverTask>>,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(manager.settings.max_movers));
    let mut workers = JoinSet::new();
    info!(max_movers = manager.settings.max_movers, "dispatch loop started");

    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(task) => task,
                None => break,
            },
        };

        // A hold pauses new dispatch as well as scanning; queued tasks
        // keep their place.
        if manager.is_held() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = manager.wait_released() => {}
            }
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        // Reap completed workers so the join set does not grow unbounded.
        while workers.try_join_next().is_some() {}

        let worker_manager = manager.clone();
        workers.spawn(async move {
            let _permit = permit;
            run_one(worker_manager, task).await;
        });

        if !manager.settings.stagger.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(manager.settings.stagger) => {}
            }
        }
    }

    info!("dispatch loop draining workers");
    while workers.join_next().await.is_some() {}
    info!("dispatch loop stopped");
}

/// Run one task in its own spawned future so a panic in the pipeline is
/// contained and recorded as a failure instead of taking the loop down.
async fn run_one(manager: Arc<Manager>, task: Arc<MoverTask>) {
    let ctx = manager.ctx.clone();
    let run_task = task.clone();
    let handle = tokio::spawn(async move { run_task.run(&ctx).await });

    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(file = %task.name(), error = %e, "mover worker died");
            task.force_failed(format!("worker died: {e}"));
            MoverOutcome::Failed
        }
    };
    manager.task_ended(&task, outcome);
}

/// Periodically evict expired tasks from the manager's memory.
pub async fn run_housekeeping_loop(manager: Arc<Manager>, cancel: CancellationToken) {
    let period = Duration::from_secs(60);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => manager.purge_memory(),
        }
    }
}
