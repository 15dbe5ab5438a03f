// src/mover/task.rs

//! The per-file state machine.
//!
//! `run` drives one file through the pipeline stages and returns one of
//! three outcomes. `failed` is transient: the manager requeues the file
//! after its cooldown. `quarantined` is final for this file: the source is
//! moved aside so the scanner stops rediscovering it.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogResult, Catalogs, MetacatFileSpec};
use crate::config::{CatalogSettings, MoverSettings, SourcePurge};
use crate::exec::{expand_template, CommandRunner};
use crate::model::{now_ts, FileDescriptor, TaskEvent, TaskStatus};
use crate::mover::metadata::{parse_sidecar, Sidecar};
use crate::scan::Lister;

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverOutcome {
    Complete,
    Failed,
    Quarantined,
}

/// Everything a task needs to execute, shared by all workers.
#[derive(Clone)]
pub struct MoverContext {
    pub runner: Arc<dyn CommandRunner>,
    pub lister: Arc<Lister>,
    pub catalogs: Catalogs,
    pub settings: Arc<MoverSettings>,
    pub catalog_settings: CatalogSettings,
    pub meta_suffix: String,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    error: Option<String>,
    events: Vec<TaskEvent>,
    /// Unix time before which the file must not be requeued. Zero means no
    /// cooldown.
    retry_after: f64,
    /// Unix time after which the finished task is evicted from memory.
    keep_until: f64,
    /// Unix time the task was queued; doubles as the history record key.
    started_at: f64,
}

/// One file's journey through the pipeline.
pub struct MoverTask {
    pub desc: FileDescriptor,
    pub created_at: f64,
    state: Mutex<TaskState>,
}

impl MoverTask {
    pub fn new(desc: FileDescriptor) -> Self {
        let now = now_ts();
        Self {
            desc,
            created_at: now,
            state: Mutex::new(TaskState {
                status: TaskStatus::Created,
                error: None,
                events: vec![TaskEvent {
                    status: TaskStatus::Created,
                    at: now,
                    info: None,
                }],
                retry_after: 0.0,
                keep_until: 0.0,
                started_at: now,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn status(&self) -> TaskStatus {
        self.lock().status
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.lock().events.clone()
    }

    pub fn retry_after(&self) -> f64 {
        self.lock().retry_after
    }

    pub fn keep_until(&self) -> f64 {
        self.lock().keep_until
    }

    pub fn started_at(&self) -> f64 {
        self.lock().started_at
    }

    pub fn last_event_at(&self) -> f64 {
        self.lock().events.last().map(|e| e.at).unwrap_or(0.0)
    }

    /// Record admission to the dispatch queue. The cooldown starts at
    /// queue time, so a file is protected from requeueing even while its
    /// attempt is still in flight.
    pub(crate) fn mark_queued(&self, now: f64, keep_until: f64, retry_after: f64) {
        {
            let mut state = self.lock();
            state.started_at = now;
            state.keep_until = keep_until;
            state.retry_after = retry_after;
        }
        self.timestamp(TaskStatus::Queued, None);
    }

    /// Refresh retention and cooldown when the task reaches a terminal
    /// state.
    pub(crate) fn extend_retention(&self, keep_until: f64, retry_after: f64) {
        let mut state = self.lock();
        state.keep_until = keep_until;
        state.retry_after = retry_after;
    }

    /// Lift the cooldown so the next scan requeues this file immediately.
    pub(crate) fn clear_cooldown(&self) {
        self.lock().retry_after = 0.0;
    }

    /// Force a terminal failure from outside the pipeline, for workers
    /// that die without returning an outcome.
    pub(crate) fn force_failed(&self, error: String) {
        self.lock().error = Some(error.clone());
        self.timestamp(TaskStatus::Failed, Some(error));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TaskState> {
        // Task state is plain data; a poisoned lock means a panic already
        // took the worker down.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timestamp(&self, status: TaskStatus, info: Option<String>) {
        let mut state = self.lock();
        state.status = status;
        state.events.push(TaskEvent {
            status,
            at: now_ts(),
            info: info.clone(),
        });
        drop(state);
        match info {
            Some(info) => info!(file = %self.desc.name, %status, info, "task state"),
            None => info!(file = %self.desc.name, %status, "task state"),
        }
    }

    fn failed(&self, error: String) -> MoverOutcome {
        warn!(file = %self.desc.name, error, "mover task failed");
        self.lock().error = Some(error.clone());
        self.timestamp(TaskStatus::Failed, Some(error));
        MoverOutcome::Failed
    }

    fn interrupted(&self) -> MoverOutcome {
        self.failed("interrupted by shutdown".to_string())
    }

    /// Move the data file and its sidecar to the quarantine location.
    ///
    /// Without a configured quarantine location this degrades to a plain
    /// failure, which leaves the file in place for the next scan.
    async fn quarantine(&self, ctx: &MoverContext, reason: String) -> MoverOutcome {
        let settings = &ctx.settings;
        let (Some(location), Some(template)) = (
            &settings.quarantine_location,
            &settings.quarantine_command_template,
        ) else {
            return self.failed(format!("{reason} (no quarantine location configured)"));
        };

        warn!(file = %self.desc.name, reason, "quarantining source file");

        let command = expand_template(
            template,
            &[
                ("server", self.desc.server.as_str()),
                ("path", self.desc.path.as_str()),
                ("dst", location.as_str()),
            ],
        );
        let outcome = ctx.runner.run(&command, settings.transfer_timeout).await;
        if !outcome.success() {
            return self.failed(format!(
                "{reason}; quarantine move failed: {}",
                outcome.error_text()
            ));
        }

        // The sidecar may already be gone; its move is best-effort.
        let meta_path = format!("{}{}", self.desc.path, ctx.meta_suffix);
        let command = expand_template(
            template,
            &[
                ("server", self.desc.server.as_str()),
                ("path", meta_path.as_str()),
                ("dst", location.as_str()),
            ],
        );
        let outcome = ctx.runner.run(&command, settings.transfer_timeout).await;
        if !outcome.success() {
            warn!(
                file = %self.desc.name,
                error = %outcome.error_text(),
                "sidecar quarantine move failed"
            );
        }

        self.lock().error = Some(reason.clone());
        self.timestamp(TaskStatus::Quarantined, Some(reason));
        MoverOutcome::Quarantined
    }

    /// Run the whole pipeline for this file.
    pub async fn run(&self, ctx: &MoverContext) -> MoverOutcome {
        let settings = &ctx.settings;
        self.timestamp(TaskStatus::Started, None);

        // Stage 1: fetch the sidecar to local scratch.
        self.timestamp(TaskStatus::DownloadingMetadata, None);
        let meta_src_path = format!("{}{}", self.desc.path, ctx.meta_suffix);
        let meta_tmp = settings
            .temp_dir
            .join(format!("{}{}", self.desc.name, ctx.meta_suffix));
        let meta_tmp_str = meta_tmp.to_string_lossy().to_string();

        let command = expand_template(
            &settings.download_command_template,
            &[
                ("server", self.desc.server.as_str()),
                ("src_path", meta_src_path.as_str()),
                ("dst_path", meta_tmp_str.as_str()),
            ],
        );
        let outcome = ctx.runner.run(&command, settings.transfer_timeout).await;
        if !outcome.success() {
            return self.failed(format!(
                "metadata download failed: {}",
                outcome.error_text()
            ));
        }

        let read = tokio::fs::read_to_string(&meta_tmp).await;
        if let Err(e) = tokio::fs::remove_file(&meta_tmp).await {
            debug!(path = %meta_tmp_str, error = %e, "could not remove scratch sidecar");
        }
        let meta_text = match read {
            Ok(text) => text,
            Err(e) => {
                return self.failed(format!("reading downloaded sidecar {meta_tmp_str}: {e}"));
            }
        };

        if ctx.cancel.is_cancelled() {
            return self.interrupted();
        }

        // Stage 2: validate.
        self.timestamp(TaskStatus::ValidatingMetadata, None);
        let sidecar = match parse_sidecar(&meta_text) {
            Ok(sidecar) => sidecar,
            Err(reason) => {
                return self
                    .quarantine(ctx, format!("metadata validation failed: {reason}"))
                    .await;
            }
        };
        let lowercase = ctx
            .catalog_settings
            .metacat
            .as_ref()
            .map(|m| m.lowercase_meta_names)
            .unwrap_or(false);
        let metacat_meta = match sidecar.metacat_metadata(lowercase) {
            Ok(meta) => meta,
            Err(reason) => {
                return self
                    .quarantine(ctx, format!("metadata validation failed: {reason}"))
                    .await;
            }
        };
        if sidecar.file_size != self.desc.size {
            return self
                .quarantine(
                    ctx,
                    format!(
                        "metadata file_size {} does not match listed size {}",
                        sidecar.file_size, self.desc.size
                    ),
                )
                .await;
        }

        let scope = sidecar.file_scope().to_string();
        let rel_path = match settings
            .rel_path
            .rel_path(&scope, &self.desc.name, &metacat_meta)
        {
            Ok(rel) => rel,
            Err(reason) => return self.quarantine(ctx, reason).await,
        };
        let dest_path = format!("{}/{}", settings.destination_root, rel_path);
        let dest_dir = match dest_path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => settings.destination_root.clone(),
        };

        if ctx.cancel.is_cancelled() {
            return self.interrupted();
        }

        // Stage 3: copy the data file, unless it is already there.
        self.timestamp(TaskStatus::TransferringData, None);
        let existing = match ctx
            .lister
            .file_size(&settings.destination_server, &dest_path)
            .await
        {
            Ok(size) => size,
            Err(e) => return self.failed(format!("destination size probe failed: {e}")),
        };
        if existing == Some(self.desc.size) {
            info!(
                file = %self.desc.name,
                dest = %dest_path,
                "already at destination with matching size; skipping copy"
            );
        } else {
            if let Some(size) = existing {
                warn!(
                    file = %self.desc.name,
                    dest = %dest_path,
                    size,
                    "destination file exists with a different size; overwriting"
                );
            }

            // The copy reports a missing directory on its own.
            let command = expand_template(
                &settings.create_dirs_command_template,
                &[
                    ("server", settings.destination_server.as_str()),
                    ("path", dest_dir.as_str()),
                ],
            );
            let outcome = ctx.runner.run(&command, settings.transfer_timeout).await;
            if !outcome.success() {
                warn!(
                    dir = %dest_dir,
                    error = %outcome.error_text(),
                    "destination directory creation failed"
                );
            }

            let src_url = format!("root://{}/{}", self.desc.server, self.desc.path);
            let dst_url = format!("root://{}/{}", settings.destination_server, dest_path);
            let command = expand_template(
                &settings.copy_command_template,
                &[
                    ("src_url", src_url.as_str()),
                    ("dst_url", dst_url.as_str()),
                    ("src_path", self.desc.path.as_str()),
                    ("dst_path", dest_path.as_str()),
                    ("dst_rel_path", rel_path.as_str()),
                ],
            );
            let outcome = ctx.runner.run(&command, settings.transfer_timeout).await;
            if !outcome.success() {
                return self.failed(format!("data copy failed: {}", outcome.error_text()));
            }
        }

        if ctx.cancel.is_cancelled() {
            return self.interrupted();
        }

        // Stage 4: declare to the configured catalogs.
        self.timestamp(TaskStatus::Declaring, None);
        if let Err(e) = self
            .declare_catalogs(ctx, &sidecar, &metacat_meta, &dest_path, &rel_path)
            .await
        {
            return if e.is_permanent() {
                self.quarantine(ctx, e.to_string()).await
            } else {
                self.failed(e.to_string())
            };
        }

        if ctx.cancel.is_cancelled() {
            return self.interrupted();
        }

        // Stage 5: remove the sources, sidecar first so a partial failure
        // never leaves a data file without its metadata.
        self.timestamp(TaskStatus::RemovingSources, None);
        let purge_template = match (settings.source_purge, &settings.rename_command_template) {
            (SourcePurge::Rename, Some(template)) => template,
            _ => &settings.delete_command_template,
        };
        for path in [meta_src_path.as_str(), self.desc.path.as_str()] {
            let command = expand_template(
                purge_template,
                &[("server", self.desc.server.as_str()), ("path", path)],
            );
            let outcome = ctx.runner.run(&command, settings.transfer_timeout).await;
            if !outcome.success() {
                return self.failed(format!(
                    "source removal of {path} failed: {}",
                    outcome.error_text()
                ));
            }
        }

        self.timestamp(TaskStatus::Complete, None);
        info!(file = %self.desc.name, dest = %dest_path, "file moved and declared");
        MoverOutcome::Complete
    }

    /// Declare the file to SAM, MetaCat and Rucio, in that order.
    ///
    /// Each catalog is checked first: an existing record with matching size
    /// and checksum is success for that catalog, a mismatching one is a
    /// rejection. Errors bubble out with their transient/rejected
    /// classification intact.
    async fn declare_catalogs(
        &self,
        ctx: &MoverContext,
        sidecar: &Sidecar,
        metacat_meta: &serde_json::Map<String, serde_json::Value>,
        dest_path: &str,
        rel_path: &str,
    ) -> CatalogResult<()> {
        let name = &self.desc.name;
        let scope = sidecar.file_scope();
        let mut file_id = None;

        if let (Some(sam), Some(cfg)) = (&ctx.catalogs.sam, &ctx.catalog_settings.sam) {
            match sam.get_file(name).await? {
                Some(existing) => {
                    if existing.size != sidecar.file_size
                        || existing
                            .adler32
                            .as_deref()
                            .is_some_and(|a| a != sidecar.adler32)
                    {
                        return Err(CatalogError::Rejected(format!(
                            "already declared to SAM with different size or checksum \
                             (ours: {} bytes adler32:{})",
                            sidecar.file_size, sidecar.adler32
                        )));
                    }
                    info!(file = %name, "already declared to SAM");
                }
                None => {
                    let metadata = sidecar.sam_metadata(name, &cfg.user);
                    let id = sam.declare(&metadata).await?;
                    if let Some(template) = &cfg.location_template {
                        let location = expand_template(
                            template,
                            &[("dst_rel_path", rel_path), ("dst_data_path", dest_path)],
                        );
                        sam.add_location(&id, &location).await?;
                    }
                    file_id = Some(id);
                }
            }
        }

        if let (Some(metacat), Some(cfg)) = (&ctx.catalogs.metacat, &ctx.catalog_settings.metacat) {
            let did = format!("{scope}:{name}");
            match metacat.get_file(&did).await? {
                Some(existing) => {
                    if existing.size != sidecar.file_size
                        || existing
                            .adler32
                            .as_deref()
                            .is_some_and(|a| a != sidecar.adler32)
                    {
                        return Err(CatalogError::Rejected(format!(
                            "already declared to MetaCat as {did} with different size or checksum"
                        )));
                    }
                    info!(file = %name, did, "already declared to MetaCat");
                }
                None => {
                    let spec = MetacatFileSpec {
                        namespace: scope.to_string(),
                        name: name.clone(),
                        size: sidecar.file_size,
                        adler32: sidecar.adler32.clone(),
                        metadata: metacat_meta.clone(),
                        dataset_did: cfg.dataset.clone(),
                        file_id: file_id.clone(),
                    };
                    metacat.declare_file(&spec).await?;
                }
            }
        }

        if let (Some(rucio), Some(cfg)) = (&ctx.catalogs.rucio, &ctx.catalog_settings.rucio) {
            let run_number = sidecar.run_number().to_string();
            let dataset_did = expand_template(
                &cfg.dataset_did_template,
                &[("run_type", scope), ("run_number", run_number.as_str())],
            );
            let (ds_scope, ds_name) = dataset_did.split_once(':').ok_or_else(|| {
                CatalogError::Rejected(format!(
                    "dataset DID {dataset_did:?} is not of the form scope:name"
                ))
            })?;

            rucio.ensure_dataset(ds_scope, ds_name).await?;
            for rse in &cfg.target_rses {
                rucio.ensure_replication_rule(ds_scope, ds_name, rse).await?;
            }
            rucio
                .add_replica(&cfg.drop_rse, scope, name, sidecar.file_size, &sidecar.adler32)
                .await?;
            if !rucio.attach(ds_scope, ds_name, scope, name).await? {
                debug!(file = %name, dataset = %dataset_did, "already attached to dataset");
            }
        }

        Ok(())
    }
}
