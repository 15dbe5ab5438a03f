// src/scan/scanner.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use globset::GlobSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ScanTarget, ScannerSettings};
use crate::manager::Manager;
use crate::model::FileDescriptor;
use crate::scan::listing::Lister;
use crate::scan::prescale::Prescale;

/// Discovers ready files under one (server, location) pair.
///
/// A data file is ready only when a sidecar named `name + meta_suffix`
/// with nonzero size appears in the same listing. Files whose sidecar has
/// not landed yet are withheld; they reappear on the next scan.
pub struct Scanner {
    target: ScanTarget,
    lister: Arc<Lister>,
    patterns: GlobSet,
    meta_suffix: String,
    prescale: Option<Prescale>,
    recursive: bool,
}

impl Scanner {
    pub fn new(settings: &ScannerSettings, target: ScanTarget, lister: Arc<Lister>) -> Self {
        Self {
            target,
            lister,
            patterns: settings.pattern_set(),
            meta_suffix: settings.meta_suffix.clone(),
            prescale: settings.prescale.as_ref().map(Prescale::new),
            recursive: settings.recursive,
        }
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    /// Raw listing of the scan root, for the operator inspection surface.
    pub async fn ls_input(&self) -> Result<Vec<FileDescriptor>> {
        self.lister
            .list_under(&self.target.server, &self.target.location, self.recursive)
            .await
    }

    /// List the location and return descriptors for every data file whose
    /// sidecar is present. Pairing, pattern filtering and prescaling all
    /// happen here; dedup against in-flight work is the manager's job.
    pub async fn collect_ready(&self) -> Result<Vec<FileDescriptor>> {
        let files = self
            .lister
            .list_under(&self.target.server, &self.target.location, self.recursive)
            .await?;
        debug!(
            server = %self.target.server,
            location = %self.target.location,
            listed = files.len(),
            "scan listing complete"
        );

        let mut data_files: HashMap<String, FileDescriptor> = HashMap::new();
        let mut sidecars_seen: HashSet<String> = HashSet::new();
        let mut ready: Vec<FileDescriptor> = Vec::new();

        for desc in files {
            if self.patterns.is_match(&desc.name) {
                if let Some(prescale) = &self.prescale {
                    if !prescale.admits(&desc.name) {
                        debug!(file = %desc.name, "rejected by prescale");
                        continue;
                    }
                }
                if sidecars_seen.contains(&desc.name) {
                    ready.push(desc);
                } else {
                    data_files.insert(desc.name.clone(), desc);
                }
            } else if let Some(data_name) = desc.name.strip_suffix(&self.meta_suffix) {
                if self.patterns.is_match(data_name) && desc.size > 0 {
                    if let Some(data_desc) = data_files.remove(data_name) {
                        ready.push(data_desc);
                    } else {
                        sidecars_seen.insert(data_name.to_string());
                    }
                }
            }
        }

        Ok(ready)
    }
}

/// Periodic scan loop for one scanner.
///
/// Runs until cancelled. Scans are skipped while the manager is held; the
/// sleep between cycles is cut short when the manager signals that its
/// queue fell below the low-water mark.
pub async fn run_scanner_loop(
    scanner: Scanner,
    manager: Arc<Manager>,
    interval: Duration,
    start_delay: Duration,
    cancel: CancellationToken,
) {
    let server = scanner.target().server.clone();
    let location = scanner.target().location.clone();
    info!(server = %server, location = %location, "scanner loop started");

    if !start_delay.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(start_delay) => {}
        }
    }

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if manager.is_held() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = manager.wait_released() => continue,
            }
        }

        match scanner.collect_ready().await {
            Ok(ready) => {
                let found = ready.len();
                let queued = manager.add_files(ready);
                info!(
                    server = %server,
                    location = %location,
                    found,
                    queued,
                    "scan cycle complete"
                );
            }
            Err(e) => {
                // Treated as zero files found; the next cycle retries.
                warn!(server = %server, location = %location, error = %e, "scan failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
            _ = manager.scan_wakeup() => {
                debug!(server = %server, location = %location, "woken below low-water mark");
            }
        }
    }

    info!(server = %server, location = %location, "scanner loop stopped");
}
