// src/model.rs

//! Shared data model: discovered files and mover task status.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::bail;

/// Current wall-clock time as fractional unix seconds.
///
/// All timestamps in the event log and the history store use this
/// representation so they can be compared and binned directly.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Immutable description of a file discovered by the scanner.
///
/// Built from one parsed listing line. `path` is the absolute source path;
/// `rel_path` is `path` with the `location` prefix and any leading slashes
/// stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub server: String,
    pub location: String,
    pub path: String,
    pub rel_path: String,
    pub name: String,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(
        server: impl Into<String>,
        location: impl Into<String>,
        path: impl Into<String>,
        size: u64,
    ) -> anyhow::Result<Self> {
        let server = server.into();
        let location = location.into();
        let path = path.into();

        if !path.starts_with(&location) {
            bail!("path {path:?} does not start with location {location:?}");
        }
        let rel_path = path[location.len()..].trim_start_matches('/').to_string();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();

        Ok(Self {
            server,
            location,
            path,
            rel_path,
            name,
            size,
        })
    }

    /// The path this file would have under a different root.
    pub fn path_under(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.rel_path)
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}({})",
            self.server, self.location, self.rel_path, self.size
        )
    }
}

/// Stages of the per-file mover pipeline, plus the two failure sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Queued,
    Started,
    DownloadingMetadata,
    ValidatingMetadata,
    TransferringData,
    Declaring,
    RemovingSources,
    Complete,
    /// Transient failure; the file is retried after its cooldown.
    Failed,
    /// Structural defect; the source was moved aside and is not retried.
    Quarantined,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Failed | TaskStatus::Quarantined
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Created => "created",
            TaskStatus::Queued => "queued",
            TaskStatus::Started => "started",
            TaskStatus::DownloadingMetadata => "downloading metadata",
            TaskStatus::ValidatingMetadata => "validating metadata",
            TaskStatus::TransferringData => "transferring data",
            TaskStatus::Declaring => "declaring",
            TaskStatus::RemovingSources => "removing sources",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
            TaskStatus::Quarantined => "quarantined",
        };
        f.write_str(s)
    }
}

/// One timestamped entry in a mover task's event log.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub status: TaskStatus,
    pub at: f64,
    pub info: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_strips_location_prefix() {
        let d = FileDescriptor::new("srv", "/data/in", "/data/in/run1/f.hdf5", 42).unwrap();
        assert_eq!(d.rel_path, "run1/f.hdf5");
        assert_eq!(d.name, "f.hdf5");
        assert_eq!(d.size, 42);
    }

    #[test]
    fn descriptor_rejects_foreign_path() {
        assert!(FileDescriptor::new("srv", "/data/in", "/other/f.hdf5", 0).is_err());
    }

    #[test]
    fn path_under_joins_without_double_slash() {
        let d = FileDescriptor::new("srv", "/in", "/in/a/b.dat", 1).unwrap();
        assert_eq!(d.path_under("/dest/"), "/dest/a/b.dat");
        assert_eq!(d.path_under("/dest"), "/dest/a/b.dat");
    }
}
