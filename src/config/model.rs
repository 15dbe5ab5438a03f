// src/config/model.rs

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scanner]
/// servers = ["eospublic.cern.ch"]
/// locations = ["/eos/experiment/dropbox"]
/// ls_command_template = "xrdfs $server ls -l $location"
/// filename_patterns = ["*.hdf5"]
///
/// [mover]
/// destination_server = "eosdest.cern.ch"
/// destination_root = "/eos/experiment/archive"
/// download_command_template = "xrdcp -f root://$server/$src_path $dst_path"
/// copy_command_template = "xrdcp $src_url $dst_url"
/// create_dirs_command_template = "xrdfs $server mkdir -p $path"
/// delete_command_template = "xrdfs $server rm $path"
///
/// [history]
/// db_path = "history.sqlite"
///
/// [metacat]
/// url = "https://metacat.example.org:9443/metacat"
/// dataset = "raw:all"
/// ```
///
/// The catalog sections (`[sam]`, `[metacat]`, `[rucio]`) are optional; an
/// absent section means the corresponding collaborator is not consulted.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub scanner: ScannerSection,
    pub mover: MoverSection,
    #[serde(default)]
    pub history: HistorySection,
    #[serde(default)]
    pub sam: Option<SamSection>,
    #[serde(default)]
    pub metacat: Option<MetacatSection>,
    #[serde(default)]
    pub rucio: Option<RucioSection>,
}

/// `[scanner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerSection {
    /// Source servers to scan; every server is paired with every location.
    pub servers: Vec<String>,

    /// Scan roots on each server.
    pub locations: Vec<String>,

    /// Listing command with `$server` and `$location` placeholders.
    pub ls_command_template: String,

    /// Regex applied to each listing line, with named groups `type`, `size`
    /// and `path`. The default matches generic `xrdfs ls -l` output.
    #[serde(default = "default_parse_re")]
    pub parse_re: String,

    /// Seconds between scans of each (server, location) pair.
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,

    /// Timeout for a single listing command.
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,

    /// Descend into directories returned by the listing.
    #[serde(default)]
    pub recursive: bool,

    /// Glob patterns selecting data files (e.g. `["*.hdf5", "np04_*"]`).
    pub filename_patterns: Vec<String>,

    /// Suffix of the metadata sidecar accompanying each data file.
    #[serde(default = "default_meta_suffix")]
    pub meta_suffix: String,

    /// Fraction of discovered files to admit, 0.0..=1.0. Admission is a
    /// deterministic hash test, so the same file always resolves the same
    /// way for a given salt.
    #[serde(default = "default_prescale_factor")]
    pub prescale_factor: f64,

    #[serde(default)]
    pub prescale_salt: String,

    /// Queue depth below which a scan is triggered immediately after a task
    /// finishes. Zero disables the early trigger.
    #[serde(default)]
    pub low_water_mark: usize,
}

/// `[mover]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MoverSection {
    /// Maximum number of concurrently running mover tasks.
    #[serde(default = "default_max_movers")]
    pub max_movers: usize,

    /// Minimum gap between consecutive task dispatches, in milliseconds.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Capacity of the dispatch queue. Admission is non-blocking: when the
    /// queue is full, newly discovered files are left for the next scan.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds a file must wait before it may be requeued after an attempt.
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,

    /// Seconds a finished task stays in memory for the recent-tasks view.
    #[serde(default = "default_keep_interval")]
    pub keep_interval_secs: u64,

    /// Timeout for each transfer-related command (download, copy, delete).
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    /// Local scratch directory for downloaded sidecars.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    pub destination_server: String,
    pub destination_root: String,

    /// `"hash"` or `"template"`.
    #[serde(default = "default_rel_path_strategy")]
    pub rel_path_strategy: String,

    /// Required when `rel_path_strategy = "template"`. May reference
    /// `$scope`, `$name` and metadata keys.
    #[serde(default)]
    pub rel_path_template: Option<String>,

    /// `"delete"` or `"rename"`.
    #[serde(default = "default_source_purge")]
    pub source_purge: String,

    /// Directory files with structural defects are moved to. When unset,
    /// quarantine degrades to a plain failure.
    #[serde(default)]
    pub quarantine_location: Option<String>,

    /// Sidecar download: `$server`, `$src_path`, `$dst_path`.
    pub download_command_template: String,

    /// Data copy: `$src_url`, `$dst_url`, `$src_path`, `$dst_path`,
    /// `$dst_rel_path`.
    pub copy_command_template: String,

    /// Destination directory creation: `$server`, `$path`.
    pub create_dirs_command_template: String,

    /// Source removal: `$server`, `$path`.
    pub delete_command_template: String,

    /// Source rename, used when `source_purge = "rename"`: `$server`,
    /// `$path`.
    #[serde(default)]
    pub rename_command_template: Option<String>,

    /// Quarantine move, required when `quarantine_location` is set:
    /// `$server`, `$path`, `$dst`.
    #[serde(default)]
    pub quarantine_command_template: Option<String>,
}

/// `[history]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seconds to retain finished records before the purge loop deletes
    /// them.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_secs: default_retention(),
        }
    }
}

/// `[sam]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SamSection {
    pub url: String,
    pub user: String,
    /// Location string registered for each file: `$dst_rel_path`,
    /// `$dst_data_path`.
    #[serde(default)]
    pub location_template: Option<String>,
}

/// `[metacat]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MetacatSection {
    pub url: String,
    /// Dataset DID (`scope:name`) new files are added to.
    pub dataset: String,
    #[serde(default)]
    pub lowercase_meta_names: bool,
}

/// `[rucio]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RucioSection {
    pub url: String,
    /// RSE the initial replica is declared in.
    pub drop_rse: String,
    /// RSEs replication rules are created for.
    #[serde(default)]
    pub target_rses: Vec<String>,
    /// Dataset DID built from metadata: `$run_type`, `$run_number`.
    pub dataset_did_template: String,
}

fn default_parse_re() -> String {
    // Generic `xrdfs ls -l` output: type flags, owner, group, size, date,
    // time, path.
    r"^(?P<type>[a-z-])\S+\s+\S+\s+\S+\s+(?P<size>\d+)\s+\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\s+(?P<path>\S+)$"
        .to_string()
}

fn default_scan_interval() -> u64 {
    300
}

fn default_scan_timeout() -> u64 {
    30
}

fn default_meta_suffix() -> String {
    ".json".to_string()
}

fn default_prescale_factor() -> f64 {
    1.0
}

fn default_max_movers() -> usize {
    10
}

fn default_stagger_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_retry_cooldown() -> u64 {
    3600
}

fn default_keep_interval() -> u64 {
    24 * 3600
}

fn default_transfer_timeout() -> u64 {
    120
}

fn default_temp_dir() -> String {
    "/tmp".to_string()
}

fn default_rel_path_strategy() -> String {
    "hash".to_string()
}

fn default_source_purge() -> String {
    "delete".to_string()
}

fn default_db_path() -> String {
    "history.sqlite".to_string()
}

fn default_retention() -> u64 {
    7 * 24 * 3600
}
