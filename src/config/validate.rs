// src/config/validate.rs

//! Semantic validation: raw TOML sections become typed settings.
//!
//! Everything that can be rejected at startup is rejected here, so runtime
//! code never re-checks templates, patterns or ranges.

use std::path::PathBuf;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::config::model::ConfigFile;
use crate::errors::{Result, ShipdError};
use crate::mover::dest::RelPathStrategy;

/// Prescale admission test parameters. `threshold` is the admitted share of
/// the hash range `0..PRESCALE_RANGE`.
#[derive(Debug, Clone)]
pub struct PrescaleSettings {
    pub threshold: u64,
    pub salt: String,
}

/// Hash range of the prescale admission test.
pub const PRESCALE_RANGE: u64 = 10_000;

/// One (server, location) pair scanned by its own loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanTarget {
    pub server: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub targets: Vec<ScanTarget>,
    pub ls_command_template: String,
    pub parse_re: String,
    pub interval: Duration,
    pub op_timeout: Duration,
    pub recursive: bool,
    pub filename_patterns: Vec<String>,
    pub meta_suffix: String,
    pub prescale: Option<PrescaleSettings>,
    pub low_water_mark: usize,
}

impl ScannerSettings {
    /// Compiled glob set for the configured data-file patterns.
    pub fn pattern_set(&self) -> GlobSet {
        // Patterns were validated at startup; rebuilding cannot fail.
        build_glob_set(&self.filename_patterns).unwrap_or_default()
    }
}

/// What happens to the source files after a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePurge {
    Delete,
    Rename,
}

#[derive(Debug, Clone)]
pub struct MoverSettings {
    pub max_movers: usize,
    pub stagger: Duration,
    pub queue_capacity: usize,
    pub retry_cooldown_secs: f64,
    pub keep_interval_secs: f64,
    pub transfer_timeout: Duration,
    pub temp_dir: PathBuf,
    pub destination_server: String,
    pub destination_root: String,
    pub rel_path: RelPathStrategy,
    pub source_purge: SourcePurge,
    pub quarantine_location: Option<String>,
    pub quarantine_command_template: Option<String>,
    pub download_command_template: String,
    pub copy_command_template: String,
    pub create_dirs_command_template: String,
    pub delete_command_template: String,
    pub rename_command_template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub db_path: PathBuf,
    pub retention_secs: f64,
}

#[derive(Debug, Clone)]
pub struct SamSettings {
    pub url: String,
    pub user: String,
    pub location_template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetacatSettings {
    pub url: String,
    pub dataset: String,
    pub lowercase_meta_names: bool,
}

#[derive(Debug, Clone)]
pub struct RucioSettings {
    pub url: String,
    pub drop_rse: String,
    pub target_rses: Vec<String>,
    pub dataset_did_template: String,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogSettings {
    pub sam: Option<SamSettings>,
    pub metacat: Option<MetacatSettings>,
    pub rucio: Option<RucioSettings>,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub scanner: ScannerSettings,
    pub mover: MoverSettings,
    pub history: HistorySettings,
    pub catalogs: CatalogSettings,
}

impl TryFrom<ConfigFile> for Settings {
    type Error = ShipdError;

    fn try_from(raw: ConfigFile) -> Result<Self> {
        let scanner = validate_scanner(&raw)?;
        let mover = validate_mover(&raw)?;
        let history = HistorySettings {
            db_path: PathBuf::from(&raw.history.db_path),
            retention_secs: raw.history.retention_secs as f64,
        };
        let catalogs = CatalogSettings {
            sam: raw.sam.as_ref().map(|s| SamSettings {
                url: s.url.trim_end_matches('/').to_string(),
                user: s.user.clone(),
                location_template: s.location_template.clone(),
            }),
            metacat: raw.metacat.as_ref().map(|m| MetacatSettings {
                url: m.url.trim_end_matches('/').to_string(),
                dataset: m.dataset.clone(),
                lowercase_meta_names: m.lowercase_meta_names,
            }),
            rucio: raw.rucio.as_ref().map(|r| RucioSettings {
                url: r.url.trim_end_matches('/').to_string(),
                drop_rse: r.drop_rse.clone(),
                target_rses: r.target_rses.clone(),
                dataset_did_template: r.dataset_did_template.clone(),
            }),
        };

        Ok(Settings {
            scanner,
            mover,
            history,
            catalogs,
        })
    }
}

fn config_err(msg: impl Into<String>) -> ShipdError {
    ShipdError::ConfigError(msg.into())
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        let glob = Glob::new(p)
            .map_err(|e| config_err(format!("invalid filename pattern {p:?}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| config_err(format!("invalid filename patterns: {e}")))
}

fn validate_scanner(raw: &ConfigFile) -> Result<ScannerSettings> {
    let s = &raw.scanner;

    if s.servers.is_empty() {
        return Err(config_err("scanner.servers must not be empty"));
    }
    if s.locations.is_empty() {
        return Err(config_err("scanner.locations must not be empty"));
    }
    if s.filename_patterns.is_empty() {
        return Err(config_err("scanner.filename_patterns must not be empty"));
    }
    build_glob_set(&s.filename_patterns)?;

    let re = Regex::new(&s.parse_re)
        .map_err(|e| config_err(format!("invalid scanner.parse_re: {e}")))?;
    for group in ["type", "size", "path"] {
        if !re.capture_names().flatten().any(|n| n == group) {
            return Err(config_err(format!(
                "scanner.parse_re is missing the named group {group:?}"
            )));
        }
    }

    if !(0.0..=1.0).contains(&s.prescale_factor) {
        return Err(config_err(format!(
            "scanner.prescale_factor must be within 0.0..=1.0, got {}",
            s.prescale_factor
        )));
    }
    let prescale = if s.prescale_factor < 1.0 {
        Some(PrescaleSettings {
            threshold: (s.prescale_factor * PRESCALE_RANGE as f64).round() as u64,
            salt: s.prescale_salt.clone(),
        })
    } else {
        None
    };

    let targets = s
        .servers
        .iter()
        .flat_map(|server| {
            s.locations.iter().map(move |location| ScanTarget {
                server: server.clone(),
                location: location.trim_end_matches('/').to_string(),
            })
        })
        .collect();

    Ok(ScannerSettings {
        targets,
        ls_command_template: s.ls_command_template.clone(),
        parse_re: s.parse_re.clone(),
        interval: Duration::from_secs(s.interval_secs),
        op_timeout: Duration::from_secs(s.timeout_secs),
        recursive: s.recursive,
        filename_patterns: s.filename_patterns.clone(),
        meta_suffix: s.meta_suffix.clone(),
        prescale,
        low_water_mark: s.low_water_mark,
    })
}

fn validate_mover(raw: &ConfigFile) -> Result<MoverSettings> {
    let m = &raw.mover;

    if m.max_movers == 0 {
        return Err(config_err("mover.max_movers must be at least 1"));
    }
    if m.queue_capacity == 0 {
        return Err(config_err("mover.queue_capacity must be at least 1"));
    }

    let rel_path = match m.rel_path_strategy.as_str() {
        "hash" => RelPathStrategy::Hash,
        "template" => {
            let pattern = m.rel_path_template.clone().ok_or_else(|| {
                config_err("mover.rel_path_template is required when rel_path_strategy = \"template\"")
            })?;
            RelPathStrategy::Template { pattern }
        }
        other => {
            return Err(config_err(format!(
                "unknown mover.rel_path_strategy {other:?} (expected \"hash\" or \"template\")"
            )));
        }
    };

    let source_purge = match m.source_purge.as_str() {
        "delete" => SourcePurge::Delete,
        "rename" => SourcePurge::Rename,
        other => {
            return Err(config_err(format!(
                "unknown mover.source_purge {other:?} (expected \"delete\" or \"rename\")"
            )));
        }
    };
    if source_purge == SourcePurge::Rename && m.rename_command_template.is_none() {
        return Err(config_err(
            "mover.rename_command_template is required when source_purge = \"rename\"",
        ));
    }
    if m.quarantine_location.is_some() && m.quarantine_command_template.is_none() {
        return Err(config_err(
            "mover.quarantine_command_template is required when quarantine_location is set",
        ));
    }

    Ok(MoverSettings {
        max_movers: m.max_movers,
        stagger: Duration::from_millis(m.stagger_ms),
        queue_capacity: m.queue_capacity,
        retry_cooldown_secs: m.retry_cooldown_secs as f64,
        keep_interval_secs: m.keep_interval_secs as f64,
        transfer_timeout: Duration::from_secs(m.transfer_timeout_secs),
        temp_dir: PathBuf::from(&m.temp_dir),
        destination_server: m.destination_server.clone(),
        destination_root: m.destination_root.trim_end_matches('/').to_string(),
        rel_path,
        source_purge,
        quarantine_location: m.quarantine_location.clone(),
        quarantine_command_template: m.quarantine_command_template.clone(),
        download_command_template: m.download_command_template.clone(),
        copy_command_template: m.copy_command_template.clone(),
        create_dirs_command_template: m.create_dirs_command_template.clone(),
        delete_command_template: m.delete_command_template.clone(),
        rename_command_template: m.rename_command_template.clone(),
    })
}
