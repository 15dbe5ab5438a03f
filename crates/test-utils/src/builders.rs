#![allow(dead_code)]

use shipd::config::{ConfigFile, Settings};
use shipd::model::FileDescriptor;

/// Base configuration every builder starts from: one scan target, plain
/// command templates, no catalogs.
const BASE_TOML: &str = r#"
[scanner]
servers = ["src.example.org"]
locations = ["/data/dropbox"]
ls_command_template = "xrdfs $server ls -l $location"
filename_patterns = ["*.hdf5"]

[mover]
stagger_ms = 0
destination_server = "dst.example.org"
destination_root = "/data/archive"
download_command_template = "xrdcp -f root://$server/$src_path $dst_path"
copy_command_template = "xrdcp $src_url $dst_url"
create_dirs_command_template = "xrdfs $server mkdir -p $path"
delete_command_template = "xrdfs $server rm $path"
"#;

/// Builder for `Settings` to simplify test setup.
pub struct SettingsBuilder {
    raw: ConfigFile,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            raw: toml::from_str(BASE_TOML).expect("base test config is valid"),
        }
    }

    pub fn with_servers(mut self, servers: &[&str]) -> Self {
        self.raw.scanner.servers = servers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_locations(mut self, locations: &[&str]) -> Self {
        self.raw.scanner.locations = locations.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_patterns(mut self, patterns: &[&str]) -> Self {
        self.raw.scanner.filename_patterns = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_meta_suffix(mut self, suffix: &str) -> Self {
        self.raw.scanner.meta_suffix = suffix.to_string();
        self
    }

    pub fn recursive(mut self) -> Self {
        self.raw.scanner.recursive = true;
        self
    }

    pub fn with_prescale(mut self, factor: f64, salt: &str) -> Self {
        self.raw.scanner.prescale_factor = factor;
        self.raw.scanner.prescale_salt = salt.to_string();
        self
    }

    pub fn with_low_water_mark(mut self, mark: usize) -> Self {
        self.raw.scanner.low_water_mark = mark;
        self
    }

    pub fn with_max_movers(mut self, n: usize) -> Self {
        self.raw.mover.max_movers = n;
        self
    }

    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.raw.mover.queue_capacity = n;
        self
    }

    pub fn with_retry_cooldown(mut self, secs: u64) -> Self {
        self.raw.mover.retry_cooldown_secs = secs;
        self
    }

    pub fn with_temp_dir(mut self, dir: &str) -> Self {
        self.raw.mover.temp_dir = dir.to_string();
        self
    }

    pub fn with_rel_path_template(mut self, template: &str) -> Self {
        self.raw.mover.rel_path_strategy = "template".to_string();
        self.raw.mover.rel_path_template = Some(template.to_string());
        self
    }

    pub fn with_rename_purge(mut self, template: &str) -> Self {
        self.raw.mover.source_purge = "rename".to_string();
        self.raw.mover.rename_command_template = Some(template.to_string());
        self
    }

    pub fn with_quarantine(mut self, location: &str, template: &str) -> Self {
        self.raw.mover.quarantine_location = Some(location.to_string());
        self.raw.mover.quarantine_command_template = Some(template.to_string());
        self
    }

    pub fn with_sam(mut self, url: &str, user: &str, location_template: Option<&str>) -> Self {
        self.raw.sam = Some(shipd::config::model::SamSection {
            url: url.to_string(),
            user: user.to_string(),
            location_template: location_template.map(|t| t.to_string()),
        });
        self
    }

    pub fn with_metacat(mut self, url: &str, dataset: &str) -> Self {
        self.raw.metacat = Some(shipd::config::model::MetacatSection {
            url: url.to_string(),
            dataset: dataset.to_string(),
            lowercase_meta_names: false,
        });
        self
    }

    pub fn with_rucio(mut self, url: &str, drop_rse: &str, target_rses: &[&str]) -> Self {
        self.raw.rucio = Some(shipd::config::model::RucioSection {
            url: url.to_string(),
            drop_rse: drop_rse.to_string(),
            target_rses: target_rses.iter().map(|s| s.to_string()).collect(),
            dataset_did_template: "$run_type:$run_type-run$run_number".to_string(),
        });
        self
    }

    pub fn build_raw(self) -> ConfigFile {
        self.raw
    }

    pub fn build(self) -> Settings {
        Settings::try_from(self.raw).expect("Failed to build valid settings from builder")
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor for a file under the default test dropbox.
pub fn descriptor(name: &str, size: u64) -> FileDescriptor {
    FileDescriptor::new(
        "src.example.org",
        "/data/dropbox",
        format!("/data/dropbox/{name}"),
        size,
    )
    .expect("test descriptor is valid")
}

/// A well-formed sidecar document for a file of the given size.
pub fn sidecar_text(size: u64) -> String {
    serde_json::json!({
        "checksum": "adler32:deadbeef",
        "file_size": size,
        "runs": [[12, 3, "testscope"]],
        "data_tier": "raw",
    })
    .to_string()
}
