// src/config/mod.rs

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate};
pub use model::ConfigFile;
pub use validate::{
    CatalogSettings, HistorySettings, MetacatSettings, MoverSettings, PrescaleSettings,
    RucioSettings, SamSettings, ScanTarget, ScannerSettings, Settings, SourcePurge,
    PRESCALE_RANGE,
};
