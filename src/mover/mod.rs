// src/mover/mod.rs

//! Per-file transfer pipeline.
//!
//! A [`MoverTask`] walks one discovered file through metadata download and
//! validation, data transfer, catalog declaration and source removal.
//! Transient problems end in `failed` and are retried after a cooldown;
//! structural defects end in `quarantined` with the source moved aside
//! for operator inspection.

pub mod dest;
pub mod metadata;
pub mod task;

pub use dest::RelPathStrategy;
pub use metadata::Sidecar;
pub use task::{MoverContext, MoverOutcome, MoverTask};
