// src/lib.rs

//! `shipd` continuously moves data files from remote dropbox locations to
//! archival storage and declares them to the experiment catalogs.
//!
//! Scanners list each configured (server, location) pair and admit data
//! files whose metadata sidecar has landed. The manager deduplicates and
//! queues them; mover tasks then download and validate the sidecar, copy
//! the data, declare the file to SAM, MetaCat and Rucio, and remove the
//! sources. Transient failures retry after a cooldown; structurally broken
//! files are quarantined. Every attempt is recorded in a SQLite history
//! log.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod exec;
pub mod history;
pub mod logging;
pub mod manager;
pub mod model;
pub mod mover;
pub mod scan;

use crate::cli::CliArgs;
use crate::config::{load_and_validate, Settings};
use crate::errors::Result;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    daemon::run(settings, args.held).await
}

/// Dry-run output: the effective configuration after validation, without
/// touching any remote storage.
fn print_dry_run(settings: &Settings) {
    println!("shipd dry-run");
    println!(
        "  scanner.interval = {}s, recursive = {}",
        settings.scanner.interval.as_secs(),
        settings.scanner.recursive
    );
    println!("  scanner.meta_suffix = {:?}", settings.scanner.meta_suffix);
    println!(
        "  scanner.filename_patterns = {:?}",
        settings.scanner.filename_patterns
    );
    if let Some(p) = &settings.scanner.prescale {
        println!(
            "  scanner.prescale = {}/{} (salt {:?})",
            p.threshold,
            config::PRESCALE_RANGE,
            p.salt
        );
    }
    println!();

    println!("scan targets ({}):", settings.scanner.targets.len());
    for target in &settings.scanner.targets {
        println!("  - {}:{}", target.server, target.location);
    }
    println!();

    println!(
        "mover: {} workers, queue {}, cooldown {}s",
        settings.mover.max_movers,
        settings.mover.queue_capacity,
        settings.mover.retry_cooldown_secs
    );
    println!(
        "  destination = {}:{}",
        settings.mover.destination_server, settings.mover.destination_root
    );
    println!("  rel_path = {:?}", settings.mover.rel_path);
    println!("  source_purge = {:?}", settings.mover.source_purge);
    if let Some(q) = &settings.mover.quarantine_location {
        println!("  quarantine_location = {q}");
    }
    println!();

    println!("catalogs:");
    match &settings.catalogs.sam {
        Some(s) => println!("  sam = {} (user {})", s.url, s.user),
        None => println!("  sam = disabled"),
    }
    match &settings.catalogs.metacat {
        Some(m) => println!("  metacat = {} (dataset {})", m.url, m.dataset),
        None => println!("  metacat = disabled"),
    }
    match &settings.catalogs.rucio {
        Some(r) => println!("  rucio = {} (drop RSE {})", r.url, r.drop_rse),
        None => println!("  rucio = disabled"),
    }

    println!();
    println!(
        "history: {} (retention {}s)",
        settings.history.db_path.display(),
        settings.history.retention_secs
    );
}
