// src/daemon.rs

//! Long-running process wiring.
//!
//! Builds the shared collaborators once, spawns every background loop
//! (dispatch, housekeeping, history purge, one scanner per target) and
//! coordinates graceful shutdown through a single cancellation token.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::Catalogs;
use crate::config::Settings;
use crate::errors::Result;
use crate::exec::{CommandRunner, ShellRunner};
use crate::history::{run_purge_loop, HistoryStore};
use crate::manager::{run_dispatch_loop, run_housekeeping_loop, Manager};
use crate::mover::MoverContext;
use crate::scan::{run_scanner_loop, Lister, Scanner};

/// Run the daemon until Ctrl-C.
pub async fn run(settings: Settings, held: bool) -> Result<()> {
    let cancel = CancellationToken::new();

    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());
    let lister = Arc::new(Lister::new(runner.clone(), &settings.scanner)?);
    let catalogs = Catalogs::from_config(&settings.catalogs)?;
    let history = Arc::new(HistoryStore::open(&settings.history.db_path)?);

    let ctx = MoverContext {
        runner,
        lister: lister.clone(),
        catalogs,
        settings: Arc::new(settings.mover.clone()),
        catalog_settings: settings.catalogs.clone(),
        meta_suffix: settings.scanner.meta_suffix.clone(),
        cancel: cancel.clone(),
    };

    let (manager, dispatch_rx) = Manager::new(&settings, history.clone(), ctx, held);
    if held {
        info!("starting held; no scanning until released");
    }

    let mut loops = JoinSet::new();
    loops.spawn(run_dispatch_loop(
        manager.clone(),
        dispatch_rx,
        cancel.clone(),
    ));
    loops.spawn(run_housekeeping_loop(manager.clone(), cancel.clone()));
    loops.spawn(run_purge_loop(
        history.clone(),
        settings.history.retention_secs,
        cancel.clone(),
    ));

    // Spread scanner start times across the interval so multiple targets on
    // the same server do not list at once.
    let spread = settings.scanner.interval / settings.scanner.targets.len().max(1) as u32;
    for (i, target) in settings.scanner.targets.iter().enumerate() {
        let scanner = Scanner::new(&settings.scanner, target.clone(), lister.clone());
        loops.spawn(run_scanner_loop(
            scanner,
            manager.clone(),
            settings.scanner.interval,
            spread * i as u32,
            cancel.clone(),
        ));
    }

    info!(
        targets = settings.scanner.targets.len(),
        max_movers = settings.mover.max_movers,
        "shipd started"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Ctrl-C handler failed; shutting down");
            } else {
                info!("shutdown requested");
            }
        }
        _ = cancel.cancelled() => {}
    }

    cancel.cancel();
    while loops.join_next().await.is_some() {}
    info!("shipd stopped");
    Ok(())
}
