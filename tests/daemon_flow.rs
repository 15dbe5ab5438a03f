// tests/daemon_flow.rs
//
// End-to-end flow through the manager: dispatch, history recording,
// cooldowns, and the hold gate on the scanner loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shipd::catalog::Catalogs;
use shipd::config::Settings;
use shipd::exec::CommandRunner;
use shipd::history::{HistoryStore, RecordStatus};
use shipd::manager::{run_dispatch_loop, Manager};
use shipd::model::TaskStatus;
use shipd::mover::MoverContext;
use shipd::scan::{run_scanner_loop, Lister, Scanner};
use shipd_test_utils::builders::{descriptor, SettingsBuilder};
use shipd_test_utils::fake_runner::ScriptedRunner;
use shipd_test_utils::init_tracing;

struct Harness {
    manager: Arc<Manager>,
    rx: tokio::sync::mpsc::Receiver<Arc<shipd::mover::MoverTask>>,
    history: Arc<HistoryStore>,
    runner: Arc<ScriptedRunner>,
    settings: Settings,
    lister: Arc<Lister>,
    cancel: CancellationToken,
}

fn harness(runner: ScriptedRunner, held: bool) -> Harness {
    init_tracing();
    let settings = SettingsBuilder::new().build();
    let runner = Arc::new(runner);
    let runner_dyn: Arc<dyn CommandRunner> = runner.clone();
    let lister = Arc::new(Lister::new(runner_dyn.clone(), &settings.scanner).unwrap());
    let history = Arc::new(HistoryStore::open_in_memory().unwrap());
    let cancel = CancellationToken::new();

    let ctx = MoverContext {
        runner: runner_dyn,
        lister: lister.clone(),
        catalogs: Catalogs::default(),
        settings: Arc::new(settings.mover.clone()),
        catalog_settings: settings.catalogs.clone(),
        meta_suffix: settings.scanner.meta_suffix.clone(),
        cancel: cancel.clone(),
    };
    let (manager, rx) = Manager::new(&settings, history.clone(), ctx, held);

    Harness {
        manager,
        rx,
        history,
        runner,
        settings,
        lister,
        cancel,
    }
}

/// Poll `check` every 10ms until it passes or two seconds elapse.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}

#[tokio::test]
async fn dispatched_task_failure_lands_in_history_with_cooldown() {
    // Metadata download fails, so the task fails fast.
    let h = harness(ScriptedRunner::new().on("xrdcp -f", 1, "connection refused"), false);
    let loop_handle = tokio::spawn(run_dispatch_loop(
        h.manager.clone(),
        h.rx,
        h.cancel.clone(),
    ));

    assert_eq!(h.manager.add_files(vec![descriptor("a.hdf5", 100)]), 1);

    let history = h.history.clone();
    eventually(move || {
        history
            .history_for_file("a.hdf5")
            .unwrap()
            .first()
            .is_some_and(|r| r.status == RecordStatus::Failed)
    })
    .await;

    assert_eq!(h.manager.queue_depth(), 0);
    let task = h.manager.task("a.hdf5").expect("task remembered");
    assert_eq!(task.status(), TaskStatus::Failed);

    let records = h.history.history_for_file("a.hdf5").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Failed);
    assert!(records[0].ended_at.is_some());
    assert!(records[0].info.contains("metadata download failed"));

    // Still cooling down, so a rescan does not requeue it.
    assert_eq!(h.manager.add_files(vec![descriptor("a.hdf5", 100)]), 0);

    h.cancel.cancel();
    loop_handle.await.unwrap();
}

#[tokio::test]
async fn scanner_loop_defers_to_hold_and_resumes_on_release() {
    let listing = "-rw-r--r-- user group 100 2026-08-01 10:00:00 /data/dropbox/a.hdf5";
    let h = harness(
        ScriptedRunner::new().on("ls -l /data/dropbox", 0, listing),
        true,
    );
    let scanner = Scanner::new(
        &h.settings.scanner,
        h.settings.scanner.targets[0].clone(),
        h.lister.clone(),
    );
    let loop_handle = tokio::spawn(run_scanner_loop(
        scanner,
        h.manager.clone(),
        Duration::from_secs(300),
        Duration::ZERO,
        h.cancel.clone(),
    ));

    // Held: no listing happens.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.runner.commands_matching("ls -l /data/dropbox").is_empty());

    h.manager.release();
    let runner = h.runner.clone();
    eventually(move || !runner.commands_matching("ls -l /data/dropbox").is_empty()).await;

    h.cancel.cancel();
    loop_handle.await.unwrap();
}
