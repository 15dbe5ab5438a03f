// tests/scanner_pairing.rs

use std::sync::Arc;

use proptest::prelude::*;

use shipd::exec::CommandRunner;
use shipd::mover::RelPathStrategy;
use shipd::scan::{Lister, Scanner};
use shipd_test_utils::builders::SettingsBuilder;
use shipd_test_utils::fake_runner::ScriptedRunner;
use shipd_test_utils::init_tracing;

fn line(kind: char, size: u64, path: &str) -> String {
    format!("{kind}rw-r--r-- user group {size} 2026-08-01 10:00:00 {path}")
}

fn scanner_with(listing: Vec<(String, String)>) -> Scanner {
    scanner_builder(listing, SettingsBuilder::new())
}

fn scanner_builder(listing: Vec<(String, String)>, builder: SettingsBuilder) -> Scanner {
    init_tracing();
    let settings = builder.build();
    let mut runner = ScriptedRunner::new();
    for (needle, output) in listing {
        runner = runner.on(&needle, 0, &output);
    }
    let runner: Arc<dyn CommandRunner> = Arc::new(runner);
    let lister = Arc::new(Lister::new(runner, &settings.scanner).unwrap());
    let target = settings.scanner.targets[0].clone();
    Scanner::new(&settings.scanner, target, lister)
}

#[tokio::test]
async fn file_without_sidecar_is_withheld() {
    let output = line('-', 100, "/data/dropbox/a.hdf5");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), output)]);
    let ready = scanner.collect_ready().await.unwrap();
    assert!(ready.is_empty());
}

#[tokio::test]
async fn file_with_sidecar_is_ready_regardless_of_listing_order() {
    // Data before sidecar.
    let output = [
        line('-', 100, "/data/dropbox/a.hdf5"),
        line('-', 20, "/data/dropbox/a.hdf5.json"),
    ]
    .join("\n");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), output)]);
    let ready = scanner.collect_ready().await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].name, "a.hdf5");
    assert_eq!(ready[0].size, 100);

    // Sidecar before data.
    let output = [
        line('-', 20, "/data/dropbox/a.hdf5.json"),
        line('-', 100, "/data/dropbox/a.hdf5"),
    ]
    .join("\n");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), output)]);
    let ready = scanner.collect_ready().await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].name, "a.hdf5");
}

#[tokio::test]
async fn zero_size_sidecar_does_not_pair() {
    let output = [
        line('-', 100, "/data/dropbox/a.hdf5"),
        line('-', 0, "/data/dropbox/a.hdf5.json"),
    ]
    .join("\n");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), output)]);
    assert!(scanner.collect_ready().await.unwrap().is_empty());
}

#[tokio::test]
async fn sidecars_themselves_are_never_admitted() {
    // A sidecar whose own name matches no data pattern is just a sidecar;
    // nothing here is a data file.
    let output = line('-', 20, "/data/dropbox/a.hdf5.json");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), output)]);
    assert!(scanner.collect_ready().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_matching_files_are_ignored() {
    let output = [
        line('-', 100, "/data/dropbox/notes.txt"),
        line('-', 20, "/data/dropbox/notes.txt.json"),
    ]
    .join("\n");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), output)]);
    assert!(scanner.collect_ready().await.unwrap().is_empty());
}

#[tokio::test]
async fn recursive_scan_finds_pairs_in_subdirectories() {
    let top = line('d', 0, "/data/dropbox/run12");
    let sub = [
        line('-', 100, "/data/dropbox/run12/a.hdf5"),
        line('-', 20, "/data/dropbox/run12/a.hdf5.json"),
    ]
    .join("\n");
    let scanner = scanner_builder(
        vec![
            ("ls -l /data/dropbox/run12".into(), sub),
            ("ls -l /data/dropbox".into(), top),
        ],
        SettingsBuilder::new().recursive(),
    );
    let ready = scanner.collect_ready().await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].rel_path, "run12/a.hdf5");
}

#[tokio::test]
async fn subdirectories_are_ignored_without_recursion() {
    let top = line('d', 0, "/data/dropbox/run12");
    let scanner = scanner_with(vec![("ls -l /data/dropbox".into(), top)]);
    assert!(scanner.collect_ready().await.unwrap().is_empty());
}

#[tokio::test]
async fn prescale_zero_admits_nothing() {
    let output = [
        line('-', 100, "/data/dropbox/a.hdf5"),
        line('-', 20, "/data/dropbox/a.hdf5.json"),
    ]
    .join("\n");
    let scanner = scanner_builder(
        vec![("ls -l /data/dropbox".into(), output)],
        SettingsBuilder::new().with_prescale(0.0, "salt"),
    );
    assert!(scanner.collect_ready().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_listing_is_an_error_not_a_panic() {
    init_tracing();
    let settings = SettingsBuilder::new().build();
    let runner = ScriptedRunner::new().on("ls -l /data/dropbox", 1, "connection refused");
    let runner: Arc<dyn CommandRunner> = Arc::new(runner);
    let lister = Arc::new(Lister::new(runner, &settings.scanner).unwrap());
    let scanner = Scanner::new(&settings.scanner, settings.scanner.targets[0].clone(), lister);
    assert!(scanner.collect_ready().await.is_err());
}

proptest! {
    #[test]
    fn hashed_rel_path_always_has_shard_shape(
        scope in "[a-z][a-z0-9-]{0,15}",
        name in "[a-z0-9_]{1,20}\\.hdf5",
    ) {
        let rel = RelPathStrategy::Hash
            .rel_path(&scope, &name, &serde_json::Map::new())
            .unwrap();
        let parts: Vec<&str> = rel.split('/').collect();
        prop_assert_eq!(parts.len(), 4);
        prop_assert_eq!(parts[0], scope.as_str());
        prop_assert_eq!(parts[1].len(), 2);
        prop_assert_eq!(parts[2].len(), 2);
        prop_assert_eq!(parts[3], name.as_str());
    }
}
