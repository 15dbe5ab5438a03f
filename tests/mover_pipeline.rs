// tests/mover_pipeline.rs

use std::sync::Arc;

use tempfile::TempDir;

use shipd::catalog::{CatalogRecord, Catalogs};
use shipd::config::Settings;
use shipd::exec::CommandRunner;
use shipd::model::TaskStatus;
use shipd::mover::{MoverContext, MoverOutcome, MoverTask};
use shipd::scan::Lister;
use shipd_test_utils::builders::{descriptor, sidecar_text, SettingsBuilder};
use shipd_test_utils::fake_catalogs::{FakeMetacat, FakeRucio, FakeSam, ScriptedFailure};
use shipd_test_utils::fake_runner::ScriptedRunner;
use shipd_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

/// Builder with all three catalogs, a template destination layout and a
/// quarantine location, rooted in a scratch dir for sidecar downloads.
fn full_builder(temp: &TempDir) -> SettingsBuilder {
    SettingsBuilder::new()
        .with_temp_dir(&temp.path().to_string_lossy())
        .with_rel_path_template("$core.run_type/$name")
        .with_quarantine("/data/quarantine", "xrdfs $server mv $path $dst")
        .with_sam("http://sam.test", "dunepro", Some("archive:$dst_rel_path"))
        .with_metacat("http://metacat.test", "raw:all")
        .with_rucio("http://rucio.test", "DROP_RSE", &["TAPE_RSE"])
}

struct Fixture {
    runner: Arc<ScriptedRunner>,
    sam: Arc<FakeSam>,
    metacat: Arc<FakeMetacat>,
    rucio: Arc<FakeRucio>,
    ctx: MoverContext,
    _temp: TempDir,
}

/// Wire a context around scripted fakes. The downloaded sidecar is staged
/// in the scratch dir up front, standing in for the download command's
/// side effect.
fn fixture_with(
    temp: TempDir,
    settings: Settings,
    runner: ScriptedRunner,
    sidecar: &str,
) -> Fixture {
    init_tracing();
    std::fs::write(temp.path().join("a.hdf5.json"), sidecar).unwrap();

    let runner = Arc::new(runner);
    let runner_dyn: Arc<dyn CommandRunner> = runner.clone();
    let lister = Arc::new(Lister::new(runner_dyn.clone(), &settings.scanner).unwrap());

    let sam = Arc::new(FakeSam::default());
    let metacat = Arc::new(FakeMetacat::default());
    let rucio = Arc::new(FakeRucio::new());
    let catalogs = Catalogs {
        sam: Some(sam.clone()),
        metacat: Some(metacat.clone()),
        rucio: Some(rucio.clone()),
    };

    let ctx = MoverContext {
        runner: runner_dyn,
        lister,
        catalogs,
        settings: Arc::new(settings.mover.clone()),
        catalog_settings: settings.catalogs.clone(),
        meta_suffix: settings.scanner.meta_suffix.clone(),
        cancel: CancellationToken::new(),
    };

    Fixture {
        runner,
        sam,
        metacat,
        rucio,
        ctx,
        _temp: temp,
    }
}

/// Happy-path fixture: destination absent, all commands succeed.
fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp).build();
    let runner =
        ScriptedRunner::new().on("dst.example.org ls -l", 1, "No such file or directory");
    fixture_with(temp, settings, runner, &sidecar_text(100))
}

#[tokio::test]
async fn happy_path_copies_declares_and_removes_sources() {
    let f = fixture();
    let task = MoverTask::new(descriptor("a.hdf5", 100));

    let outcome = with_timeout(task.run(&f.ctx)).await;
    assert_eq!(outcome, MoverOutcome::Complete);
    assert_eq!(task.status(), TaskStatus::Complete);

    // One data copy, built from the template's URLs.
    let copies = f.runner.commands_matching("xrdcp root://");
    assert_eq!(copies.len(), 1);
    assert!(copies[0].contains("root://src.example.org//data/dropbox/a.hdf5"));
    assert!(copies[0].contains("root://dst.example.org//data/archive/testscope/a.hdf5"));

    // Sidecar removed before the data file.
    let removals = f.runner.commands_matching("rm ");
    assert_eq!(removals.len(), 2);
    assert!(removals[0].ends_with("/data/dropbox/a.hdf5.json"));
    assert!(removals[1].ends_with("/data/dropbox/a.hdf5"));

    // Declared everywhere, with the SAM file id flowing into MetaCat.
    assert_eq!(f.sam.declared_count(), 1);
    assert_eq!(
        f.sam.locations.lock().unwrap().as_slice(),
        &[("fake-sam-id-1".to_string(), "archive:testscope/a.hdf5".to_string())]
    );
    let declared = f.metacat.declared.lock().unwrap();
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].namespace, "testscope");
    assert_eq!(declared[0].dataset_did, "raw:all");
    assert_eq!(declared[0].file_id.as_deref(), Some("fake-sam-id-1"));

    assert_eq!(
        f.rucio.datasets.lock().unwrap().as_slice(),
        &[("testscope".to_string(), "testscope-run12".to_string())]
    );
    assert_eq!(f.rucio.replica_count(), 1);
}

#[tokio::test]
async fn matching_destination_size_skips_the_copy() {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp).build();
    let listing =
        "-rw-r--r-- user group 100 2026-08-01 10:00:00 /data/archive/testscope/a.hdf5";
    let runner = ScriptedRunner::new().on("dst.example.org ls -l", 0, listing);
    let f = fixture_with(temp, settings, runner, &sidecar_text(100));

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Complete);
    assert!(f.runner.commands_matching("xrdcp root://").is_empty());
    // Declarations and source removal still happen.
    assert_eq!(f.sam.declared_count(), 1);
    assert_eq!(f.runner.commands_matching("rm ").len(), 2);
}

#[tokio::test]
async fn size_mismatch_quarantines_before_any_transfer() {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp).build();
    let runner = ScriptedRunner::new();
    // Sidecar says 999 bytes, the listing said 100.
    let f = fixture_with(temp, settings, runner, &sidecar_text(999));

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Quarantined);
    assert_eq!(task.status(), TaskStatus::Quarantined);
    assert!(task.error().unwrap().contains("does not match"));

    // Data file and sidecar both moved to the quarantine location.
    let moves = f.runner.commands_matching("mv ");
    assert_eq!(moves.len(), 2);
    assert!(moves[0].contains("/data/dropbox/a.hdf5 /data/quarantine"));
    assert!(moves[1].contains("/data/dropbox/a.hdf5.json /data/quarantine"));

    assert!(f.runner.commands_matching("xrdcp root://").is_empty());
    assert_eq!(f.sam.declared_count(), 0);
    assert_eq!(f.metacat.declared_count(), 0);
}

#[tokio::test]
async fn malformed_metadata_quarantines_without_declaring() {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp).build();
    let f = fixture_with(
        temp,
        settings,
        ScriptedRunner::new(),
        r#"{"file_size": 100, "runs": [[12, 3, "testscope"]]}"#,
    );

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Quarantined);
    assert!(task.error().unwrap().contains("checksum"));
    assert_eq!(f.sam.declared_count(), 0);
    assert_eq!(f.rucio.replica_count(), 0);
}

#[tokio::test]
async fn quarantine_degrades_to_failure_without_a_location() {
    let temp = TempDir::new().unwrap();
    let settings = SettingsBuilder::new()
        .with_temp_dir(&temp.path().to_string_lossy())
        .with_rel_path_template("$core.run_type/$name")
        .build();
    let f = fixture_with(temp, settings, ScriptedRunner::new(), &sidecar_text(999));

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Failed);
    assert!(task
        .error()
        .unwrap()
        .contains("no quarantine location configured"));
    assert!(f.runner.commands_matching("mv ").is_empty());
}

#[tokio::test]
async fn metadata_download_failure_is_transient() {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp).build();
    let runner = ScriptedRunner::new().on("xrdcp -f", 1, "connection refused");
    let f = fixture_with(temp, settings, runner, &sidecar_text(100));

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Failed);
    assert!(task.error().unwrap().contains("metadata download failed"));
    assert_eq!(f.sam.declared_count(), 0);
}

#[tokio::test]
async fn copy_failure_fails_without_declaring_or_removing() {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp).build();
    let runner = ScriptedRunner::new()
        .on("dst.example.org ls -l", 1, "No such file or directory")
        .on("xrdcp root://", 1, "transfer aborted");
    let f = fixture_with(temp, settings, runner, &sidecar_text(100));

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Failed);
    assert!(task.error().unwrap().contains("data copy failed"));
    assert_eq!(f.sam.declared_count(), 0);
    assert!(f.runner.commands_matching("rm ").is_empty());
}

#[tokio::test]
async fn conflicting_catalog_record_quarantines() {
    let f = fixture();
    f.sam.existing.lock().unwrap().insert(
        "a.hdf5".to_string(),
        CatalogRecord {
            size: 42,
            adler32: Some("deadbeef".to_string()),
        },
    );

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Quarantined);
    assert!(task.error().unwrap().contains("SAM"));
    assert_eq!(f.sam.declared_count(), 0);
    assert_eq!(f.metacat.declared_count(), 0);
    // The data never leaves the dropbox through the normal purge path.
    assert!(f.runner.commands_matching("rm ").is_empty());
}

#[tokio::test]
async fn matching_catalog_record_is_idempotent_success() {
    let f = fixture();
    f.sam.existing.lock().unwrap().insert(
        "a.hdf5".to_string(),
        CatalogRecord {
            size: 100,
            adler32: Some("deadbeef".to_string()),
        },
    );

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Complete);
    // No re-declaration to SAM, but the others still run.
    assert_eq!(f.sam.declared_count(), 0);
    assert_eq!(f.metacat.declared_count(), 1);
    // Without a fresh SAM declaration there is no file id to forward.
    assert_eq!(f.metacat.declared.lock().unwrap()[0].file_id, None);
}

#[tokio::test]
async fn transient_catalog_failure_is_retryable() {
    let f = fixture();
    *f.metacat.fail_declare.lock().unwrap() = Some(ScriptedFailure {
        permanent: false,
        message: "metacat 503".to_string(),
    });

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Failed);
    assert!(task.error().unwrap().contains("metacat 503"));
    // Failed, not quarantined: the source stays in place.
    assert!(f.runner.commands_matching("mv ").is_empty());
    assert!(f.runner.commands_matching("rm ").is_empty());
}

#[tokio::test]
async fn rename_purge_moves_sources_instead_of_deleting() {
    let temp = TempDir::new().unwrap();
    let settings = full_builder(&temp)
        .with_rename_purge("xrdfs $server mv $path $path.moved")
        .build();
    let runner =
        ScriptedRunner::new().on("dst.example.org ls -l", 1, "No such file or directory");
    let f = fixture_with(temp, settings, runner, &sidecar_text(100));

    let task = MoverTask::new(descriptor("a.hdf5", 100));
    let outcome = with_timeout(task.run(&f.ctx)).await;

    assert_eq!(outcome, MoverOutcome::Complete);
    assert!(f.runner.commands_matching("rm ").is_empty());
    let renames = f.runner.commands_matching(".moved");
    assert_eq!(renames.len(), 2);
    assert!(renames[0].contains("a.hdf5.json /data/dropbox/a.hdf5.json.moved"));
}
