//! Saving archives to disk and loading them back.

mod common;

use std::fs;

use persist::{
    load_module, Archive, ArchiveConfig, ArchiveError, ArrayFormat, NdArray, Obj, SaveOptions,
};

use common::{init_tracing, items, registry};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Archive whose arrays all go to side data.
fn offloading(config: ArchiveConfig) -> Archive {
    Archive::with_registry(config.with_array_threshold(Some(0)), registry())
}

fn populated(config: ArchiveConfig) -> (Archive, Obj) {
    let mut archive = offloading(config);
    let array = Obj::array(NdArray::from_f64(vec![1.0, 2.5, -3.0]));
    archive.insert("weights", array.clone()).unwrap();
    archive.insert("pair", Obj::list(vec![array.clone(), array.clone()])).unwrap();
    archive.insert("label", Obj::str("run 7")).unwrap();
    (archive, array)
}

fn assert_restored(ns: &persist::Env, array: &Obj) {
    assert_eq!(&ns["weights"], array);
    assert_eq!(ns["label"], Obj::str("run 7"));
    let pair = items(&ns["pair"]);
    assert!(pair[0].is(&ns["weights"]));
    assert!(pair[1].is(&ns["weights"]));
}

// ─────────────────────────────────────────────────────────────────────────────
// Layouts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_package_with_npy_directory() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (archive, array) = populated(ArchiveConfig::default());

    let report = archive.save(dir.path(), &SaveOptions::named("model")).unwrap();
    assert_eq!(report.init_file, dir.path().join("model").join("__init__.py"));
    assert_eq!(report.package_dir, dir.path().join("model"));
    assert_eq!(report.data_files.len(), 1);
    assert!(report.data_files[0].starts_with(dir.path().join("model").join("_arrays")));
    assert_eq!(report.data_files[0].extension().unwrap(), "npy");

    let text = fs::read_to_string(&report.init_file).unwrap();
    assert!(text.starts_with("from persist.arrays import load as _arrays_load\n"), "{text}");
    assert!(text.ends_with("except NameError: pass\n"));

    let ns = load_module(&registry(), &dir.path().join("model")).unwrap();
    assert_restored(&ns, &array);
}

#[test]
fn test_module_with_npz_file() {
    let dir = tempfile::tempdir().unwrap();
    let (archive, array) = populated(ArchiveConfig::default().with_scoped(false));

    let options = SaveOptions::named("model").with_package(false).with_format(ArrayFormat::Npz);
    let report = archive.save(dir.path(), &options).unwrap();
    assert_eq!(report.init_file, dir.path().join("model.py"));
    assert_eq!(report.data_files, vec![dir.path().join("model_arrays.npz")]);

    let ns = load_module(&registry(), &report.init_file).unwrap();
    assert_restored(&ns, &array);
}

#[test]
fn test_archive_without_side_data_has_no_loader() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = Archive::with_registry(ArchiveConfig::default(), registry());
    archive.insert("x", Obj::list(vec![Obj::int(1), Obj::int(2)])).unwrap();

    let report = archive.save(dir.path(), &SaveOptions::named("plain")).unwrap();
    assert!(report.data_files.is_empty());
    let text = fs::read_to_string(&report.init_file).unwrap();
    assert!(!text.contains("persist.arrays"));
    assert_eq!(text, format!("{}\n", archive.render().unwrap()));

    let ns = load_module(&registry(), &report.package_dir).unwrap();
    assert_eq!(ns["x"], Obj::list(vec![Obj::int(1), Obj::int(2)]));
}

#[test]
fn test_missing_parent_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("deeper");
    let mut archive = Archive::with_registry(ArchiveConfig::default(), registry());
    archive.insert("x", Obj::int(5)).unwrap();

    let report = archive.save(&target, &SaveOptions::named("m").with_package(false)).unwrap();
    assert_eq!(report.init_file, target.join("m.py"));
    assert!(report.init_file.is_file());
}

// ─────────────────────────────────────────────────────────────────────────────
// Names
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_item_mode_names_the_package() {
    let dir = tempfile::tempdir().unwrap();
    let config = ArchiveConfig::default().with_single_item_mode(true);
    let mut archive = Archive::with_registry(config, registry());
    archive.insert("settings", Obj::dict(vec![(Obj::str("k"), Obj::int(1))])).unwrap();

    let report = archive.save(dir.path(), &SaveOptions::default()).unwrap();
    assert_eq!(report.init_file, dir.path().join("settings").join("__init__.py"));
}

#[test]
fn test_name_is_required_outside_single_item_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = Archive::with_registry(ArchiveConfig::default(), registry());
    archive.insert("x", Obj::int(1)).unwrap();
    let result = archive.save(dir.path(), &SaveOptions::default());
    assert!(matches!(result, Err(ArchiveError::MissingName)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Existing files
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_existing_program_requires_force() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = Archive::with_registry(ArchiveConfig::default(), registry());
    archive.insert("x", Obj::int(1)).unwrap();
    let options = SaveOptions::named("m").with_package(false);
    archive.save(dir.path(), &options).unwrap();

    match archive.save(dir.path(), &options) {
        Err(ArchiveError::FileExists(path)) => assert_eq!(path, dir.path().join("m.py")),
        other => panic!("expected FileExists, got {other:?}"),
    }
}

#[test]
fn test_force_overwrites_and_keeps_backup() {
    let dir = tempfile::tempdir().unwrap();
    let options = SaveOptions::named("m").with_package(false);

    let mut first = Archive::with_registry(ArchiveConfig::default(), registry());
    first.insert("x", Obj::int(1)).unwrap();
    first.save(dir.path(), &options).unwrap();

    let mut second = Archive::with_registry(ArchiveConfig::default(), registry());
    second.insert("x", Obj::int(2)).unwrap();
    second.save(dir.path(), &options.clone().with_force(true)).unwrap();

    let backup = fs::read_to_string(dir.path().join("m.py.bak")).unwrap();
    assert!(backup.starts_with("x = 1\n"));
    let ns = load_module(&registry(), &dir.path().join("m.py")).unwrap();
    assert_eq!(ns["x"], Obj::int(2));
}

#[test]
fn test_force_without_backups_removes_them() {
    let dir = tempfile::tempdir().unwrap();
    let config = ArchiveConfig::default().with_backup_data(false);
    let options = SaveOptions::named("m").with_package(false).with_force(true);

    for value in [1, 2] {
        let mut archive = Archive::with_registry(config.clone(), registry());
        archive.insert("x", Obj::int(value)).unwrap();
        archive.save(dir.path(), &options).unwrap();
    }
    assert!(!dir.path().join("m.py.bak").exists());
}

#[test]
fn test_existing_side_data_requires_force() {
    let dir = tempfile::tempdir().unwrap();
    let (archive, _) = populated(ArchiveConfig::default());
    let options = SaveOptions::named("m").with_package(false).with_format(ArrayFormat::Npz);
    archive.save(dir.path(), &options).unwrap();
    fs::remove_file(dir.path().join("m.py")).unwrap();

    match archive.save(dir.path(), &options) {
        Err(ArchiveError::FileExists(path)) => assert_eq!(path, dir.path().join("m_arrays.npz")),
        other => panic!("expected FileExists, got {other:?}"),
    }
}

#[test]
fn test_target_must_be_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "not a directory").unwrap();
    let mut archive = Archive::with_registry(ArchiveConfig::default(), registry());
    archive.insert("x", Obj::int(1)).unwrap();

    match archive.save(&file, &SaveOptions::named("m")) {
        Err(ArchiveError::NotADirectory(path)) => assert_eq!(path, file),
        other => panic!("expected NotADirectory, got {other:?}"),
    }
}

#[test]
fn test_forced_package_replaces_a_file_in_the_way() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("m"), "stale").unwrap();
    let mut archive = Archive::with_registry(ArchiveConfig::default(), registry());
    archive.insert("x", Obj::int(1)).unwrap();

    assert!(matches!(
        archive.save(dir.path(), &SaveOptions::named("m")),
        Err(ArchiveError::NotADirectory(_))
    ));
    archive.save(dir.path(), &SaveOptions::named("m").with_force(true)).unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("m.bak")).unwrap(), "stale");
    assert!(dir.path().join("m").join("__init__.py").is_file());
}
