use chrono::{Local, TimeZone};
use heartnotes_core::service::backup_service::{
    export_database_to_dir, replace_database, replace_database_from_path,
};
use heartnotes_core::transfer::snapshot::{export_snapshot, export_snapshot_to_path};
use heartnotes_core::{
    BackupError, Confirmation, EntryDraft, EntryFilter, EntryListQuery, EntryRepository,
    EntryStore, RepoError, SortOrder, StoreConfig, StoreSchema,
};
use std::fs;
use std::path::Path;

fn file_store(dir: &Path, name: &str) -> EntryStore {
    EntryStore::open(StoreConfig::new(dir.join(name))).unwrap()
}

fn seed(store: &EntryStore, rows: &[(i64, i64, i64, &str)]) {
    let repo = store.repository().unwrap();
    for (observed_at, count, total, comment) in rows {
        repo.create_entry(&EntryDraft::new(*observed_at, *count, *total, *comment))
            .unwrap();
    }
}

fn tuples(store: &EntryStore) -> Vec<(i64, i64, i64, bool, String)> {
    store
        .repository()
        .unwrap()
        .list_entries(&EntryListQuery::new(EntryFilter::None, SortOrder::Ascending))
        .unwrap()
        .into_iter()
        .map(|e| (e.observed_at, e.count, e.total, e.edited, e.comment))
        .collect()
}

#[test]
fn export_copies_file_and_keeps_store_usable() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = file_store(dir.path(), "HeartNotes.db");
    seed(&store, &[(1, 1, 2, "before export")]);

    let destination = dir.path().join("copy.db");
    let bytes = export_snapshot_to_path(&mut store, &destination).unwrap();
    assert!(bytes > 0);
    assert_eq!(fs::metadata(&destination).unwrap().len(), bytes);
    assert!(!dir.path().join("copy.db.partial").exists());

    assert!(store.is_open());
    seed(&store, &[(2, 2, 2, "after export")]);
    assert_eq!(store.repository().unwrap().count_entries().unwrap(), 2);

    let copy = EntryStore::open(StoreConfig::new(&destination)).unwrap();
    assert_eq!(tuples(&copy), vec![(1, 1, 2, false, "before export".to_string())]);
}

#[test]
fn export_of_in_memory_store_fails() {
    let mut store = EntryStore::open_in_memory(StoreSchema::default()).unwrap();
    let mut sink = Vec::new();
    let err = export_snapshot(&mut store, &mut sink, Path::new("dest.db")).unwrap_err();
    assert_eq!(err.path, Path::new("dest.db"));
    assert!(sink.is_empty());
}

#[test]
fn export_database_to_dir_uses_backup_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let backups = tempfile::tempdir().unwrap();
    let mut store = file_store(dir.path(), "HeartNotes.db");
    seed(&store, &[(1, 1, 1, "x")]);

    let now = Local.with_ymd_and_hms(2024, 6, 7, 8, 9, 10).unwrap();
    let path = export_database_to_dir(&mut store, backups.path(), &now).unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "HeartNotes.2024-06-07-080910.db"
    );
    assert!(path.is_file());
}

#[test]
fn replace_copies_every_source_row() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");

    let source = file_store(dir.path(), "source.db");
    seed(
        &source,
        &[(10, 1, 2, "one"), (20, 0, 0, "two"), (30, 5, 5, "three\nlines")],
    );
    source
        .repository()
        .unwrap()
        .update_entry(
            1,
            &EntryDraft::new(10, 1, 2, "one").edited(),
        )
        .unwrap();
    let expected = tuples(&source);
    drop(source);

    let target = file_store(dir.path(), "target.db");
    seed(&target, &[(99, 9, 9, "old")]);

    let report = replace_database_from_path(
        &target,
        &dir.path().join("source.db"),
        &staging,
        Confirmation::confirmed_by_user(),
    )
    .unwrap();
    assert_eq!(report.rows_copied, 3);
    assert!(report.bytes_staged > 0);
    assert_eq!(tuples(&target), expected);

    let staged_left = fs::read_dir(&staging).unwrap().count();
    assert_eq!(staged_left, 0);
}

#[test]
fn replace_from_reader_stages_then_merges() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = file_store(dir.path(), "source.db");
    seed(&source, &[(1, 1, 1, "a"), (2, 2, 2, "b")]);

    let mut bytes = Vec::new();
    export_snapshot(&mut source, &mut bytes, Path::new("memory")).unwrap();

    let target = EntryStore::open_in_memory(StoreSchema::default()).unwrap();
    let report = replace_database(
        &target,
        &mut bytes.as_slice(),
        Path::new("download.db"),
        &dir.path().join("staging"),
        Confirmation::confirmed_by_user(),
    )
    .unwrap();
    assert_eq!(report.rows_copied, 2);
    assert_eq!(report.bytes_staged, bytes.len() as u64);
    assert_eq!(target.repository().unwrap().count_entries().unwrap(), 2);
}

#[test]
fn replace_with_non_database_source_keeps_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.db");
    fs::write(&bogus, "this is not a sqlite file, just some text padding").unwrap();

    let target = file_store(dir.path(), "target.db");
    seed(&target, &[(1, 1, 1, "keep me")]);

    let err = replace_database_from_path(
        &target,
        &bogus,
        &dir.path().join("staging"),
        Confirmation::confirmed_by_user(),
    )
    .unwrap_err();
    assert!(
        matches!(err, BackupError::Repo(RepoError::SourceUnreadable { .. })),
        "{err}"
    );
    assert_eq!(tuples(&target), vec![(1, 1, 1, false, "keep me".to_string())]);
}

#[test]
fn replace_with_foreign_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let foreign = dir.path().join("foreign.db");
    let conn = rusqlite::Connection::open(&foreign).unwrap();
    conn.execute_batch("CREATE TABLE other (x INTEGER); INSERT INTO other VALUES (1);")
        .unwrap();
    drop(conn);

    let target = EntryStore::open_in_memory(StoreSchema::default()).unwrap();
    seed(&target, &[(1, 1, 1, "keep")]);
    let err = target
        .repository()
        .unwrap()
        .replace_all(&foreign)
        .unwrap_err();
    assert!(matches!(err, RepoError::SourceUnreadable { .. }), "{err}");
    assert_eq!(target.repository().unwrap().count_entries().unwrap(), 1);
}

#[test]
fn replace_with_missing_source_reports_transfer_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = EntryStore::open_in_memory(StoreSchema::default()).unwrap();

    let err = replace_database_from_path(
        &target,
        &dir.path().join("missing.db"),
        &dir.path().join("staging"),
        Confirmation::confirmed_by_user(),
    )
    .unwrap_err();
    match err {
        BackupError::Transfer(transfer) => {
            assert_eq!(transfer.path, dir.path().join("missing.db"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn replace_on_closed_store_is_storage_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = file_store(dir.path(), "source.db");
    seed(&source, &[(1, 1, 1, "a")]);
    source.close().unwrap();

    let mut target = file_store(dir.path(), "target.db");
    target.close().unwrap();
    let err = replace_database_from_path(
        &target,
        &dir.path().join("source.db"),
        &dir.path().join("staging"),
        Confirmation::confirmed_by_user(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        BackupError::Repo(RepoError::StorageUnavailable)
    ));
}

fn assert_source_rejected(source: &Path) {
    let target = EntryStore::open_in_memory(StoreSchema::default()).unwrap();
    seed(&target, &[(1, 1, 1, "keep")]);

    let err = target.repository().unwrap().replace_all(source).unwrap_err();
    assert!(matches!(err, RepoError::SourceUnreadable { .. }), "{err}");
    assert_eq!(tuples(&target), vec![(1, 1, 1, false, "keep".to_string())]);
}

#[test]
fn replace_rejects_source_with_out_of_range_edited_flag() {
    let dir = tempfile::tempdir().unwrap();
    let source = file_store(dir.path(), "source.db");
    seed(&source, &[(10, 1, 2, "flagged")]);
    drop(source);

    let conn = rusqlite::Connection::open(dir.path().join("source.db")).unwrap();
    conn.execute("UPDATE data SET edited = 2;", []).unwrap();
    drop(conn);

    assert_source_rejected(&dir.path().join("source.db"));
}

#[test]
fn replace_rejects_source_with_null_or_mistyped_columns() {
    let dir = tempfile::tempdir().unwrap();
    let loose_table = "CREATE TABLE data (
        _id INTEGER PRIMARY KEY, date INTEGER, datemod INTEGER,
        count INTEGER, total INTEGER, edited INTEGER, comment TEXT
    );";
    let cases = [
        ("null_comment.db", "INSERT INTO data VALUES (1, 10, 10, 1, 2, 0, NULL);"),
        ("null_count.db", "INSERT INTO data VALUES (1, 10, 10, NULL, 2, 0, 'x');"),
        ("text_total.db", "INSERT INTO data VALUES (1, 10, 10, 1, 'many', 0, 'x');"),
        ("real_date.db", "INSERT INTO data VALUES (1, 10.5, 10, 1, 2, 0, 'x');"),
        ("blob_comment.db", "INSERT INTO data VALUES (1, 10, 10, 1, 2, 0, x'00ff');"),
    ];

    for (name, insert) in cases {
        let path = dir.path().join(name);
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(loose_table).unwrap();
        conn.execute_batch(insert).unwrap();
        drop(conn);

        assert_source_rejected(&path);
    }
}

#[test]
fn replace_accepts_loose_schema_with_clean_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loose.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE data (
            _id INTEGER PRIMARY KEY, date INTEGER, datemod INTEGER,
            count INTEGER, total INTEGER, edited INTEGER, comment TEXT
        );
        INSERT INTO data VALUES (4, 10, 11, 1, 2, 1, 'clean');",
    )
    .unwrap();
    drop(conn);

    let target = EntryStore::open_in_memory(StoreSchema::default()).unwrap();
    let repo = target.repository().unwrap();
    assert_eq!(repo.replace_all(&path).unwrap(), 1);

    let entry = repo.get_entry(4).unwrap();
    assert_eq!((entry.count, entry.total, entry.edited), (1, 2, true));
    assert_eq!(entry.comment, "clean");
}
