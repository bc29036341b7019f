use heartnotes_core::db::migrations::latest_version;
use heartnotes_core::db::{open_db, open_db_in_memory, DbError};
use heartnotes_core::StoreSchema;
use rusqlite::Connection;

#[test]
fn open_db_in_memory_creates_entry_table() {
    let conn = open_db_in_memory(&StoreSchema::default()).unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_eq!(
        column_names(&conn, "data"),
        vec!["_id", "date", "datemod", "count", "total", "edited", "comment"]
    );
}

#[test]
fn opening_same_database_twice_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("HeartNotes.db");
    let schema = StoreSchema::default();

    let conn_first = open_db(&path, &schema).unwrap();
    conn_first
        .execute_batch(
            "INSERT INTO data (date, datemod, count, total, edited, comment)
             VALUES (1, 1, 1, 1, 0, 'kept');",
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path, &schema).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_eq!(row_count(&conn_second), 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, &StoreSchema::default()).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn outdated_table_is_dropped_and_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE data (_id INTEGER PRIMARY KEY, legacy TEXT);
         INSERT INTO data (legacy) VALUES ('old row');
         PRAGMA user_version = 0;",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path, &StoreSchema::default()).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_eq!(row_count(&conn), 0);
    assert!(column_names(&conn, "data").contains(&"comment".to_string()));
    assert!(!column_names(&conn, "data").contains(&"legacy".to_string()));
}

#[test]
fn invalid_schema_identifier_is_rejected_before_sql() {
    let schema = StoreSchema {
        table: "data; DROP TABLE x".to_string(),
        ..StoreSchema::default()
    };
    let err = open_db_in_memory(&schema).unwrap_err();
    assert!(matches!(err, DbError::InvalidSchema(_)), "{err}");
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM data;", [], |row| row.get(0))
        .unwrap()
}

fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table});"))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>("name"))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}
