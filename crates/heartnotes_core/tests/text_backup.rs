use chrono::{FixedOffset, Local, TimeZone};
use heartnotes_core::codec::text::parse_text;
use heartnotes_core::repo::entry_repo::now_epoch_ms;
use heartnotes_core::service::backup_service::{
    export_text, export_text_to_dir, list_backups, restore_text, restore_text_from_path,
    RestoreCause,
};
use heartnotes_core::{
    BackupError, BackupKind, Confirmation, DateZone, EntryDraft, EntryFilter, EntryListQuery,
    EntryRepository, EntryStore, ParseErrorKind, SortOrder, StoreSchema,
};
use std::fs;

fn central() -> DateZone {
    DateZone::Fixed(FixedOffset::west_opt(6 * 3600).unwrap())
}

fn memory_store() -> EntryStore {
    EntryStore::open_in_memory(StoreSchema::default()).unwrap()
}

#[test]
fn export_then_restore_preserves_tuples_and_order() {
    let source = memory_store();
    let repo = source.repository().unwrap();
    let rows = [
        (1_704_117_600_000_i64, 12, 60, "Felt fine"),
        (1_704_204_000_000, 0, 60, "Skipped\nnext day"),
        (1_704_290_400_000, 3, 3, "tab\tinside\tcomment"),
        (1_704_376_800_000, 1, 2, ""),
    ];
    for (observed_at, count, total, comment) in rows {
        repo.create_entry(&EntryDraft::new(observed_at, count, total, comment))
            .unwrap();
    }

    let mut buffer = Vec::new();
    let query = EntryListQuery::new(EntryFilter::None, SortOrder::Ascending);
    let report = export_text(&repo, &query, &mut buffer, central()).unwrap();
    assert_eq!(report.entries_written, 4);
    assert!(report.path.is_none());

    let text = String::from_utf8(buffer).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.contains("Skipped<br>next day"));
    assert!(text.contains("tab<tab>inside<tab>comment"));

    let target = memory_store();
    let target_repo = target.repository().unwrap();
    let restored = restore_text(
        &target_repo,
        text.as_bytes(),
        Confirmation::confirmed_by_user(),
    )
    .unwrap();
    assert_eq!(restored.rows_restored, 4);

    let tuples = target_repo
        .list_entries(&query)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.observed_at, entry.count, entry.total, entry.comment))
        .collect::<Vec<_>>();
    let expected = rows
        .iter()
        .map(|(observed_at, count, total, comment)| {
            (*observed_at, *count, *total, comment.to_string())
        })
        .collect::<Vec<_>>();
    assert_eq!(tuples, expected);
}

#[test]
fn export_honors_filter_and_sort() {
    let store = memory_store();
    let repo = store.repository().unwrap();
    for (observed_at, count, total) in [(1_000_i64, 0, 5), (2_000, 4, 5), (3_000, 2, 5)] {
        repo.create_entry(&EntryDraft::new(observed_at, count, total, "x"))
            .unwrap();
    }

    let mut buffer = Vec::new();
    let query = EntryListQuery::new(EntryFilter::NonZero, SortOrder::Descending);
    export_text(&repo, &query, &mut buffer, central()).unwrap();

    let parsed = parse_text(&String::from_utf8(buffer).unwrap()).unwrap();
    let counts = parsed
        .records
        .iter()
        .map(|record| record.count)
        .collect::<Vec<_>>();
    assert_eq!(counts, vec![2, 4]);
}

#[test]
fn restore_matches_documented_two_line_scenario() {
    let store = memory_store();
    let repo = store.repository().unwrap();
    repo.create_entry(&EntryDraft::new(1, 1, 1, "replaced"))
        .unwrap();

    let input = "12/60\tJan 01, 2024 08:00:00 -0600\tFelt fine\n\
                 0/60\tJan 02, 2024 08:00:00 -0600\tSkipped<br>next day\n";
    let before = now_epoch_ms();
    let report = restore_text(&repo, input.as_bytes(), Confirmation::confirmed_by_user()).unwrap();

    assert_eq!(report.rows_restored, 2);
    assert_eq!(report.to_string(), "2 lines restored.");
    assert!(report.modified_at >= before);

    let entries = repo
        .list_entries(&EntryListQuery::new(EntryFilter::None, SortOrder::Ascending))
        .unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].observed_at, 1_704_117_600_000);
    assert_eq!((entries[0].count, entries[0].total), (12, 60));
    assert_eq!(entries[0].comment, "Felt fine");
    assert_eq!((entries[1].count, entries[1].total), (0, 60));
    assert_eq!(entries[1].comment, "Skipped\nnext day");
    for entry in &entries {
        assert!(entry.edited);
        assert_eq!(entry.modified_at, report.modified_at);
    }
}

#[test]
fn restore_halts_at_first_malformed_line() {
    let store = memory_store();
    let repo = store.repository().unwrap();

    let mut lines = Vec::new();
    for day in 1..=10 {
        if day == 5 {
            lines.push(format!("5/10\tJan {day:02}, 2024 08:00:00 -0600"));
        } else {
            lines.push(format!(
                "{day}/10\tJan {day:02}, 2024 08:00:00 -0600\tday {day}"
            ));
        }
    }
    let input = lines.join("\n");

    let err = restore_text(&repo, input.as_bytes(), Confirmation::confirmed_by_user())
        .unwrap_err();
    match err {
        BackupError::Restore {
            rows_restored,
            lines_read,
            cause: RestoreCause::Parse(parse),
        } => {
            assert_eq!(rows_restored, 4);
            assert_eq!(lines_read, 5);
            assert_eq!(parse.line, 5);
            assert_eq!(parse.kind, ParseErrorKind::TokenCount { found: 2 });
        }
        other => panic!("unexpected error: {other}"),
    }

    let comments = repo
        .list_entries(&EntryListQuery::new(EntryFilter::None, SortOrder::Ascending))
        .unwrap()
        .into_iter()
        .map(|entry| entry.comment)
        .collect::<Vec<_>>();
    assert_eq!(comments, vec!["day 1", "day 2", "day 3", "day 4"]);
}

#[test]
fn restore_skips_comment_and_blank_lines() {
    let store = memory_store();
    let repo = store.repository().unwrap();

    let input = "# exported by HeartNotes\n\
                 \n\
                 1/2\tJan 01, 2024 08:00:00 -0600\tkept\n\
                 \t# not a comment marker on its own\n";
    let err = restore_text(&repo, input.as_bytes(), Confirmation::confirmed_by_user())
        .unwrap_err();
    assert!(matches!(
        err,
        BackupError::Restore {
            rows_restored: 1,
            lines_read: 4,
            ..
        }
    ));

    let input = "# header\n\n1/2\tJan 01, 2024 08:00:00 -0600\tkept\n";
    let report = restore_text(&repo, input.as_bytes(), Confirmation::confirmed_by_user()).unwrap();
    assert_eq!(report.rows_restored, 1);
    assert_eq!(report.lines_read, 3);
}

#[test]
fn restore_from_missing_file_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = memory_store();
    let repo = store.repository().unwrap();
    repo.create_entry(&EntryDraft::new(1, 1, 1, "survivor"))
        .unwrap();

    let err = restore_text_from_path(
        &repo,
        &dir.path().join("missing.txt"),
        Confirmation::confirmed_by_user(),
    )
    .unwrap_err();
    assert!(matches!(err, BackupError::Io { .. }), "{err}");
    assert_eq!(repo.count_entries().unwrap(), 1);
}

#[test]
fn export_to_dir_uses_backup_file_name_and_leaves_no_partial() {
    let dir = tempfile::tempdir().unwrap();
    let store = memory_store();
    let repo = store.repository().unwrap();
    repo.create_entry(&EntryDraft::new(1_704_117_600_000, 1, 2, "saved"))
        .unwrap();

    let now = Local.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
    let report =
        export_text_to_dir(&repo, &EntryListQuery::default(), dir.path(), central(), &now)
            .unwrap();

    let path = report.path.unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "HeartNotes.2024-03-04-050607.txt"
    );
    let written = fs::read_to_string(&path).unwrap();
    assert_eq!(written, "1/2\tJan 01, 2024 08:00:00 -0600\tsaved\n");

    let names = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names.len(), 1);
}

#[test]
fn list_backups_filters_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "HeartNotes.2024-01-01-080000.txt",
        "HeartNotes.2024-02-01-080000.txt",
        "HeartNotes.2024-02-01-080000.db",
        "HeartNotes.txt",
        "notes.2024-01-01-080000.txt",
    ] {
        fs::write(dir.path().join(name), "x").unwrap();
    }

    let texts = list_backups(dir.path(), BackupKind::Text).unwrap();
    let mut names = texts
        .iter()
        .map(|backup| backup.path.file_name().unwrap().to_str().unwrap().to_string())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(
        names,
        vec![
            "HeartNotes.2024-01-01-080000.txt",
            "HeartNotes.2024-02-01-080000.txt"
        ]
    );
    assert_eq!(list_backups(dir.path(), BackupKind::Database).unwrap().len(), 1);
}
