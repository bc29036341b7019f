use heartnotes_core::{Entry, EntryDraft, EntryValidationError};
use serde_json::json;

#[test]
fn entry_serializes_with_stable_field_names() {
    let entry = Entry {
        id: 7,
        observed_at: 1_704_117_600_000,
        modified_at: 1_704_117_601_000,
        count: 2,
        total: 3,
        edited: true,
        comment: "tab\there".to_string(),
    };

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(
        value,
        json!({
            "id": 7,
            "observed_at": 1_704_117_600_000_i64,
            "modified_at": 1_704_117_601_000_i64,
            "count": 2,
            "total": 3,
            "edited": true,
            "comment": "tab\there",
        })
    );

    let decoded: Entry = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn draft_deserialization_defaults_optional_fields() {
    let draft: EntryDraft =
        serde_json::from_value(json!({"observed_at": 10, "count": 1, "total": 2})).unwrap();
    assert_eq!(draft, EntryDraft::new(10, 1, 2, ""));
    assert!(!draft.edited);
}

#[test]
fn draft_deserialization_runs_validation() {
    let result = serde_json::from_value::<EntryDraft>(json!({
        "observed_at": 10,
        "count": -1,
        "total": 2,
    }));
    let err = result.unwrap_err();
    assert!(err.to_string().contains("count must be >= 0"), "{err}");
}

#[test]
fn draft_validation_reports_first_bad_field() {
    assert_eq!(
        EntryDraft::new(1, 0, -5, "").validate(),
        Err(EntryValidationError::NegativeTotal(-5))
    );
    assert_eq!(
        EntryDraft::new(-1, 0, 0, "").validate(),
        Err(EntryValidationError::NegativeTimestamp(-1))
    );
    assert!(EntryDraft::new(0, 9, 1, "").validate().is_ok());
}

#[test]
fn to_draft_keeps_editable_fields() {
    let entry = Entry {
        id: 1,
        observed_at: 5,
        modified_at: 6,
        count: 1,
        total: 1,
        edited: true,
        comment: "c".to_string(),
    };
    assert_eq!(entry.to_draft(), EntryDraft::new(5, 1, 1, "c").edited());
}
