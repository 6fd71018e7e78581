mod common;

use common::{doc, fields};
use pretty_assertions::assert_eq;
use serde_json::json;
use tandem_sync::{IdentityIndex, Lookup, RecordAdapter};
use tandem_types::{FieldValue, Identity, LocalRecord, MappingError, RecordId, ID_FIELD};
use uuid::Uuid;

fn record(raw: u64, value: serde_json::Value) -> LocalRecord {
    LocalRecord::new(RecordId::new(raw), fields(value))
}

// ── Record → document ────────────────────────────────────────────

#[test]
fn remote_fields_replace_primary_key_with_id() {
    let adapter = RecordAdapter::new("id");
    let rec = record(1, json!({"id": "a", "title": "hello", "done": false}));

    let remote = adapter.to_remote_fields(&rec).unwrap();
    assert_eq!(remote, fields(json!({"_id": "a", "title": "hello", "done": false})));
}

#[test]
fn remote_fields_without_id_omit_identity_entirely() {
    let adapter = RecordAdapter::new("key");
    let rec = record(1, json!({"key": 7, "title": "x", "_id": "stray"}));

    let remote = adapter.to_remote_fields_without_id(&rec);
    assert_eq!(remote, fields(json!({"title": "x"})));
}

#[test]
fn remote_document_carries_identity() {
    let adapter = RecordAdapter::new("id");
    let rec = record(3, json!({"id": 42, "n": 1}));

    let d = adapter.to_remote_document(&rec).unwrap();
    assert_eq!(d.id(), &Identity::Int(42));
    assert_eq!(d.get(ID_FIELD), Some(&FieldValue::Int(42)));
}

#[test]
fn record_without_key_cannot_be_converted() {
    let adapter = RecordAdapter::new("id");
    let rec = record(1, json!({"title": "orphan"}));

    assert_eq!(
        adapter.to_remote_document(&rec),
        Err(MappingError::MissingKey { field: "id".into() })
    );
}

// ── Document → record ────────────────────────────────────────────

#[test]
fn local_fields_rename_id_to_primary_key() {
    let adapter = RecordAdapter::new("sku");
    let d = doc(json!({"_id": "p-1", "price": 9.5}));

    assert_eq!(adapter.to_local_fields(&d), fields(json!({"sku": "p-1", "price": 9.5})));
}

#[test]
fn apply_remote_fields_touches_only_changed_values() {
    let adapter = RecordAdapter::new("id");
    let d = doc(json!({"_id": "a", "title": "new", "count": 3.0}));
    let mut target = fields(json!({"id": "a", "title": "old", "count": 3, "extra": true}));

    adapter.apply_remote_fields(&d, &mut target);
    // `count` stays an integer: 3 and 3.0 are equal, so it is never rewritten.
    assert_eq!(
        target,
        fields(json!({"id": "a", "title": "new", "count": 3, "extra": true}))
    );
}

#[test]
fn uuid_keys_round_trip_through_bytes() {
    let adapter = RecordAdapter::new("id");
    let id = Uuid::now_v7();
    let rec = LocalRecord::new(
        RecordId::new(1),
        fields(json!({"name": "u"})).with("id", FieldValue::Bytes(id.as_bytes().to_vec())),
    );

    let d = adapter.to_remote_document(&rec).unwrap();
    assert_eq!(d.id(), &Identity::Uuid(id));
    assert_eq!(adapter.to_local_fields(&d), rec.fields);
}

// ── Diffs ────────────────────────────────────────────────────────

#[test]
fn local_to_remote_diff_is_minimal() {
    let adapter = RecordAdapter::new("id");
    let rec = record(1, json!({"id": "a", "title": "new", "n": 1, "same": "x"}));
    let d = doc(json!({"_id": "a", "title": "old", "n": 1.0, "same": "x", "stale": 5}));

    let diff = adapter.local_to_remote_diff(&rec, &d);
    assert_eq!(diff.len(), 2);
    assert_eq!(
        diff.sets().collect::<Vec<_>>(),
        vec![(&"title".to_string(), &FieldValue::from("new"))]
    );
    assert_eq!(diff.removals().collect::<Vec<_>>(), vec!["stale"]);
}

#[test]
fn null_and_absent_produce_no_diff() {
    let adapter = RecordAdapter::new("id");
    let rec = record(1, json!({"id": "a", "note": null}));
    let d = doc(json!({"_id": "a"}));

    assert!(adapter.local_to_remote_diff(&rec, &d).is_empty());
    assert!(adapter.remote_to_local_diff(&d, &rec).is_empty());
    assert!(RecordAdapter::fields_equal(Some(&FieldValue::Null), None));
}

#[test]
fn remote_to_local_diff_never_touches_key_when_equal() {
    let adapter = RecordAdapter::new("id");
    let rec = record(1, json!({"id": 5, "v": "a"}));
    let d = doc(json!({"_id": 5.0, "v": "b"}));

    let diff = adapter.remote_to_local_diff(&d, &rec);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.sets().next().map(|(k, _)| k.as_str()), Some("v"));
}

// ── Identity index ───────────────────────────────────────────────

#[test]
fn strict_index_rejects_duplicates() {
    let records = vec![
        record(1, json!({"id": "a"})),
        record(2, json!({"id": "a"})),
    ];
    let err = IdentityIndex::strict(records, "id").unwrap_err();
    assert_eq!(err, MappingError::DuplicateIdentity(Identity::from("a")));
}

#[test]
fn lenient_index_marks_duplicates_ambiguous() {
    let records = vec![
        record(1, json!({"id": "a"})),
        record(2, json!({"id": "a"})),
        record(3, json!({"id": "a"})),
        record(4, json!({"id": "b"})),
        record(5, json!({"title": "no key"})),
    ];
    let (index, errors) = IdentityIndex::lenient(records, "id");

    assert_eq!(
        errors,
        vec![
            MappingError::DuplicateIdentity(Identity::from("a")),
            MappingError::MissingKey { field: "id".into() },
        ]
    );
    assert_eq!(index.lookup(&Identity::from("a")), Lookup::Ambiguous);
    assert!(index.contains(&Identity::from("a")));
    assert!(matches!(index.lookup(&Identity::from("b")), Lookup::Found(r) if r.id == RecordId::new(4)));
    assert_eq!(index.lookup(&Identity::from("c")), Lookup::Missing);
    assert_eq!(index.len(), 1);
}

#[test]
fn index_matches_integral_float_keys() {
    let records = vec![record(1, json!({"id": 10.0}))];
    let index = IdentityIndex::strict(records, "id").unwrap();
    assert!(matches!(index.lookup(&Identity::Int(10)), Lookup::Found(_)));
}
