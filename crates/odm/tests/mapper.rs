mod common;

use chrono::{TimeZone, Utc};
use common::{Ticket, Widget, harness, widget};
use opsdesk_odm::{
    Change, DocumentStore, FieldAccessor, FindOptions, ObjectId, OdmError, ReadOptions, Repository,
    TimelineEvent, Value, decode, doc, encode,
};

fn stored(h: &common::Harness, collection: &str, id: ObjectId) -> opsdesk_odm::Document {
    h.store
        .inner
        .find_one(collection, &doc! { "_id" => id }, &FindOptions::new())
        .unwrap()
        .unwrap()
}

#[test]
fn create_writes_only_present_fields() {
    let h = harness();
    let mut item = widget("A");
    item.active = Some(true);
    item.save(&h.odm).unwrap();

    let id = item.id.unwrap();
    let document = stored(&h, "widgets", id);
    let keys: Vec<_> = document.keys().map(String::as_str).collect();
    assert_eq!(keys, ["_id", "active", "created", "name"]);
    assert_eq!(document["name"], Value::from("A"));
    assert_eq!(document["active"], Value::Bool(true));
    assert!(matches!(document["created"], Value::Timestamp(_)));

    let entries = h.timeline.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, TimelineEvent::Create);
    assert_eq!(entries[0].resource, "Widget");
    assert_eq!(entries[0].resource_id, Some(id));
    assert_eq!(entries[0].changes.len(), 2);
    assert_eq!(entries[0].changes["name"], Change::created(Value::from("A")));
    assert_eq!(entries[0].changes["active"], Change::created(Value::Bool(true)));
}

#[test]
fn save_resyncs_old_values() {
    let h = harness();
    let mut item = widget("A");
    item.qty = Some(3);
    item.due = Some(Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap());
    item.save(&h.odm).unwrap();

    for field in ["_id", "name", "qty", "due", "created"] {
        assert_eq!(item.state().old(field), item.read(field).as_ref(), "{field}");
    }
    assert!(item.timeline_changes(TimelineEvent::Update).is_empty());
}

#[test]
fn update_records_only_the_changed_field() {
    let h = harness();
    let mut item = widget("A");
    item.active = Some(true);
    item.save(&h.odm).unwrap();

    let mut loaded = Widget::find_by_id(&h.odm, item.id.unwrap()).unwrap().unwrap();
    loaded.active = Some(false);
    loaded.save(&h.odm).unwrap();

    let entries = h.timeline.entries();
    let update = entries.last().unwrap();
    assert_eq!(update.event, TimelineEvent::Update);
    assert_eq!(update.changes.len(), 1);
    assert_eq!(
        update.changes["active"],
        Change { old_value: Some(Value::Bool(true)), new_value: Some(Value::Bool(false)) }
    );
    assert!(loaded.modified.is_some());
    assert!(matches!(stored(&h, "widgets", loaded.id.unwrap())["modified"], Value::Timestamp(_)));
}

#[test]
fn empty_values_are_suppressed_until_they_clear_something() {
    let h = harness();
    let mut item = widget("A");
    item.qty = Some(0);
    item.tags = Some(Vec::new());
    item.watchers = Some(Vec::new());
    item.save(&h.odm).unwrap();
    let id = item.id.unwrap();

    let document = stored(&h, "widgets", id);
    assert!(!document.contains_key("qty"));
    assert!(!document.contains_key("tags"));
    assert!(!document.contains_key("watchers"));

    item.qty = Some(5);
    item.save(&h.odm).unwrap();
    assert_eq!(stored(&h, "widgets", id)["qty"], Value::Int(5));

    item.qty = Some(0);
    item.name = Some(String::new());
    let encoded = encode(&item).unwrap();
    assert_eq!(encoded.get("qty"), Some(&Value::Null));
    assert_eq!(encoded.get("name"), Some(&Value::Null));
    assert!(!encoded.contains_key("tags"));

    item.save(&h.odm).unwrap();
    let document = stored(&h, "widgets", id);
    assert_eq!(document["qty"], Value::Null);
    assert_eq!(document["name"], Value::Null);
}

#[test]
fn decode_is_a_load() {
    let owner = ObjectId::new();
    let document = doc! {
        "_id" => ObjectId::new(),
        "name" => "B",
        "qty" => "7",
        "owner" => owner.to_hex(),
        "stray" => true,
        "meta" => doc! { "source" => "import" },
    };
    let item: Widget = decode(document).unwrap();
    assert_eq!(item.qty, Some(7));
    assert_eq!(item.owner, Some(owner));
    assert_eq!(item.state().old("qty"), Some(&Value::Int(7)));
    assert_eq!(item.state().meta().get("source"), Some(&Value::from("import")));
    assert!(item.timeline_changes(TimelineEvent::Update).is_empty());
}

#[test]
fn decode_skips_stored_values_that_no_longer_fit() {
    let document = doc! { "name" => "old", "owner" => "not-an-id", "due" => "n/a" };
    let item: Widget = decode(document).unwrap();
    assert_eq!(item.name.as_deref(), Some("old"));
    assert_eq!(item.owner, None);
    assert_eq!(item.due, None);
    assert_eq!(item.state().old("due"), None);
}

#[test]
fn legacy_documents_do_not_break_reads() {
    let h = harness();
    h.store.inner.insert_one("widgets", doc! { "name" => "good" }).unwrap();
    let legacy = h
        .store
        .inner
        .insert_one("widgets", doc! { "name" => "legacy", "due" => "n/a" })
        .unwrap();

    let found = Widget::all(&h.odm, doc! {}, &[], &ReadOptions::new()).unwrap();
    assert_eq!(found.len(), 2);
    let mut item = found.get(&legacy).unwrap().clone();
    assert_eq!(item.name.as_deref(), Some("legacy"));
    assert_eq!(item.due, None);

    item.qty = Some(3);
    item.save(&h.odm).unwrap();
    let document = stored(&h, "widgets", legacy);
    assert_eq!(document["due"], Value::from("n/a"));
    assert_eq!(document["qty"], Value::Int(3));
}

#[test]
fn assignment_stays_strict() {
    let mut item = widget("A");
    let err = item.set("owner", "not-an-id").unwrap_err();
    assert!(matches!(err, OdmError::InvalidIdentifier { .. }));
    assert!(item.set("due", "n/a").is_err());
}

#[test]
fn caller_provided_created_is_kept() {
    let h = harness();
    let created = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut item = widget("old");
    item.created = Some(created);
    item.save(&h.odm).unwrap();
    let loaded = Widget::find_by_id(&h.odm, item.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.created, Some(created));
}

#[test]
fn set_coerces_through_the_field_type() {
    let mut item = Widget::default();
    item.set("qty", "12 boxes").unwrap();
    item.set("price", "9.5").unwrap();
    item.set("due", "2024-03-01").unwrap();
    item.set("active", 1).unwrap();
    assert_eq!(item.qty, Some(12));
    assert_eq!(item.price, Some(9.5));
    assert_eq!(item.due, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
    assert_eq!(item.active, Some(true));
    assert!(matches!(item.set("owner", "zz"), Err(OdmError::InvalidIdentifier { .. })));
    assert!(matches!(item.set("colour", "red"), Err(OdmError::Schema { .. })));
}

#[test]
fn preserve_discard_and_computed_fields_shape_the_diff() {
    let h = harness();
    let mut ticket = Ticket::default();
    ticket.status = Some("open".to_owned());
    ticket.note = Some("internal".to_owned());
    ticket.watchers = Some(vec![ObjectId::new()]);
    ticket.save(&h.odm).unwrap();

    let create = &h.timeline.entries()[0];
    assert!(!create.changes.contains_key("note"));
    assert_eq!(create.changes["watcher_count"], Change::created(Value::Int(1)));

    ticket.note = Some("changed".to_owned());
    ticket.watchers.as_mut().unwrap().push(ObjectId::new());
    ticket.save(&h.odm).unwrap();

    let update = h.timeline.entries().pop().unwrap();
    assert!(!update.changes.contains_key("note"));
    assert_eq!(update.changes["status"], Change { old_value: None, new_value: Some("open".into()) });
    assert_eq!(
        update.changes["watcher_count"],
        Change { old_value: Some(Value::Int(1)), new_value: Some(Value::Int(2)) }
    );
    assert!(update.changes.contains_key("watchers"));
}

#[test]
fn delete_records_last_known_values_and_becomes_inert() {
    let h = harness();
    let mut item = widget("gone");
    item.qty = Some(2);
    item.save(&h.odm).unwrap();
    let id = item.id.unwrap();

    item.delete(&h.odm).unwrap();
    assert!(item.state().is_deleted());
    assert_eq!(h.store.inner.len("widgets"), 0);

    let delete = h.timeline.entries().pop().unwrap();
    assert_eq!(delete.event, TimelineEvent::Delete);
    assert_eq!(delete.resource_id, Some(id));
    assert_eq!(delete.changes["name"], Change::removed(Value::from("gone")));
    assert_eq!(delete.changes["qty"], Change::removed(Value::Int(2)));

    assert!(matches!(item.save(&h.odm), Err(OdmError::Lifecycle { .. })));
    assert!(matches!(item.delete(&h.odm), Err(OdmError::Lifecycle { .. })));
    assert!(matches!(widget("new").delete(&h.odm), Err(OdmError::Lifecycle { .. })));
}

#[test]
fn update_without_null_skips_the_timeline_and_never_clears() {
    let h = harness();
    let mut item = widget("A");
    item.qty = Some(4);
    item.save(&h.odm).unwrap();
    let id = item.id.unwrap();
    let before = h.timeline.len();

    item.qty = None;
    item.price = Some(2.5);
    item.update_without_null(&h.odm, false).unwrap();
    let document = stored(&h, "widgets", id);
    assert_eq!(document["qty"], Value::Int(4));
    assert_eq!(document["price"], Value::Double(2.5));
    assert!(document.contains_key("modified"));
    assert_eq!(h.timeline.len(), before);

    item.update_without_null(&h.odm, true).unwrap();
    let document = stored(&h, "widgets", id);
    assert!(!document.contains_key("qty"));
    assert_eq!(document["_id"], Value::Id(id));
}

#[test]
fn serialization_helpers() {
    let h = harness();
    let mut item = widget("A");
    item.live = Some(true);
    item.created = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    item.state_mut().meta_mut().insert("origin".to_owned(), Value::from("api"));
    item.save(&h.odm).unwrap();
    let id = item.id.unwrap().to_hex();

    let array = item.to_array(&["qty"]);
    assert_eq!(array["id"], serde_json::json!(id));
    assert_eq!(array["created"], serde_json::json!("2024-01-02T03:04:05.000Z"));
    assert_eq!(array["meta"], serde_json::json!({ "origin": "api" }));

    let json = item.to_json(&[]);
    assert_eq!(json["created"], serde_json::json!(1_704_164_645));
    assert!(json.get("live").is_none());
    assert!(json.get("meta").is_none());

    let simple = item.simple_json();
    assert_eq!(simple["created"], serde_json::json!("2024-01-02T03:04:05.000Z"));
    assert_eq!(simple["id"], serde_json::json!(id));

    let copy = item.data_for_copy().unwrap();
    assert!(copy.is_new());
    assert_eq!(copy.name, item.name);
    assert!(copy.modified.is_none());
    assert_ne!(copy.created, item.created);
}

#[test]
fn unregistered_entities_are_schema_errors() {
    let h = opsdesk_odm::Odm::builder()
        .store(std::sync::Arc::new(opsdesk_odm::MemoryStore::new()))
        .build()
        .unwrap();
    let err = widget("x").save(&h).unwrap_err();
    assert!(matches!(err, OdmError::Schema { .. }));
}
