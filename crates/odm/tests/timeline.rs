mod common;

use common::{BrokenSink, ProbeStore, Quiet, Ticket, Widget, harness, widget};
use opsdesk_odm::{
    AuditDispatch, FieldAccessor, MemoryStore, ObjectId, Odm, Repository, TIMELINE_COLLECTION,
    TimelineEvent, Value, doc,
};
use std::sync::Arc;

#[test]
fn background_dispatch_reaches_the_store_collection() {
    let store = Arc::new(MemoryStore::new());
    let odm = Odm::builder()
        .store(store.clone())
        .audit_dispatch(AuditDispatch::Background)
        .queue_capacity(2)
        .register::<Ticket>()
        .build()
        .unwrap();

    let mut ticket = Ticket::default();
    ticket.status = Some("open".to_owned());
    ticket.save(&odm).unwrap();
    for status in ["review", "closed", "archived"] {
        ticket.status = Some(status.to_owned());
        ticket.save(&odm).unwrap();
    }

    let history = ticket.history(&odm).unwrap();
    let events: Vec<_> = history.iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        [
            TimelineEvent::Create,
            TimelineEvent::Update,
            TimelineEvent::Update,
            TimelineEvent::Update
        ]
    );
    assert_eq!(store.len(TIMELINE_COLLECTION), 4);
    let last = &history[3].changes["status"];
    assert_eq!(last.old_value, Some(Value::from("closed")));
    assert_eq!(last.new_value, Some(Value::from("archived")));
}

#[test]
fn entries_carry_the_acting_user() {
    let h = harness();
    let user = ObjectId::new();
    let odm = h.odm.acting_as(user, doc! { "ip" => "10.0.0.7" });
    assert_eq!(odm.actor().map(|a| a.user_id), Some(user));

    widget("A").save(&odm).unwrap();
    widget("B").save(&h.odm).unwrap();

    let entries = h.timeline.entries();
    assert_eq!(entries[0].user_id, Some(user));
    assert_eq!(entries[0].user_info, doc! { "ip" => "10.0.0.7" });
    assert_eq!(entries[0].resource, "Widget");
    assert_eq!(entries[1].user_id, None);
    assert!(entries[1].user_info.is_empty());
}

#[test]
fn sink_failures_never_fail_the_mutation() {
    let odm = Odm::builder()
        .store(Arc::new(MemoryStore::new()))
        .timeline_sink(Arc::new(BrokenSink))
        .register::<Widget>()
        .build()
        .unwrap();
    let mut item = widget("A");
    item.save(&odm).unwrap();
    item.qty = Some(2);
    item.save(&odm).unwrap();
    item.delete(&odm).unwrap();
    assert!(Widget::find_by_id(&odm, item.id.unwrap()).unwrap().is_none());
}

#[test]
fn blocked_events_are_not_recorded() {
    let h = harness();
    let mut quiet = Quiet::default();
    quiet.label = Some("x".to_owned());
    quiet.save(&h.odm).unwrap();
    quiet.label = Some("y".to_owned());
    quiet.save(&h.odm).unwrap();
    quiet.delete(&h.odm).unwrap();

    let entries = h.timeline.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, TimelineEvent::Create);
}

#[test]
fn failed_writes_leave_no_trace() {
    let h = common::harness_with(ProbeStore::new());
    let mut item = widget("A");
    item.save(&h.odm).unwrap();
    h.store.fail_writes(true);

    item.qty = Some(9);
    assert!(item.save(&h.odm).unwrap_err().store_error().is_some());
    assert!(item.delete(&h.odm).unwrap_err().store_error().is_some());
    assert_eq!(h.timeline.len(), 1);
}

#[test]
fn disabled_audit_records_nothing() {
    let store = Arc::new(MemoryStore::new());
    let odm = Odm::builder()
        .store(store.clone())
        .audit_enabled(false)
        .register::<Widget>()
        .build()
        .unwrap();
    assert!(!odm.timeline().is_enabled());

    let mut item = widget("A");
    item.save(&odm).unwrap();
    assert!(item.history(&odm).unwrap().is_empty());
    assert_eq!(store.len(TIMELINE_COLLECTION), 0);
}

#[test]
fn timeline_collection_is_configurable() {
    let store = Arc::new(MemoryStore::new());
    let odm = Odm::builder()
        .store(store.clone())
        .timeline_collection("audit_log")
        .register::<Widget>()
        .build()
        .unwrap();
    widget("A").save(&odm).unwrap();
    assert_eq!(store.len("audit_log"), 1);
    assert_eq!(store.len(TIMELINE_COLLECTION), 0);
}

#[test]
fn deletions_record_the_last_known_state() {
    let h = harness();
    let mut ticket = Ticket::default();
    ticket.status = Some("open".to_owned());
    ticket.note = Some("private".to_owned());
    ticket.save(&h.odm).unwrap();
    ticket.delete(&h.odm).unwrap();

    let entries = h.timeline.entries();
    let deletion = &entries[1];
    assert_eq!(deletion.event, TimelineEvent::Delete);
    assert_eq!(deletion.changes["status"].old_value, Some(Value::from("open")));
    assert!(!deletion.changes.contains_key("note"));
}

#[test]
fn metadata_edits_are_audited() {
    let h = harness();
    let mut item = widget("A");
    item.save(&h.odm).unwrap();
    item.state_mut().meta_mut().insert("color".to_owned(), Value::from("red"));
    item.save(&h.odm).unwrap();
    item.state_mut().meta_mut().clear();
    item.save(&h.odm).unwrap();

    let entries = h.timeline.entries();
    assert!(!entries[0].changes.contains_key("meta"));

    assert_eq!(entries[1].changes.len(), 1);
    let added = &entries[1].changes["meta"];
    assert_eq!(added.old_value, None);
    assert_eq!(added.new_value, Some(Value::from(doc! { "color" => "red" })));

    let cleared = &entries[2].changes["meta"];
    assert_eq!(cleared.old_value, Some(Value::from(doc! { "color" => "red" })));
    assert_eq!(cleared.new_value, None);
}

#[test]
fn metadata_follows_the_discard_list() {
    let h = harness();
    let mut ticket = Ticket::default();
    ticket.status = Some("open".to_owned());
    ticket.state_mut().meta_mut().insert("source".to_owned(), Value::from("mail"));
    ticket.save(&h.odm).unwrap();

    let mut quiet = Quiet::default();
    quiet.label = Some("q".to_owned());
    quiet.state_mut().meta_mut().insert("source".to_owned(), Value::from("mail"));
    quiet.save(&h.odm).unwrap();

    let entries = h.timeline.entries();
    let recorded = &entries[0].changes["meta"];
    assert_eq!(recorded.new_value, Some(Value::from(doc! { "source" => "mail" })));
    assert_eq!(entries[1].resource, "Quiet");
    assert!(!entries[1].changes.contains_key("meta"));
    assert!(entries[1].changes.contains_key("label"));
}
