use std::sync::Arc;
use std::thread;

use netauto_core::database::Database;
use netauto_core::{Alert, AlertCategory, AlertError, AlertSeverity, AlertStatus, AlertStore};

fn telnet_alert(device: &str) -> Alert {
    Alert::new(AlertCategory::InsecureService, "Telnet service exposed")
        .with_device(device)
        .with_severity(AlertSeverity::High)
        .with_dedupe_kind("telnet-port-23")
}

fn temp_store() -> (tempfile::TempDir, AlertStore) {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let db = Database::new(dir.path().join("alerts.db")).expect("db should open");
    (dir, AlertStore::new(db))
}

#[test]
fn repeated_detection_keeps_one_open_alert() {
    let (_dir, store) = temp_store();

    let first = store.create(&telnet_alert("10.0.0.1:22")).unwrap();
    let second = store.create(&telnet_alert("10.0.0.1:22")).unwrap();
    let other_device = store.create(&telnet_alert("10.0.0.2:22")).unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);
    assert_ne!(first.id, other_device.id);
    assert_eq!(store.open_counts().unwrap().high, 2);
}

#[test]
fn concurrent_creates_for_one_finding_insert_once() {
    let (_dir, store) = temp_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.create(&telnet_alert("10.0.0.9:22")).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    assert!(results.iter().all(|r| r.id == results[0].id));
    assert_eq!(store.list(None, 100).unwrap().len(), 1);
}

#[test]
fn acknowledged_alert_leaves_open_list_but_still_blocks_duplicates() {
    let (_dir, store) = temp_store();
    let id = store.create(&telnet_alert("10.0.0.1:22")).unwrap().id;

    let record = store.acknowledge(&id).unwrap();
    assert_eq!(record.status, AlertStatus::Acknowledged);
    assert!(store.list(Some(AlertStatus::Open), 10).unwrap().is_empty());

    let again = store.create(&telnet_alert("10.0.0.1:22")).unwrap();
    assert!(!again.created);
    assert_eq!(again.id, id);
}

#[test]
fn redetection_after_resolve_opens_a_new_alert() {
    let (_dir, store) = temp_store();
    let first = store.create(&telnet_alert("10.0.0.1:22")).unwrap();
    store.resolve(&first.id).unwrap();

    let second = store.create(&telnet_alert("10.0.0.1:22")).unwrap();
    assert!(second.created);
    assert_ne!(second.id, first.id);
    assert!(second.generation > first.generation);

    let old = store.get(&first.id).unwrap().expect("resolved alert is kept");
    assert_eq!(old.status, AlertStatus::Resolved);
    assert_eq!(old.superseded_by.as_deref(), Some(second.id.as_str()));
}

#[test]
fn lifecycle_rejects_backwards_moves_and_unknown_ids() {
    let (_dir, store) = temp_store();
    let id = store.create(&telnet_alert("10.0.0.1:22")).unwrap().id;
    store.resolve(&id).unwrap();

    assert!(matches!(
        store.acknowledge(&id),
        Err(AlertError::InvalidTransition { .. })
    ));
    assert!(matches!(store.resolve("missing"), Err(AlertError::NotFound(_))));
}

#[test]
fn alerts_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.db");

    let id = {
        let store = AlertStore::new(Database::new(path.clone()).unwrap());
        store.create(&telnet_alert("10.0.0.1:22")).unwrap().id
    };

    let store = AlertStore::new(Database::new(path).unwrap());
    let again = store.create(&telnet_alert("10.0.0.1:22")).unwrap();
    assert!(!again.created);
    assert_eq!(again.id, id);
}
