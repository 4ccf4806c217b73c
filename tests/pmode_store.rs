mod common;

use common::*;
use std::sync::Arc;

use msh::pmode::store::{
    InMemoryKeyValueStore, KeyValueStore, PModeStore, PModeStoreError, UpdateOutcome,
};
use msh::pmode::{Mep, MepBinding};

fn store() -> PModeStore {
    PModeStore::new(Arc::new(InMemoryKeyValueStore::new()), false)
}

#[tokio::test]
async fn create_then_get_round_trips_every_field() {
    let store = store();
    let created = store.create(pmode("p1")).await.expect("created");

    let fetched = store.get_by_id("p1").await.expect("present");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.initiator, created.initiator);
    assert_eq!(fetched.responder, created.responder);
    assert_eq!(fetched.leg1, created.leg1);
    assert!(fetched.metadata.created_at.is_some());
}

#[tokio::test]
async fn create_or_update_round_trips() {
    let store = store();
    store.create_or_update(pmode("p1")).await.expect("created");

    let mut changed = pmode("p1");
    changed.agreement = Some("agreement-7".to_string());
    store.create_or_update(changed.clone()).await.expect("updated");

    let fetched = store.get_by_id("p1").await.expect("present");
    assert_eq!(fetched.agreement.as_deref(), Some("agreement-7"));
    assert!(fetched.metadata.modified_at.is_some());
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let store = store();
    store.create(pmode("p1")).await.expect("created");

    let error = store.create(pmode("p1")).await.expect_err("duplicate");
    assert!(matches!(error, PModeStoreError::Duplicate { .. }));
}

#[tokio::test]
async fn two_leg_binding_without_leg2_fails_creation() {
    let store = store();

    let mut invalid = pmode("p-two-way");
    invalid.mep = Mep::TwoWay;
    invalid.binding = MepBinding::PushPush;

    let error = store.create(invalid).await.expect_err("leg count invariant");
    assert!(error.to_string().contains("requires 2 leg(s)"));
}

#[tokio::test]
async fn update_of_missing_pmode_is_unchanged() {
    let store = store();
    let outcome = store.update(pmode("p-absent")).await.expect("no-op");
    assert_eq!(outcome, UpdateOutcome::Unchanged);
}

#[tokio::test]
async fn soft_deleted_pmode_is_invisible_and_not_updatable() {
    let store = store();
    store.create(pmode("p1")).await.expect("created");

    assert!(store.soft_delete("p1").await.expect("soft deleted"));
    assert!(store.get_by_id("p1").await.is_none());

    let outcome = store.update(pmode("p1")).await.expect("no-op");
    assert_eq!(outcome, UpdateOutcome::Unchanged);

    // A second soft delete finds nothing to do.
    assert!(!store.soft_delete("p1").await.expect("no-op"));
}

#[tokio::test]
async fn create_or_update_restores_a_soft_deleted_pmode() {
    let store = store();
    store.create(pmode("p1")).await.expect("created");
    assert!(store.soft_delete("p1").await.expect("soft deleted"));
    assert!(store.get_by_id("p1").await.is_none());

    let mut changed = pmode("p1");
    changed.agreement = Some("agreement-9".to_string());
    let restored = store.create_or_update(changed).await.expect("restored");
    assert!(!restored.metadata.deleted);

    let fetched = store.get_by_id("p1").await.expect("visible again");
    assert_eq!(fetched.agreement.as_deref(), Some("agreement-9"));
}

#[tokio::test]
async fn find_by_service_and_action_matches_either_leg() {
    let store = store();

    let mut two_way = pmode("p-two-way");
    two_way.mep = Mep::TwoWay;
    two_way.binding = MepBinding::PushPush;
    two_way.leg2 = Some(leg("urn:invoicing:reply", "respond"));
    store.create(two_way).await.expect("created");

    let found = store
        .find_by_service_and_action("urn:invoicing:reply", "respond")
        .await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "p-two-way");
}

#[tokio::test]
async fn find_by_service_and_action_skips_deleted_entries() {
    let store = store();
    store.create(pmode("p1")).await.expect("created");
    store.create(pmode("p2")).await.expect("created");

    let found = store.find_by_service_and_action(SERVICE, ACTION).await;
    assert_eq!(found.len(), 2);

    store.soft_delete("p1").await.expect("soft deleted");
    let found = store.find_by_service_and_action(SERVICE, ACTION).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "p2");
}

#[tokio::test]
async fn load_rebuilds_the_cache_from_the_backing_store() {
    let backing: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
    {
        let store = PModeStore::new(Arc::clone(&backing), false);
        store.create(pmode("p1")).await.expect("created");
    }

    let reopened = PModeStore::new(backing, false);
    assert!(reopened.get_by_id("p1").await.is_none());
    assert_eq!(reopened.load().await.expect("loaded"), 1);
    assert!(reopened.get_by_id("p1").await.is_some());
}
