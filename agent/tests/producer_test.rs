//! Integration tests for the live-or-queue producer policy.

mod common;

use common::{route_doc, Harness};
use fieldsync_agent::db;
use fieldsync_agent::sync::PerformOutcome;
use fieldsync_engine::{
    ActionPayload, ActionState, BinaryAttachment, CachedRoute, HttpMethod, NewAction,
    Notification, PhotoPayload, ProductCheckPayload, RouteDocument, VisitPayload,
};
use serde_json::json;

fn checkin(item: &str) -> NewAction {
    NewAction::new(
        format!("/route-items/{}/checkin", item),
        HttpMethod::Post,
        ActionPayload::Checkin(VisitPayload {
            route_id: "r-1".into(),
            item_id: item.into(),
            at: 10,
            latitude: Some(-23.5),
            longitude: Some(-46.6),
            notes: None,
        }),
    )
}

async fn cache_route(h: &Harness) {
    let doc: RouteDocument = serde_json::from_value(route_doc("r-1", "2024-05-10")).unwrap();
    db::put_route(h.pool(), &CachedRoute::from_document(doc, 1)).await;
}

async fn item_status(h: &Harness, item: &str) -> serde_json::Value {
    let route = db::get_route(h.pool(), "r-1").await.unwrap().unwrap();
    route.item(item).unwrap()["status"].clone()
}

#[tokio::test]
async fn offline_goes_straight_to_the_queue() {
    let h = Harness::new(false).await;
    cache_route(&h).await;

    let outcome = h.state.engine.perform(checkin("A")).await;

    let PerformOutcome::Queued { action_id } = outcome else {
        panic!("expected queued, got {:?}", outcome);
    };
    assert!(h.mock.requests().is_empty());
    assert_eq!(item_status(&h, "A").await, "IN_PROGRESS");
    assert_eq!(
        h.state.notifier.last(),
        Some(Notification::SavedOffline { action_id })
    );

    let action = db::get_action(h.pool(), action_id).await.unwrap().unwrap();
    assert_eq!(action.state, ActionState::Pending);
    assert_eq!(action.retry_count, 0);
    assert_eq!(action.endpoint, "/route-items/A/checkin");
}

#[tokio::test]
async fn live_success_patches_without_queueing() {
    let h = Harness::new(true).await;
    cache_route(&h).await;

    let outcome = h.state.engine.perform(checkin("A")).await;

    assert_eq!(
        outcome,
        PerformOutcome::Applied {
            already_applied: false
        }
    );
    assert_eq!(h.mock.paths(), vec!["/route-items/A/checkin"]);
    assert_eq!(h.pending().await, 0);
    assert_eq!(item_status(&h, "A").await, "IN_PROGRESS");
}

#[tokio::test]
async fn live_conflict_is_applied() {
    let h = Harness::new(true).await;
    h.mock.script(
        "/route-items/A/checkin",
        409,
        json!({"message": "already checked in"}),
    );

    let outcome = h.state.engine.perform(checkin("A")).await;

    assert_eq!(
        outcome,
        PerformOutcome::Applied {
            already_applied: true
        }
    );
    assert_eq!(h.pending().await, 0);
}

#[tokio::test]
async fn client_error_is_surfaced_not_queued() {
    let h = Harness::new(true).await;
    cache_route(&h).await;
    h.mock.script(
        "/product-checks",
        400,
        json!({"message": "quantity must be positive"}),
    );

    let outcome = h
        .state
        .engine
        .perform(NewAction::new(
            "/product-checks",
            HttpMethod::Post,
            ActionPayload::ProductCheck(ProductCheckPayload {
                route_id: "r-1".into(),
                item_id: "A".into(),
                product_id: "sku-1".into(),
                quantity: -1.0,
                price: None,
                expiry_date: None,
                checked_at: 1,
            }),
        ))
        .await;

    assert_eq!(
        outcome,
        PerformOutcome::Rejected {
            status: 400,
            message: "quantity must be positive".into()
        }
    );
    assert_eq!(h.pending().await, 0);
    let route = db::get_route(h.pool(), "r-1").await.unwrap().unwrap();
    assert!(route.item("A").unwrap().get("productCounts").is_none());
    assert!(h.state.session.is_authenticated());
}

#[tokio::test]
async fn unauthorized_drops_the_session() {
    let h = Harness::new(true).await;
    h.mock.script(
        "/route-items/A/checkin",
        401,
        json!({"message": "token expired"}),
    );

    let outcome = h.state.engine.perform(checkin("A")).await;

    assert!(matches!(outcome, PerformOutcome::Rejected { status: 401, .. }));
    assert!(!h.state.session.is_authenticated());
    assert!(matches!(
        h.state.notifier.last(),
        Some(Notification::SessionInvalid { .. })
    ));
    assert_eq!(h.pending().await, 0);
}

#[tokio::test]
async fn server_error_queues_and_replays_with_the_same_key() {
    let h = Harness::new(true).await;
    cache_route(&h).await;
    h.mock.script(
        "/route-items/A/checkin",
        503,
        json!({"message": "maintenance"}),
    );

    let outcome = h.state.engine.perform(checkin("A")).await;

    assert!(matches!(outcome, PerformOutcome::Queued { .. }));
    assert_eq!(item_status(&h, "A").await, "IN_PROGRESS");

    // Enqueue while online triggers a drain in the background
    h.wait_until_drained().await;

    let requests = h.mock.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].idempotency_key.is_some());
    assert_eq!(requests[0].idempotency_key, requests[1].idempotency_key);
}

#[tokio::test]
async fn unreachable_remote_queues() {
    let h = Harness::new(true).await;
    let client = fieldsync_agent::remote::ApiClient::new(
        "http://127.0.0.1:9",
        h.state.session.clone(),
        std::time::Duration::from_secs(1),
    )
    .unwrap();
    let engine = fieldsync_agent::sync::SyncEngine::new_shared(
        h.pool().clone(),
        client,
        h.state.connectivity.clone(),
        h.state.notifier.clone(),
    );

    let outcome = engine.perform(checkin("A")).await;

    assert!(matches!(outcome, PerformOutcome::Queued { .. }));
    assert!(h.pending().await >= 1);
}

#[tokio::test]
async fn malformed_attachment_is_rejected_up_front() {
    let h = Harness::new(false).await;
    let mut attachment = BinaryAttachment::from_bytes("photo", "p.jpg", "image/jpeg", b"jpeg");
    attachment.data_url = "data:image/jpeg,raw".into();

    let outcome = h
        .state
        .engine
        .perform(NewAction::new(
            "/photos",
            HttpMethod::Post,
            ActionPayload::Photo(PhotoPayload {
                route_id: Some("r-1".into()),
                item_id: Some("A".into()),
                category: None,
                taken_at: 1,
                attachment,
            }),
        ))
        .await;

    assert!(matches!(outcome, PerformOutcome::Invalid { .. }));
    assert_eq!(h.pending().await, 0);
}

#[tokio::test]
async fn store_failure_is_reported_as_not_saved() {
    let h = Harness::new(false).await;
    h.pool().close().await;

    let outcome = h.state.engine.perform(checkin("A")).await;

    assert!(matches!(outcome, PerformOutcome::NotSaved { .. }));
    assert!(matches!(
        h.state.notifier.last(),
        Some(Notification::CouldNotSaveOffline { .. })
    ));
}

#[tokio::test]
async fn photo_increments_the_item_counter() {
    let h = Harness::new(false).await;
    cache_route(&h).await;

    for _ in 0..2 {
        h.state
            .engine
            .perform(NewAction::new(
                "/photos",
                HttpMethod::Post,
                ActionPayload::Photo(PhotoPayload {
                    route_id: Some("r-1".into()),
                    item_id: Some("B".into()),
                    category: Some("shelf".into()),
                    taken_at: 1,
                    attachment: BinaryAttachment::from_bytes(
                        "photo",
                        "shelf.jpg",
                        "image/jpeg",
                        &[0xFF, 0xD8, 0xFF],
                    ),
                }),
            ))
            .await;
    }

    let route = db::get_route(h.pool(), "r-1").await.unwrap().unwrap();
    assert_eq!(route.item("B").unwrap()["photoCount"], 2);
}
