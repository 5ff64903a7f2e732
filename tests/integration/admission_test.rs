//! Admission, activation, cancellation and session release.

use std::sync::Arc;

use chrono::Duration;

use waitroom_admission::identity::StaticIdentityDirectory;
use waitroom_core::error::ErrorKind;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::TokenStatus;

use crate::helpers::{self, SUB, TestRoom, token_of};

#[tokio::test]
async fn test_repeat_request_returns_existing_token() {
    let room = TestRoom::new(1);

    let a = room.request(1, 1).await;
    let a_again = room.request(1, 1).await;
    assert!(!a_again.queued);
    assert_eq!(a.token, a_again.token);

    let b = room.request(1, 2).await;
    let b_again = room.request(1, 2).await;
    assert!(b_again.queued);
    assert_eq!(b.token, b_again.token);
    assert_eq!(b_again.position, Some(1));
}

#[tokio::test]
async fn test_unknown_identity_is_rejected() {
    let directory = StaticIdentityDirectory::restricted();
    directory.add_owner(OwnerId::new(1)).await;
    directory.add_resource(ResourceId::new(1)).await;
    let room = TestRoom::with_identity(2, Arc::new(directory));

    let err = room
        .service
        .request_admission(ResourceId::new(1), SUB, OwnerId::new(2))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = room
        .service
        .request_admission(ResourceId::new(9), SUB, OwnerId::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    assert!(!room.request(1, 1).await.queued);
}

#[tokio::test]
async fn test_waiters_activate_in_issue_order() {
    let room = TestRoom::new(1);

    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;
    let c = room.request(1, 3).await;
    let d = room.request(1, 4).await;
    assert_eq!(b.position, Some(1));
    assert_eq!(c.position, Some(2));
    assert_eq!(d.position, Some(3));

    let err = room
        .service
        .activate_token(token_of(&c), OwnerId::new(3), ResourceId::new(1), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.queue_position, Some(2));

    room.service.mark_used(token_of(&a)).await.unwrap();

    assert_eq!(room.state(&b).await.status, TokenStatus::Active);
    let c_state = room.state(&c).await;
    let d_state = room.state(&d).await;
    assert_eq!(c_state.status, TokenStatus::Waiting);
    assert_eq!(c_state.position, 1);
    assert_eq!(d_state.position, 2);
    assert_eq!(room.stored(&d).await.queue_position, 2);
}

#[tokio::test]
async fn test_first_in_line_activates_when_slot_frees() {
    let room = TestRoom::new(1);

    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;

    // Free the slot behind the service's back: no promotion runs.
    let stored = room.stored(&a).await;
    room.store
        .put(waitroom_entity::AdmissionToken {
            status: TokenStatus::Cancelled,
            ..stored
        })
        .await;

    let state = room
        .service
        .activate_token(token_of(&b), OwnerId::new(2), ResourceId::new(1), SUB)
        .await
        .unwrap();
    assert_eq!(state.status, TokenStatus::Active);
    assert_eq!(state.position, 0);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_activation_rejects_foreign_and_finished_tokens() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;

    let err = room
        .service
        .activate_token(token_of(&a), OwnerId::new(2), ResourceId::new(1), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = room
        .service
        .activate_token(token_of(&a), OwnerId::new(1), ResourceId::new(2), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = room
        .service
        .activate_token("no-such-token", OwnerId::new(1), ResourceId::new(1), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    room.service.mark_used(token_of(&a)).await.unwrap();
    let err = room
        .service
        .activate_token(token_of(&a), OwnerId::new(1), ResourceId::new(1), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Gone);
}

#[tokio::test]
async fn test_mark_used_requires_active_token() {
    let room = TestRoom::new(1);
    room.request(1, 1).await;
    let b = room.request(1, 2).await;

    let err = room.service.mark_used(token_of(&b)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert_eq!(room.state(&b).await.status, TokenStatus::Waiting);
}

#[tokio::test]
async fn test_cancel_waiting_token_moves_line_up() {
    let room = TestRoom::new(1);
    room.request(1, 1).await;
    let b = room.request(1, 2).await;
    let c = room.request(1, 3).await;

    room.service
        .cancel_token(token_of(&b), OwnerId::new(2))
        .await
        .unwrap();

    assert_eq!(room.state(&b).await.status, TokenStatus::Cancelled);
    assert_eq!(room.stored(&c).await.queue_position, 1);

    let err = room
        .service
        .cancel_token(token_of(&b), OwnerId::new(2))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);

    let err = room
        .service
        .cancel_token(token_of(&c), OwnerId::new(99))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_cancel_active_token_promotes_next() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;

    room.service
        .cancel_token(token_of(&a), OwnerId::new(1))
        .await
        .unwrap();

    assert_eq!(room.state(&b).await.status, TokenStatus::Active);
    assert_eq!(room.durable_active(1).await, 1);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_release_session_is_idempotent() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;

    room.service
        .release_session(OwnerId::new(1), ResourceId::new(1), SUB)
        .await;
    assert_eq!(room.state(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.state(&b).await.status, TokenStatus::Active);

    room.service
        .release_session(OwnerId::new(1), ResourceId::new(1), SUB)
        .await;
    assert_eq!(room.state(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.state(&b).await.status, TokenStatus::Active);
    assert_eq!(room.durable_active(1).await, 1);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_release_without_session_keeps_waiting_token() {
    let room = TestRoom::new(1);
    room.request(1, 1).await;
    let b = room.request(1, 2).await;

    room.service
        .release_session(OwnerId::new(2), ResourceId::new(1), SUB)
        .await;
    assert_eq!(room.state(&b).await.status, TokenStatus::Waiting);
}

#[tokio::test]
async fn test_expired_token_is_replaced_on_request() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;

    room.clock.advance(Duration::seconds(601));
    let fresh = room.request(1, 1).await;

    assert!(!fresh.queued);
    assert_ne!(fresh.token, a.token);
    assert_eq!(room.stored(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.durable_active(1).await, 1);
}

#[tokio::test]
async fn test_store_failure_degrades_to_queueing() {
    let service = helpers::service_with_failing_store(3);

    let ticket = service
        .request_admission(ResourceId::new(1), SUB, OwnerId::new(1))
        .await
        .unwrap();
    assert!(ticket.queued);
    assert!(ticket.degraded);
    assert!(ticket.token.is_none());

    // Advisory calls swallow the failure.
    service.heartbeat(OwnerId::new(1), ResourceId::new(1), SUB).await;
    service
        .release_session(OwnerId::new(1), ResourceId::new(1), SUB)
        .await;

    let err = service.get_token_status("anything").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
}

#[tokio::test]
async fn test_queue_stats_list_busy_resources() {
    let room = TestRoom::new(1);
    room.request(1, 1).await;
    room.request(1, 2).await;
    room.request(1, 3).await;
    let done = room.request(2, 1).await;
    room.service.mark_used(token_of(&done)).await.unwrap();

    let stats = room.service.queue_stats(ResourceId::new(1)).await.unwrap();
    assert_eq!(stats.active, 1);
    assert_eq!(stats.waiting, 2);
    assert_eq!(stats.average_wait_seconds, 20);

    let all = room.service.all_queue_stats().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].resource_id, ResourceId::new(1));

    let owned = room.service.owner_tokens(OwnerId::new(1)).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].resource_id, ResourceId::new(1));
}

#[tokio::test]
async fn test_cleared_sessions_rebuild_counter_from_store() {
    let room = TestRoom::new(1);
    room.request(1, 1).await;

    let cleared = room.service.clear_all_sessions().await.unwrap();
    assert_eq!(cleared.heartbeats, 1);
    assert_eq!(cleared.counters, 1);
    assert_eq!(room.counter(1).await, None);

    let b = room.request(1, 2).await;
    assert!(b.queued);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_force_process_promotes_into_free_slots() {
    let room = TestRoom::new(2);
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;
    let c = room.request(1, 3).await;

    // Both holders leave without the service noticing.
    for ticket in [&a, &b] {
        let stored = room.stored(ticket).await;
        room.store
            .put(waitroom_entity::AdmissionToken {
                status: TokenStatus::Cancelled,
                ..stored
            })
            .await;
    }

    let promoted = room.service.force_process(ResourceId::new(1)).await.unwrap();
    assert_eq!(promoted, 1);
    assert_eq!(room.state(&c).await.status, TokenStatus::Active);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_purge_removes_used_tokens_past_retention() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;
    room.service.mark_used(token_of(&a)).await.unwrap();
    room.request(1, 2).await;

    assert_eq!(room.service.purge_past_retention().await.unwrap(), 0);

    room.clock.advance(Duration::hours(25));
    assert_eq!(room.service.purge_past_retention().await.unwrap(), 1);
    assert_eq!(room.store.len().await, 1);
}
