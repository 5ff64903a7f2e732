//! End-to-end admission scenarios.

use chrono::Duration;

use waitroom_core::error::ErrorKind;
use waitroom_core::events::AdmissionEvent;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_database::TokenStore;
use waitroom_entity::TokenStatus;

use crate::helpers::{SUB, TestRoom, token_of};

#[tokio::test]
async fn test_direct_entry_until_full_then_promotion_on_use() {
    let room = TestRoom::new(2);

    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;
    assert!(!a.queued);
    assert!(!b.queued);
    assert_eq!(a.status, Some(TokenStatus::Active));
    assert_eq!(b.status, Some(TokenStatus::Active));

    let c = room.request(1, 3).await;
    assert!(c.queued);
    assert_eq!(c.status, Some(TokenStatus::Waiting));
    assert_eq!(c.position, Some(1));
    assert_eq!(c.eta_seconds, Some(10));

    room.service.mark_used(token_of(&a)).await.unwrap();

    assert_eq!(room.state(&a).await.status, TokenStatus::Used);
    assert_eq!(room.state(&c).await.status, TokenStatus::Active);
    assert_eq!(room.durable_active(1).await, 2);
    assert_eq!(room.counter(1).await, Some(2));
}

#[tokio::test]
async fn test_out_of_turn_activation_then_reaper_promotes() {
    let room = TestRoom::new(1);

    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;
    assert!(!a.queued);
    assert_eq!(b.position, Some(1));

    let err = room
        .service
        .activate_token(token_of(&b), OwnerId::new(2), ResourceId::new(1), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.queue_position, Some(1));

    room.clock.advance(Duration::seconds(121));
    let report = room.reaper().sweep().await;
    assert_eq!(report.sessions_released, 1);

    assert_eq!(room.state(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.state(&b).await.status, TokenStatus::Active);
    assert_eq!(room.durable_active(1).await, 1);
}

#[tokio::test]
async fn test_validation_after_active_window_expires_lazily() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;

    assert!(room
        .service
        .validate_for_operation(token_of(&a), OwnerId::new(1), ResourceId::new(1))
        .await
        .unwrap());

    room.clock.advance(Duration::seconds(601));
    let valid = room
        .service
        .validate_for_operation(token_of(&a), OwnerId::new(1), ResourceId::new(1))
        .await
        .unwrap();
    assert!(!valid);

    assert_eq!(room.stored(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.durable_active(1).await, 0);
    assert_eq!(room.counter(1).await, Some(0));
}

#[tokio::test]
async fn test_activation_corrects_drifted_counter() {
    let room = TestRoom::new(3);

    let a = room.request(1, 1).await;
    room.request(1, 2).await;
    let c = room.request(1, 3).await;
    let d = room.request(1, 4).await;
    assert!(!a.queued && !c.queued);
    assert!(d.queued);

    // A holder finishes without the counter hearing about it.
    let stored = room.stored(&c).await;
    assert!(room
        .store
        .transition(stored.id, TokenStatus::Active, TokenStatus::Used, room.clock_now())
        .await
        .unwrap());
    assert_eq!(room.counter(1).await, Some(3));
    assert_eq!(room.durable_active(1).await, 2);

    let mut events = room.events();
    let state = room
        .service
        .activate_token(token_of(&d), OwnerId::new(4), ResourceId::new(1), SUB)
        .await
        .unwrap();
    assert_eq!(state.status, TokenStatus::Active);
    assert_eq!(room.counter(1).await, Some(3));
    assert_eq!(room.durable_active(1).await, 3);

    let mut resynced = None;
    while let Ok(event) = events.try_recv() {
        if let AdmissionEvent::CounterResynced { cached, durable, .. } = event.payload {
            resynced = Some((cached, durable));
        }
    }
    assert_eq!(resynced, Some((Some(3), 2)));
}
