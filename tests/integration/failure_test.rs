//! Store faults part-way through a decision: slots are handed back and
//! readers fall back to what is stored.

use std::sync::atomic::Ordering;

use waitroom_core::error::ErrorKind;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::{AdmissionToken, TokenStatus};

use crate::helpers::{SUB, TestRoom, token_of};

#[tokio::test]
async fn test_failed_insert_gives_slot_back() {
    let (room, store) = TestRoom::flaky(2);
    store.fail_insert.store(true, Ordering::SeqCst);

    let ticket = room.request(1, 1).await;
    assert!(ticket.queued);
    assert!(ticket.degraded);
    assert!(ticket.token.is_none());
    assert_eq!(room.counter(1).await, Some(0));
    assert_eq!(room.durable_active(1).await, 0);

    store.fail_insert.store(false, Ordering::SeqCst);
    assert!(!room.request(1, 1).await.queued);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_failed_activation_gives_slot_back() {
    let (room, store) = TestRoom::flaky(1);
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;

    // Free the slot without running promotion.
    let holder = room.stored(&a).await;
    room.store
        .put(AdmissionToken {
            status: TokenStatus::Cancelled,
            ..holder
        })
        .await;

    store.fail_activate.store(true, Ordering::SeqCst);
    let err = room
        .service
        .activate_token(token_of(&b), OwnerId::new(2), ResourceId::new(1), SUB)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert_eq!(room.counter(1).await, Some(0));
    assert_eq!(room.stored(&b).await.status, TokenStatus::Waiting);

    store.fail_activate.store(false, Ordering::SeqCst);
    let state = room
        .service
        .activate_token(token_of(&b), OwnerId::new(2), ResourceId::new(1), SUB)
        .await
        .unwrap();
    assert_eq!(state.status, TokenStatus::Active);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_failed_promotion_gives_slot_back() {
    let (room, store) = TestRoom::flaky(1);
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;

    store.fail_activate.store(true, Ordering::SeqCst);
    assert!(room.service.mark_used(token_of(&a)).await.is_err());
    assert_eq!(room.stored(&a).await.status, TokenStatus::Used);
    assert_eq!(room.stored(&b).await.status, TokenStatus::Waiting);
    assert_eq!(room.counter(1).await, Some(0));
    assert_eq!(room.durable_active(1).await, 0);

    store.fail_activate.store(false, Ordering::SeqCst);
    assert_eq!(room.service.promote_next(ResourceId::new(1)).await.unwrap(), 1);
    assert_eq!(room.stored(&b).await.status, TokenStatus::Active);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_shows_stored_position() {
    let (room, store) = TestRoom::flaky(1);
    room.request(1, 1).await;
    let b = room.request(1, 2).await;
    let c = room.request(1, 3).await;
    assert_eq!(room.stored(&c).await.queue_position, 2);

    // B leaves without the line being repositioned.
    let ahead = room.stored(&b).await;
    room.store
        .put(AdmissionToken {
            status: TokenStatus::Cancelled,
            ..ahead
        })
        .await;

    store.stall_positions.store(true, Ordering::SeqCst);
    let state = room.state(&c).await;
    assert_eq!(state.status, TokenStatus::Waiting);
    assert_eq!(state.position, 2);

    store.stall_positions.store(false, Ordering::SeqCst);
    assert_eq!(room.state(&c).await.position, 1);
}
