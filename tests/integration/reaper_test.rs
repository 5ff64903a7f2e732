//! Reaper sweeps over a populated room.

use chrono::Duration;

use waitroom_core::config::AdmissionConfig;
use waitroom_core::types::{OwnerId, ResourceId, SubResourceId};
use waitroom_entity::TokenStatus;

use crate::helpers::{SUB, TestRoom, token_of};

#[tokio::test]
async fn test_sweep_reclaims_slot_whose_heartbeat_vanished() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;

    // The cache lost the record entirely.
    room.service.tracker().clear_all().await.unwrap();
    room.clock.advance(Duration::seconds(121));

    let report = room.reaper().sweep().await;
    assert_eq!(report.sessions_released, 0);
    assert_eq!(report.abandoned_expired, 1);
    assert_eq!(room.state(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.state(&b).await.status, TokenStatus::Active);
}

#[tokio::test]
async fn test_beating_session_survives_sweep() {
    let room = TestRoom::new(1);
    let a = room.request(1, 1).await;

    for _ in 0..4 {
        room.clock.advance(Duration::seconds(100));
        room.service
            .heartbeat(OwnerId::new(1), ResourceId::new(1), SUB)
            .await;
        let report = room.reaper().sweep().await;
        assert!(report.is_noop());
    }

    assert!(room
        .service
        .validate_for_operation(token_of(&a), OwnerId::new(1), ResourceId::new(1))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_orphan_counter_is_dropped() {
    let room = TestRoom::new(2);
    let a = room.request(1, 1).await;
    room.service.mark_used(token_of(&a)).await.unwrap();
    room.service
        .release_session(OwnerId::new(1), ResourceId::new(1), SUB)
        .await;
    assert_eq!(room.counter(1).await, Some(0));

    let report = room.reaper().sweep().await;
    assert_eq!(report.orphan_counters, 1);
    assert_eq!(room.counter(1).await, None);

    // A dropped entry is reseeded on next use.
    assert!(!room.request(1, 2).await.queued);
    assert_eq!(room.counter(1).await, Some(1));
}

#[tokio::test]
async fn test_repeated_sweeps_are_idempotent() {
    let room = TestRoom::new(1);
    room.request(1, 1).await;
    let b = room.request(1, 2).await;
    room.clock.advance(Duration::seconds(121));

    let first = room.reaper().sweep().await;
    let second = room.reaper().sweep().await;
    assert_eq!(first.sessions_released, 1);
    assert_eq!(second.sessions_released, 0);
    assert_eq!(second.tokens_expired, 0);
    assert_eq!(room.state(&b).await.status, TokenStatus::Active);
    assert_eq!(room.durable_active(1).await, 1);
}

#[tokio::test]
async fn test_freed_slot_skips_stale_waiter_and_fills() {
    let room = TestRoom::with_config(AdmissionConfig {
        max_active_per_resource: 1,
        inactivity_timeout_seconds: 100_000,
        active_window_seconds: 100_000,
        token_ttl_seconds: 7200,
        ..AdmissionConfig::default()
    });
    let a = room.request(1, 1).await;
    let b = room.request(1, 2).await;
    room.clock.advance(Duration::seconds(3600));
    let c = room.request(1, 3).await;
    assert!(b.queued && c.queued);

    // A and B outlive the token lifetime; C does not.
    room.clock.advance(Duration::seconds(3601));
    let report = room.reaper().sweep().await;
    assert_eq!(report.tokens_expired, 2);

    assert_eq!(room.stored(&a).await.status, TokenStatus::Expired);
    assert_eq!(room.stored(&b).await.status, TokenStatus::Expired);
    assert_eq!(room.stored(&c).await.status, TokenStatus::Active);
    assert_eq!(room.durable_active(1).await, 1);
    assert_eq!(room.counter(1).await, Some(1));

    let again = room.reaper().sweep().await;
    assert_eq!(again.tokens_expired, 0);
    assert_eq!(room.stored(&c).await.status, TokenStatus::Active);
}

#[tokio::test]
async fn test_session_moved_by_repeat_request_is_not_reaped() {
    let room = TestRoom::new(1);
    let owner = OwnerId::new(1);
    let resource = ResourceId::new(1);
    let moved = SubResourceId::new(2);
    let a = room.request(1, 1).await;

    let again = room
        .service
        .request_admission(resource, moved, owner)
        .await
        .unwrap();
    assert_eq!(again.token, a.token);

    for _ in 0..3 {
        room.clock.advance(Duration::seconds(100));
        room.service.heartbeat(owner, resource, moved).await;
        let report = room.reaper().sweep().await;
        assert!(report.is_noop(), "{report:?}");
    }

    assert!(room
        .service
        .validate_for_operation(token_of(&a), owner, resource)
        .await
        .unwrap());
}
