//! Invariants under concurrent callers.

use std::collections::HashSet;
use std::sync::Arc;

use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::TokenStatus;

use crate::helpers::{SUB, TestRoom, token_of};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_active_tokens_never_exceed_cap() {
    let room = Arc::new(TestRoom::new(5));

    let mut handles = Vec::new();
    for owner in 1..=40 {
        let room = Arc::clone(&room);
        handles.push(tokio::spawn(async move { room.request(1, owner).await }));
    }

    let mut admitted = 0;
    for handle in handles {
        if !handle.await.unwrap().queued {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(room.durable_active(1).await, 5);
    assert_eq!(room.counter(1).await, Some(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_live_token_per_owner() {
    let room = Arc::new(TestRoom::new(1));
    room.request(1, 100).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let room = Arc::clone(&room);
        handles.push(tokio::spawn(async move { room.request(1, 7).await }));
    }

    let mut tokens = HashSet::new();
    for handle in handles {
        let ticket = handle.await.unwrap();
        assert!(ticket.queued);
        tokens.insert(token_of(&ticket).to_string());
    }
    assert_eq!(tokens.len(), 1);

    let live = room.service.owner_tokens(OwnerId::new(7)).await.unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_conserve_slots() {
    let room = Arc::new(TestRoom::new(3));

    let mut holders = Vec::new();
    for owner in 1..=3 {
        holders.push(room.request(1, owner).await);
    }
    let mut waiters = Vec::new();
    for owner in 4..=8 {
        waiters.push(room.request(1, owner).await);
    }
    assert!(holders.iter().all(|t| !t.queued));
    assert!(waiters.iter().all(|t| t.queued));

    let mut handles = Vec::new();
    for ticket in holders {
        let room = Arc::clone(&room);
        handles.push(tokio::spawn(async move {
            room.service.mark_used(token_of(&ticket)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(room.durable_active(1).await, 3);
    assert_eq!(room.counter(1).await, Some(3));

    // The three earliest waiters got the slots.
    for (index, ticket) in waiters.iter().enumerate() {
        let expected = if index < 3 {
            TokenStatus::Active
        } else {
            TokenStatus::Waiting
        };
        assert_eq!(room.state(ticket).await.status, expected);
    }
    let last = room.state(&waiters[4]).await;
    assert_eq!(last.position, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resources_do_not_share_slots() {
    let room = Arc::new(TestRoom::new(2));

    let mut handles = Vec::new();
    for resource in 1..=4 {
        for owner in 1..=6 {
            let room = Arc::clone(&room);
            handles.push(tokio::spawn(async move {
                room.service
                    .request_admission(ResourceId::new(resource), SUB, OwnerId::new(owner))
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for resource in 1..=4 {
        assert_eq!(room.durable_active(resource).await, 2);
        let stats = room
            .service
            .queue_stats(ResourceId::new(resource))
            .await
            .unwrap();
        assert_eq!(stats.waiting, 4);
    }
}
