//! Ordering and coalescing of remote pushes across mutations and sessions.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use cart_sync::{SyncTicket, VersionGate};
use cart_sync_core::CartContext;
use cart_sync_integration_tests::{TestCart, user};

#[tokio::test]
async fn test_burst_of_mutations_coalesces() {
    let cart = TestCart::new(&[(1, 100)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.flush().await;
    assert_eq!(cart.remote.replace_calls(), 1);

    cart.remote.hold_replaces(true);
    cart.add(1, 1).await;
    cart.remote.wait_for_replace_calls(2).await;
    for _ in 0..9 {
        cart.add(1, 1).await;
    }

    cart.remote.hold_replaces(false);
    cart.engine.flush().await;

    assert_eq!(cart.remote.replace_calls(), 3);
    assert_eq!(cart.remote.max_in_flight(), 1);
    assert_eq!(
        cart.remote.applied(),
        vec![(user(1), 0), (user(1), 1), (user(1), 10)]
    );
    assert_eq!(cart.remote.stored(user(1)), Some(cart.engine.snapshot()));
}

#[tokio::test]
async fn test_relogin_waits_for_push_from_previous_session() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.flush().await;

    cart.remote.hold_replaces(true);
    cart.add(1, 2).await;
    cart.remote.wait_for_replace_calls(2).await;
    cart.engine.handle_identity_change(None).await;
    assert!(cart.engine.snapshot().is_empty());

    let engine = cart.engine.clone();
    let relogin = tokio::spawn(async move {
        engine.handle_identity_change(Some(user(1))).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cart.remote.fetch_calls(), 1);

    cart.remote.hold_replaces(false);
    relogin.await.unwrap();

    assert_eq!(cart.quantity(1), Some(2));
    assert_eq!(cart.engine.context(), CartContext::Authenticated(user(1)));
}

#[tokio::test]
async fn test_anonymous_mutation_during_login_is_merged() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.flush().await;
    cart.remote.hold_replaces(true);
    cart.add(1, 2).await;
    cart.remote.wait_for_replace_calls(2).await;
    cart.engine.handle_identity_change(None).await;

    let engine = cart.engine.clone();
    let relogin = tokio::spawn(async move {
        engine.handle_identity_change(Some(user(1))).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Still anonymous while the login is pending: stays local.
    cart.add(2, 1).await;
    assert_eq!(cart.engine.context(), CartContext::Anonymous);

    cart.remote.hold_replaces(false);
    relogin.await.unwrap();
    cart.engine.flush().await;

    assert_eq!(cart.quantity(1), Some(2));
    assert_eq!(cart.quantity(2), Some(1));
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.len()), Some(2));
}

#[tokio::test]
async fn test_superseded_login_is_discarded() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.flush().await;
    cart.remote.hold_replaces(true);
    cart.add(1, 2).await;
    cart.remote.wait_for_replace_calls(2).await;
    cart.engine.handle_identity_change(None).await;

    let engine = cart.engine.clone();
    let relogin = tokio::spawn(async move {
        engine.handle_identity_change(Some(user(1))).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Signed out again before the login could finish.
    cart.engine.handle_identity_change(None).await;
    cart.remote.hold_replaces(false);
    relogin.await.unwrap();

    assert_eq!(cart.engine.context(), CartContext::Anonymous);
    assert!(cart.engine.snapshot().is_empty());
    assert!(cart.local.stored().unwrap().is_empty());
}

#[tokio::test]
async fn test_reset_while_signed_in_supersedes_earlier_pushes() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    for _ in 0..3 {
        cart.add(1, 1).await;
    }
    cart.engine.flush().await;
    let before_reset = cart.engine.authoritative_ticket().unwrap();

    cart.engine.reset();
    assert_eq!(cart.engine.context(), CartContext::Authenticated(user(1)));
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.item_count()), Some(3));

    cart.remote.hold_replaces(true);
    cart.add(1, 1).await;
    let engine = cart.engine.clone();
    let flush = tokio::spawn(async move { engine.flush().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!flush.is_finished());

    cart.remote.hold_replaces(false);
    flush.await.unwrap();

    let ticket = cart.engine.authoritative_ticket().unwrap();
    assert!(ticket > before_reset);
    assert_eq!(ticket.version, 1);
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.item_count()), Some(1));
}

#[test]
fn test_completion_from_older_session_is_stale() {
    let gate = VersionGate::new();
    let old_session = SyncTicket::new(1, 14);
    let new_session = SyncTicket::new(3, 0);
    gate.mark_sent(old_session);
    gate.mark_sent(new_session);

    assert!(gate.acknowledge(new_session));
    assert!(!gate.acknowledge(old_session));
    assert_eq!(gate.acknowledged(), Some(new_session));
}
