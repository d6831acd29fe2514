//! End-to-end shopper flows across anonymous browsing, login and logout.

#![allow(clippy::unwrap_used)]

use cart_sync::{IdentityChannel, MemoryRemote, MemoryStore, MutationOutcome};
use cart_sync_core::{CartContext, CartSnapshot};
use cart_sync_integration_tests::{TestCart, key, snapshot, user, wait_until};
use rust_decimal::Decimal;

// =============================================================================
// Anonymous Cart
// =============================================================================

#[tokio::test]
async fn test_adds_accumulate_up_to_stock_ceiling() {
    let cart = TestCart::new(&[(1, 5)]);

    cart.add(1, 2).await;
    assert_eq!(cart.quantity(1), Some(2));

    cart.add(1, 3).await;
    assert_eq!(cart.quantity(1), Some(5));

    let outcome = cart.add(1, 1).await;
    assert!(outcome.clamped());
    assert_eq!(cart.quantity(1), Some(5));
    assert_eq!(cart.engine.item_count(), 5);
    assert_eq!(cart.engine.subtotal().amount, Decimal::new(500, 2));
}

#[tokio::test]
async fn test_anonymous_cart_never_touches_remote() {
    let cart = TestCart::new(&[(1, 5)]);
    cart.add(1, 2).await;
    cart.engine.update_quantity(key(1), 4);
    cart.engine.flush().await;

    assert_eq!(cart.remote.replace_calls(), 0);
    assert_eq!(cart.remote.fetch_calls(), 0);
    assert!(cart.engine.sync_status().is_none());
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_merges_anonymous_cart_into_remote_cart() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.remote
        .seed(user(1), snapshot(&[(1, 1, 10), (2, 2, 10)], 6));
    cart.add(1, 3).await;

    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.flush().await;

    let merged = cart.engine.snapshot();
    assert_eq!(merged.version(), 0);
    assert_eq!(cart.quantity(1), Some(3));
    assert_eq!(cart.quantity(2), Some(2));
    assert_eq!(cart.engine.context(), CartContext::Authenticated(user(1)));

    let remote = cart.remote.stored(user(1)).unwrap();
    assert!(remote.same_lines(&merged));
    assert_eq!(cart.local.stored(), Some(merged));
}

#[tokio::test]
async fn test_login_clamps_combined_quantity_to_fresh_stock() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.add(1, 4).await;
    cart.remote.seed(user(1), snapshot(&[(1, 6, 10)], 2));

    // Stock dropped since the remote cart was written.
    cart.stock.set(key(1), 5);
    cart.engine.handle_identity_change(Some(user(1))).await;

    let line = cart.engine.snapshot().get(&key(1)).cloned().unwrap();
    assert_eq!(line.quantity, 5);
    assert_eq!(line.max_quantity, 5);
}

#[tokio::test]
async fn test_login_surfaces_sold_out_lines() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.add(1, 2).await;
    cart.remote.seed(user(1), snapshot(&[(1, 1, 10)], 1));

    cart.stock.set(key(1), 0);
    cart.engine.handle_identity_change(Some(user(1))).await;

    assert_eq!(cart.engine.unavailable_lines().len(), 1);
    assert_eq!(cart.engine.item_count(), 0);
    assert_eq!(
        cart.engine.update_quantity(key(1), 3),
        MutationOutcome::Unavailable
    );
    assert_eq!(cart.engine.remove_item(key(1)), MutationOutcome::Removed);
}

#[tokio::test]
async fn test_repeated_identity_is_noop() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.handle_identity_change(None).await;
    cart.engine.handle_identity_change(None).await;

    assert_eq!(cart.remote.fetch_calls(), 1);
}

#[tokio::test]
async fn test_mutations_while_authenticated_reach_remote() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;

    cart.add(1, 2).await;
    cart.add(2, 1).await;
    cart.engine.update_quantity(key(1), 7);
    cart.engine.flush().await;

    let local = cart.engine.snapshot();
    let remote = cart.remote.stored(user(1)).unwrap();
    assert_eq!(remote, local);
    assert_eq!(local.version(), 3);

    let status = cart.engine.sync_status().unwrap();
    assert!(status.is_idle());
    assert!(status.last_error.is_none());
    assert!(status.last_synced_at.is_some());
    assert_eq!(status.acknowledged, cart.engine.authoritative_ticket());
}

#[tokio::test]
async fn test_login_with_unreachable_remote_keeps_local_cart() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.add(1, 2).await;
    cart.remote.set_failing(true);

    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.engine.flush().await;

    assert_eq!(cart.quantity(1), Some(2));
    assert_eq!(cart.engine.context(), CartContext::Authenticated(user(1)));
    assert!(cart.engine.remote_merge_pending());
    assert_eq!(cart.remote.replace_calls(), 0);

    // Once the remote is back, the next flush merges and pushes.
    cart.remote.set_failing(false);
    cart.add(1, 1).await;
    cart.engine.flush().await;

    assert!(!cart.engine.remote_merge_pending());
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.item_count()), Some(3));
    assert!(cart.engine.sync_status().unwrap().last_error.is_none());
}

#[tokio::test]
async fn test_unreachable_remote_at_login_never_overwrites_remote_cart() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.remote.seed(user(1), snapshot(&[(2, 2, 10)], 5));
    cart.add(1, 2).await;
    cart.remote.set_failing(true);

    cart.engine.handle_identity_change(Some(user(1))).await;

    // Mutations while the merge is pending stay local.
    cart.remote.set_failing(false);
    cart.engine.update_quantity(key(1), 3);
    assert_eq!(cart.remote.replace_calls(), 0);

    cart.engine.flush().await;

    assert_eq!(cart.quantity(1), Some(3));
    assert_eq!(cart.quantity(2), Some(2));
    let remote = cart.remote.stored(user(1)).unwrap();
    assert!(remote.same_lines(&cart.engine.snapshot()));
    assert_eq!(remote.get(&key(2)).map(|line| line.quantity), Some(2));
}

#[tokio::test]
async fn test_deferred_merge_completes_in_background() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.remote.seed(user(1), snapshot(&[(2, 1, 10)], 2));
    cart.add(1, 1).await;
    cart.remote.set_failing(true);
    cart.engine.handle_identity_change(Some(user(1))).await;
    assert!(cart.engine.remote_merge_pending());

    cart.remote.set_failing(false);
    wait_until(|| !cart.engine.remote_merge_pending()).await;
    cart.engine.flush().await;

    assert_eq!(cart.quantity(2), Some(1));
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.len()), Some(2));
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout_clears_device_but_keeps_remote() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.add(1, 2).await;
    cart.engine.flush().await;

    cart.engine.handle_identity_change(None).await;

    assert!(cart.engine.snapshot().is_empty());
    assert_eq!(cart.local.stored(), Some(CartSnapshot::empty()));
    assert_eq!(cart.engine.context(), CartContext::Anonymous);
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.item_count()), Some(2));

    // Logging back in restores the cart.
    cart.engine.handle_identity_change(Some(user(1))).await;
    assert_eq!(cart.quantity(1), Some(2));
}

#[tokio::test]
async fn test_clear_while_authenticated_empties_both_sides() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.add(1, 2).await;
    cart.add(2, 2).await;

    assert!(cart.engine.clear_cart());
    cart.engine.flush().await;

    assert!(cart.engine.snapshot().is_empty());
    assert!(cart.local.stored().unwrap().is_empty());
    assert!(cart.remote.stored(user(1)).unwrap().is_empty());
}

#[tokio::test]
async fn test_switching_users_does_not_leak_carts() {
    let cart = TestCart::new(&[(1, 10), (2, 10)]);
    cart.remote.seed(user(2), snapshot(&[(2, 1, 10)], 4));

    cart.engine.handle_identity_change(Some(user(1))).await;
    cart.add(1, 3).await;
    cart.engine.flush().await;

    cart.engine.handle_identity_change(Some(user(2))).await;
    cart.engine.flush().await;

    assert_eq!(cart.quantity(1), None);
    assert_eq!(cart.quantity(2), Some(1));
    assert_eq!(cart.remote.stored(user(1)).map(|s| s.item_count()), Some(3));
    assert_eq!(cart.remote.stored(user(2)).map(|s| s.item_count()), Some(1));
}

// =============================================================================
// Identity Signal
// =============================================================================

#[tokio::test]
async fn test_engine_follows_identity_channel() {
    let cart = TestCart::with_store(MemoryStore::new(), MemoryRemote::new(), &[(1, 10)]);
    cart.remote.seed(user(3), snapshot(&[(1, 4, 10)], 1));
    let identity = IdentityChannel::default();
    let watcher = cart.engine.watch_identity(&identity);

    identity.sign_in(user(3));
    wait_until(|| cart.engine.context() == CartContext::Authenticated(user(3))).await;
    assert_eq!(cart.quantity(1), Some(4));

    identity.sign_out();
    wait_until(|| cart.engine.context() == CartContext::Anonymous).await;
    assert!(cart.engine.snapshot().is_empty());

    drop(identity);
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_engine_starts_from_signal_current_identity() {
    let cart = TestCart::new(&[(1, 10)]);
    cart.remote.seed(user(4), snapshot(&[(1, 2, 10)], 1));
    let identity = IdentityChannel::new(Some(user(4)));

    let watcher = cart.engine.watch_identity(&identity);
    wait_until(|| cart.engine.context() == CartContext::Authenticated(user(4))).await;
    assert_eq!(cart.quantity(1), Some(2));
    assert_eq!(cart.remote.fetch_calls(), 1);

    drop(identity);
    watcher.await.unwrap();
}
