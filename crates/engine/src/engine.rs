//! The cart engine: single owner of the in-memory cart.
//!
//! # Mutation path
//!
//! Every mutation runs to completion under the engine's lock:
//! 1. apply to the in-memory snapshot and bump its version
//! 2. save to the local store (failures degrade to memory-only, never raise)
//! 3. when authenticated, hand the snapshot to the identity's sync queue
//! 4. publish the snapshot to subscribers
//!
//! Only stock lookups and remote calls suspend, and none of them while the
//! lock is held.
//!
//! # Identity transitions
//!
//! - anonymous -> `X`: fetch `X`'s remote cart, merge it with the local cart,
//!   adopt the result (version 0), persist it and push it back. If the fetch
//!   keeps failing the cart is signed in unmerged and nothing is pushed until
//!   a later fetch succeeds and the merge has happened.
//! - `X` -> anonymous: empty the in-memory and local cart; `X`'s remote cart
//!   is left as the durable record for the next login
//! - `X` -> `Y`: logout followed by login

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use cart_sync_core::{
    CartContext, CartLine, CartSnapshot, LineKey, Price, ProductId, UserId, VariantId,
    clamp_quantity,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::identity::IdentitySignal;
use crate::merge::{CeilingTable, merge_with_report, shared_keys};
use crate::remote::RemoteCartStore;
use crate::stock::StockOracle;
use crate::store::LocalStore;
use crate::sync::{SyncQueue, SyncStatus, SyncTicket};

/// Attempts at fetching the remote cart during login before giving up.
const FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(200);
/// Backoff of the background fetch for a login that could not merge.
const MERGE_RETRY_DELAY: Duration = Duration::from_secs(1);
const MERGE_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Catalog data for the product being added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRef {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub unit_price_base: Price,
    pub unit_price_sale: Option<Price>,
    pub image: Option<String>,
}

/// Variant selection for the product being added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRef {
    pub variant_id: VariantId,
    pub name: Option<String>,
}

/// What a mutation did to the targeted line.
///
/// Quantities over the ceiling are capped rather than rejected; `clamped`
/// tells the caller that happened so it can show a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The line now holds `quantity`.
    Updated { quantity: u32, clamped: bool },
    /// The line was removed.
    Removed,
    /// Nothing to do (absent key).
    Unchanged,
    /// The line's ceiling is zero; nothing was added.
    Unavailable,
}

impl MutationOutcome {
    #[must_use]
    pub const fn clamped(self) -> bool {
        matches!(self, Self::Updated { clamped: true, .. })
    }

    #[must_use]
    pub const fn quantity(self) -> Option<u32> {
        match self {
            Self::Updated { quantity, .. } => Some(quantity),
            _ => None,
        }
    }
}

/// Result of [`CartEngine::refresh_stock`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockRefresh {
    /// Lines whose quantity was lowered to a shrunken ceiling.
    pub reclamped: Vec<LineKey>,
    /// Lines whose ceiling is now zero.
    pub unavailable: Vec<LineKey>,
    /// Lines whose ceiling could not be looked up; left untouched.
    pub failed: Vec<LineKey>,
}

/// Cart engine handle.
///
/// Cheaply cloneable via `Arc`; every clone drives the same cart. Construct
/// one per device at the application root and pass it to whatever needs it.
pub struct CartEngine<L, R, S> {
    inner: Arc<EngineInner<L, R, S>>,
}

impl<L, R, S> Clone for CartEngine<L, R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<L, R, S> {
    local: L,
    remote: Arc<R>,
    stock: S,
    state: Mutex<EngineState>,
    snapshots: watch::Sender<CartSnapshot>,
}

#[derive(Default)]
struct EngineState {
    snapshot: CartSnapshot,
    context: CartContext,
    /// Identity the local snapshot belongs to; saved with it.
    owner: Option<UserId>,
    /// Identity most recently requested; `None` before the first transition.
    target: Option<Option<UserId>>,
    /// Bumped on every identity transition and on reset while signed in.
    epoch: u64,
    /// Signed in, but the remote cart has not been merged in yet.
    merge_pending: bool,
    queues: HashMap<UserId, Arc<SyncQueue>>,
    persistence_degraded: bool,
}

impl<L, R, S> CartEngine<L, R, S>
where
    L: LocalStore,
    R: RemoteCartStore,
    S: StockOracle,
{
    /// Create an engine with an empty, anonymous cart.
    ///
    /// Call [`CartEngine::init`] to load the device's stored cart.
    #[must_use]
    pub fn new(local: L, remote: R, stock: S) -> Self {
        let (snapshots, _) = watch::channel(CartSnapshot::empty());
        Self {
            inner: Arc::new(EngineInner {
                local,
                remote: Arc::new(remote),
                stock,
                state: Mutex::new(EngineState::default()),
                snapshots,
            }),
        }
    }

    /// Load the device's cart from the local store.
    ///
    /// Corrupt or unreadable data yields an empty cart. Lines that violate
    /// the quantity invariant are repaired on the way in.
    ///
    /// A cart saved during a signed-in session remembers its identity. The
    /// first identity transition keeps it only for that same identity and
    /// empties it for anyone else, guests included.
    pub fn init(&self) -> CartSnapshot {
        let stored = self.inner.local.load_or_empty();
        let loaded = repair(&stored.snapshot);
        let mut state = self.lock_state();
        state.snapshot = loaded;
        state.owner = stored.owner;
        info!(
            lines = state.snapshot.len(),
            version = state.snapshot.version(),
            owner = ?state.owner,
            "Cart loaded"
        );
        self.publish(&state);
        state.snapshot.clone()
    }

    /// Empty the in-memory and local cart without touching any remote cart.
    ///
    /// A signed-in session continues; its next push supersedes everything
    /// sent before the reset.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        if state.context.identity().is_some() {
            state.epoch += 1;
        }
        self.reset_locked(&mut state);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.lock_state().snapshot.clone()
    }

    #[must_use]
    pub fn context(&self) -> CartContext {
        self.lock_state().context
    }

    /// Total units across purchasable lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lock_state().snapshot.item_count()
    }

    /// Sale-or-base price × quantity, summed over purchasable lines.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.lock_state().snapshot.subtotal()
    }

    /// Lines that can no longer be purchased (ceiling zero).
    #[must_use]
    pub fn unavailable_lines(&self) -> Vec<CartLine> {
        self.lock_state()
            .snapshot
            .unavailable_lines()
            .cloned()
            .collect()
    }

    /// Receiver that observes every snapshot change, for reactive rendering.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Whether the last local save failed.
    #[must_use]
    pub fn persistence_degraded(&self) -> bool {
        self.lock_state().persistence_degraded
    }

    /// Sync health for the current identity; `None` when anonymous.
    #[must_use]
    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.current_queue().map(|queue| queue.status())
    }

    /// Ticket of the snapshot the remote store holds authoritatively for the
    /// current identity.
    #[must_use]
    pub fn authoritative_ticket(&self) -> Option<SyncTicket> {
        self.current_queue()
            .and_then(|queue| queue.gate().acknowledged())
    }

    /// Whether the signed-in identity's remote cart still has to be merged
    /// in. Nothing is pushed until it has.
    #[must_use]
    pub fn remote_merge_pending(&self) -> bool {
        self.lock_state().merge_pending
    }

    /// Wait until every pending sync for the current identity has finished.
    ///
    /// A login whose remote fetch failed tries the fetch once more first, so
    /// a recovered remote receives the merged cart before this returns.
    pub async fn flush(&self) {
        if let Some(identity) = self.context().identity() {
            self.complete_pending_merge(identity).await;
        }
        if let Some(queue) = self.current_queue() {
            queue.wait_idle().await;
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `quantity` units of a product or variant.
    ///
    /// An existing line accumulates; a new line takes its ceiling from the
    /// stock oracle. The result is capped to the ceiling.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Stock` if the line is new and its ceiling cannot be
    /// looked up.
    #[instrument(skip(self, product, variant), fields(product_id = %product.product_id))]
    pub async fn add_item(
        &self,
        product: &ProductRef,
        variant: Option<&VariantRef>,
        quantity: u32,
    ) -> Result<MutationOutcome> {
        let key = LineKey::new(product.product_id, variant.map(|v| v.variant_id));
        let mut ceiling = None;

        loop {
            if let Some(outcome) = self.try_add(key, product, variant, quantity, ceiling) {
                debug!(key = %key, ?outcome, "Added item");
                return Ok(outcome);
            }
            ceiling = Some(self.inner.stock.current_ceiling(key).await?);
        }
    }

    /// Set a line's quantity; zero or less removes it.
    pub fn update_quantity(&self, key: LineKey, quantity: i64) -> MutationOutcome {
        if quantity <= 0 {
            return self.remove_item(key);
        }

        let outcome = self.commit(|snapshot| {
            let Some(line) = snapshot.get_mut(&key) else {
                return (MutationOutcome::Unchanged, false);
            };
            if !line.is_available() {
                return (MutationOutcome::Unavailable, false);
            }
            let (quantity, clamped) = clamp_quantity(quantity.unsigned_abs(), line.max_quantity);
            let changed = quantity != line.quantity;
            line.quantity = quantity;
            (MutationOutcome::Updated { quantity, clamped }, changed)
        });
        debug!(key = %key, ?outcome, "Updated quantity");
        outcome
    }

    /// Remove a line; a no-op when absent.
    pub fn remove_item(&self, key: LineKey) -> MutationOutcome {
        let outcome = self.commit(|snapshot| match snapshot.remove(&key) {
            Some(_) => (MutationOutcome::Removed, true),
            None => (MutationOutcome::Unchanged, false),
        });
        debug!(key = %key, ?outcome, "Removed item");
        outcome
    }

    /// Remove every line. Returns whether anything was removed.
    pub fn clear_cart(&self) -> bool {
        let cleared = self.commit(|snapshot| {
            let had_lines = !snapshot.is_empty();
            snapshot.clear();
            (had_lines, had_lines)
        });
        debug!(cleared, "Cleared cart");
        cleared
    }

    /// Re-query the stock ceiling of every line and re-clamp quantities.
    ///
    /// Lines whose ceiling dropped to zero are kept and reported as
    /// unavailable. Counts as a mutation only if something changed.
    pub async fn refresh_stock(&self) -> StockRefresh {
        let keys: Vec<LineKey> = self.lock_state().snapshot.keys().copied().collect();

        let mut fresh = Vec::with_capacity(keys.len());
        let mut failed = Vec::new();
        for key in keys {
            match self.inner.stock.current_ceiling(key).await {
                Ok(ceiling) => fresh.push((key, ceiling)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Stock refresh failed for line");
                    failed.push(key);
                }
            }
        }

        let refresh = self.commit(|snapshot| {
            let mut refresh = StockRefresh {
                failed,
                ..StockRefresh::default()
            };
            let mut changed = false;
            for (key, ceiling) in fresh {
                // Removed while we were looking it up.
                let Some(line) = snapshot.get_mut(&key) else {
                    continue;
                };
                if line.max_quantity != ceiling {
                    line.max_quantity = ceiling;
                    changed = true;
                }
                if ceiling == 0 {
                    refresh.unavailable.push(key);
                } else if line.quantity > ceiling {
                    line.quantity = ceiling;
                    refresh.reclamped.push(key);
                    changed = true;
                }
            }
            (refresh, changed)
        });

        if !refresh.reclamped.is_empty() || !refresh.unavailable.is_empty() {
            info!(
                reclamped = refresh.reclamped.len(),
                unavailable = refresh.unavailable.len(),
                "Stock refresh adjusted cart"
            );
        }
        refresh
    }

    // =========================================================================
    // Identity transitions
    // =========================================================================

    /// Spawn a task that applies every change of `signal` to this engine,
    /// starting with its current identity.
    pub fn watch_identity(&self, signal: &impl IdentitySignal) -> JoinHandle<()> {
        let mut identities = signal.subscribe();
        identities.mark_unchanged();
        let initial = signal.current_identity();
        let engine = self.clone();
        tokio::spawn(async move {
            engine.handle_identity_change(initial).await;
            while identities.changed().await.is_ok() {
                let next = *identities.borrow_and_update();
                engine.handle_identity_change(next).await;
            }
        })
    }

    /// Move the cart to `next`'s context.
    ///
    /// Repeating the current identity is a no-op. A login superseded by a
    /// newer transition while its remote fetch is in flight is discarded.
    #[instrument(skip(self))]
    pub async fn handle_identity_change(&self, next: Option<UserId>) {
        let Some(epoch) = self.begin_transition(next) else {
            return;
        };
        if let Some(identity) = next {
            self.sign_in(identity, epoch).await;
        }
    }

    /// Record the requested identity and sign out of the current one.
    ///
    /// Returns the new epoch, or `None` if `next` is already the target.
    fn begin_transition(&self, next: Option<UserId>) -> Option<u64> {
        let mut state = self.lock_state();
        if state.target == Some(next) {
            return None;
        }
        state.target = Some(next);
        state.epoch += 1;
        state.merge_pending = false;

        if let CartContext::Authenticated(previous) = state.context {
            state.context = CartContext::Anonymous;
            self.reset_locked(&mut state);
            clear_sentry_user();
            add_breadcrumb("cart.identity", "Signed out", &[]);
            info!(user_id = %previous, "Cart signed out, local cart cleared");
        } else if let Some(owner) = state.owner
            && state.owner != next
        {
            // Restored from a session that ended without a logout.
            self.reset_locked(&mut state);
            info!(user_id = %owner, "Discarded local cart saved for another identity");
        }

        prune_queues(&mut state, next);
        Some(state.epoch)
    }

    async fn sign_in(&self, identity: UserId, epoch: u64) {
        let queue = self.queue_for(identity);

        // A push from an earlier session must land before we read.
        queue.wait_idle().await;
        let Some(remote) = self.fetch_remote(identity).await else {
            self.sign_in_unmerged(identity, epoch);
            return;
        };
        let ceilings = self
            .fetch_ceilings(&shared_keys(&self.snapshot(), &remote))
            .await;

        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!(user_id = %identity, "Login superseded by a newer identity change");
            return;
        }
        state.context = CartContext::Authenticated(identity);
        self.adopt_merged(&mut state, identity, &remote, &ceilings);

        set_sentry_user(&identity);
        add_breadcrumb("cart.identity", "Signed in", &[]);
        info!(
            user_id = %identity,
            lines = state.snapshot.len(),
            "Cart signed in and merged"
        );
    }

    /// Sign in keeping the local cart as is, with the merge deferred.
    ///
    /// Pushing now would overwrite remote-only lines, so sync stays off until
    /// a retried fetch succeeds.
    fn sign_in_unmerged(&self, identity: UserId, epoch: u64) {
        {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                debug!(user_id = %identity, "Login superseded by a newer identity change");
                return;
            }
            state.context = CartContext::Authenticated(identity);
            state.owner = Some(identity);
            state.merge_pending = true;
            self.persist(&mut state);
        }

        set_sentry_user(&identity);
        add_breadcrumb("cart.identity", "Signed in, remote cart merge deferred", &[]);
        warn!(user_id = %identity, "Cart signed in without its remote cart, sync paused until merged");
        self.spawn_merge_retry(identity);
    }

    /// Retry the deferred merge in the background with exponential backoff.
    ///
    /// Stops once no merge is pending for `identity` or the engine is gone.
    fn spawn_merge_retry(&self, identity: UserId) {
        let weak: Weak<EngineInner<L, R, S>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut delay = MERGE_RETRY_DELAY;
            loop {
                tokio::time::sleep(delay).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if (Self { inner }).complete_pending_merge(identity).await {
                    return;
                }
                delay = (delay * 2).min(MERGE_RETRY_MAX_DELAY);
            }
        });
    }

    /// Fetch and merge the remote cart of a login that signed in unmerged.
    ///
    /// Returns `false` while the merge is still pending.
    async fn complete_pending_merge(&self, identity: UserId) -> bool {
        if !self.merge_pending_for(identity) {
            return true;
        }
        let remote = match self.inner.remote.fetch(identity).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(user_id = %identity, error = %e, "Remote cart still unreachable, merge deferred");
                return false;
            }
        };
        let ceilings = self
            .fetch_ceilings(&shared_keys(&self.snapshot(), &remote))
            .await;

        let mut state = self.lock_state();
        if !(state.merge_pending && state.context == CartContext::Authenticated(identity)) {
            return true;
        }
        self.adopt_merged(&mut state, identity, &remote, &ceilings);
        add_breadcrumb("cart.sync", "Deferred remote cart merge completed", &[]);
        info!(
            user_id = %identity,
            lines = state.snapshot.len(),
            "Deferred remote cart merge completed"
        );
        true
    }

    fn merge_pending_for(&self, identity: UserId) -> bool {
        let state = self.lock_state();
        state.merge_pending && state.context == CartContext::Authenticated(identity)
    }

    /// Merge `remote` into the local cart, then persist, push and publish.
    fn adopt_merged(
        &self,
        state: &mut EngineState,
        identity: UserId,
        remote: &CartSnapshot,
        ceilings: &CeilingTable,
    ) {
        // Read the local cart now so mutations made during the fetch survive.
        let merged = merge_with_report(&state.snapshot, remote, ceilings);
        if !merged.report.is_clean() {
            info!(
                clamped = ?merged.report.clamped,
                unavailable = ?merged.report.unavailable,
                "Merge adjusted cart lines"
            );
        }
        state.snapshot = merged.snapshot;
        state.owner = Some(identity);
        state.merge_pending = false;
        self.persist(state);
        self.enqueue_sync(state);
        self.publish(state);
    }

    /// Fetch the remote cart, retrying a few times.
    ///
    /// `None` means every attempt failed.
    async fn fetch_remote(&self, identity: UserId) -> Option<CartSnapshot> {
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.inner.remote.fetch(identity).await {
                Ok(snapshot) => return Some(snapshot),
                Err(e) => {
                    warn!(user_id = %identity, attempt, error = %e, "Remote cart fetch failed");
                    if attempt < FETCH_ATTEMPTS {
                        tokio::time::sleep(FETCH_RETRY_DELAY * attempt).await;
                    }
                }
            }
        }
        add_breadcrumb("cart.sync", "Remote cart fetch failed, merge deferred", &[]);
        None
    }

    async fn fetch_ceilings(&self, keys: &[LineKey]) -> CeilingTable {
        let mut ceilings = CeilingTable::with_capacity(keys.len());
        for &key in keys {
            match self.inner.stock.current_ceiling(key).await {
                Ok(ceiling) => {
                    ceilings.insert(key, ceiling);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Stock lookup failed during merge, using stored ceiling");
                }
            }
        }
        ceilings
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current_queue(&self) -> Option<Arc<SyncQueue>> {
        let state = self.lock_state();
        state
            .context
            .identity()
            .and_then(|identity| state.queues.get(&identity).cloned())
    }

    fn queue_for(&self, identity: UserId) -> Arc<SyncQueue> {
        let mut state = self.lock_state();
        let remote = &self.inner.remote;
        Arc::clone(
            state
                .queues
                .entry(identity)
                .or_insert_with(|| Arc::new(SyncQueue::spawn(identity, Arc::clone(remote)))),
        )
    }

    fn try_add(
        &self,
        key: LineKey,
        product: &ProductRef,
        variant: Option<&VariantRef>,
        quantity: u32,
        ceiling: Option<u32>,
    ) -> Option<MutationOutcome> {
        self.commit(|snapshot| {
            if let Some(line) = snapshot.get_mut(&key) {
                if !line.is_available() {
                    return (Some(MutationOutcome::Unavailable), false);
                }
                let requested = u64::from(line.quantity) + u64::from(quantity);
                let (quantity, clamped) = clamp_quantity(requested, line.max_quantity);
                let changed = quantity != line.quantity;
                line.quantity = quantity;
                return (Some(MutationOutcome::Updated { quantity, clamped }), changed);
            }

            // New line: needs a ceiling from the stock oracle first.
            let Some(ceiling) = ceiling else {
                return (None, false);
            };
            if ceiling == 0 {
                return (Some(MutationOutcome::Unavailable), false);
            }
            let (quantity, clamped) = clamp_quantity(u64::from(quantity), ceiling);
            snapshot.insert(new_line(product, variant, quantity, ceiling));
            (Some(MutationOutcome::Updated { quantity, clamped }), true)
        })
    }

    /// Apply `mutate` under the lock; on change bump, persist, sync, publish.
    fn commit<T>(&self, mutate: impl FnOnce(&mut CartSnapshot) -> (T, bool)) -> T {
        let mut state = self.lock_state();
        let (outcome, changed) = mutate(&mut state.snapshot);
        if changed {
            state.snapshot.bump_version();
            self.persist(&mut state);
            self.enqueue_sync(&state);
            self.publish(&state);
        }
        outcome
    }

    fn reset_locked(&self, state: &mut EngineState) {
        state.snapshot = CartSnapshot::empty();
        state.owner = state.context.identity();
        self.persist(state);
        self.publish(state);
    }

    fn persist(&self, state: &mut EngineState) {
        match self.inner.local.save(state.owner, &state.snapshot) {
            Ok(()) => {
                if state.persistence_degraded {
                    info!("Local cart persistence recovered");
                }
                state.persistence_degraded = false;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    version = state.snapshot.version(),
                    "Failed to persist cart locally, continuing in memory"
                );
                state.persistence_degraded = true;
            }
        }
    }

    fn enqueue_sync(&self, state: &EngineState) {
        let CartContext::Authenticated(identity) = state.context else {
            return;
        };
        // A push before the merge would overwrite the remote cart.
        if state.merge_pending {
            return;
        }
        if let Some(queue) = state.queues.get(&identity) {
            queue.enqueue(
                SyncTicket::new(state.epoch, state.snapshot.version()),
                state.snapshot.clone(),
            );
        }
    }

    fn publish(&self, state: &EngineState) {
        self.inner.snapshots.send_replace(state.snapshot.clone());
    }
}

/// Drop idle sync queues of every identity but `keep`; their workers exit.
///
/// A queue with work outstanding stays so a later login of its identity is
/// still ordered after it.
fn prune_queues(state: &mut EngineState, keep: Option<UserId>) {
    state
        .queues
        .retain(|&identity, queue| Some(identity) == keep || !queue.status().is_idle());
}

fn new_line(
    product: &ProductRef,
    variant: Option<&VariantRef>,
    quantity: u32,
    max_quantity: u32,
) -> CartLine {
    CartLine {
        product_id: product.product_id,
        variant_id: variant.map(|v| v.variant_id),
        name: product.name.clone(),
        variant_name: variant.and_then(|v| v.name.clone()),
        sku: product.sku.clone(),
        unit_price_base: product.unit_price_base,
        unit_price_sale: product.unit_price_sale,
        image: product.image.clone(),
        quantity,
        max_quantity,
    }
}

/// Drop zero-quantity lines and cap quantities above a positive ceiling.
fn repair(snapshot: &CartSnapshot) -> CartSnapshot {
    let version = snapshot.version();
    let lines = snapshot
        .lines()
        .filter(|line| line.quantity > 0)
        .cloned()
        .map(|mut line| {
            if line.is_available() && line.quantity > line.max_quantity {
                line.quantity = line.max_quantity;
            }
            line
        });
    CartSnapshot::from_lines(lines, version)
}
