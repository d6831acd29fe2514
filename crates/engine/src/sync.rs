//! Ordered synchronization of cart snapshots to the remote cart store.
//!
//! # Ordering
//!
//! Every identity gets one [`SyncQueue`] with a single worker task, so at most
//! one `replace` is in flight per identity. Pending work is a one-slot
//! `watch` channel: a snapshot enqueued while a call is in flight overwrites
//! any earlier pending snapshot, so a burst of mutations costs at most two
//! calls (the in-flight one and one carrying the final state).
//!
//! Each request carries a [`SyncTicket`] `(epoch, version)`. The epoch changes
//! on every identity transition, which keeps tickets increasing even though a
//! merge restarts the snapshot version at 0. The [`VersionGate`] only accepts
//! a completion whose ticket is newer than the last accepted one; anything
//! older is ignored, never applied over newer state.
//!
//! A queue outlives logout of its identity: a later login for the same
//! identity reuses it, so a push still in flight from the earlier session is
//! ordered before anything the new session sends.

use std::sync::{Arc, Mutex, PoisonError};

use cart_sync_core::{CartSnapshot, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::add_breadcrumb;
use crate::remote::RemoteCartStore;

/// Orders sync requests across identity sessions and snapshot versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncTicket {
    /// Identity-transition counter of the engine when the request was made.
    pub epoch: u64,
    /// Snapshot version carried by the request.
    pub version: u64,
}

impl SyncTicket {
    #[must_use]
    pub const fn new(epoch: u64, version: u64) -> Self {
        Self { epoch, version }
    }
}

impl std::fmt::Display for SyncTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.epoch, self.version)
    }
}

/// Tracks the newest ticket sent and the newest ticket accepted as authoritative.
#[derive(Debug, Default)]
pub struct VersionGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default, Clone, Copy)]
struct GateState {
    sent: Option<SyncTicket>,
    acknowledged: Option<SyncTicket>,
}

impl VersionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a request with `ticket` was sent.
    pub fn mark_sent(&self, ticket: SyncTicket) {
        let mut state = self.lock();
        if state.sent.is_none_or(|sent| ticket > sent) {
            state.sent = Some(ticket);
        }
    }

    /// Accept the completion of `ticket` if it is newer than anything accepted.
    ///
    /// Returns `false` for a stale completion, which the caller must ignore.
    pub fn acknowledge(&self, ticket: SyncTicket) -> bool {
        let mut state = self.lock();
        if state.acknowledged.is_some_and(|acked| ticket <= acked) {
            return false;
        }
        state.acknowledged = Some(ticket);
        true
    }

    /// Highest ticket sent so far.
    #[must_use]
    pub fn sent(&self) -> Option<SyncTicket> {
        self.lock().sent
    }

    /// Ticket whose snapshot is the authoritative remote state.
    #[must_use]
    pub fn acknowledged(&self) -> Option<SyncTicket> {
        self.lock().acknowledged
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Health of an identity's synchronization, for display and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Newest ticket handed to the queue.
    pub enqueued: Option<SyncTicket>,
    /// Newest ticket whose request finished, successfully or not.
    pub completed: Option<SyncTicket>,
    /// Newest ticket the remote store acknowledged.
    pub acknowledged: Option<SyncTicket>,
    /// Error from the most recent failed request, cleared by a success.
    pub last_error: Option<String>,
    /// When the remote store last acknowledged a snapshot.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Whether a `replace` call is running.
    pub in_flight: bool,
}

impl SyncStatus {
    /// Every enqueued request has finished.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.in_flight
            && match (self.enqueued, self.completed) {
                (None, _) => true,
                (Some(enqueued), Some(completed)) => completed >= enqueued,
                (Some(_), None) => false,
            }
    }
}

#[derive(Debug, Clone)]
struct SyncRequest {
    ticket: SyncTicket,
    snapshot: CartSnapshot,
}

/// Single-flight sync queue for one identity.
#[derive(Debug)]
pub(crate) struct SyncQueue {
    identity: UserId,
    pending: watch::Sender<Option<SyncRequest>>,
    status: Arc<watch::Sender<SyncStatus>>,
    gate: Arc<VersionGate>,
}

impl SyncQueue {
    /// Create the queue and spawn its worker on the current Tokio runtime.
    pub(crate) fn spawn<R: RemoteCartStore>(identity: UserId, remote: Arc<R>) -> Self {
        let (pending, requests) = watch::channel(None);
        let (status, _) = watch::channel(SyncStatus::default());
        let status = Arc::new(status);
        let gate = Arc::new(VersionGate::new());

        tokio::spawn(run_worker(
            identity,
            remote,
            requests,
            Arc::clone(&status),
            Arc::clone(&gate),
        ));
        debug!(user_id = %identity, "Spawned cart sync worker");

        Self {
            identity,
            pending,
            status,
            gate,
        }
    }

    /// Queue `snapshot` as the latest state for this identity.
    ///
    /// Supersedes any request that has not started yet. Never blocks.
    pub(crate) fn enqueue(&self, ticket: SyncTicket, snapshot: CartSnapshot) {
        self.status.send_modify(|status| {
            if status.enqueued.is_none_or(|enqueued| ticket > enqueued) {
                status.enqueued = Some(ticket);
            }
        });
        self.pending
            .send_replace(Some(SyncRequest { ticket, snapshot }));
        debug!(user_id = %self.identity, %ticket, "Cart sync request queued");
    }

    pub(crate) fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn gate(&self) -> &VersionGate {
        &self.gate
    }

    /// Wait until every request enqueued so far has finished.
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(SyncStatus::is_idle).await;
    }
}

#[instrument(skip_all, fields(user_id = %identity))]
async fn run_worker<R: RemoteCartStore>(
    identity: UserId,
    remote: Arc<R>,
    mut requests: watch::Receiver<Option<SyncRequest>>,
    status: Arc<watch::Sender<SyncStatus>>,
    gate: Arc<VersionGate>,
) {
    // Exits once the queue is dropped and the last pending request is handled.
    while requests.changed().await.is_ok() {
        let Some(request) = requests.borrow_and_update().clone() else {
            continue;
        };
        let ticket = request.ticket;

        status.send_modify(|s| s.in_flight = true);
        gate.mark_sent(ticket);

        let result = remote.replace(identity, &request.snapshot).await;

        match result {
            Ok(()) => {
                if gate.acknowledge(ticket) {
                    info!(%ticket, lines = request.snapshot.len(), "Cart synced to remote");
                    status.send_modify(|s| {
                        s.acknowledged = Some(ticket);
                        s.last_error = None;
                        s.last_synced_at = Some(Utc::now());
                    });
                } else {
                    debug!(%ticket, "Ignoring stale sync completion");
                }
            }
            Err(e) => {
                // Local state stays authoritative; the next mutation retries
                // with the full snapshot.
                warn!(%ticket, error = %e, "Cart sync failed");
                let ticket_label = ticket.to_string();
                add_breadcrumb(
                    "cart.sync",
                    "Cart sync failed",
                    &[("ticket", ticket_label.as_str())],
                );
                status.send_modify(|s| s.last_error = Some(e.to_string()));
            }
        }

        status.send_modify(|s| {
            s.in_flight = false;
            if s.completed.is_none_or(|completed| ticket > completed) {
                s.completed = Some(ticket);
            }
        });
    }
    debug!("Cart sync worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::remote::MemoryRemote;

    fn ticket(version: u64) -> SyncTicket {
        SyncTicket::new(1, version)
    }

    #[test]
    fn test_gate_ignores_reordered_completion() {
        let gate = VersionGate::new();
        gate.mark_sent(ticket(1));
        gate.mark_sent(ticket(2));

        // version 2 completes before version 1
        assert!(gate.acknowledge(ticket(2)));
        assert!(!gate.acknowledge(ticket(1)));

        assert_eq!(gate.acknowledged(), Some(ticket(2)));
        assert_eq!(gate.sent(), Some(ticket(2)));
    }

    #[test]
    fn test_ticket_epoch_dominates_version() {
        assert!(SyncTicket::new(2, 0) > SyncTicket::new(1, 40));
    }

    #[test]
    fn test_status_idle() {
        let mut status = SyncStatus::default();
        assert!(status.is_idle());

        status.enqueued = Some(ticket(2));
        status.completed = Some(ticket(1));
        assert!(!status.is_idle());

        status.completed = Some(ticket(2));
        assert!(status.is_idle());

        status.in_flight = true;
        assert!(!status.is_idle());
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_two_calls() {
        let remote = MemoryRemote::new();
        let id = UserId::new(1);
        remote.hold_replaces(true);
        let queue = SyncQueue::spawn(id, Arc::new(remote.clone()));

        queue.enqueue(ticket(1), CartSnapshot::empty().with_version(1));
        remote.wait_for_replace_calls(1).await;

        for version in 2..=10 {
            queue.enqueue(ticket(version), CartSnapshot::empty().with_version(version));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(remote.replace_calls(), 1);

        remote.hold_replaces(false);
        queue.wait_idle().await;

        assert_eq!(remote.replace_calls(), 2);
        assert_eq!(remote.max_in_flight(), 1);
        assert_eq!(remote.applied(), vec![(id, 1), (id, 10)]);
        assert_eq!(queue.status().acknowledged, Some(ticket(10)));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_next_request_retries() {
        let remote = MemoryRemote::new();
        let id = UserId::new(1);
        let queue = SyncQueue::spawn(id, Arc::new(remote.clone()));

        remote.set_failing(true);
        queue.enqueue(ticket(1), CartSnapshot::empty().with_version(1));
        queue.wait_idle().await;
        assert!(queue.status().last_error.is_some());
        assert!(remote.stored(id).is_none());

        remote.set_failing(false);
        queue.enqueue(ticket(2), CartSnapshot::empty().with_version(2));
        queue.wait_idle().await;

        let status = queue.status();
        assert!(status.last_error.is_none());
        assert_eq!(status.acknowledged, Some(ticket(2)));
        assert_eq!(remote.stored(id).map(|s| s.version()), Some(2));
    }
}
