//! Presence registry: who is online, and where to push their events.
//!
//! Every live connection owns one bounded inbound queue. The registry holds
//! the sending half of each queue, grouped by user. Pushing is a
//! non-blocking `try_send`; a queue that is closed or full marks its
//! connection dead, and the connection is evicted exactly like a
//! disconnect.
//!
//! The map lock is only held for in-memory mutation. Online/offline
//! announcements are pushed after it is released, but under a second
//! ordering lock taken before the map lock is dropped, so every watcher sees
//! a user's transitions in the order the map applied them. Evictions found
//! while pushing run only after both locks are released.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::logging;
use crate::types::{LiveEvent, UserId};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Sending half of a connection's inbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<LiveEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its connection task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn push(&self, event: LiveEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

type Entries = HashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>;

#[derive(Default)]
pub struct PresenceRegistry {
    entries: Mutex<Entries>,
    /// Held from a presence transition until its announcement is pushed.
    announcements: Mutex<()>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announcement_order(&self) -> MutexGuard<'_, ()> {
        self.announcements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every connection not belonging to `user_id`.
    fn others(entries: &Entries, user_id: &UserId) -> Vec<(UserId, ConnectionHandle)> {
        entries
            .iter()
            .filter(|(user, _)| *user != user_id)
            .flat_map(|(user, conns)| conns.values().map(move |c| (user.clone(), c.clone())))
            .collect()
    }

    /// Add `handle` under `user_id`. The user's first connection announces
    /// them online to everybody else. Re-registering a handle replaces it.
    pub fn register(&self, user_id: &UserId, handle: ConnectionHandle) {
        let connection = handle.id();
        let announcement = {
            let mut entries = self.lock();
            let first = !entries.contains_key(user_id);
            entries
                .entry(user_id.clone())
                .or_default()
                .insert(connection, handle);
            if first {
                let recipients = Self::others(&entries, user_id);
                Some((recipients, self.announcement_order()))
            } else {
                None
            }
        };

        tracing::debug!(
            "presence: {} registered connection {}",
            logging::user_id(user_id.as_str()),
            connection.0
        );

        if let Some((recipients, order)) = announcement {
            tracing::info!("presence: {} online", logging::user_id(user_id.as_str()));
            let (_, dead) = Self::push_all(
                recipients,
                LiveEvent::UserOnline {
                    user_id: user_id.clone(),
                },
            );
            drop(order);
            self.evict(dead);
        }
    }

    /// Remove a connection. When it was the user's last one the user is
    /// announced offline to everybody still connected. Unknown connections
    /// are ignored.
    ///
    /// The registry holds the only sender of each queue, so removing the
    /// handle here closes the connection task's receiver.
    pub fn unregister(&self, user_id: &UserId, connection: ConnectionId) {
        let (recipients, order) = {
            let mut entries = self.lock();
            let Some(conns) = entries.get_mut(user_id) else {
                return;
            };
            if conns.remove(&connection).is_none() {
                return;
            }
            if !conns.is_empty() {
                return;
            }
            entries.remove(user_id);
            let recipients = Self::others(&entries, user_id);
            (recipients, self.announcement_order())
        };

        tracing::info!("presence: {} offline", logging::user_id(user_id.as_str()));
        let (_, dead) = Self::push_all(
            recipients,
            LiveEvent::UserOffline {
                user_id: user_id.clone(),
            },
        );
        drop(order);
        self.evict(dead);
    }

    /// Push `event` to every live connection of `user_id`.
    ///
    /// Returns `true` when at least one connection accepted the event and
    /// `false` when the user is offline or every connection turned out dead.
    pub fn send_to(&self, user_id: &UserId, event: LiveEvent) -> bool {
        let recipients: Vec<_> = {
            let entries = self.lock();
            match entries.get(user_id) {
                Some(conns) => conns
                    .values()
                    .map(|c| (user_id.clone(), c.clone()))
                    .collect(),
                None => return false,
            }
        };
        let (delivered, dead) = Self::push_all(recipients, event);
        self.evict(dead);
        delivered > 0
    }

    /// Snapshot of currently online users.
    pub fn list_online(&self) -> BTreeSet<UserId> {
        self.lock().keys().cloned().collect()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.lock().contains_key(user_id)
    }

    /// Number of live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    /// Offer `event` to each recipient. Returns how many accepted it and the
    /// connections that refused.
    fn push_all(
        recipients: Vec<(UserId, ConnectionHandle)>,
        event: LiveEvent,
    ) -> (usize, Vec<(UserId, ConnectionId)>) {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (user, handle) in recipients {
            if handle.push(event.clone()) {
                delivered += 1;
            } else {
                dead.push((user, handle.id()));
            }
        }
        (delivered, dead)
    }

    fn evict(&self, dead: Vec<(UserId, ConnectionId)>) {
        for (user, connection) in dead {
            tracing::warn!(
                "presence: evicting unresponsive connection {} of {}",
                connection.0,
                logging::user_id(user.as_str())
            );
            self.unregister(&user, connection);
        }
    }
}
