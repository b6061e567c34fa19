//! Change notifications in both directions.
//!
//! - [`BroadcastMerger`] folds an incoming [`ChangeNotification`] into the
//!   local store. It never fails: every payload yields some collection.
//! - [`Publisher`] is the outbound side. It fans a notification out to local
//!   subscribers over a tokio broadcast channel and queues it for the remote
//!   channel. Sending is best-effort: failures are counted and logged, never
//!   returned to the operation that published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::model::MenuItem;
use crate::protocol::{encode_notification, ChangeNotification};
use crate::store::OptimisticStore;

/// What to do with a `{ id, deleted: true }` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMarkerPolicy {
    /// Remove the entry with that id; unknown ids are ignored.
    #[default]
    Remove,
    /// Treat the marker like any other upsert: an existing record is
    /// overwritten by the bare marker and an unknown id inserts one.
    Overwrite,
}

/// Applies change notifications to an [`OptimisticStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastMerger {
    policy: DeleteMarkerPolicy,
}

impl BroadcastMerger {
    pub fn new(policy: DeleteMarkerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DeleteMarkerPolicy {
        self.policy
    }

    /// Fold one notification into the store as a single transformation.
    pub async fn apply(&self, store: &OptimisticStore, notification: ChangeNotification) {
        log::debug!("Applying {} notification", notification.kind());
        match notification {
            ChangeNotification::FullReplace(items) => store.replace_all(items).await,
            ChangeNotification::Upsert(item) => store.upsert_by_id(item).await,
            ChangeNotification::DeleteMarker(id) => match self.policy {
                DeleteMarkerPolicy::Remove => {
                    if !store.remove(&id).await {
                        log::debug!("Delete marker for unknown item {id}");
                    }
                }
                // TODO: drop the Overwrite policy once no consumer reads tombstone records.
                DeleteMarkerPolicy::Overwrite => store.upsert_by_id(MenuItem::tombstone(id)).await,
            },
        }
    }
}

/// Counters for monitoring the outbound path.
#[derive(Debug, Clone, Default)]
pub struct PublishStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub local_subscribers: usize,
}

struct AtomicPublishStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicPublishStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// Outbound notification fan-out.
pub struct Publisher {
    /// Local consumers (other views of the same menu)
    local: broadcast::Sender<Arc<ChangeNotification>>,

    /// Encoded frames bound for the remote channel
    remote: Option<mpsc::Sender<String>>,

    capacity: usize,

    atomic_stats: Arc<AtomicPublishStats>,
}

impl Publisher {
    /// `capacity` bounds how many notifications a lagging local subscriber
    /// may fall behind before it starts missing them.
    pub fn new(capacity: usize) -> Self {
        let (local, _) = broadcast::channel(capacity.max(1));
        Self {
            local,
            remote: None,
            capacity,
            atomic_stats: Arc::new(AtomicPublishStats::new()),
        }
    }

    /// Also forward every notification to the remote channel's outgoing queue.
    pub fn with_remote(mut self, outgoing: mpsc::Sender<String>) -> Self {
        self.remote = Some(outgoing);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeNotification>> {
        self.local.subscribe()
    }

    /// Best-effort send. Never blocks and never fails the caller.
    pub fn publish(&self, notification: ChangeNotification) {
        let kind = notification.kind();
        let notification = Arc::new(notification);

        // No local subscribers is not an error.
        let _ = self.local.send(notification.clone());

        let Some(ref remote) = self.remote else {
            return;
        };

        let frame = match encode_notification(&notification) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping {kind} notification: {e}");
                self.atomic_stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match remote.try_send(frame) {
            Ok(()) => {
                self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::warn!("Broadcast channel did not accept {kind} notification: {e}");
                self.atomic_stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            local_subscribers: self.local.receiver_count(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
