//! Sync client: optimistic local mutation plus REST confirmation.
//!
//! Each operation is an independent future. Operations may overlap freely;
//! their effects on the collection go through [`OptimisticStore`], whose
//! write lock is the single point where transformations are serialized.
//!
//! Recovery is coarse-grained:
//! - a failed save discards optimistic state by refetching the whole list;
//! - a failed delete restores the whole list from a pre-delete snapshot;
//! - a failed bulk upload leaves local state alone for the operator to retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

use crate::backend::{BulkOutcome, HttpBackend, MenuBackend};
use crate::broadcast::{BroadcastMerger, Publisher};
use crate::channel::ChannelEvent;
use crate::config::SyncConfig;
use crate::error::{BackendError, SyncError};
use crate::model::{ItemId, MenuItem};
use crate::protocol::ChangeNotification;
use crate::store::{Match, OptimisticStore};

/// Per-id sequence stamps for in-flight updates.
///
/// An update response is current only if no later save of the same id was
/// issued after it. An id is forgotten once its last in-flight save settles.
#[derive(Default)]
struct StampBook {
    next: AtomicU64,
    pending: Mutex<HashMap<ItemId, Pending>>,
}

struct Pending {
    latest: u64,
    in_flight: usize,
}

impl StampBook {
    async fn issue(&self, id: &ItemId) -> u64 {
        let stamp = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let mut pending = self.pending.lock().await;
        let entry = pending.entry(id.clone()).or_insert(Pending {
            latest: stamp,
            in_flight: 0,
        });
        entry.latest = stamp;
        entry.in_flight += 1;
        stamp
    }

    /// Mark the save holding `stamp` as finished. Returns whether it was
    /// still the latest save of `id`.
    async fn settle(&self, id: &ItemId, stamp: u64) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.get_mut(id) else {
            return true;
        };
        let current = entry.latest == stamp;
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if entry.in_flight == 0 {
            pending.remove(id);
        }
        current
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Marks the client busy for as long as it lives.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reject items that must never reach the store or the network.
pub fn validate(item: &MenuItem, is_new: bool) -> Result<(), SyncError> {
    let Some(price) = item.price else {
        return Err(SyncError::Validation("Name and Price are required".into()));
    };
    if item.name.trim().is_empty() {
        return Err(SyncError::Validation("Name and Price are required".into()));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(SyncError::Validation("Price must be a non-negative number".into()));
    }
    if !is_new && item.id.is_none() {
        return Err(SyncError::Validation("Cannot update an item without an id".into()));
    }
    Ok(())
}

/// The sync client.
pub struct SyncClient<B: MenuBackend = HttpBackend> {
    backend: B,

    /// The authoritative local collection
    store: Arc<OptimisticStore>,

    merger: BroadcastMerger,

    publisher: Publisher,

    /// User-visible errors; holds at most one message
    errors: RwLock<Vec<String>>,

    /// Fetches and bulk uploads in flight
    loading: AtomicUsize,

    stamps: StampBook,

    discard_stale_responses: bool,
}

impl SyncClient<HttpBackend> {
    /// Client talking to the configured HTTP backend, with no remote
    /// broadcast channel attached.
    pub fn connect_http(config: &SyncConfig) -> Result<Self, BackendError> {
        Ok(Self::new(HttpBackend::new(config)?, config))
    }
}

impl<B: MenuBackend> SyncClient<B> {
    pub fn new(backend: B, config: &SyncConfig) -> Self {
        Self {
            backend,
            store: Arc::new(OptimisticStore::new()),
            merger: BroadcastMerger::new(config.delete_marker_policy),
            publisher: Publisher::new(config.broadcast_capacity),
            errors: RwLock::new(Vec::new()),
            loading: AtomicUsize::new(0),
            stamps: StampBook::default(),
            discard_stale_responses: config.discard_stale_responses,
        }
    }

    /// Replace the outbound publisher, e.g. with one wired to a
    /// [`ChannelClient`](crate::channel::ChannelClient).
    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Share an existing store instead of starting empty.
    pub fn with_store(mut self, store: Arc<OptimisticStore>) -> Self {
        self.store = store;
        self
    }

    /// Create or update an item.
    ///
    /// Invalid items fail with [`SyncError::Validation`] before anything is
    /// touched. Otherwise the store is updated first, then the backend is
    /// called; the canonical record replaces the optimistic one and is
    /// published. On failure the whole collection is refetched.
    pub async fn save(&self, item: MenuItem, is_new: bool) -> Result<MenuItem, SyncError> {
        if let Err(e) = validate(&item, is_new) {
            return Err(self.fail(e).await);
        }
        self.clear_errors().await;

        let mut optimistic = item.clone();
        optimistic.image_file = None;
        let placeholder = self.store.upsert_optimistic(optimistic, is_new).await;

        let stamp = match item.id {
            Some(ref id) if !is_new => Some(self.stamps.issue(id).await),
            _ => None,
        };

        let result = match item.id {
            Some(ref id) if !is_new => self.backend.update(id, &item).await,
            _ => self.backend.create(&item).await,
        };

        let current = match (item.id.as_ref(), stamp) {
            (Some(id), Some(stamp)) => self.stamps.settle(id, stamp).await,
            _ => true,
        };

        let saved = match result {
            Ok(saved) => saved,
            Err(e) => {
                log::error!("Saving {:?} failed: {e}", item.name);
                let err = self.fail(SyncError::Save(e)).await;
                self.reload().await;
                return Err(err);
            }
        };

        if self.discard_stale_responses && !current {
            log::info!("Discarding superseded save response for {:?}", item.name);
            return Ok(saved);
        }

        let target = if is_new {
            placeholder.map(Match::Placeholder)
        } else {
            item.id.clone().map(Match::Id)
        };
        let replaced = match target {
            Some(ref target) => self.store.replace_one(target, saved.clone()).await,
            None => false,
        };
        if !replaced {
            // The optimistic entry was swept away (e.g. by a full replace);
            // the canonical record still belongs in the list.
            self.store.upsert_by_id(saved.clone()).await;
        }

        self.publisher.publish(ChangeNotification::Upsert(saved.clone()));
        Ok(saved)
    }

    /// Delete an item, restoring the whole prior collection on failure.
    pub async fn delete(&self, id: &ItemId) -> Result<(), SyncError> {
        let backup = self.store.snapshot().await;
        self.store.remove(id).await;

        match self.backend.delete(id).await {
            Ok(()) => {
                self.publisher.publish(ChangeNotification::DeleteMarker(id.clone()));
                Ok(())
            }
            Err(e) => {
                log::error!("Deleting item {id} failed: {e}");
                self.store.restore(backup).await;
                Err(self.fail(SyncError::Delete(e)).await)
            }
        }
    }

    /// Load the whole collection from the backend.
    ///
    /// On failure the current collection is left as it was.
    pub async fn fetch_all(&self) -> Result<usize, SyncError> {
        match self.load().await {
            Ok(count) => Ok(count),
            Err(e) => {
                log::error!("Failed to load menu: {e}");
                Err(self.fail(SyncError::Load(e)).await)
            }
        }
    }

    /// Send `items` to the bulk endpoint and adopt the server's answer.
    ///
    /// Failure does not roll anything back.
    pub async fn bulk_replace(&self, items: Vec<MenuItem>) -> Result<Vec<MenuItem>, SyncError> {
        let _loading = LoadingGuard::enter(&self.loading);

        let canonical = match self.backend.bulk_replace(&items).await {
            Ok(BulkOutcome::Canonical(saved)) => saved,
            Ok(BulkOutcome::Accepted) => items,
            Err(e) => {
                log::error!("Bulk upload of {} items failed: {e}", items.len());
                return Err(self.fail(SyncError::BulkUpload(e)).await);
            }
        };

        log::info!("Bulk upload completed: {} items", canonical.len());
        self.store.replace_all(canonical.clone()).await;
        self.publisher
            .publish(ChangeNotification::FullReplace(canonical.clone()));
        Ok(canonical)
    }

    /// Fold a notification from the remote channel into the collection.
    pub async fn apply_remote(&self, notification: ChangeNotification) {
        self.merger.apply(&self.store, notification).await;
    }

    /// Apply channel events until the channel closes. Returns how many
    /// notifications were applied.
    pub async fn pump(&self, mut events: mpsc::Receiver<ChannelEvent>) -> usize {
        let mut applied = 0;
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Notification(notification) => {
                    self.apply_remote(notification).await;
                    applied += 1;
                }
                ChannelEvent::Connected => log::info!("Broadcast channel connected"),
                ChannelEvent::Disconnected => log::warn!("Broadcast channel disconnected"),
            }
        }
        applied
    }

    pub fn store(&self) -> &Arc<OptimisticStore> {
        &self.store
    }

    pub async fn items(&self) -> Vec<MenuItem> {
        self.store.items().await
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Local feed of every notification this client publishes.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeNotification>> {
        self.publisher.subscribe()
    }

    pub async fn errors(&self) -> Vec<String> {
        self.errors.read().await.clone()
    }

    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    /// Record `err` as the single user-visible error and hand it back.
    pub(crate) async fn fail(&self, err: SyncError) -> SyncError {
        *self.errors.write().await = vec![err.user_message()];
        err
    }

    async fn load(&self) -> Result<usize, BackendError> {
        let _loading = LoadingGuard::enter(&self.loading);
        let items = self.backend.list().await?;
        let count = items.len();
        self.store.replace_all(items).await;
        log::info!("Loaded {count} menu items");
        Ok(count)
    }

    /// Refetch after a failed save. Errors are logged only, so the save
    /// failure stays the reported one.
    async fn reload(&self) {
        if let Err(e) = self.load().await {
            log::error!("Refetch after failed save also failed: {e}");
        }
    }
}
