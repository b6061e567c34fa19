//! Optimistic item store.
//!
//! The collection is an immutable `Arc<Vec<_>>` behind one async lock. Every
//! mutation builds the next vector from the current one and swaps it in while
//! holding the write lock, so:
//! - mutations are applied one at a time, in lock-acquisition order;
//! - a [`Snapshot`] taken earlier is never modified by later mutations.
//!
//! Invariant: at most one entry per non-null item id.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{ItemId, MenuItem};

/// Stable identity of a store entry, independent of the item's backend id.
///
/// Optimistic creates have no id yet, so the placeholder is found again by
/// this key when the canonical record arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey(Uuid);

impl EntryKey {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: EntryKey,
    item: MenuItem,
}

impl Entry {
    fn fresh(item: MenuItem) -> Self {
        Self {
            key: EntryKey::fresh(),
            item,
        }
    }

    fn has_id(&self, id: &ItemId) -> bool {
        self.item.id.as_ref() == Some(id)
    }
}

/// How [`OptimisticStore::replace_one`] locates its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// The optimistic placeholder inserted by a create.
    Placeholder(EntryKey),
    /// An existing item by backend id.
    Id(ItemId),
}

/// Whole-collection capture used for rollback.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Arc<Vec<Entry>>,
}

impl Snapshot {
    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn to_items(&self) -> Vec<MenuItem> {
        self.items().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&MenuItem> {
        self.entries.iter().find(|e| e.has_id(id)).map(|e| &e.item)
    }
}

/// Snapshots compare by item value, not by identity.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.items().eq(other.items())
    }
}

/// The menu collection plus its local mutation rules.
pub struct OptimisticStore {
    entries: RwLock<Arc<Vec<Entry>>>,
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn with_items(items: Vec<MenuItem>) -> Self {
        Self {
            entries: RwLock::new(Arc::new(items.into_iter().map(Entry::fresh).collect())),
        }
    }

    /// Apply a local change ahead of the remote call.
    ///
    /// New items are prepended and the placeholder's key is returned. For an
    /// existing item the entry with the same id is replaced in place; `None`
    /// is returned when no entry carries that id.
    pub async fn upsert_optimistic(&self, item: MenuItem, is_new: bool) -> Option<EntryKey> {
        let mut guard = self.entries.write().await;

        if is_new {
            let entry = Entry::fresh(item);
            let key = entry.key;
            let mut next = Vec::with_capacity(guard.len() + 1);
            next.push(entry);
            next.extend(guard.iter().cloned());
            *guard = Arc::new(next);
            return Some(key);
        }

        let id = item.id.clone()?;
        let idx = guard.iter().position(|e| e.has_id(&id))?;
        let key = guard[idx].key;
        let mut next = guard.as_ref().clone();
        next[idx] = Entry { key, item };
        *guard = Arc::new(next);
        Some(key)
    }

    /// Swap an optimistic entry for the canonical record.
    ///
    /// Any other entry already carrying the replacement's id is dropped, so a
    /// broadcast echo that landed before the response cannot duplicate it.
    /// Returns `false` when the target is gone.
    pub async fn replace_one(&self, target: &Match, replacement: MenuItem) -> bool {
        let mut guard = self.entries.write().await;

        let Some(idx) = guard.iter().position(|e| match target {
            Match::Placeholder(key) => e.key == *key,
            Match::Id(id) => e.has_id(id),
        }) else {
            return false;
        };

        let key = guard[idx].key;
        let new_id = replacement.id.clone();
        let mut replacement = Some(replacement);
        let next: Vec<Entry> = guard
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                if i == idx {
                    replacement.take().map(|item| Entry { key, item })
                } else if new_id.as_ref().is_some_and(|id| e.has_id(id)) {
                    None
                } else {
                    Some(e.clone())
                }
            })
            .collect();
        *guard = Arc::new(next);
        true
    }

    /// Replace the entry with the item's id in place, or prepend it.
    pub async fn upsert_by_id(&self, item: MenuItem) {
        let mut guard = self.entries.write().await;

        let existing = item
            .id
            .as_ref()
            .and_then(|id| guard.iter().position(|e| e.has_id(id)));

        let next = match existing {
            Some(idx) => {
                let mut next = guard.as_ref().clone();
                next[idx].item = item;
                next
            }
            None => {
                let mut next = Vec::with_capacity(guard.len() + 1);
                next.push(Entry::fresh(item));
                next.extend(guard.iter().cloned());
                next
            }
        };
        *guard = Arc::new(next);
    }

    /// Remove the entry with this id. Returns whether one was removed.
    pub async fn remove(&self, id: &ItemId) -> bool {
        let mut guard = self.entries.write().await;
        if !guard.iter().any(|e| e.has_id(id)) {
            return false;
        }
        let next: Vec<Entry> = guard.iter().filter(|e| !e.has_id(id)).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    /// Adopt `items` verbatim, discarding the current collection.
    pub async fn replace_all(&self, items: Vec<MenuItem>) {
        let next: Vec<Entry> = items.into_iter().map(Entry::fresh).collect();
        *self.entries.write().await = Arc::new(next);
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.read().await.clone(),
        }
    }

    /// Roll the whole collection back to `snapshot`.
    pub async fn restore(&self, snapshot: Snapshot) {
        *self.entries.write().await = snapshot.entries;
    }

    pub async fn items(&self) -> Vec<MenuItem> {
        self.snapshot().await.to_items()
    }

    pub async fn get(&self, id: &ItemId) -> Option<MenuItem> {
        self.snapshot().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
