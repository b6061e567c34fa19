//! End-to-end sync client flows against an in-memory backend.
//!
//! The fake backend records every call, can be told to fail an operation,
//! and can delay responses so overlapping operations resolve out of order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use menu_sync::backend::{BulkOutcome, MenuBackend};
use menu_sync::channel::ChannelEvent;
use menu_sync::config::SyncConfig;
use menu_sync::error::{BackendError, SyncError};
use menu_sync::model::{ImageFile, ItemId, MenuItem};
use menu_sync::protocol::ChangeNotification;
use menu_sync::sync::SyncClient;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

#[derive(Default)]
struct FakeBackend {
    remote: Mutex<Vec<MenuItem>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    /// Response delay keyed by operation name or item name
    delays: Mutex<HashMap<String, Duration>>,
    bulk_accepts: bool,
    last_sent: Mutex<Option<MenuItem>>,
}

impl FakeBackend {
    fn with_remote(items: Vec<MenuItem>) -> Self {
        Self {
            remote: Mutex::new(items),
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn delay(&self, key: &str, millis: u64) {
        self.delays
            .lock()
            .unwrap()
            .insert(key.to_string(), Duration::from_millis(millis));
    }

    fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == operation).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn enter(&self, operation: &'static str, key: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(operation);
        let delay = {
            let delays = self.delays.lock().unwrap();
            delays.get(key).or_else(|| delays.get(operation)).copied()
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(operation) {
            return Err(BackendError::Status { operation, status: 500 });
        }
        Ok(())
    }
}

#[async_trait]
impl MenuBackend for FakeBackend {
    async fn list(&self) -> Result<Vec<MenuItem>, BackendError> {
        self.enter("list", "list").await?;
        Ok(self.remote.lock().unwrap().clone())
    }

    async fn create(&self, item: &MenuItem) -> Result<MenuItem, BackendError> {
        *self.last_sent.lock().unwrap() = Some(item.clone());
        self.enter("create", &item.name).await?;
        let mut saved = item.clone().with_id(self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Some(image) = saved.image_file.take() {
            saved.image_url = Some(format!("/images/{}", image.file_name));
        }
        self.remote.lock().unwrap().insert(0, saved.clone());
        Ok(saved)
    }

    async fn update(&self, id: &ItemId, item: &MenuItem) -> Result<MenuItem, BackendError> {
        self.enter("update", &item.name).await?;
        let mut saved = item.clone();
        saved.id = Some(id.clone());
        saved.image_file = None;
        let mut remote = self.remote.lock().unwrap();
        if let Some(existing) = remote.iter_mut().find(|i| i.id.as_ref() == Some(id)) {
            *existing = saved.clone();
        }
        Ok(saved)
    }

    async fn delete(&self, id: &ItemId) -> Result<(), BackendError> {
        self.enter("delete", "delete").await?;
        self.remote.lock().unwrap().retain(|i| i.id.as_ref() != Some(id));
        Ok(())
    }

    async fn bulk_replace(&self, items: &[MenuItem]) -> Result<BulkOutcome, BackendError> {
        self.enter("bulk", "bulk").await?;
        if self.bulk_accepts {
            return Ok(BulkOutcome::Accepted);
        }
        let saved: Vec<MenuItem> = items
            .iter()
            .map(|item| {
                let mut saved = item.clone();
                if saved.id.is_none() {
                    saved.id = Some(ItemId::Int(self.next_id.fetch_add(1, Ordering::SeqCst)));
                }
                saved
            })
            .collect();
        *self.remote.lock().unwrap() = saved.clone();
        Ok(BulkOutcome::Canonical(saved))
    }
}

fn item(id: i64, name: &str) -> MenuItem {
    MenuItem::new(name, 10.0).with_id(id)
}

/// A client whose local collection already mirrors `remote`.
async fn loaded_client(remote: Vec<MenuItem>) -> SyncClient<FakeBackend> {
    loaded_client_with(remote, &SyncConfig::default()).await
}

async fn loaded_client_with(remote: Vec<MenuItem>, config: &SyncConfig) -> SyncClient<FakeBackend> {
    let client = SyncClient::new(FakeBackend::with_remote(remote), config);
    client.fetch_all().await.unwrap();
    client
}

#[tokio::test]
async fn test_invalid_save_touches_nothing() {
    let client = loaded_client(vec![item(1, "A")]).await;
    let before = client.store().snapshot().await;
    let calls_before = client.backend().total_calls();

    let mut no_price = MenuItem::new("Dosa", 0.0);
    no_price.price = None;

    for invalid in [MenuItem::new("", 10.0), no_price] {
        let result = client.save(invalid, true).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    assert_eq!(client.store().snapshot().await, before);
    assert_eq!(client.backend().total_calls(), calls_before);
    assert_eq!(client.errors().await, vec!["Name and Price are required".to_string()]);
}

#[tokio::test]
async fn test_create_replaces_placeholder_and_publishes() {
    let client = loaded_client(vec![item(1, "A")]).await;
    let mut feed = client.subscribe();

    let saved = client.save(MenuItem::new("Dosa", 40.0), true).await.unwrap();

    assert_eq!(saved.id, Some(ItemId::Int(100)));
    assert_eq!(client.items().await, vec![saved.clone(), item(1, "A")]);
    assert_eq!(*feed.recv().await.unwrap(), ChangeNotification::Upsert(saved));
    assert!(client.errors().await.is_empty());
}

#[tokio::test]
async fn test_create_shows_placeholder_while_in_flight() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.backend().delay("Dosa", 50);

    let (saved, during) = tokio::join!(client.save(MenuItem::new("Dosa", 40.0), true), async {
        sleep(Duration::from_millis(10)).await;
        client.items().await
    });

    assert_eq!(during.len(), 2);
    assert_eq!(during[0].name, "Dosa");
    assert_eq!(during[0].id, None);
    assert_eq!(client.items().await[0], saved.unwrap());
}

#[tokio::test]
async fn test_echo_before_response_leaves_one_record() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.backend().delay("Dosa", 50);

    let echo = MenuItem::new("Dosa", 40.0).with_id(100);
    let (saved, _) = tokio::join!(client.save(MenuItem::new("Dosa", 40.0), true), async {
        sleep(Duration::from_millis(10)).await;
        client.apply_remote(ChangeNotification::Upsert(echo.clone())).await;
    });

    assert_eq!(saved.unwrap(), echo);
    let items = client.items().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items.iter().filter(|i| i.id == Some(ItemId::Int(100))).count(), 1);
}

#[tokio::test]
async fn test_update_preserves_position() {
    let client = loaded_client(vec![item(1, "A"), item(2, "B"), item(3, "C")]).await;

    client.save(item(2, "B2"), false).await.unwrap();

    let names: Vec<_> = client.items().await.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["A", "B2", "C"]);
}

#[tokio::test]
async fn test_image_is_sent_but_not_kept_locally() {
    let client = loaded_client(Vec::new()).await;
    let with_image =
        MenuItem::new("Vada", 20.0).with_image(ImageFile::new("vada.png", "image/png", vec![1, 2]));

    let saved = client.save(with_image, true).await.unwrap();

    let sent = client.backend().last_sent.lock().unwrap().clone().unwrap();
    assert!(sent.image_file.is_some());
    assert_eq!(saved.image_url.as_deref(), Some("/images/vada.png"));
    assert!(client.items().await.iter().all(|i| i.image_file.is_none()));
}

#[tokio::test]
async fn test_save_failure_refetches_once() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.backend().fail("update");
    let lists_before = client.backend().calls("list");

    let result = client.save(item(1, "Changed"), false).await;

    assert!(matches!(result, Err(SyncError::Save(_))));
    assert_eq!(client.backend().calls("list"), lists_before + 1);
    assert_eq!(client.errors().await, vec!["Save failed".to_string()]);
    // The optimistic edit is gone; the server's version is back.
    assert_eq!(client.items().await, vec![item(1, "A")]);
}

#[tokio::test]
async fn test_save_failure_with_failing_refetch_reports_once() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.backend().fail("create");
    client.backend().fail("list");

    let result = client.save(MenuItem::new("Dosa", 5.0), true).await;

    assert!(matches!(result, Err(SyncError::Save(_))));
    assert_eq!(client.errors().await, vec!["Save failed".to_string()]);
}

#[tokio::test]
async fn test_delete_success_publishes_marker() {
    let client = loaded_client(vec![item(1, "A"), item(2, "B")]).await;
    let mut feed = client.subscribe();

    client.delete(&ItemId::Int(1)).await.unwrap();

    assert_eq!(client.items().await, vec![item(2, "B")]);
    assert_eq!(
        *feed.recv().await.unwrap(),
        ChangeNotification::DeleteMarker(ItemId::Int(1))
    );
}

#[tokio::test]
async fn test_delete_failure_restores_snapshot() {
    let client = loaded_client(vec![item(1, "A"), item(2, "B")]).await;
    client.backend().fail("delete");
    let before = client.store().snapshot().await;

    let result = client.delete(&ItemId::Int(1)).await;

    assert!(matches!(result, Err(SyncError::Delete(_))));
    assert_eq!(client.store().snapshot().await, before);
    assert_eq!(client.errors().await, vec!["Delete failed".to_string()]);
}

#[tokio::test]
async fn test_fetch_failure_leaves_state() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.backend().fail("list");

    let result = client.fetch_all().await;

    assert!(matches!(result, Err(SyncError::Load(_))));
    assert_eq!(client.items().await, vec![item(1, "A")]);
    assert_eq!(client.errors().await, vec!["Failed to load menu".to_string()]);
}

#[tokio::test]
async fn test_loading_flag_during_fetch() {
    let client = SyncClient::new(FakeBackend::with_remote(vec![item(1, "A")]), &SyncConfig::default());
    client.backend().delay("list", 50);
    assert!(!client.is_loading());

    let (_, during) = tokio::join!(client.fetch_all(), async {
        sleep(Duration::from_millis(10)).await;
        client.is_loading()
    });

    assert!(during);
    assert!(!client.is_loading());
}

#[tokio::test]
async fn test_stale_same_id_response_discarded() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.backend().delay("slow", 100);
    client.backend().delay("fast", 10);

    let (first, second) = tokio::join!(client.save(item(1, "slow"), false), async {
        sleep(Duration::from_millis(5)).await;
        client.save(item(1, "fast"), false).await
    });

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(client.items().await, vec![item(1, "fast")]);
}

#[tokio::test]
async fn test_last_response_wins_without_stamps() {
    let config = SyncConfig {
        discard_stale_responses: false,
        ..SyncConfig::default()
    };
    let client = loaded_client_with(vec![item(1, "A")], &config).await;
    client.backend().delay("slow", 100);
    client.backend().delay("fast", 10);

    let _ = tokio::join!(client.save(item(1, "slow"), false), async {
        sleep(Duration::from_millis(5)).await;
        client.save(item(1, "fast"), false).await
    });

    assert_eq!(client.items().await, vec![item(1, "slow")]);
}

#[tokio::test]
async fn test_concurrent_saves_to_different_items_converge() {
    let client = loaded_client(vec![item(1, "A"), item(2, "B")]).await;
    client.backend().delay("A2", 40);
    client.backend().delay("B2", 10);

    let (a, b) = tokio::join!(client.save(item(1, "A2"), false), client.save(item(2, "B2"), false));

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(client.items().await, vec![item(1, "A2"), item(2, "B2")]);
}

#[tokio::test]
async fn test_bulk_adopts_canonical_collection() {
    let client = loaded_client(vec![item(1, "A")]).await;
    let mut feed = client.subscribe();

    let saved = client
        .bulk_replace(vec![MenuItem::new("X", 1.0), MenuItem::new("Y", 2.0)])
        .await
        .unwrap();

    assert!(saved.iter().all(MenuItem::is_persisted));
    assert_eq!(client.items().await, saved);
    assert_eq!(*feed.recv().await.unwrap(), ChangeNotification::FullReplace(saved));
    assert!(!client.is_loading());
}

#[tokio::test]
async fn test_bulk_accepted_keeps_sent_items() {
    let backend = FakeBackend {
        bulk_accepts: true,
        ..FakeBackend::with_remote(Vec::new())
    };
    let client = SyncClient::new(backend, &SyncConfig::default());
    let sent = vec![MenuItem::new("X", 1.0)];

    let saved = client.bulk_replace(sent.clone()).await.unwrap();

    assert_eq!(saved, sent);
    assert_eq!(client.items().await, sent);
}

#[tokio::test]
async fn test_bulk_failure_does_not_roll_back() {
    let client = loaded_client(vec![item(1, "A")]).await;
    client.store().replace_all(vec![MenuItem::new("Imported", 3.0)]).await;
    client.backend().fail("bulk");

    let result = client.bulk_replace(client.items().await).await;

    assert!(matches!(result, Err(SyncError::BulkUpload(_))));
    assert_eq!(client.items().await, vec![MenuItem::new("Imported", 3.0)]);
    assert_eq!(client.errors().await, vec!["Bulk upload failed".to_string()]);
    assert!(!client.is_loading());
}

#[tokio::test]
async fn test_pump_applies_channel_notifications() {
    let client = loaded_client(vec![item(1, "A")]).await;
    let (tx, rx) = mpsc::channel(8);

    tx.send(ChannelEvent::Connected).await.unwrap();
    tx.send(ChannelEvent::Notification(ChangeNotification::Upsert(item(2, "C"))))
        .await
        .unwrap();
    tx.send(ChannelEvent::Notification(ChangeNotification::DeleteMarker(ItemId::Int(1))))
        .await
        .unwrap();
    tx.send(ChannelEvent::Disconnected).await.unwrap();
    drop(tx);

    assert_eq!(client.pump(rx).await, 2);
    assert_eq!(client.items().await, vec![item(2, "C")]);
}
