//! Bulk flows that replace the collection wholesale.

use crate::backend::MenuBackend;
use crate::error::SyncError;
use crate::model::MenuItem;
use crate::normalize::normalize;
use crate::spreadsheet::{read_first_sheet, write_template, Row};
use crate::sync::SyncClient;

/// Import and upload orchestration over a [`SyncClient`].
pub struct Reconciler<'a, B: MenuBackend> {
    client: &'a SyncClient<B>,
}

impl<'a, B: MenuBackend> Reconciler<'a, B> {
    pub fn new(client: &'a SyncClient<B>) -> Self {
        Self { client }
    }

    /// Replace the local collection with the normalized rows. Nothing is
    /// sent to the backend until [`upload_all`](Self::upload_all).
    pub async fn import_from_table(&self, rows: &[Row]) -> usize {
        let items = normalize(rows);
        let count = items.len();
        self.client.store().replace_all(items).await;
        log::info!("Imported {count} rows into the local menu");
        count
    }

    /// Read the first sheet of an `.xlsx` workbook and import it.
    pub async fn import_workbook(&self, bytes: &[u8]) -> Result<usize, SyncError> {
        match read_first_sheet(bytes) {
            Ok(rows) => Ok(self.import_from_table(&rows).await),
            Err(e) => {
                log::error!("Spreadsheet import failed: {e}");
                Err(self.client.fail(e.into()).await)
            }
        }
    }

    /// Bulk-replace the backend with the current local collection.
    pub async fn upload_all(&self) -> Result<Vec<MenuItem>, SyncError> {
        let items = self.client.items().await;
        if items.is_empty() {
            log::warn!("Upload requested with an empty menu");
            return Err(self.client.fail(SyncError::NothingToUpload).await);
        }
        self.client.bulk_replace(items).await
    }

    /// The import template as `.xlsx` bytes.
    pub fn export_template(&self) -> Result<Vec<u8>, SyncError> {
        Ok(write_template()?)
    }
}
