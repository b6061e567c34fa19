//! Error types shared by the sync engine.

use crate::spreadsheet::SpreadsheetError;

/// Failure talking to the REST backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("{operation} returned status {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("{operation} transport error: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response could not be decoded: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("item has no id")]
    MissingId,
}

/// Failure of a [`SyncClient`](crate::sync::SyncClient) or
/// [`Reconciler`](crate::reconcile::Reconciler) operation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Rejected before any optimistic mutation or network call.
    #[error("{0}")]
    Validation(String),

    #[error("Save failed: {0}")]
    Save(#[source] BackendError),

    #[error("Delete failed: {0}")]
    Delete(#[source] BackendError),

    #[error("Bulk upload failed: {0}")]
    BulkUpload(#[source] BackendError),

    #[error("Failed to load menu: {0}")]
    Load(#[source] BackendError),

    #[error("No items to upload")]
    NothingToUpload,

    #[error("Spreadsheet import failed: {0}")]
    Spreadsheet(#[from] SpreadsheetError),
}

impl SyncError {
    /// Short text for the user-visible error list. Transport detail stays in
    /// the log.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Save(_) => "Save failed".to_string(),
            Self::Delete(_) => "Delete failed".to_string(),
            Self::BulkUpload(_) => "Bulk upload failed".to_string(),
            Self::Load(_) => "Failed to load menu".to_string(),
            Self::NothingToUpload => "No items to upload".to_string(),
            Self::Spreadsheet(_) => "Could not read spreadsheet".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_detail() {
        let err = SyncError::Save(BackendError::Status {
            operation: "update",
            status: 500,
        });
        assert_eq!(err.user_message(), "Save failed");
        assert_eq!(err.to_string(), "Save failed: update returned status 500");
    }

    #[test]
    fn test_validation_message_passthrough() {
        let err = SyncError::Validation("Name and Price are required".into());
        assert_eq!(err.user_message(), "Name and Price are required");
    }
}
