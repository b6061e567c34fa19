//! Client configuration.

use crate::broadcast::DeleteMarkerPolicy;

/// Environment variables read by [`SyncConfig::from_env`].
pub const ENV_BASE_URL: &str = "MENU_SYNC_BASE_URL";
pub const ENV_BULK_URL: &str = "MENU_SYNC_BULK_URL";
pub const ENV_TOKEN: &str = "MENU_SYNC_TOKEN";
pub const ENV_WS_URL: &str = "MENU_SYNC_WS_URL";

/// Sync client configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collection endpoint; items live at `{base_url}/{id}`
    pub base_url: String,
    /// Bulk replace endpoint
    pub bulk_url: String,
    /// Bearer credential attached to every request when set
    pub token: Option<String>,
    /// Broadcast channel address (None = no remote channel)
    pub ws_url: Option<String>,
    /// Buffered notifications per local subscriber and outgoing frames
    pub broadcast_capacity: usize,
    /// Drop update responses superseded by a newer save of the same id
    pub discard_stale_responses: bool,
    pub delete_marker_policy: DeleteMarkerPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/vendor/menu".to_string(),
            bulk_url: "http://127.0.0.1:8080/api/vendor/menu/bulk-json".to_string(),
            token: None,
            ws_url: None,
            broadcast_capacity: 256,
            discard_stale_responses: true,
            delete_marker_policy: DeleteMarkerPolicy::Remove,
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with any `MENU_SYNC_*` variables that are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(url) = non_empty(ENV_BULK_URL) {
            config.bulk_url = url;
        }
        config.token = non_empty(ENV_TOKEN);
        config.ws_url = non_empty(ENV_WS_URL);
        config
    }

    /// Config for a backend rooted at `base_url`, with the bulk endpoint at
    /// `{base_url}/bulk-json`.
    pub fn for_base(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            bulk_url: format!("{base_url}/bulk-json"),
            base_url,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}
