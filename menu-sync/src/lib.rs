//! # menu-sync: Optimistic sync engine for a vendor menu
//!
//! Keeps a local menu collection consistent with a REST backend and with
//! other clients editing the same menu.
//!
//! ## Architecture
//!
//! ```text
//!  spreadsheet ──► normalize ──► Reconciler ──┐
//!                                             ▼
//! ┌─────────────┐   REST    ┌─────────────────────────┐
//! │ MenuBackend │ ◄───────► │       SyncClient        │
//! │ (HTTP)      │           │ validate → mutate → call│
//! └─────────────┘           └──────┬───────────┬──────┘
//!                                  │           │ publish
//!                                  ▼           ▼
//!                       ┌────────────────┐  ┌───────────┐   WebSocket
//!                       │ OptimisticStore│  │ Publisher │ ─────────────► peers
//!                       │(one write lock)│  └───────────┘
//!                       └───────▲────────┘
//!                               │ apply
//!                       ┌───────┴────────┐   ┌───────────────┐
//!                       │ BroadcastMerger│ ◄─│ ChannelClient │ ◄──── peers
//!                       └────────────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`]: `MenuItem` and `ItemId`
//! - [`store`]: the collection and its transformations
//! - [`protocol`]: `menu:update` envelopes and change notifications
//! - [`broadcast`]: inbound merge and outbound fan-out
//! - [`channel`]: WebSocket broadcast channel client
//! - [`backend`]: REST contract and its reqwest implementation
//! - [`sync`]: create/update/delete/fetch/bulk with optimistic state
//! - [`spreadsheet`] / [`normalize`]: `.xlsx` rows to items
//! - [`reconcile`]: import and bulk upload flows

pub mod model;
pub mod store;
pub mod protocol;
pub mod broadcast;
pub mod channel;
pub mod backend;
pub mod sync;
pub mod spreadsheet;
pub mod normalize;
pub mod reconcile;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use model::{split_tags, ImageFile, ItemId, MenuItem};
pub use store::{EntryKey, Match, OptimisticStore, Snapshot};
pub use protocol::{ChangeNotification, Envelope, ProtocolError, MENU_UPDATE};
pub use broadcast::{BroadcastMerger, DeleteMarkerPolicy, PublishStats, Publisher};
pub use channel::{ChannelClient, ChannelError, ChannelEvent, ConnectionState};
pub use backend::{BulkOutcome, HttpBackend, MenuBackend};
pub use sync::{validate, SyncClient};
pub use spreadsheet::{CellValue, Row, SpreadsheetError, TEMPLATE_HEADERS};
pub use normalize::normalize;
pub use reconcile::Reconciler;
pub use config::SyncConfig;
pub use error::{BackendError, SyncError};
