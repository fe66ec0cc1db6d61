//! AssetDesk client library.
//!
//! HTTP access to the AssetDesk API, the paged entity lists, the device
//! relation lifecycle and the view cache those writes invalidate.

pub mod api_client;
pub mod cache;
pub mod cli;
pub mod config;
pub mod desk;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod list_query;
pub mod notifications;
pub mod policy;
pub mod telemetry;
pub mod tickets;

pub use api_client::RestClient;
pub use cache::{CacheLimits, CacheRead, CachedView, Freshness, ViewCache, Watermark};
pub use config::{AuthConfig, CacheConfig, ClientConfig, ConfigError, TelemetryConfig};
pub use desk::AssetDesk;
pub use error::ClientError;
pub use inventory::{Inventory, InventoryStore};
pub use lifecycle::{RelationLifecycle, RelationViews};
pub use list_query::EntityListQuery;
pub use notifications::{Notification, NotificationLevel};
pub use policy::RequestPolicy;
pub use tickets::{DashboardStats, TicketDesk, TicketStore};
