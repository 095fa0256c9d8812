//! avsync client - async synchronization for attribute view tables.

pub mod config;
pub mod error;
pub mod http;
pub mod notifications;
pub mod persistence;
pub mod polling;
pub mod sync;
pub mod telemetry;

pub use config::{ClientConfig, ConfigError, DatabaseConfig, SourceConfig, SyncConfig, TelemetryConfig};
pub use error::{ClientError, PreconditionError, SyncError, SyncResult};
pub use http::HttpTransport;
pub use notifications::{Notification, NotificationLevel, NotificationLog, Notifier, TracingNotifier};
pub use persistence::SourceRegistry;
pub use polling::{poll_until, PollOutcome, PollPolicy};
pub use sync::{generate_item_id, LoadPhase, SyncContext, SyncSettings, SyncState, TableSync};
pub use telemetry::init_tracing;
