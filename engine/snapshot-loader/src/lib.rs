//! # Snapshot Loader
//!
//! Pull side of the engine. A `SnapshotSource` fetches the user's full
//! holding list; the `SnapshotRefresher` applies it to the Valuation Store as
//! a wholesale replacement, either on demand or in the background whenever a
//! component asks for a refresh through `RefreshTrigger`.

pub mod config;
pub mod http;
pub mod refresher;
pub mod source;

pub use config::SnapshotConfig;
pub use http::HttpSnapshotLoader;
pub use refresher::{RefreshStatus, SnapshotRefresher};
pub use source::{normalize_records, PortfolioRecord, RefreshTrigger, SnapshotSource};
