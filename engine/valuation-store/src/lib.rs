//! Valuation Store - the materialized view of a user's positions
//!
//! Holds the authoritative holding set and the last applied price per
//! instrument. Ticks, snapshot replacements and execution deltas are merged
//! with deterministic rules, and the portfolio summary is rebuilt after every
//! mutation. All writers go through a single owning task (`StoreHandle`), so
//! readers only ever see whole, consistent views.

mod actor;
mod config;
mod store;
mod view;

pub use actor::{spawn_store, StoreHandle};
pub use config::StoreConfig;
pub use store::{ExecutionOutcome, IgnoreReason, SnapshotOutcome, TickOutcome, ValuationStore};
pub use view::{PortfolioView, SectorAllocation};
