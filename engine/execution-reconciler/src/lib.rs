//! Execution Reconciler
//!
//! Applies `ORDER_EXECUTED` events to the Valuation Store exactly once per
//! execution id. The delta is applied immediately so the result is visible
//! without a round trip; a best-effort snapshot refresh follows to correct any
//! drift between the delta and the backend's books.

pub mod config;
pub mod reconciler;
pub mod seen;

pub use config::ReconcilerConfig;
pub use reconciler::{ExecutionNotice, ExecutionReconciler, Reconciliation};
pub use seen::SeenExecutions;
