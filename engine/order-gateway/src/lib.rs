//! OrderGateway - intent validation and order submission
//!
//! Validates trade intents against the current positions and last observed
//! prices, refuses a second submission of an intent that is still in flight,
//! and forwards accepted intents to the execution backend. A submission that
//! outlives the configured wait surfaces `Timeout` to the caller while the
//! request stays outstanding; its eventual result is published as an
//! `OrderOutcome`.

pub mod backend;
pub mod config;
pub mod gateway;
pub mod messages;

#[cfg(test)]
mod integration_tests;

pub use backend::{interpret_response, HttpOrderBackend, OrderBackend, PositionBook};
pub use config::OrderGatewayConfig;
pub use gateway::{OrderGateway, OrderOutcome, SubmissionReceipt, SubmissionState};
pub use messages::{Acknowledgement, OrderRequest};
