//! Portfolio Types - shared domain model for the valuation engine
//!
//! Every engine crate speaks in these types: instrument ids, price ticks,
//! holdings with their derived valuation, order intents, execution events and
//! the error taxonomy surfaced to callers.

pub mod catalog;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod holding;
pub mod ids;
pub mod market;
pub mod order;

pub use catalog::{Instrument, InstrumentCatalog};
pub use credentials::Credentials;
pub use error::{EngineError, EngineResult};
pub use execution::{ExecutionEvent, ExecutionId};
pub use holding::{Holding, PortfolioSummary};
pub use ids::InstrumentId;
pub use market::{LogicalTimestamp, PriceTick};
pub use order::{IntentKey, OrderIntent, OrderMode, Side, TicketId};

/// Re-exported so downstream crates agree on one decimal type
pub use rust_decimal::Decimal;
