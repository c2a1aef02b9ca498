//! Snapshot seams and record normalization

use async_trait::async_trait;
use portfolio_types::{EngineResult, Holding, InstrumentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Full holding list for one user
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self, user_id: &str) -> EngineResult<Vec<Holding>>;
}

/// Anything that can ask for a best-effort re-snapshot
pub trait RefreshTrigger: Send + Sync {
    fn request_refresh(&self, reason: &str);
}

/// One row of the backend's portfolio listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRecord {
    pub stock_id: InstrumentId,
    #[serde(default)]
    pub stock_name: Option<String>,
    pub quantity: Decimal,
    /// Average purchase price per share
    pub buy_price: Decimal,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub day_change: Option<Decimal>,
}

/// Convert backend rows into holdings
///
/// Invested value is `buy_price × quantity`. Rows without a positive quantity
/// are dropped; a missing current price falls back to the buy price.
pub fn normalize_records(records: Vec<PortfolioRecord>) -> Vec<Holding> {
    records
        .into_iter()
        .filter_map(|record| {
            if record.quantity <= Decimal::ZERO {
                debug!("Dropping record for {} with quantity {}", record.stock_id, record.quantity);
                return None;
            }
            let price = record.current_price.unwrap_or(record.buy_price);
            Some(Holding::new(
                record.stock_id,
                record.quantity,
                record.buy_price * record.quantity,
                price,
                record.day_change.unwrap_or(Decimal::ZERO),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_records() {
        let body = r#"[
            {"stock_id": 24, "stock_name": "INFY", "quantity": 10, "buy_price": 100.0,
             "current_price": 120.5, "day_change": 1.5, "current_value": 1205.0, "pnl": 205.0},
            {"stock_id": 3, "quantity": 0, "buy_price": 50},
            {"stock_id": 7, "quantity": 4, "buy_price": "25.5"}
        ]"#;
        let records: Vec<PortfolioRecord> = serde_json::from_str(body).unwrap();
        let holdings = normalize_records(records);

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].instrument_id(), InstrumentId(24));
        assert_eq!(holdings[0].invested_value(), dec!(1000));
        assert_eq!(holdings[0].current_price(), dec!(120.5));
        assert_eq!(holdings[0].holdings_value(), dec!(1205));
        assert_eq!(holdings[0].day_change_percent(), dec!(1.5));

        assert_eq!(holdings[1].instrument_id(), InstrumentId(7));
        assert_eq!(holdings[1].invested_value(), dec!(102));
        assert_eq!(holdings[1].current_price(), dec!(25.5));
    }
}
