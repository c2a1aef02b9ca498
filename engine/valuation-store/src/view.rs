//! Read-side view of the Valuation Store

use portfolio_types::{Holding, InstrumentCatalog, InstrumentId, PortfolioSummary, PriceTick};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const UNKNOWN_SECTOR: &str = "Others";

/// Consistent copy of the store taken after a mutation
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioView {
    /// Increases with every mutation that changed state
    pub revision: u64,
    /// Sorted by instrument id
    pub holdings: Vec<Holding>,
    pub summary: PortfolioSummary,
    /// Live price cache, including instruments that are not held
    pub last_prices: BTreeMap<InstrumentId, PriceTick>,
}

/// Share of portfolio value held in one sector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorAllocation {
    pub sector: String,
    pub value: Decimal,
    pub percent: Decimal,
}

impl PortfolioView {
    pub fn holding(&self, id: InstrumentId) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.instrument_id() == id)
    }

    /// Shares currently held, zero when there is no holding
    pub fn held_shares(&self, id: InstrumentId) -> Decimal {
        self.holding(id).map(Holding::shares).unwrap_or(Decimal::ZERO)
    }

    pub fn last_price(&self, id: InstrumentId) -> Option<&PriceTick> {
        self.last_prices.get(&id)
    }

    /// Holdings value grouped by sector, largest first
    pub fn sector_allocation(&self, catalog: &InstrumentCatalog) -> Vec<SectorAllocation> {
        let mut by_sector: HashMap<&str, Decimal> = HashMap::new();
        for holding in &self.holdings {
            let sector = catalog.sector_of(holding.instrument_id()).unwrap_or(UNKNOWN_SECTOR);
            *by_sector.entry(sector).or_insert(Decimal::ZERO) += holding.holdings_value();
        }

        let total: Decimal = by_sector.values().copied().sum();
        let mut allocation: Vec<SectorAllocation> = by_sector
            .into_iter()
            .map(|(sector, value)| SectorAllocation {
                sector: sector.to_string(),
                value,
                percent: if total.is_zero() {
                    Decimal::ZERO
                } else {
                    value / total * Decimal::ONE_HUNDRED
                },
            })
            .collect();
        allocation.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.sector.cmp(&b.sector)));
        allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_types::Instrument;
    use rust_decimal_macros::dec;

    fn instrument(id: u32, ticker: &str, sector: &str) -> Instrument {
        Instrument {
            id: InstrumentId(id),
            ticker: ticker.into(),
            sector: sector.into(),
            display_name: ticker.into(),
        }
    }

    #[test]
    fn test_sector_allocation() {
        let catalog = InstrumentCatalog::new(vec![
            instrument(17, "HCLTECH", "Tech"),
            instrument(24, "INFY", "Tech"),
            instrument(18, "HDFCBANK", "Finance"),
        ]);
        let view = PortfolioView {
            holdings: vec![
                Holding::new(InstrumentId(17), dec!(1), dec!(0), dec!(100), dec!(0)),
                Holding::new(InstrumentId(18), dec!(1), dec!(0), dec!(500), dec!(0)),
                Holding::new(InstrumentId(24), dec!(2), dec!(0), dec!(100), dec!(0)),
                Holding::new(InstrumentId(99), dec!(1), dec!(0), dec!(200), dec!(0)),
            ],
            ..Default::default()
        };

        let allocation = view.sector_allocation(&catalog);
        let sectors: Vec<&str> = allocation.iter().map(|a| a.sector.as_str()).collect();
        assert_eq!(sectors, vec!["Finance", "Tech", "Others"]);
        assert_eq!(allocation[0].value, dec!(500));
        assert_eq!(allocation[1].value, dec!(300));
        assert_eq!(allocation[0].percent, dec!(50));
        assert_eq!(allocation[2].percent, dec!(20));
    }

    #[test]
    fn test_held_shares_defaults_to_zero() {
        let view = PortfolioView::default();
        assert_eq!(view.held_shares(InstrumentId(1)), Decimal::ZERO);
        assert!(view.sector_allocation(&InstrumentCatalog::permissive()).is_empty());
    }
}
