//! Holdings and the aggregate portfolio summary
//!
//! `holdings_value`, `total_gain_loss` and `total_gain_loss_percent` are derived
//! fields. They are private and recomputed whenever price or position changes,
//! so no caller can move them out of step with the inputs.

use crate::ids::InstrumentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's position in one instrument plus its derived valuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    instrument_id: InstrumentId,
    shares: Decimal,
    invested_value: Decimal,
    current_price: Decimal,
    day_change_percent: Decimal,
    holdings_value: Decimal,
    total_gain_loss: Decimal,
    total_gain_loss_percent: Decimal,
}

impl Holding {
    /// Create a holding and derive its valuation
    pub fn new(
        instrument_id: InstrumentId,
        shares: Decimal,
        invested_value: Decimal,
        current_price: Decimal,
        day_change_percent: Decimal,
    ) -> Self {
        let mut holding = Self {
            instrument_id,
            shares,
            invested_value,
            current_price,
            day_change_percent,
            holdings_value: Decimal::ZERO,
            total_gain_loss: Decimal::ZERO,
            total_gain_loss_percent: Decimal::ZERO,
        };
        holding.recompute();
        holding
    }

    /// Apply a new price and day change
    pub fn reprice(&mut self, price: Decimal, day_change_percent: Decimal) {
        self.current_price = price;
        self.day_change_percent = day_change_percent;
        self.recompute();
    }

    /// Replace the position composition (shares and invested capital)
    pub fn set_position(&mut self, shares: Decimal, invested_value: Decimal) {
        self.shares = shares;
        self.invested_value = invested_value.max(Decimal::ZERO);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.holdings_value = self.shares * self.current_price;
        self.total_gain_loss = self.holdings_value - self.invested_value;
        self.total_gain_loss_percent = percent_of(self.total_gain_loss, self.invested_value);
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument_id
    }

    pub fn shares(&self) -> Decimal {
        self.shares
    }

    pub fn invested_value(&self) -> Decimal {
        self.invested_value
    }

    pub fn current_price(&self) -> Decimal {
        self.current_price
    }

    pub fn day_change_percent(&self) -> Decimal {
        self.day_change_percent
    }

    pub fn holdings_value(&self) -> Decimal {
        self.holdings_value
    }

    pub fn total_gain_loss(&self) -> Decimal {
        self.total_gain_loss
    }

    pub fn total_gain_loss_percent(&self) -> Decimal {
        self.total_gain_loss_percent
    }

    /// Average cost per share, zero for an empty position
    pub fn average_cost(&self) -> Decimal {
        if self.shares.is_zero() {
            Decimal::ZERO
        } else {
            self.invested_value / self.shares
        }
    }
}

/// Aggregate over all holdings. Always rebuilt from the holding set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: Decimal,
    pub invested_capital: Decimal,
    pub total_gain_loss: Decimal,
    pub total_gain_loss_percent: Decimal,
}

impl PortfolioSummary {
    pub fn from_holdings<'a, I>(holdings: I) -> Self
    where
        I: IntoIterator<Item = &'a Holding>,
    {
        let (total_value, invested_capital) = holdings
            .into_iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(value, invested), h| {
                (value + h.holdings_value(), invested + h.invested_value())
            });
        let total_gain_loss = total_value - invested_capital;

        Self {
            total_value,
            invested_capital,
            total_gain_loss,
            total_gain_loss_percent: percent_of(total_gain_loss, invested_capital),
        }
    }
}

/// `part / whole * 100`, defined as zero when `whole` is zero
fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        (part / whole) * Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn holding(shares: Decimal, invested: Decimal, price: Decimal) -> Holding {
        Holding::new(InstrumentId(1), shares, invested, price, dec!(0))
    }

    #[test]
    fn test_derived_fields() {
        let h = holding(dec!(5), dec!(500), dec!(110));
        assert_eq!(h.holdings_value(), dec!(550));
        assert_eq!(h.total_gain_loss(), dec!(50));
        assert_eq!(h.total_gain_loss_percent(), dec!(10));
    }

    #[test]
    fn test_zero_invested_value_has_zero_percent() {
        let h = holding(dec!(3), dec!(0), dec!(42));
        assert_eq!(h.holdings_value(), dec!(126));
        assert_eq!(h.total_gain_loss(), dec!(126));
        assert_eq!(h.total_gain_loss_percent(), Decimal::ZERO);
    }

    #[test]
    fn test_reprice_recomputes() {
        let mut h = holding(dec!(10), dec!(1000), dec!(100));
        h.reprice(dec!(90), dec!(-1.5));
        assert_eq!(h.holdings_value(), dec!(900));
        assert_eq!(h.total_gain_loss(), dec!(-100));
        assert_eq!(h.total_gain_loss_percent(), dec!(-10));
        assert_eq!(h.day_change_percent(), dec!(-1.5));
    }

    #[test]
    fn test_set_position_recomputes() {
        let mut h = holding(dec!(10), dec!(1000), dec!(120));
        h.set_position(dec!(4), dec!(400));
        assert_eq!(h.holdings_value(), dec!(480));
        assert_eq!(h.total_gain_loss(), dec!(80));
        assert_eq!(h.average_cost(), dec!(100));
    }

    #[test]
    fn test_summary_is_sum_of_holdings() {
        let holdings = vec![
            holding(dec!(10), dec!(1000), dec!(120)),
            holding(dec!(2), dec!(300), dec!(100)),
        ];
        let summary = PortfolioSummary::from_holdings(&holdings);
        assert_eq!(summary.total_value, dec!(1400));
        assert_eq!(summary.invested_capital, dec!(1300));
        assert_eq!(summary.total_gain_loss, dec!(100));
        assert_eq!(summary.total_gain_loss_percent, dec!(100) / dec!(1300) * dec!(100));
    }

    #[test]
    fn test_empty_summary() {
        let summary = PortfolioSummary::from_holdings(&Vec::new());
        assert_eq!(summary, PortfolioSummary::default());
    }
}
