//! Merge rules for the Valuation Store
//!
//! `ValuationStore` is plain data with synchronous methods; the owning task in
//! `actor.rs` is the only place it is mutated at runtime.

use crate::view::PortfolioView;
use portfolio_types::{
    ExecutionEvent, Holding, InstrumentCatalog, InstrumentId, LogicalTimestamp, PortfolioSummary,
    PriceTick, Side,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of applying one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Price cache updated; `revalued` is true when a holding was repriced
    Applied { revalued: bool },
    /// Not newer than the last applied tick, discarded
    Stale { last_applied: LogicalTimestamp },
    UnknownInstrument,
}

/// Result of replacing the holding set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub holdings: usize,
    /// Holdings present before and absent from the snapshot
    pub removed: usize,
    /// Holdings valued at a live tick price instead of the snapshot's price
    pub live_priced: usize,
    /// Records skipped because the catalog does not know the instrument
    pub skipped: usize,
}

/// Result of applying an execution delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Opened,
    Increased,
    Reduced,
    Closed,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownInstrument,
    /// Sell for an instrument with no holding
    NoPosition,
    InvalidQuantity,
}

/// In-memory holding set plus the live price cache
pub struct ValuationStore {
    catalog: Arc<InstrumentCatalog>,
    holdings: BTreeMap<InstrumentId, Holding>,
    last_prices: BTreeMap<InstrumentId, PriceTick>,
    summary: PortfolioSummary,
    revision: u64,
}

impl ValuationStore {
    pub fn new(catalog: Arc<InstrumentCatalog>) -> Self {
        Self {
            catalog,
            holdings: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            summary: PortfolioSummary::default(),
            revision: 0,
        }
    }

    /// Apply a tick iff it is strictly newer than the last one applied for
    /// its instrument
    pub fn apply_tick(&mut self, tick: PriceTick) -> TickOutcome {
        let id = tick.instrument_id;
        if !self.catalog.accepts(id) {
            debug!("Ignoring tick for unknown instrument {}", id);
            return TickOutcome::UnknownInstrument;
        }

        if let Some(last) = self.last_prices.get(&id) {
            if !tick.supersedes(last) {
                debug!(
                    "Discarding stale tick for {}: {} is not newer than {}",
                    id, tick.observed_at, last.observed_at
                );
                metrics::increment_counter!("valuation_ticks_stale_total");
                return TickOutcome::Stale { last_applied: last.observed_at };
            }
        }

        let revalued = match self.holdings.get_mut(&id) {
            Some(holding) => {
                holding.reprice(tick.price, tick.day_change_percent);
                true
            }
            None => false,
        };
        self.last_prices.insert(id, tick);
        if revalued {
            self.refresh_summary();
        }
        self.revision += 1;
        metrics::increment_counter!("valuation_ticks_applied_total");

        TickOutcome::Applied { revalued }
    }

    /// Replace the holding set wholesale.
    ///
    /// Shares and invested value come from the snapshot unconditionally. A
    /// price already received from the stream is kept over the snapshot's
    /// embedded price; where no tick has been seen the snapshot price seeds
    /// the cache at `LogicalTimestamp::ORIGIN`.
    pub fn replace_snapshot(&mut self, snapshot: Vec<Holding>) -> SnapshotOutcome {
        let mut outcome = SnapshotOutcome::default();
        let mut replacement = BTreeMap::new();

        for mut holding in snapshot {
            let id = holding.instrument_id();
            if !self.catalog.accepts(id) {
                debug!("Skipping snapshot record for unknown instrument {}", id);
                outcome.skipped += 1;
                continue;
            }

            match self.last_prices.get(&id) {
                Some(live) if live.observed_at > LogicalTimestamp::ORIGIN => {
                    holding.reprice(live.price, live.day_change_percent);
                    outcome.live_priced += 1;
                }
                _ => {
                    self.last_prices.insert(
                        id,
                        PriceTick::new(
                            id,
                            holding.current_price(),
                            holding.day_change_percent(),
                            LogicalTimestamp::ORIGIN,
                        ),
                    );
                }
            }

            if replacement.insert(id, holding).is_some() {
                warn!("Snapshot contained instrument {} more than once, keeping the last record", id);
            }
        }

        outcome.removed = self.holdings.keys().filter(|id| !replacement.contains_key(id)).count();
        outcome.holdings = replacement.len();
        self.holdings = replacement;
        self.refresh_summary();
        self.revision += 1;
        metrics::increment_counter!("valuation_snapshots_applied_total");

        info!(
            "Snapshot applied: {} holdings ({} removed, {} live-priced)",
            outcome.holdings, outcome.removed, outcome.live_priced
        );
        outcome
    }

    /// Apply the position delta of a settled execution
    pub fn apply_execution(&mut self, event: &ExecutionEvent) -> ExecutionOutcome {
        let id = event.instrument_id;
        if !self.catalog.accepts(id) {
            debug!("Ignoring execution {} for unknown instrument {}", event.execution_id, id);
            return ExecutionOutcome::Ignored(IgnoreReason::UnknownInstrument);
        }
        if event.quantity <= Decimal::ZERO || event.executed_price < Decimal::ZERO {
            warn!(
                "Ignoring execution {} with quantity {} at {}",
                event.execution_id, event.quantity, event.executed_price
            );
            return ExecutionOutcome::Ignored(IgnoreReason::InvalidQuantity);
        }

        let outcome = match event.side {
            Side::Buy => self.apply_buy(event),
            Side::Sell => self.apply_sell(event),
        };

        if !matches!(outcome, ExecutionOutcome::Ignored(_)) {
            self.refresh_summary();
            self.revision += 1;
        }
        outcome
    }

    fn apply_buy(&mut self, event: &ExecutionEvent) -> ExecutionOutcome {
        let id = event.instrument_id;
        match self.holdings.get_mut(&id) {
            Some(holding) => {
                let shares = holding.shares() + event.quantity;
                let invested = holding.invested_value() + event.notional();
                holding.set_position(shares, invested);
                ExecutionOutcome::Increased
            }
            None => {
                let (price, day_change) = match self.last_prices.get(&id) {
                    Some(live) => (live.price, live.day_change_percent),
                    None => (event.executed_price, Decimal::ZERO),
                };
                let holding = Holding::new(id, event.quantity, event.notional(), price, day_change);
                self.holdings.insert(id, holding);
                ExecutionOutcome::Opened
            }
        }
    }

    fn apply_sell(&mut self, event: &ExecutionEvent) -> ExecutionOutcome {
        let id = event.instrument_id;
        let Some(holding) = self.holdings.get_mut(&id) else {
            warn!("Sell execution {} for {} without a holding", event.execution_id, id);
            return ExecutionOutcome::Ignored(IgnoreReason::NoPosition);
        };

        let prior_shares = holding.shares();
        if event.quantity >= prior_shares {
            if event.quantity > prior_shares {
                warn!(
                    "Sell execution {} for {} exceeds held shares ({} > {}), closing position",
                    event.execution_id, id, event.quantity, prior_shares
                );
            }
            self.holdings.remove(&id);
            return ExecutionOutcome::Closed;
        }

        let prior_invested = holding.invested_value();
        let released = (event.quantity / prior_shares) * prior_invested;
        holding.set_position(prior_shares - event.quantity, prior_invested - released);
        ExecutionOutcome::Reduced
    }

    fn refresh_summary(&mut self) {
        self.summary = PortfolioSummary::from_holdings(self.holdings.values());
    }

    pub fn holding(&self, id: InstrumentId) -> Option<&Holding> {
        self.holdings.get(&id)
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.values()
    }

    pub fn last_price(&self, id: InstrumentId) -> Option<&PriceTick> {
        self.last_prices.get(&id)
    }

    pub fn summary(&self) -> &PortfolioSummary {
        &self.summary
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Owned copy of the current state for readers
    pub fn view(&self) -> PortfolioView {
        PortfolioView {
            revision: self.revision,
            holdings: self.holdings.values().cloned().collect(),
            summary: self.summary.clone(),
            last_prices: self.last_prices.clone(),
        }
    }
}
