//! Execution event reconciliation

use crate::config::ReconcilerConfig;
use crate::seen::SeenExecutions;
use chrono::{DateTime, Utc};
use metrics::increment_counter;
use portfolio_types::{EngineResult, ExecutionEvent, ExecutionId, InstrumentId, Side};
use rust_decimal::Decimal;
use snapshot_loader::RefreshTrigger;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use valuation_store::{ExecutionOutcome, IgnoreReason, StoreHandle};

/// What happened to one delivered execution event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Applied(ExecutionOutcome),
    /// Already applied within the recency window
    Duplicate,
    /// Seen for the first time but not applicable to the holdings
    Ignored(IgnoreReason),
}

/// Notification for an execution that changed the holdings
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionNotice {
    pub execution_id: ExecutionId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub quantity: Decimal,
    pub executed_price: Decimal,
    pub outcome: ExecutionOutcome,
    pub received_at: DateTime<Utc>,
}

/// Applies each execution id once, then asks for a refresh
pub struct ExecutionReconciler {
    config: ReconcilerConfig,
    store: StoreHandle,
    refresh: Arc<dyn RefreshTrigger>,
    seen: SeenExecutions,
    notices: broadcast::Sender<ExecutionNotice>,
}

impl ExecutionReconciler {
    pub fn new(config: ReconcilerConfig, store: StoreHandle, refresh: Arc<dyn RefreshTrigger>) -> Self {
        let (notices, _) = broadcast::channel(config.notice_buffer.max(1));
        let seen = SeenExecutions::new(config.seen_window_capacity);
        Self { config, store, refresh, seen, notices }
    }

    /// Apply `event` unless its id was already applied
    ///
    /// The id is recorded only once the store has answered, so an event that
    /// failed to apply is not mistaken for a duplicate on redelivery.
    pub async fn reconcile(&mut self, event: ExecutionEvent) -> EngineResult<Reconciliation> {
        if self.seen.contains(&event.execution_id) {
            increment_counter!("executions_duplicate_total");
            debug!("Duplicate execution {} discarded", event.execution_id);
            return Ok(Reconciliation::Duplicate);
        }

        let received_at = Utc::now();
        let outcome = self.store.apply_execution(event.clone()).await?;
        self.seen.insert(event.execution_id.clone());

        if let ExecutionOutcome::Ignored(reason) = outcome {
            debug!("Execution {} not applied: {:?}", event.execution_id, reason);
            return Ok(Reconciliation::Ignored(reason));
        }

        increment_counter!("executions_applied_total");
        info!(
            "Execution {} applied: {} {} x {} @ {} ({:?})",
            event.execution_id,
            event.side,
            event.instrument_id,
            event.quantity,
            event.executed_price,
            outcome
        );

        let _ = self.notices.send(ExecutionNotice {
            execution_id: event.execution_id.clone(),
            instrument_id: event.instrument_id,
            side: event.side,
            quantity: event.quantity,
            executed_price: event.executed_price,
            outcome,
            received_at,
        });

        if self.config.refresh_after_execution {
            self.refresh.request_refresh(&format!("execution {}", event.execution_id));
        }
        Ok(Reconciliation::Applied(outcome))
    }

    pub fn notices(&self) -> broadcast::Receiver<ExecutionNotice> {
        self.notices.subscribe()
    }

    /// Sender side, for subscribing after the reconciler moved into a task
    pub fn notice_sender(&self) -> broadcast::Sender<ExecutionNotice> {
        self.notices.clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_types::{Holding, InstrumentCatalog};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valuation_store::{spawn_store, StoreConfig, ValuationStore};

    const X: InstrumentId = InstrumentId(11);

    #[derive(Default)]
    struct CountingTrigger {
        requests: AtomicUsize,
    }

    impl RefreshTrigger for CountingTrigger {
        fn request_refresh(&self, _reason: &str) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn execution(id: &str, side: Side, quantity: Decimal, price: Decimal) -> ExecutionEvent {
        ExecutionEvent {
            execution_id: ExecutionId::new(id),
            instrument_id: X,
            side,
            quantity,
            executed_price: price,
        }
    }

    fn reconciler(config: ReconcilerConfig) -> (ExecutionReconciler, StoreHandle, Arc<CountingTrigger>) {
        let (store, _) = spawn_store(
            ValuationStore::new(Arc::new(InstrumentCatalog::permissive())),
            StoreConfig::default(),
        );
        let trigger = Arc::new(CountingTrigger::default());
        (ExecutionReconciler::new(config, store.clone(), trigger.clone()), store, trigger)
    }

    #[tokio::test]
    async fn test_exactly_once_over_repeated_delivery() {
        let (mut reconciler, store, trigger) = reconciler(ReconcilerConfig::default());
        let buy = execution("ex-1", Side::Buy, dec!(5), dec!(100));

        assert_eq!(
            reconciler.reconcile(buy.clone()).await.unwrap(),
            Reconciliation::Applied(ExecutionOutcome::Opened)
        );
        for _ in 0..4 {
            assert_eq!(reconciler.reconcile(buy.clone()).await.unwrap(), Reconciliation::Duplicate);
        }

        let view = store.view();
        let holding = view.holding(X).unwrap();
        assert_eq!(holding.shares(), dec!(5));
        assert_eq!(holding.invested_value(), dec!(500));
        assert_eq!(trigger.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sell_reduces_proportionally_and_notifies() {
        let (mut reconciler, store, _) = reconciler(ReconcilerConfig::default());
        store
            .replace_snapshot(vec![Holding::new(X, dec!(10), dec!(1000), dec!(120), dec!(0))])
            .await
            .unwrap();
        let mut notices = reconciler.notices();

        let outcome = reconciler
            .reconcile(execution("ex-2", Side::Sell, dec!(4), dec!(130)))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciliation::Applied(ExecutionOutcome::Reduced));
        assert_eq!(store.view().holding(X).unwrap().invested_value(), dec!(600));

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.execution_id, ExecutionId::new("ex-2"));
        assert_eq!(notice.side, Side::Sell);
        assert_eq!(notice.outcome, ExecutionOutcome::Reduced);

        let outcome = reconciler
            .reconcile(execution("ex-3", Side::Sell, dec!(6), dec!(130)))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciliation::Applied(ExecutionOutcome::Closed));
        assert!(store.view().holding(X).is_none());
    }

    #[tokio::test]
    async fn test_ignored_execution_is_remembered_without_notice() {
        let config = ReconcilerConfig { refresh_after_execution: false, ..Default::default() };
        let (mut reconciler, _store, trigger) = reconciler(config);
        let mut notices = reconciler.notices();

        let sell = execution("ex-4", Side::Sell, dec!(1), dec!(10));
        assert_eq!(
            reconciler.reconcile(sell.clone()).await.unwrap(),
            Reconciliation::Ignored(IgnoreReason::NoPosition)
        );
        assert_eq!(reconciler.reconcile(sell).await.unwrap(), Reconciliation::Duplicate);
        assert!(notices.try_recv().is_err());
        assert_eq!(trigger.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_apply_is_not_recorded() {
        let (mut reconciler, store, _) = reconciler(ReconcilerConfig::default());
        store.shutdown().await;

        let buy = execution("ex-5", Side::Buy, dec!(1), dec!(10));
        assert!(reconciler.reconcile(buy).await.is_err());
        assert_eq!(reconciler.seen_count(), 0);
    }
}
