//! Main OrderGateway implementation

use crate::backend::{OrderBackend, PositionBook};
use crate::config::OrderGatewayConfig;
use crate::messages::{Acknowledgement, OrderRequest};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::increment_counter;
use portfolio_types::{
    EngineError, EngineResult, InstrumentCatalog, IntentKey, OrderIntent, OrderMode, Side,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

/// Lifecycle of one intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionState {
    /// Reserved and being validated
    Drafted,
    /// Sent to the backend, no answer yet
    Submitting,
    Accepted,
    Rejected,
    /// The request was sent but the exchange failed before an answer; the
    /// backend may or may not have taken the order
    Unconfirmed,
}

/// Final result of a submission, published whether or not the caller was
/// still waiting for it
#[derive(Debug, Clone, PartialEq)]
pub struct OrderOutcome {
    pub key: IntentKey,
    pub mode: OrderMode,
    pub state: SubmissionState,
    pub acknowledgement: Option<Acknowledgement>,
    /// Rejection reason as reported
    pub reason: Option<String>,
}

/// Returned to the caller of an accepted submission
///
/// For conditional orders this means armed on the backend, not executed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub key: IntentKey,
    pub mode: OrderMode,
    pub acknowledgement: Acknowledgement,
}

type InFlight = Arc<DashMap<IntentKey, SubmissionState>>;

/// Removes the in-flight entry when the submission ends, however it ends
struct InFlightGuard {
    in_flight: InFlight,
    key: IntentKey,
    retain: bool,
}

impl InFlightGuard {
    fn advance(&self, state: SubmissionState) {
        if let Some(mut entry) = self.in_flight.get_mut(&self.key) {
            *entry = state;
        }
    }

    /// Keep the entry after the guard is gone
    fn retain(&mut self) {
        self.retain = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.retain {
            self.in_flight.remove(&self.key);
        }
    }
}

/// Main OrderGateway service
pub struct OrderGateway {
    config: OrderGatewayConfig,
    backend: Arc<dyn OrderBackend>,
    book: Arc<dyn PositionBook>,
    catalog: Arc<InstrumentCatalog>,
    in_flight: InFlight,
    outcomes: broadcast::Sender<OrderOutcome>,
}

impl OrderGateway {
    pub fn new(
        config: OrderGatewayConfig,
        backend: Arc<dyn OrderBackend>,
        book: Arc<dyn PositionBook>,
        catalog: Arc<InstrumentCatalog>,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(config.outcome_buffer.max(1));
        Self { config, backend, book, catalog, in_flight: Arc::new(DashMap::new()), outcomes }
    }

    /// Validate and submit an intent
    ///
    /// Fails without a network call on validation errors and on a duplicate of
    /// an intent still in flight. Returns `Timeout` when no answer arrives in
    /// time; the request is not cancelled and its result is published as an
    /// `OrderOutcome`. A transport failure after sending leaves the intent
    /// reserved as `Unconfirmed`.
    pub async fn submit(&self, intent: OrderIntent) -> EngineResult<SubmissionReceipt> {
        let key = intent.key();
        let guard = self.reserve(key)?;

        let request = match self.validate(&intent) {
            Ok(request) => request,
            Err(e) => {
                info!("Order {} refused: {}", key, e);
                return Err(e);
            }
        };

        guard.advance(SubmissionState::Submitting);
        increment_counter!("orders_submitted_total");
        info!("Submitting order {} qty {} ({:?})", key, intent.quantity, intent.mode);

        let (reply, response) = oneshot::channel();
        let backend = self.backend.clone();
        let outcomes = self.outcomes.clone();
        let mode = intent.mode;
        tokio::spawn(async move {
            let mut guard = guard;
            let result = backend.submit(request).await;
            let outcome = match &result {
                Ok(ack) => {
                    guard.advance(SubmissionState::Accepted);
                    increment_counter!("orders_accepted_total");
                    OrderOutcome {
                        key,
                        mode,
                        state: SubmissionState::Accepted,
                        acknowledgement: Some(ack.clone()),
                        reason: None,
                    }
                }
                Err(EngineError::Transport(reason)) => {
                    // Sent, but nobody knows whether it landed; resubmitting
                    // could double the order
                    guard.advance(SubmissionState::Unconfirmed);
                    guard.retain();
                    increment_counter!("orders_unconfirmed_total");
                    warn!("Order {} unconfirmed after transport failure: {}", key, reason);
                    OrderOutcome {
                        key,
                        mode,
                        state: SubmissionState::Unconfirmed,
                        acknowledgement: None,
                        reason: Some(reason.clone()),
                    }
                }
                Err(e) => {
                    guard.advance(SubmissionState::Rejected);
                    increment_counter!("orders_rejected_total");
                    warn!("Order {} rejected: {}", key, e);
                    OrderOutcome {
                        key,
                        mode,
                        state: SubmissionState::Rejected,
                        acknowledgement: None,
                        reason: Some(rejection_text(e)),
                    }
                }
            };
            drop(guard);
            let _ = outcomes.send(outcome);
            let _ = reply.send(result);
        });

        let wait = self.config.submission_timeout();
        match tokio::time::timeout(wait, response).await {
            Ok(Ok(result)) => result.map(|acknowledgement| SubmissionReceipt { key, mode, acknowledgement }),
            Ok(Err(_)) => Err(EngineError::Shutdown("submission task ended without a result".into())),
            Err(_) => {
                increment_counter!("orders_timed_out_total");
                warn!("Order {} not acknowledged within {:?}; still outstanding", key, wait);
                Err(EngineError::Timeout(wait))
            }
        }
    }

    /// Current state of an intent that is reserved or in flight
    pub fn state_of(&self, key: &IntentKey) -> Option<SubmissionState> {
        self.in_flight.get(key).map(|state| *state)
    }

    /// Drop the reservation of an unconfirmed intent so it may be submitted
    /// again. Only call this once the holdings show the first attempt did not
    /// execute.
    pub fn release_unconfirmed(&self, key: &IntentKey) -> bool {
        self.in_flight
            .remove_if(key, |_, state| *state == SubmissionState::Unconfirmed)
            .is_some()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Receiver for the outcome of every submission
    pub fn outcomes(&self) -> broadcast::Receiver<OrderOutcome> {
        self.outcomes.subscribe()
    }

    fn reserve(&self, key: IntentKey) -> EngineResult<InFlightGuard> {
        match self.in_flight.entry(key) {
            Entry::Occupied(_) => {
                increment_counter!("orders_duplicate_total");
                warn!("Duplicate submission of {} refused", key);
                Err(EngineError::DuplicateSubmission(key.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(SubmissionState::Drafted);
                Ok(InFlightGuard { in_flight: self.in_flight.clone(), key, retain: false })
            }
        }
    }

    fn validate(&self, intent: &OrderIntent) -> EngineResult<OrderRequest> {
        let id = intent.instrument_id;
        if intent.quantity < 1 {
            return Err(EngineError::Validation("quantity must be at least 1".into()));
        }
        if !self.catalog.accepts(id) {
            return Err(EngineError::Validation(format!("unknown instrument {}", id)));
        }
        if let OrderMode::Conditional { limit_price } = intent.mode {
            if limit_price <= Decimal::ZERO {
                return Err(EngineError::Validation(format!(
                    "limit price must be positive, got {}",
                    limit_price
                )));
            }
        }
        if intent.side == Side::Sell {
            let held = self.book.held_shares(id);
            let requested = Decimal::from(intent.quantity);
            if requested > held {
                return Err(EngineError::InsufficientShares { requested, held });
            }
        }

        let price = match intent.mode {
            OrderMode::Instant => self
                .book
                .last_price(id)
                .ok_or_else(|| EngineError::Validation(format!("no price observed for {} yet", id)))?,
            OrderMode::Conditional { limit_price } => limit_price,
        };
        Ok(OrderRequest::from_intent(intent, price))
    }
}

fn rejection_text(err: &EngineError) -> String {
    match err {
        EngineError::BackendRejection(reason) | EngineError::Auth(reason) => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use portfolio_types::{Holding, InstrumentId, TicketId};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    const X: InstrumentId = InstrumentId(7);

    /// Backend that records calls and answers once released
    struct GatedBackend {
        calls: AtomicUsize,
        requests: Mutex<Vec<OrderRequest>>,
        entered: Notify,
        release: Notify,
        gated: bool,
        answer: EngineResult<Acknowledgement>,
    }

    impl GatedBackend {
        fn new(gated: bool, answer: EngineResult<Acknowledgement>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                entered: Notify::new(),
                release: Notify::new(),
                gated,
                answer,
            })
        }

        fn accepting() -> Arc<Self> {
            Self::new(false, Ok(Acknowledgement::default()))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderBackend for GatedBackend {
        async fn submit(&self, request: OrderRequest) -> EngineResult<Acknowledgement> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.entered.notify_one();
            if self.gated {
                self.release.notified().await;
            }
            self.answer.clone()
        }
    }

    struct FakeBook {
        shares: Decimal,
        price: Option<Decimal>,
    }

    impl PositionBook for FakeBook {
        fn held_shares(&self, _id: InstrumentId) -> Decimal {
            self.shares
        }

        fn last_price(&self, _id: InstrumentId) -> Option<Decimal> {
            self.price
        }
    }

    fn gateway(backend: Arc<GatedBackend>, timeout_ms: u64) -> OrderGateway {
        let config = OrderGatewayConfig { submission_timeout_ms: timeout_ms, ..Default::default() };
        OrderGateway::new(
            config,
            backend,
            Arc::new(FakeBook { shares: dec!(5), price: Some(dec!(100)) }),
            Arc::new(InstrumentCatalog::permissive()),
        )
    }

    #[tokio::test]
    async fn test_duplicate_submission_makes_no_second_call() {
        let backend = GatedBackend::new(true, Ok(Acknowledgement::default()));
        let gateway = Arc::new(gateway(backend.clone(), 5_000));
        let intent = OrderIntent::instant(TicketId::new(), X, Side::Sell, 2);

        let first = {
            let gateway = gateway.clone();
            let intent = intent.clone();
            tokio::spawn(async move { gateway.submit(intent).await })
        };
        backend.entered.notified().await;
        assert_eq!(gateway.state_of(&intent.key()), Some(SubmissionState::Submitting));

        let err = gateway.submit(intent.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSubmission(_)));
        assert_eq!(backend.calls(), 1);

        backend.release.notify_one();
        let receipt = first.await.unwrap().unwrap();
        assert_eq!(receipt.key, intent.key());
        assert_eq!(gateway.in_flight_count(), 0);

        // A new ticket for the same instrument and side is a different intent
        let other = OrderIntent::instant(TicketId::new(), X, Side::Sell, 2);
        backend.release.notify_one();
        gateway.submit(other).await.unwrap();
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_oversell_rejected_before_network() {
        let backend = GatedBackend::accepting();
        let gateway = gateway(backend.clone(), 1_000);

        let err = gateway
            .submit(OrderIntent::instant(TicketId::new(), X, Side::Sell, 6))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::InsufficientShares { requested: dec!(6), held: dec!(5) });
        assert!(err.is_validation());
        assert_eq!(backend.calls(), 0);
        assert_eq!(gateway.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let backend = GatedBackend::accepting();
        let gateway = gateway(backend.clone(), 1_000);

        let zero = OrderIntent::instant(TicketId::new(), X, Side::Buy, 0);
        assert!(gateway.submit(zero).await.unwrap_err().is_validation());

        let bad_limit = OrderIntent::conditional(TicketId::new(), X, Side::Buy, 1, dec!(0));
        assert!(gateway.submit(bad_limit).await.unwrap_err().is_validation());

        let unpriced = OrderGateway::new(
            OrderGatewayConfig::default(),
            backend.clone(),
            Arc::new(FakeBook { shares: dec!(0), price: None }),
            Arc::new(InstrumentCatalog::permissive()),
        );
        let err = unpriced
            .submit(OrderIntent::instant(TicketId::new(), X, Side::Buy, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_leaves_request_outstanding() {
        let backend = GatedBackend::new(true, Ok(Acknowledgement::default()));
        let gateway = gateway(backend.clone(), 20);
        let mut outcomes = gateway.outcomes();
        let intent = OrderIntent::instant(TicketId::new(), X, Side::Buy, 1);

        let err = gateway.submit(intent.clone()).await.unwrap_err();
        assert_eq!(err, EngineError::Timeout(Duration::from_millis(20)));
        assert_eq!(gateway.state_of(&intent.key()), Some(SubmissionState::Submitting));
        assert!(matches!(
            gateway.submit(intent.clone()).await,
            Err(EngineError::DuplicateSubmission(_))
        ));

        backend.release.notify_one();
        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.key, intent.key());
        assert_eq!(outcome.state, SubmissionState::Accepted);
        assert_eq!(gateway.in_flight_count(), 0);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_unconfirmed_and_stays_reserved() {
        let backend =
            GatedBackend::new(false, Err(EngineError::Transport("connection reset by peer".into())));
        let gateway = gateway(backend.clone(), 1_000);
        let mut outcomes = gateway.outcomes();
        let intent = OrderIntent::instant(TicketId::new(), X, Side::Buy, 1);

        let err = gateway.submit(intent.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.state, SubmissionState::Unconfirmed);
        assert_eq!(outcome.reason.as_deref(), Some("connection reset by peer"));
        assert_eq!(gateway.state_of(&intent.key()), Some(SubmissionState::Unconfirmed));

        assert!(matches!(
            gateway.submit(intent.clone()).await,
            Err(EngineError::DuplicateSubmission(_))
        ));
        assert_eq!(backend.calls(), 1);

        assert!(gateway.release_unconfirmed(&intent.key()));
        assert!(!gateway.release_unconfirmed(&intent.key()));
        assert_eq!(gateway.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_rejection_is_verbatim() {
        let backend =
            GatedBackend::new(false, Err(EngineError::BackendRejection("Insufficient balance".into())));
        let gateway = gateway(backend, 1_000);
        let mut outcomes = gateway.outcomes();

        let err = gateway
            .submit(OrderIntent::instant(TicketId::new(), X, Side::Buy, 3))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::BackendRejection("Insufficient balance".into()));

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.state, SubmissionState::Rejected);
        assert_eq!(outcome.reason.as_deref(), Some("Insufficient balance"));
    }

    #[tokio::test]
    async fn test_conditional_order_leaves_holdings_alone() {
        use valuation_store::{spawn_store, StoreConfig, StoreHandle, ValuationStore};

        let (store, _task): (StoreHandle, _) = spawn_store(
            ValuationStore::new(Arc::new(InstrumentCatalog::permissive())),
            StoreConfig::default(),
        );
        store
            .replace_snapshot(vec![Holding::new(X, dec!(10), dec!(1000), dec!(100), dec!(0))])
            .await
            .unwrap();
        let before = store.view();

        let backend = GatedBackend::accepting();
        let gateway = OrderGateway::new(
            OrderGatewayConfig::default(),
            backend.clone(),
            Arc::new(store.clone()),
            Arc::new(InstrumentCatalog::permissive()),
        );

        let intent = OrderIntent::conditional(TicketId::new(), X, Side::Sell, 4, dec!(130));
        let receipt = gateway.submit(intent).await.unwrap();
        assert_eq!(receipt.mode, OrderMode::Conditional { limit_price: dec!(130) });

        let requests = backend.requests.lock().unwrap().clone();
        assert!(matches!(requests.as_slice(), [OrderRequest::Conditional(body)]
            if body.target_price == dec!(130) && body.order_type == "S"));

        let after = store.view();
        assert_eq!(after.revision, before.revision);
        assert_eq!(after.holdings, before.holdings);
    }
}
