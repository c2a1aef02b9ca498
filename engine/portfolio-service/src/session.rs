//! Portfolio session: one user's engine, wired end to end

use crate::config::ServiceConfig;
use execution_reconciler::{ExecutionNotice, ExecutionReconciler};
use futures::{Stream, StreamExt};
use market_stream::{StreamClient, StreamEvent};
use order_gateway::{
    HttpOrderBackend, OrderBackend, OrderGateway, OrderOutcome, PositionBook, SubmissionReceipt,
    SubmissionState,
};
use portfolio_types::{
    Credentials, EngineError, EngineResult, InstrumentCatalog, InstrumentId, OrderIntent, OrderMode,
    PriceTick,
};
use serde::Serialize;
use snapshot_loader::{
    HttpSnapshotLoader, RefreshStatus, RefreshTrigger, SnapshotRefresher, SnapshotSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use valuation_store::{
    spawn_store, PortfolioView, SectorAllocation, SnapshotOutcome, StoreHandle, ValuationStore,
};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Starting,
    Live,
    /// Credentials were rejected; the session no longer refreshes
    AuthRejected,
    Closed,
}

/// Request/response collaborators of a session
pub struct SessionBackends {
    pub snapshots: Arc<dyn SnapshotSource>,
    pub orders: Arc<dyn OrderBackend>,
}

/// A running engine for one user
pub struct PortfolioSession {
    user_id: String,
    catalog: Arc<InstrumentCatalog>,
    store: StoreHandle,
    refresher: SnapshotRefresher,
    gateway: OrderGateway,
    notices: broadcast::Sender<ExecutionNotice>,
    status: Arc<watch::Sender<SessionStatus>>,
    store_task: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PortfolioSession {
    /// Start a session against the configured HTTP backend and market channel
    pub async fn start(
        config: &ServiceConfig,
        credentials: Credentials,
        catalog: InstrumentCatalog,
    ) -> EngineResult<Self> {
        let snapshots = HttpSnapshotLoader::new(config.snapshot_config(), credentials.clone())?;
        let orders = HttpOrderBackend::new(
            &config.backend.base_url,
            config.backend.request_timeout(),
            credentials.clone(),
        )?;
        let stream = StreamClient::new(config.stream.clone(), &credentials.user_id)?;
        info!("Subscribing to {}", stream.endpoint());

        let backends = SessionBackends { snapshots: Arc::new(snapshots), orders: Arc::new(orders) };
        Self::start_with(config, &credentials.user_id, catalog, backends, stream.subscribe()).await
    }

    /// Start a session over arbitrary backends and an event sequence
    ///
    /// Stream events are consumed while the initial snapshot loads. An `Auth`
    /// failure of that load tears the session down and is returned; any other
    /// failure is logged and retried in the background.
    pub async fn start_with<S>(
        config: &ServiceConfig,
        user_id: &str,
        catalog: InstrumentCatalog,
        backends: SessionBackends,
        events: S,
    ) -> EngineResult<Self>
    where
        S: Stream<Item = StreamEvent> + Send + Unpin + 'static,
    {
        let (status, _) = watch::channel(SessionStatus::Starting);
        let status = Arc::new(status);
        let catalog = Arc::new(catalog);

        let (store, store_task) = spawn_store(ValuationStore::new(catalog.clone()), config.store.clone());
        let refresher = SnapshotRefresher::new(backends.snapshots, store.clone(), user_id);
        let reconciler = ExecutionReconciler::new(
            config.reconciler.clone(),
            store.clone(),
            Arc::new(refresher.clone()),
        );
        let notices = reconciler.notice_sender();

        let mut session = Self {
            user_id: user_id.to_string(),
            catalog: catalog.clone(),
            store: store.clone(),
            refresher: refresher.clone(),
            gateway: OrderGateway::new(
                config.orders.clone(),
                backends.orders,
                Arc::new(store.clone()) as Arc<dyn PositionBook>,
                catalog,
            ),
            notices,
            status,
            store_task: Some(store_task),
            tasks: Vec::new(),
        };

        session.tasks.push(tokio::spawn(pump_events(events, store, reconciler, refresher.clone())));

        match refresher.load_now().await {
            Ok(outcome) => info!("Initial snapshot for user {} loaded: {:?}", user_id, outcome),
            Err(EngineError::Auth(reason)) => {
                error!("Initial snapshot rejected for user {}: {}", user_id, reason);
                session.close().await;
                return Err(EngineError::Auth(reason));
            }
            Err(e) => {
                warn!("Initial snapshot failed, retrying in background: {}", e);
                refresher.request_refresh("initial snapshot failed");
            }
        }

        session.tasks.push(refresher.spawn());
        session.tasks.push(tokio::spawn(watch_auth(refresher.status(), session.status.clone())));
        session
            .tasks
            .push(tokio::spawn(refresh_after_instant_orders(session.gateway.outcomes(), refresher)));

        session.status.send_replace(SessionStatus::Live);
        info!("Portfolio session live for user {}", user_id);
        Ok(session)
    }

    /// Validate and submit an order intent
    ///
    /// An accepted instant order is followed by a background re-snapshot;
    /// holdings change only once that snapshot or the execution event lands.
    pub async fn submit(&self, intent: OrderIntent) -> EngineResult<SubmissionReceipt> {
        if *self.status.borrow() == SessionStatus::Closed {
            return Err(EngineError::Shutdown("session closed".into()));
        }
        self.gateway.submit(intent).await
    }

    /// Latest consistent view of holdings, summary and prices
    pub fn view(&self) -> Arc<PortfolioView> {
        self.store.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PortfolioView>> {
        self.store.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<ExecutionNotice> {
        self.notices.subscribe()
    }

    pub fn order_outcomes(&self) -> broadcast::Receiver<OrderOutcome> {
        self.gateway.outcomes()
    }

    /// Force a re-snapshot now
    pub async fn refresh(&self) -> EngineResult<SnapshotOutcome> {
        self.refresher.load_now().await
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    pub fn sector_allocation(&self) -> Vec<SectorAllocation> {
        self.view().sector_allocation(&self.catalog)
    }

    /// Wait until a price for `id` has been observed
    pub async fn wait_for_price(&self, id: InstrumentId, wait: Duration) -> EngineResult<PriceTick> {
        let mut views = self.store.subscribe();
        let observed = tokio::time::timeout(wait, async move {
            loop {
                let price = views.borrow_and_update().last_price(id).cloned();
                if let Some(tick) = price {
                    return Ok(tick);
                }
                if views.changed().await.is_err() {
                    return Err(EngineError::Shutdown("valuation store stopped".into()));
                }
            }
        })
        .await;
        observed.unwrap_or(Err(EngineError::Timeout(wait)))
    }

    /// Stop every task and the store
    pub async fn shutdown(mut self) {
        self.close().await;
    }

    async fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.store.shutdown().await;
        if let Some(task) = self.store_task.take() {
            if let Err(e) = task.await {
                error!("Valuation store task failed: {}", e);
            }
        }
        self.status.send_replace(SessionStatus::Closed);
        info!("Portfolio session for user {} closed", self.user_id);
    }
}

impl Drop for PortfolioSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Route stream events into the store and the reconciler
async fn pump_events<S>(
    mut events: S,
    store: StoreHandle,
    mut reconciler: ExecutionReconciler,
    refresher: SnapshotRefresher,
) where
    S: Stream<Item = StreamEvent> + Send + Unpin + 'static,
{
    while let Some(event) = events.next().await {
        let result = match event {
            StreamEvent::Prices(ticks) => store.apply_ticks(ticks).await.map(|_| ()),
            StreamEvent::Execution(execution) => reconciler.reconcile(execution).await.map(|_| ()),
            StreamEvent::UnidentifiedExecution { instrument_id } => {
                // No id to deduplicate on, so only the backend's books are trusted
                let target = instrument_id.map(|id| id.to_string()).unwrap_or_else(|| "?".into());
                refresher.request_refresh(&format!("execution without id for {}", target));
                Ok(())
            }
            StreamEvent::Connected { attempt } => {
                // Executions may have been missed while disconnected
                if attempt > 0 {
                    refresher.request_refresh(&format!("stream reconnected (attempt {})", attempt));
                }
                Ok(())
            }
        };
        match result {
            Ok(()) => {}
            Err(EngineError::Shutdown(_)) => break,
            Err(e) => warn!("Failed to apply stream event: {}", e),
        }
    }
    debug!("Stream event pump stopped");
}

async fn watch_auth(mut refresh: watch::Receiver<RefreshStatus>, status: Arc<watch::Sender<SessionStatus>>) {
    loop {
        let rejected = matches!(*refresh.borrow_and_update(), RefreshStatus::AuthRejected(_));
        if rejected {
            error!("Credentials rejected; session will no longer refresh");
            status.send_replace(SessionStatus::AuthRejected);
            return;
        }
        if refresh.changed().await.is_err() {
            return;
        }
    }
}

async fn refresh_after_instant_orders(
    mut outcomes: broadcast::Receiver<OrderOutcome>,
    refresher: SnapshotRefresher,
) {
    loop {
        match outcomes.recv().await {
            Ok(outcome) => {
                let settled = matches!(
                    outcome.state,
                    SubmissionState::Accepted | SubmissionState::Unconfirmed
                );
                if settled && outcome.mode == OrderMode::Instant {
                    refresher.request_refresh(&format!("order {} {:?}", outcome.key, outcome.state));
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} order outcomes; refreshing", skipped);
                refresher.request_refresh("order outcomes lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
