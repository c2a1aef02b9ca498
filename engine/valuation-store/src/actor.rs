//! Single owner of the Valuation Store
//!
//! Every mutation is a command on one queue, applied in arrival order by one
//! task. After each state change the task publishes a fresh `PortfolioView`
//! on a watch channel, so readers never observe a half-applied update.

use crate::config::StoreConfig;
use crate::store::{ExecutionOutcome, SnapshotOutcome, TickOutcome, ValuationStore};
use crate::view::PortfolioView;
use portfolio_types::{
    EngineError, EngineResult, ExecutionEvent, Holding, InstrumentId, PriceTick,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

enum StoreCommand {
    ApplyTicks { ticks: Vec<PriceTick>, reply: oneshot::Sender<Vec<TickOutcome>> },
    ReplaceSnapshot { holdings: Vec<Holding>, reply: oneshot::Sender<SnapshotOutcome> },
    ApplyExecution { event: ExecutionEvent, reply: oneshot::Sender<ExecutionOutcome> },
    Shutdown,
}

/// Cloneable handle used by every writer and reader of the store
#[derive(Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<StoreCommand>,
    view: watch::Receiver<Arc<PortfolioView>>,
}

/// Move `store` into its owning task
pub fn spawn_store(store: ValuationStore, config: StoreConfig) -> (StoreHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(config.command_buffer.max(1));
    let (view_tx, view) = watch::channel(Arc::new(store.view()));
    let task = tokio::spawn(run(store, rx, view_tx));
    (StoreHandle { commands, view }, task)
}

async fn run(
    mut store: ValuationStore,
    mut commands: mpsc::Receiver<StoreCommand>,
    view_tx: watch::Sender<Arc<PortfolioView>>,
) {
    info!("Valuation store started");

    while let Some(command) = commands.recv().await {
        let revision = store.revision();
        match command {
            StoreCommand::ApplyTicks { ticks, reply } => {
                let outcomes = ticks.into_iter().map(|t| store.apply_tick(t)).collect();
                let _ = reply.send(outcomes);
            }
            StoreCommand::ReplaceSnapshot { holdings, reply } => {
                let _ = reply.send(store.replace_snapshot(holdings));
            }
            StoreCommand::ApplyExecution { event, reply } => {
                let _ = reply.send(store.apply_execution(&event));
            }
            StoreCommand::Shutdown => break,
        }

        if store.revision() != revision {
            view_tx.send_replace(Arc::new(store.view()));
        }
    }

    debug!("Valuation store stopped at revision {}", store.revision());
}

impl StoreHandle {
    /// Apply one frame's worth of ticks as a single mutation
    pub async fn apply_ticks(&self, ticks: Vec<PriceTick>) -> EngineResult<Vec<TickOutcome>> {
        self.request(|reply| StoreCommand::ApplyTicks { ticks, reply }).await
    }

    pub async fn apply_tick(&self, tick: PriceTick) -> EngineResult<TickOutcome> {
        let mut outcomes = self.apply_ticks(vec![tick]).await?;
        outcomes.pop().ok_or_else(|| EngineError::Shutdown("tick was not applied".to_string()))
    }

    pub async fn replace_snapshot(&self, holdings: Vec<Holding>) -> EngineResult<SnapshotOutcome> {
        self.request(|reply| StoreCommand::ReplaceSnapshot { holdings, reply }).await
    }

    pub async fn apply_execution(&self, event: ExecutionEvent) -> EngineResult<ExecutionOutcome> {
        self.request(|reply| StoreCommand::ApplyExecution { event, reply }).await
    }

    /// Stop the owning task after queued commands are drained
    pub async fn shutdown(&self) {
        let _ = self.commands.send(StoreCommand::Shutdown).await;
    }

    /// Latest published view
    pub fn view(&self) -> Arc<PortfolioView> {
        self.view.borrow().clone()
    }

    /// Receiver notified on every published view
    pub fn subscribe(&self) -> watch::Receiver<Arc<PortfolioView>> {
        self.view.clone()
    }

    pub fn held_shares(&self, id: InstrumentId) -> Decimal {
        self.view.borrow().held_shares(id)
    }

    pub fn last_price(&self, id: InstrumentId) -> Option<PriceTick> {
        self.view.borrow().last_price(id).cloned()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| EngineError::Shutdown("valuation store is not running".to_string()))?;
        response
            .await
            .map_err(|_| EngineError::Shutdown("valuation store dropped the request".to_string()))
    }
}
