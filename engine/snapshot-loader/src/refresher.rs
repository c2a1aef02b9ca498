//! Background snapshot refresh
//!
//! Refresh requests are coalesced: any number of requests made while a load
//! is running produce exactly one further load. An `Auth` failure is terminal
//! and stops the background task.

use crate::source::{RefreshTrigger, SnapshotSource};
use metrics::increment_counter;
use portfolio_types::{EngineError, EngineResult};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use valuation_store::{SnapshotOutcome, StoreHandle};

/// Health of the refresh path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Active,
    /// Credentials were rejected; no further loads are attempted
    AuthRejected(String),
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    store: StoreHandle,
    user_id: String,
    wake: Notify,
    status: watch::Sender<RefreshStatus>,
}

/// Loads snapshots into the Valuation Store
#[derive(Clone)]
pub struct SnapshotRefresher {
    inner: Arc<Inner>,
}

impl SnapshotRefresher {
    pub fn new(source: Arc<dyn SnapshotSource>, store: StoreHandle, user_id: impl Into<String>) -> Self {
        let (status, _) = watch::channel(RefreshStatus::Active);
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                user_id: user_id.into(),
                wake: Notify::new(),
                status,
            }),
        }
    }

    /// Fetch and apply a snapshot now
    pub async fn load_now(&self) -> EngineResult<SnapshotOutcome> {
        let rejected = match &*self.inner.status.borrow() {
            RefreshStatus::AuthRejected(reason) => Some(reason.clone()),
            RefreshStatus::Active => None,
        };
        if let Some(reason) = rejected {
            return Err(EngineError::Auth(reason));
        }

        let holdings = match self.inner.source.load(&self.inner.user_id).await {
            Ok(holdings) => holdings,
            Err(EngineError::Auth(reason)) => {
                error!("Snapshot credentials rejected, refresh stopped: {}", reason);
                self.inner.status.send_replace(RefreshStatus::AuthRejected(reason.clone()));
                self.inner.wake.notify_one();
                return Err(EngineError::Auth(reason));
            }
            Err(e) => return Err(e),
        };

        let outcome = self.inner.store.replace_snapshot(holdings).await?;
        increment_counter!("snapshots_applied_total");
        debug!("Snapshot applied: {:?}", outcome);
        Ok(outcome)
    }

    pub fn status(&self) -> watch::Receiver<RefreshStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(*self.inner.status.borrow(), RefreshStatus::AuthRejected(_))
    }

    /// Serve refresh requests until credentials are rejected or the store stops
    pub fn spawn(&self) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move {
            info!("Snapshot refresher started");
            loop {
                refresher.inner.wake.notified().await;
                if refresher.is_auth_rejected() {
                    break;
                }
                match refresher.load_now().await {
                    Ok(_) => {}
                    Err(EngineError::Auth(_)) | Err(EngineError::Shutdown(_)) => break,
                    Err(e) => {
                        increment_counter!("snapshot_failures_total");
                        warn!("Background snapshot failed: {}", e);
                    }
                }
            }
            info!("Snapshot refresher stopped");
        })
    }
}

impl RefreshTrigger for SnapshotRefresher {
    fn request_refresh(&self, reason: &str) {
        debug!("Snapshot refresh requested: {}", reason);
        self.inner.wake.notify_one();
    }
}
