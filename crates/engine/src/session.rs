//! Store sessions - the connections behind one operator action
//!
//! A session opens the target and log pools for an environment, hands out
//! the core components wired to them, and must be closed on every exit
//! path. When both stores resolve to the same URL one pool is shared.

use std::sync::Arc;
use std::time::Duration;

use crate::backends::{AnyBackend, DatabasePool, DatabasePoolConfig};
use crate::config::EnvironmentConfig;
use crate::detail::DetailRecorder;
use crate::error::EngineResult;
use crate::executor::MutationExecutor;
use crate::ledger::BatchLedger;
use crate::orchestrator::BatchOrchestrator;
use crate::rollback::RollbackEngine;

/// Round-trip times of a connectivity check
#[derive(Debug, Clone, Copy)]
pub struct StoreHealth {
    pub target: Duration,
    pub log: Duration,
}

/// Open pools for one environment
pub struct StoreSession {
    env: EnvironmentConfig,
    target: Arc<dyn DatabasePool>,
    log: Arc<dyn DatabasePool>,
    shared: bool,
}

impl StoreSession {
    /// Validate the environment and connect to both stores
    pub async fn connect(
        env: &EnvironmentConfig,
        pool_config: &DatabasePoolConfig,
    ) -> EngineResult<Self> {
        env.validate()?;

        let target_url = env.target.store.database_url()?;
        let log_url = env.log.store.database_url()?;
        let backend = AnyBackend::new();

        let target = backend.create_pool(&target_url, pool_config).await?;
        let shared = target_url == log_url;
        let log = if shared {
            Arc::clone(&target)
        } else {
            match backend.create_pool(&log_url, pool_config).await {
                Ok(pool) => pool,
                Err(err) => {
                    target.close().await;
                    return Err(err);
                }
            }
        };

        tracing::info!(env = %env.name, shared_store = shared, "Store session opened");
        Ok(Self::from_pools(env.clone(), target, log))
    }

    /// Wrap pools that are already open
    pub fn from_pools(
        env: EnvironmentConfig,
        target: Arc<dyn DatabasePool>,
        log: Arc<dyn DatabasePool>,
    ) -> Self {
        let shared = Arc::ptr_eq(&target, &log);
        Self {
            env,
            target,
            log,
            shared,
        }
    }

    pub fn environment(&self) -> &EnvironmentConfig {
        &self.env
    }

    pub fn ledger(&self) -> BatchLedger {
        BatchLedger::new(Arc::clone(&self.log), self.env.log.ledger_table.clone())
    }

    pub fn recorder(&self) -> DetailRecorder {
        DetailRecorder::new(Arc::clone(&self.log), self.env.log.detail_table.clone())
    }

    pub fn executor(&self) -> MutationExecutor {
        MutationExecutor::new(
            Arc::clone(&self.target),
            self.env.target.table.clone(),
            self.env.target.value_column.clone(),
            self.env.target.key_column.clone(),
        )
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(
            self.env.name.clone(),
            self.ledger(),
            self.recorder(),
            self.executor(),
        )
    }

    pub fn rollback_engine(&self) -> RollbackEngine {
        RollbackEngine::new(self.ledger(), self.recorder(), self.executor())
    }

    /// Create the ledger and detail tables when missing
    pub async fn ensure_log_schema(&self) -> EngineResult<()> {
        self.ledger().ensure_schema().await?;
        self.recorder().ensure_schema().await
    }

    /// Ping both stores
    pub async fn health_check(&self) -> EngineResult<StoreHealth> {
        let target = self.target.health_check().await?;
        let log = if self.shared {
            target
        } else {
            self.log.health_check().await?
        };
        Ok(StoreHealth { target, log })
    }

    /// Release every connection
    pub async fn close(self) {
        self.target.close().await;
        if !self.shared {
            self.log.close().await;
        }
        tracing::debug!(env = %self.env.name, "Store session closed");
    }
}
