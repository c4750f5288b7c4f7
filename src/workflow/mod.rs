//! Top-level DR workflows composed from the database and server drivers.

pub mod failover;
pub mod health;
pub mod report;
pub mod setup;
pub mod site;
pub mod switchover;

use std::future::Future;
use std::sync::Arc;

pub use health::{HealthReport, SiteHealth};
pub use report::{StepOutcome, StepRecord, WorkflowReport};
pub use site::Site;

use crate::config::DrConfig;
use crate::db::DatabaseDriver;
use crate::error::Result;
use crate::remote::{HostPool, SessionFactory};
use crate::wait::PollBudget;

/// Polling deadlines of one workflow run, all counted from its start.
#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    pub start: PollBudget,
    pub stop: PollBudget,
}

/// Drives the primary/standby pair described by a [`DrConfig`].
pub struct Orchestrator {
    config: Arc<DrConfig>,
    pool: HostPool,
}

impl Orchestrator {
    pub fn new(config: DrConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let pool = HostPool::new(factory).with_secrets(config.secrets());
        Self {
            config: Arc::new(config),
            pool,
        }
    }

    pub fn config(&self) -> &DrConfig {
        &self.config
    }

    pub fn pool(&self) -> &HostPool {
        &self.pool
    }

    fn budgets(&self) -> Budgets {
        let g = &self.config.general;
        let start = PollBudget::new(g.poll_interval, g.start_timeout);
        Budgets {
            start,
            stop: PollBudget {
                total: g.stop_timeout,
                ..start
            },
        }
    }

    pub(crate) async fn primary(&self) -> Result<Site> {
        let c = &self.config;
        Site::open(&self.pool, "primary", &c.db_prim, &c.wls_prim, &c.general).await
    }

    pub(crate) async fn standby(&self) -> Result<Site> {
        let c = &self.config;
        Site::open(&self.pool, "standby", &c.db_stby, &c.wls_stby, &c.general).await
    }

    pub(crate) async fn primary_db(&self) -> Result<DatabaseDriver> {
        site::open_db(&self.pool, &self.config.db_prim, &self.config.general).await
    }

    pub(crate) async fn standby_db(&self) -> Result<DatabaseDriver> {
        site::open_db(&self.pool, &self.config.db_stby, &self.config.general).await
    }

    /// Run a workflow body and close every session afterwards, whatever the
    /// outcome.
    pub(crate) async fn scoped<F>(&self, body: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let result = body.await;
        if let Err(e) = self.pool.close_all().await {
            tracing::warn!(error = %e, "Failed to close every session");
        }
        result
    }
}
