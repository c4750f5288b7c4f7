use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use super::report::{StepOutcome, WorkflowReport};
use crate::config::{DbSiteConfig, GeneralConfig, WlsSiteConfig};
use crate::db::{DatabaseDriver, DbParams};
use crate::error::{DrError, Result};
use crate::remote::{HostPool, RemoteHost};
use crate::wait::PollBudget;
use crate::wls::{
    AdminServerDriver, ControlOutcome, ManagedServerDriver, NmOutcome, NmState, NodeManagerDriver,
    WlsParams,
};

/// One side of the DR pair with its drivers wired to pooled hosts.
pub struct Site {
    pub label: &'static str,
    pub db_config: DbSiteConfig,
    pub db: DatabaseDriver,
    pub wls: Arc<WlsParams>,
    pub wls_hosts: Vec<Arc<RemoteHost>>,
    admin_host: Arc<RemoteHost>,
    pub admin: AdminServerDriver,
    pub node_managers: Vec<NodeManagerDriver>,
    pub managed: Vec<ManagedServerDriver>,
}

pub async fn open_db(pool: &HostPool, db: &DbSiteConfig, general: &GeneralConfig) -> Result<DatabaseDriver> {
    let host = pool.get(&db.target()).await?;
    host.register_secret(&db.sysdba_password);
    Ok(DatabaseDriver::new(
        host,
        Arc::new(DbParams::from_site(db, general)),
    ))
}

impl Site {
    pub async fn open(
        pool: &HostPool,
        label: &'static str,
        db: &DbSiteConfig,
        wls: &WlsSiteConfig,
        general: &GeneralConfig,
    ) -> Result<Self> {
        let db_driver = open_db(pool, db, general).await?;
        let params = Arc::new(WlsParams::from_site(wls, general));

        let mut hosts: BTreeMap<&str, Arc<RemoteHost>> = BTreeMap::new();
        let mut wls_hosts = Vec::with_capacity(wls.hosts.len());
        for address in &wls.hosts {
            let host = pool.get(&wls.target(address)).await?;
            for secret in params.secrets() {
                host.register_secret(secret);
            }
            hosts.insert(address.as_str(), Arc::clone(&host));
            wls_hosts.push(host);
        }
        let lookup = |address: &str| {
            hosts.get(address).cloned().ok_or_else(|| {
                DrError::config(format!("{} site: host '{}' is not declared", label, address))
            })
        };

        let admin_host = lookup(&wls.admin_host)?;
        let admin = AdminServerDriver::new(Arc::clone(&admin_host), Arc::clone(&params));
        let node_managers = wls_hosts
            .iter()
            .map(|h| NodeManagerDriver::new(Arc::clone(h), Arc::clone(&params)))
            .collect();
        let managed = wls
            .managed_servers
            .iter()
            .map(|m| Ok(ManagedServerDriver::new(lookup(&m.host)?, Arc::clone(&params), &m.name)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            label,
            db_config: db.clone(),
            db: db_driver,
            wls: params,
            wls_hosts,
            admin_host,
            admin,
            node_managers,
            managed,
        })
    }

    pub fn admin_host(&self) -> Arc<RemoteHost> {
        Arc::clone(&self.admin_host)
    }

    pub fn db_unique_name(&self) -> &str {
        &self.db_config.db_unique_name
    }

    /// Managed servers grouped by host, in declaration order.
    fn managed_by_host(&self) -> Vec<Vec<&ManagedServerDriver>> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: BTreeMap<&str, Vec<&ManagedServerDriver>> = BTreeMap::new();
        for ms in &self.managed {
            if !groups.contains_key(ms.address()) {
                order.push(ms.address());
            }
            groups.entry(ms.address()).or_default().push(ms);
        }
        order
            .into_iter()
            .filter_map(|h| groups.remove(h))
            .collect()
    }

    /// Stop every managed server, then the admin server.
    ///
    /// With `parallel`, hosts are handled concurrently and servers on one
    /// host one after another.
    pub async fn stop_servers(
        &self,
        report: &mut WorkflowReport,
        budget: &PollBudget,
        parallel: bool,
    ) -> Result<()> {
        let groups = self.managed_by_host();
        let results: Vec<Vec<ControlResult>> = if parallel {
            join_all(groups.iter().map(|g| stop_group(g, budget))).await
        } else {
            let mut all = Vec::with_capacity(groups.len());
            for g in &groups {
                all.push(stop_group(g, budget).await);
            }
            all
        };

        let mut first_err = None;
        for r in results.into_iter().flatten() {
            if let Err(e) = record_control(report, r) {
                first_err.get_or_insert(e);
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        let name = format!("{}: stop admin server {}", self.label, self.admin.name());
        let began = Instant::now();
        let outcome = async {
            let o = self.admin.stop().await?;
            if o == ControlOutcome::Stopping {
                self.admin.wait_stopped(budget).await?;
            }
            Ok::<_, DrError>(o)
        }
        .await;
        record_control(report, ControlResult { name, outcome, elapsed: began.elapsed() })
    }

    /// Start node managers, then the admin server, then every managed server,
    /// polling each to its target state.
    pub async fn start_servers(&self, report: &mut WorkflowReport, budget: &PollBudget) -> Result<()> {
        for nm in &self.node_managers {
            let name = format!("{}: start node manager on {}", self.label, nm.address());
            let began = Instant::now();
            let result = async {
                let o = nm.start().await?;
                if o == NmOutcome::Triggered {
                    nm.wait_for(NmState::Running, budget).await?;
                }
                Ok::<_, DrError>(o)
            }
            .await;
            match result {
                Ok(NmOutcome::Triggered) => report.record(name, StepOutcome::Done, began.elapsed()),
                Ok(_) => report.record(name, StepOutcome::NoOp, began.elapsed()),
                Err(e) => {
                    report.record(name, StepOutcome::Failed(e.to_string()), began.elapsed());
                    return Err(e);
                }
            }
        }

        let name = format!("{}: start admin server {}", self.label, self.admin.name());
        let began = Instant::now();
        let outcome = async {
            let o = self.admin.start().await?;
            self.admin.wait_running(budget).await?;
            Ok::<_, DrError>(o)
        }
        .await;
        record_control(report, ControlResult { name, outcome, elapsed: began.elapsed() })?;

        // Trigger every start first so servers boot side by side, then poll.
        let mut triggered = Vec::with_capacity(self.managed.len());
        for ms in &self.managed {
            let began = Instant::now();
            let outcome = ms.start().await;
            triggered.push((ms, outcome, began));
        }
        for (ms, outcome, began) in triggered {
            let name = format!("{}: start managed server {} on {}", self.label, ms.name(), ms.address());
            let outcome = match outcome {
                Ok(o) => ms.wait_running(budget).await.map(|_| o),
                Err(e) => Err(e),
            };
            record_control(report, ControlResult { name, outcome, elapsed: began.elapsed() })?;
        }
        Ok(())
    }
}

/// A finished control verb, ready to be recorded.
struct ControlResult {
    name: String,
    outcome: Result<ControlOutcome>,
    elapsed: Duration,
}

async fn stop_group(group: &[&ManagedServerDriver], budget: &PollBudget) -> Vec<ControlResult> {
    let mut out = Vec::with_capacity(group.len());
    for ms in group {
        let began = Instant::now();
        let outcome = async {
            let o = ms.stop().await?;
            if o == ControlOutcome::Stopping {
                ms.wait_stopped(budget).await?;
            }
            Ok::<_, DrError>(o)
        }
        .await;
        let failed = outcome.is_err();
        out.push(ControlResult {
            name: format!("stop managed server {} on {}", ms.name(), ms.address()),
            outcome,
            elapsed: began.elapsed(),
        });
        if failed {
            break;
        }
    }
    out
}

fn record_control(report: &mut WorkflowReport, r: ControlResult) -> Result<()> {
    match r.outcome {
        Ok(o) if o.is_noop() => {
            report.record(r.name, StepOutcome::NoOp, r.elapsed);
            Ok(())
        }
        Ok(_) => {
            report.record(r.name, StepOutcome::Done, r.elapsed);
            Ok(())
        }
        Err(e) => {
            report.record(r.name, StepOutcome::Failed(e.to_string()), r.elapsed);
            Err(e)
        }
    }
}
