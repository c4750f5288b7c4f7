//! Operations on a database host: identity queries, Data Guard health and
//! role transitions through the broker.

pub mod models;

use std::sync::Arc;

pub use models::{DbIdentity, DbParams, DbRole, DgSnapshot};

use crate::constants::{patterns, scripts, tokens};
use crate::error::{DrError, Result};
use crate::matcher::OutputMatcher;
use crate::remote::{RemoteHost, ScriptBundle, ScriptBundleRunner};

#[derive(Clone)]
pub struct DatabaseDriver {
    host: Arc<RemoteHost>,
    params: Arc<DbParams>,
}

impl DatabaseDriver {
    pub fn new(host: Arc<RemoteHost>, params: Arc<DbParams>) -> Self {
        Self { host, params }
    }

    pub fn db_unique_name(&self) -> &str {
        &self.params.db_unique_name
    }

    pub fn address(&self) -> &str {
        self.host.address()
    }

    fn bundle(&self, script: &str) -> ScriptBundle {
        ScriptBundle::new(&self.params.scripts_dir, script)
            .dependency(&self.params.scripts_dir, scripts::DB_COMMON)
            .exec_as(&self.params.os_user)
            .arg(&self.params.oracle_home)
            .arg(&self.params.oracle_sid)
    }

    async fn run(&self, bundle: ScriptBundle) -> Result<String> {
        ScriptBundleRunner::new(&self.host).run(&bundle).await
    }

    /// One-column query; the answer is the last non-empty line.
    async fn query(&self, script: &str) -> Result<String> {
        let output = self.run(self.bundle(script)).await?;
        let value = OutputMatcher::last_line(&output).to_string();
        if value.is_empty() {
            return Err(DrError::parse(script, "empty output"));
        }
        Ok(value)
    }

    pub async fn is_cluster(&self) -> Result<bool> {
        let output = self.run(self.bundle(scripts::DB_IS_CLUSTER)).await?;
        let value = OutputMatcher::require(patterns::DB_CLUSTER_VALUE, &output, "cluster_database")?;
        Ok(value.eq_ignore_ascii_case("TRUE"))
    }

    pub async fn db_name(&self) -> Result<String> {
        self.query(scripts::DB_NAME).await
    }

    pub async fn query_db_unique_name(&self) -> Result<String> {
        self.query(scripts::DB_UNIQUE_NAME).await
    }

    pub async fn identity(&self) -> Result<DbIdentity> {
        Ok(DbIdentity {
            db_name: self.db_name().await?,
            db_unique_name: self.query_db_unique_name().await?,
            is_cluster: self.is_cluster().await?,
        })
    }

    async fn show_configuration(&self, sysdba_password: &str) -> Result<String> {
        self.host.register_secret(sysdba_password);
        self.run(
            self.bundle(scripts::DG_SHOW_CONFIGURATION_VERBOSE)
                .arg(sysdba_password),
        )
        .await
    }

    /// Top-level status and the role the broker lists for `db`.
    pub async fn dg_snapshot(&self, db: &str, sysdba_password: &str) -> Result<DgSnapshot> {
        let output = self.show_configuration(sysdba_password).await?;
        let status = OutputMatcher::require(patterns::DG_CONFIGURATION_STATUS, &output, "Configuration Status")?;
        let mut role = None;
        for candidate in [DbRole::Primary, DbRole::PhysicalStandby, DbRole::SnapshotStandby] {
            let pattern = patterns::dg_member_role(db, candidate.broker_label());
            if OutputMatcher::contains(&pattern, &output, true)? {
                role = Some(candidate);
                break;
            }
        }
        Ok(DgSnapshot { status, role })
    }

    /// Assert `db` holds `expected_role` and the broker reports `SUCCESS`.
    ///
    /// A wrong role fails at once. A non-`SUCCESS` status is retried after
    /// the configured delay until `attempts` is used up.
    pub async fn verify_dg_config(
        &self,
        db: &str,
        expected_role: DbRole,
        sysdba_password: &str,
        attempts: u32,
    ) -> Result<()> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let DgSnapshot { status, role } = self.dg_snapshot(db, sysdba_password).await?;
            if role != Some(expected_role) {
                return Err(DrError::parse(
                    "Data Guard role",
                    format!("{} is not listed as {}", db, expected_role.broker_label()),
                ));
            }
            if status.eq_ignore_ascii_case(tokens::SUCCESS) {
                tracing::info!(db = db, role = %expected_role, attempt = attempt, "Data Guard configuration healthy");
                return Ok(());
            }
            if attempt >= attempts {
                return Err(DrError::DgHealth { status, attempts });
            }
            tracing::warn!(
                db = db,
                status = %status,
                attempt = attempt,
                attempts = attempts,
                delay_s = self.params.dg_retry_delay.as_secs(),
                "Data Guard status not SUCCESS yet, retrying"
            );
            tokio::time::sleep(self.params.dg_retry_delay).await;
        }
    }

    /// Run a broker transition and match its final line against `expect`.
    async fn transition(&self, script: &str, args: &[&str], expect: &str, what: &str) -> Result<()> {
        let mut bundle = self.bundle(script);
        for a in args {
            bundle = bundle.arg(*a);
        }
        let output = self.run(bundle).await?;
        let last = OutputMatcher::last_line(&output);
        if !OutputMatcher::contains(expect, last, true)? {
            return Err(DrError::parse(
                what,
                format!("unexpected broker output: {}", crate::matcher::tail(&self.host.mask(&output), 5)),
            ));
        }
        tracing::info!(host = %self.host.address(), step = what, "Broker reported success");
        Ok(())
    }

    pub async fn convert_to_snapshot_standby(&self, prim: &str, stby: &str, sysdba_password: &str) -> Result<()> {
        self.host.register_secret(sysdba_password);
        tracing::info!(primary = prim, standby = stby, "Converting standby to snapshot");
        self.transition(
            scripts::DG_CONVERT_TO_SNAPSHOT,
            &[sysdba_password, stby],
            &patterns::dg_converted(stby),
            "convert to snapshot standby",
        )
        .await
    }

    pub async fn convert_to_physical_standby(&self, prim: &str, stby: &str, sysdba_password: &str) -> Result<()> {
        self.host.register_secret(sysdba_password);
        tracing::info!(primary = prim, standby = stby, "Converting standby to physical");
        self.transition(
            scripts::DG_CONVERT_TO_PHYSICAL,
            &[sysdba_password, stby],
            &patterns::dg_converted(stby),
            "convert to physical standby",
        )
        .await
    }

    pub async fn switchover_to(&self, stby: &str, sysdba_password: &str, prim: &str) -> Result<()> {
        self.host.register_secret(sysdba_password);
        tracing::info!(primary = prim, standby = stby, "Switching over");
        self.transition(
            scripts::DG_SWITCHOVER,
            &[sysdba_password, stby],
            &patterns::dg_switchover_succeeded(stby),
            "switchover",
        )
        .await
    }

    pub async fn failover_to(&self, stby: &str, sysdba_password: &str) -> Result<()> {
        self.host.register_secret(sysdba_password);
        tracing::info!(standby = stby, "Failing over");
        self.transition(
            scripts::DG_FAILOVER,
            &[sysdba_password, stby],
            &patterns::dg_failover_succeeded(stby),
            "failover",
        )
        .await
    }

    pub async fn reinstate(&self, db: &str, sysdba_password: &str) -> Result<()> {
        self.host.register_secret(sysdba_password);
        tracing::info!(db = db, "Reinstating former primary");
        self.transition(
            scripts::DG_REINSTATE,
            &[sysdba_password, db],
            &patterns::dg_reinstated(db),
            "reinstate",
        )
        .await
    }
}
