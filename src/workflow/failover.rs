use tokio::time::Instant;

use super::report::{StepOutcome, WorkflowReport};
use super::Orchestrator;
use crate::db::DbRole;
use crate::error::{DrError, Result};

impl Orchestrator {
    /// Promote the standby when the primary site is lost.
    ///
    /// Stopping the primary side is best-effort since that site may be down.
    pub async fn failover(&self, report: &mut WorkflowReport) -> Result<()> {
        self.scoped(self.failover_steps(report)).await
    }

    async fn failover_steps(&self, report: &mut WorkflowReport) -> Result<()> {
        let budgets = self.budgets();
        let general = &self.config().general;
        let password = &self.config().db_stby.sysdba_password;
        let stby_db = self.config().db_stby.db_unique_name.clone();

        let stby = report.step("open standby site", self.standby()).await?;

        report
            .step("check standby database role", async {
                let snapshot = stby.db.dg_snapshot(&stby_db, password).await?;
                match snapshot.role {
                    Some(DbRole::PhysicalStandby) => Ok(()),
                    other => Err(DrError::parse(
                        "Data Guard role",
                        format!(
                            "{} must be a physical standby to fail over, broker lists {}",
                            stby_db,
                            other.map(|r| r.to_string()).unwrap_or_else(|| "no role".to_string())
                        ),
                    )),
                }
            })
            .await?;

        // The primary site may be gone; its step failures are kept as warnings.
        let began = Instant::now();
        let mut scratch = WorkflowReport::new("failover");
        let stopped = async {
            let prim = self.primary().await?;
            prim.stop_servers(&mut scratch, &budgets.stop, general.parallel_stop)
                .await
        }
        .await;
        for mut record in scratch.steps {
            if let StepOutcome::Failed(m) = record.outcome {
                record.outcome = StepOutcome::Warning(m);
            }
            report.steps.push(record);
        }
        match stopped {
            Ok(()) => report.record("stop primary application tier", StepOutcome::Done, began.elapsed()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not stop the primary application tier, continuing");
                report.record(
                    "stop primary application tier",
                    StepOutcome::Warning(e.to_string()),
                    began.elapsed(),
                );
            }
        }

        report
            .step("broker failover", stby.db.failover_to(&stby_db, password))
            .await?;
        report
            .step("check new primary role", async {
                let snapshot = stby.db.dg_snapshot(&stby_db, password).await?;
                if snapshot.role != Some(DbRole::Primary) {
                    return Err(DrError::parse(
                        "Data Guard role",
                        format!("{} is not primary after failover", stby_db),
                    ));
                }
                if !snapshot.is_healthy() {
                    tracing::warn!(status = %snapshot.status, "Broker not healthy after failover; reinstate the former primary");
                }
                Ok(())
            })
            .await?;

        stby.start_servers(report, &budgets.start).await
    }

    /// Bring the failed former primary back as a physical standby of the new
    /// primary.
    pub async fn reinstate(&self, report: &mut WorkflowReport) -> Result<()> {
        self.scoped(self.reinstate_steps(report)).await
    }

    async fn reinstate_steps(&self, report: &mut WorkflowReport) -> Result<()> {
        let general = &self.config().general;
        let password = &self.config().db_stby.sysdba_password;
        let stby_db = self.config().db_stby.db_unique_name.clone();
        let prim_db = self.config().db_prim.db_unique_name.clone();

        let new_primary = report.step("open new primary database", self.standby_db()).await?;
        report
            .step("check new primary role", async {
                let snapshot = new_primary.dg_snapshot(&stby_db, password).await?;
                match snapshot.role {
                    Some(DbRole::Primary) => Ok(()),
                    _ => Err(DrError::parse(
                        "Data Guard role",
                        format!("{} is not primary, nothing to reinstate against", stby_db),
                    )),
                }
            })
            .await?;
        report
            .step("broker reinstate", new_primary.reinstate(&prim_db, password))
            .await?;
        report
            .step(
                "check reinstated standby",
                new_primary.verify_dg_config(&prim_db, DbRole::PhysicalStandby, password, general.dg_retries),
            )
            .await
    }
}
