use super::report::WorkflowReport;
use super::Orchestrator;
use crate::db::DbRole;
use crate::error::Result;

impl Orchestrator {
    /// Move the application tier and the database role from the primary site
    /// to the standby site.
    pub async fn switchover(&self, report: &mut WorkflowReport) -> Result<()> {
        self.scoped(self.switchover_steps(report)).await
    }

    async fn switchover_steps(&self, report: &mut WorkflowReport) -> Result<()> {
        let budgets = self.budgets();
        let general = &self.config().general;
        let password = &self.config().db_prim.sysdba_password;

        let prim = report.step("open primary site", self.primary()).await?;
        let stby = report.step("open standby site", self.standby()).await?;
        let (prim_db, stby_db) = (prim.db_unique_name().to_string(), stby.db_unique_name().to_string());

        report
            .step(
                "check primary database role",
                prim.db.verify_dg_config(&prim_db, DbRole::Primary, password, general.dg_retries),
            )
            .await?;
        report
            .step(
                "check standby database role",
                prim.db.verify_dg_config(&stby_db, DbRole::PhysicalStandby, password, general.dg_retries),
            )
            .await?;

        prim.stop_servers(report, &budgets.stop, general.parallel_stop).await?;

        report
            .step(
                "broker switchover",
                prim.db.switchover_to(&stby_db, password, &prim_db),
            )
            .await?;
        report
            .step(
                "check new primary role",
                stby.db.verify_dg_config(&stby_db, DbRole::Primary, password, general.dg_retries),
            )
            .await?;

        stby.start_servers(report, &budgets.start).await
    }
}
