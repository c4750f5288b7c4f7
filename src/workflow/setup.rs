use super::report::WorkflowReport;
use super::site::Site;
use super::Orchestrator;
use crate::constants::scripts;
use crate::db::DbRole;
use crate::error::Result;
use crate::remote::{RemoteHost, ScriptBundle, ScriptBundleRunner};

impl Orchestrator {
    /// Prepare both WebLogic domains for DR: primary checks and setup, then
    /// the standby, with its database opened as a snapshot standby meanwhile.
    pub async fn dr_setup(&self, report: &mut WorkflowReport) -> Result<()> {
        self.scoped(self.dr_setup_steps(report)).await
    }

    fn fmw_bundle(&self, script: &str, site: &Site) -> ScriptBundle {
        let dir = &self.config().general.scripts_dir;
        ScriptBundle::new(dir, script)
            .dependency(dir, scripts::FMW_DR_COMMON)
            .exec_as(&site.wls.os_user)
    }

    async fn run_fmw(&self, host: &RemoteHost, bundle: ScriptBundle) -> Result<()> {
        let output = ScriptBundleRunner::new(host).run(&bundle).await?;
        tracing::debug!(host = %host.address(), output = %host.mask(&output), "FMW DR script finished");
        Ok(())
    }

    async fn dr_setup_steps(&self, report: &mut WorkflowReport) -> Result<()> {
        let c = self.config();
        let password = &c.db_prim.sysdba_password;

        let prim = report.step("open primary site", self.primary()).await?;
        let stby = report.step("open standby site", self.standby()).await?;
        let prim_admin = prim.admin_host();
        let stby_admin = stby.admin_host();

        report
            .step(
                "check primary database role",
                prim.db.verify_dg_config(prim.db_unique_name(), DbRole::Primary, password, c.general.dg_retries),
            )
            .await?;

        // ─── Primary side ───────────────────────────────────────────────────

        report
            .step(
                "primary: check database connectivity",
                self.run_fmw(
                    &prim_admin,
                    self.fmw_bundle(scripts::FMW_PRIMARY_CHECK_DB_CONNECTIVITY, &prim)
                        .arg(&prim.wls.mw_home)
                        .arg(&c.db_prim.scan_address)
                        .arg(c.db_prim.listener_port.to_string())
                        .arg(&c.db_prim.service_name),
                ),
            )
            .await?;
        report
            .step(
                "primary: check connectivity to standby admin",
                self.run_fmw(
                    &prim_admin,
                    self.fmw_bundle(scripts::FMW_PRIMARY_CHECK_CONNECTIVITY_TO_STBY_ADMIN, &prim)
                        .arg(&stby.wls.admin_host)
                        .arg(stby.wls.admin_port.to_string()),
                ),
            )
            .await?;
        report
            .step(
                "primary: FMW DR setup",
                self.run_fmw(
                    &prim_admin,
                    self.fmw_bundle(scripts::FMW_DR_SETUP_PRIMARY, &prim)
                        .arg(&prim.wls.mw_home)
                        .arg(&prim.wls.domain_dir)
                        .arg(prim.wls.admin_url())
                        .arg(&prim.wls.wls_user)
                        .arg(&prim.wls.wls_password),
                ),
            )
            .await?;

        // ─── Standby side ───────────────────────────────────────────────────

        report
            .step(
                "standby: convert database to snapshot standby",
                prim.db.convert_to_snapshot_standby(prim.db_unique_name(), stby.db_unique_name(), password),
            )
            .await?;

        let standby_result = self.setup_standby(report, &prim, &stby, &stby_admin).await;

        // Back to physical standby whatever happened on the standby tier.
        let converted = report
            .step(
                "standby: convert database to physical standby",
                prim.db.convert_to_physical_standby(prim.db_unique_name(), stby.db_unique_name(), password),
            )
            .await;
        standby_result?;
        converted?;

        report
            .step(
                "check standby database role",
                prim.db.verify_dg_config(stby.db_unique_name(), DbRole::PhysicalStandby, password, c.general.dg_retries),
            )
            .await
    }

    async fn setup_standby(
        &self,
        report: &mut WorkflowReport,
        prim: &Site,
        stby: &Site,
        stby_admin: &RemoteHost,
    ) -> Result<()> {
        let c = self.config();
        report
            .step(
                "standby: check database connectivity",
                self.run_fmw(
                    stby_admin,
                    self.fmw_bundle(scripts::FMW_STANDBY_CHECK_DB_CONNECTIVITY, stby)
                        .arg(&stby.wls.mw_home)
                        .arg(&c.db_stby.scan_address)
                        .arg(c.db_stby.listener_port.to_string())
                        .arg(&c.db_stby.service_name),
                ),
            )
            .await?;
        for host in &stby.wls_hosts {
            report
                .step(
                    &format!("standby: FMW DR setup on {}", host.address()),
                    self.run_fmw(
                        host,
                        self.fmw_bundle(scripts::FMW_DR_SETUP_STANDBY, stby)
                            .arg(&stby.wls.mw_home)
                            .arg(&stby.wls.domain_dir)
                            .arg(&prim.wls.admin_host)
                            .arg(&c.db_prim.scan_address)
                            .arg(&c.db_stby.scan_address)
                            .arg(&c.db_stby.service_name),
                    ),
                )
                .await?;
        }
        Ok(())
    }
}
