use std::sync::Arc;

use super::params::WlsParams;
use super::state::{ControlOutcome, ServerState};
use super::{admin_bundle, nm_bundle, parse_status, run_bundle, wait_running, wait_stopped};
use crate::constants::{patterns, SHUTDOWN_TIMEOUT_S};
use crate::error::Result;
use crate::remote::{host::shell_quote, RemoteHost, RunAs};
use crate::wait::PollBudget;

/// The administration server, driven through the node manager on its host.
#[derive(Clone)]
pub struct AdminServerDriver {
    host: Arc<RemoteHost>,
    params: Arc<WlsParams>,
}

impl AdminServerDriver {
    /// `host` must be the administration server's host.
    pub fn new(host: Arc<RemoteHost>, params: Arc<WlsParams>) -> Self {
        Self { host, params }
    }

    pub fn name(&self) -> &str {
        &self.params.admin_server_name
    }

    async fn probe(&self) -> Result<(ServerState, String)> {
        let bundle = nm_bundle(&self.params, "status", self.host.address())
            .arg(&self.params.admin_server_name)
            .arg("admin");
        let output = run_bundle(&self.host, &bundle).await?;
        let state = parse_status(patterns::ADMIN_SERVER_STATUS, &output, "admin server status")?;
        Ok((state, output))
    }

    pub async fn status(&self) -> Result<ServerState> {
        let (state, _) = self.probe().await?;
        tracing::info!(server = %self.name(), state = %state, "Admin server status");
        Ok(state)
    }

    /// No-op when already up; otherwise ask the node manager to start it.
    pub async fn start(&self) -> Result<ControlOutcome> {
        let state = self.status().await?;
        if state.is_up() {
            return Ok(ControlOutcome::Running);
        }
        tracing::info!(server = %self.name(), from = %state, "Starting admin server");
        let bundle = nm_bundle(&self.params, "start", self.host.address())
            .arg(&self.params.admin_server_name)
            .arg("admin");
        run_bundle(&self.host, &bundle).await?;
        Ok(ControlOutcome::Starting)
    }

    /// No-op when already down; otherwise refresh boot properties and issue a
    /// non-blocking shutdown.
    pub async fn stop(&self) -> Result<ControlOutcome> {
        let state = self.status().await?;
        if state.is_down() {
            return Ok(ControlOutcome::Shutdown);
        }
        tracing::info!(server = %self.name(), from = %state, "Stopping admin server");
        self.write_boot_properties().await?;
        let bundle = admin_bundle(&self.params, "shutdown")
            .arg(&self.params.admin_server_name)
            .arg(SHUTDOWN_TIMEOUT_S.to_string());
        run_bundle(&self.host, &bundle).await?;
        Ok(ControlOutcome::Stopping)
    }

    pub async fn wait_running(&self, budget: &PollBudget) -> Result<()> {
        let label = format!("admin server {}", self.name());
        wait_running(&label, budget, || self.probe()).await
    }

    pub async fn wait_stopped(&self, budget: &PollBudget) -> Result<()> {
        let label = format!("admin server {}", self.name());
        wait_stopped(&label, budget, || self.probe()).await
    }

    /// The node manager starts the admin server with these credentials.
    async fn write_boot_properties(&self) -> Result<()> {
        let dir = format!(
            "{}/servers/{}/security",
            self.params.domain_dir, self.params.admin_server_name
        );
        let body = format!(
            "username={}\npassword={}\n",
            self.params.wls_user, self.params.wls_password
        );
        let cmd = format!(
            "mkdir -p {d} && printf '%s' {b} > {d}/boot.properties && chmod 600 {d}/boot.properties",
            d = shell_quote(&dir),
            b = shell_quote(&body)
        );
        self.host
            .run_as(&RunAs::user(&self.params.os_user), &cmd, false)
            .await?;
        Ok(())
    }
}
