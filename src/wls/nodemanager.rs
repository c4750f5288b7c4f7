use std::sync::Arc;

use super::params::WlsParams;
use super::state::{NmOutcome, NmState};
use super::{nm_bundle, run_bundle};
use crate::constants::patterns;
use crate::error::Result;
use crate::matcher::OutputMatcher;
use crate::remote::host::shell_quote;
use crate::remote::{RemoteHost, RunAs};
use crate::wait::{poll, PollBudget};

/// Background launch of the domain's node manager listening on
/// `host:port`, logging under `<domain>/nodemanager/`.
fn start_command(params: &WlsParams, host: &str) -> String {
    let dir = &params.domain_dir;
    let log_dir = format!("{}/nodemanager", dir);
    format!(
        "mkdir -p {logs} && nohup {script} {host} {port} > {log} 2>&1 &",
        logs = shell_quote(&log_dir),
        script = shell_quote(&format!("{}/bin/startNodeManager.sh", dir)),
        host = shell_quote(host),
        port = params.nm_port,
        log = shell_quote(&format!("{}/nm_{}.out", log_dir, host)),
    )
}

fn stop_command(params: &WlsParams, host: &str) -> String {
    let dir = &params.domain_dir;
    let log_dir = format!("{}/nodemanager", dir);
    format!(
        "mkdir -p {logs} && {script} > {log} 2>&1",
        logs = shell_quote(&log_dir),
        script = shell_quote(&format!("{}/bin/stopNodeManager.sh", dir)),
        log = shell_quote(&format!("{}/nm_stop_{}.out", log_dir, host)),
    )
}

/// Node manager on one host.
#[derive(Clone)]
pub struct NodeManagerDriver {
    host: Arc<RemoteHost>,
    params: Arc<WlsParams>,
}

impl NodeManagerDriver {
    pub fn new(host: Arc<RemoteHost>, params: Arc<WlsParams>) -> Self {
        Self { host, params }
    }

    pub fn address(&self) -> &str {
        self.host.address()
    }

    /// Connect and ask for the version. Any failure means not running.
    pub async fn status(&self) -> NmState {
        let bundle = nm_bundle(&self.params, "version", self.host.address());
        match run_bundle(&self.host, &bundle).await {
            Ok(output) => match OutputMatcher::extract(patterns::NODE_MANAGER_VERSION, &output) {
                Ok(Some(version)) => {
                    tracing::debug!(host = %self.host.address(), version = %version, "Node manager answered");
                    NmState::Running
                }
                _ => NmState::NotRunning,
            },
            Err(e) => {
                tracing::debug!(host = %self.host.address(), error = %e, "Node manager probe failed");
                NmState::NotRunning
            }
        }
    }

    /// Launch the domain's start script in the background, then settle.
    pub async fn start(&self) -> Result<NmOutcome> {
        if self.status().await == NmState::Running {
            tracing::info!(host = %self.host.address(), "Node manager already running");
            return Ok(NmOutcome::AlreadyRunning);
        }
        let cmd = start_command(&self.params, self.host.address());
        tracing::info!(host = %self.host.address(), port = self.params.nm_port, "Starting node manager");
        self.host
            .run_as(&RunAs::user(&self.params.os_user), &cmd, false)
            .await?;
        tokio::time::sleep(self.params.nm_settle).await;
        Ok(NmOutcome::Triggered)
    }

    pub async fn stop(&self) -> Result<NmOutcome> {
        if self.status().await == NmState::NotRunning {
            tracing::info!(host = %self.host.address(), "Node manager already stopped");
            return Ok(NmOutcome::AlreadyStopped);
        }
        let cmd = stop_command(&self.params, self.host.address());
        tracing::info!(host = %self.host.address(), "Stopping node manager");
        self.host
            .run_as(&RunAs::user(&self.params.os_user), &cmd, false)
            .await?;
        tokio::time::sleep(self.params.nm_settle).await;
        Ok(NmOutcome::Triggered)
    }

    pub async fn wait_for(&self, expected: NmState, budget: &PollBudget) -> Result<()> {
        let label = format!("node manager on {}", self.host.address());
        poll(
            budget.interval,
            budget.total,
            budget.start,
            || self.status(),
            &expected,
            &label,
        )
        .await
        .into_result(&label, &expected.to_string())
    }
}
