use std::future::Future;
use std::sync::Arc;

use super::params::WlsParams;
use super::state::{ControlOutcome, ServerState};
use super::{admin_bundle, nm_bundle, parse_status, run_bundle, wait_running, wait_stopped};
use crate::constants::{patterns, SHUTDOWN_TIMEOUT_S};
use crate::error::Result;
use crate::remote::RemoteHost;
use crate::wait::{Observed, PollBudget};

/// A managed server. Calls go through the administration server first and
/// fall back to the node manager on the server's own host.
#[derive(Clone)]
pub struct ManagedServerDriver {
    host: Arc<RemoteHost>,
    params: Arc<WlsParams>,
    name: String,
}

impl ManagedServerDriver {
    /// `host` is the host the managed server runs on.
    pub fn new(host: Arc<RemoteHost>, params: Arc<WlsParams>, name: impl Into<String>) -> Self {
        Self {
            host,
            params,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        self.host.address()
    }

    /// Run `primary`; on any error log it and run `fallback` instead.
    async fn with_fallback<T, P, F>(&self, verb: &str, primary: P, fallback: F) -> Result<T>
    where
        P: Future<Output = Result<T>>,
        F: Future<Output = Result<T>>,
    {
        match primary.await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::warn!(
                    server = %self.name,
                    verb = verb,
                    error = %e,
                    "Admin server path failed, falling back to node manager"
                );
                fallback.await
            }
        }
    }

    async fn admin_probe(&self) -> Result<(ServerState, String)> {
        let bundle = admin_bundle(&self.params, "status").arg(&self.name);
        let output = run_bundle(&self.host, &bundle).await?;
        let state = parse_status(patterns::MANAGED_SERVER_STATUS, &output, "managed server status")?;
        // The sentinel from the admin path means the admin server is unreachable.
        if state.is_connection_error() {
            return Err(crate::error::DrError::Connectivity {
                host: self.params.admin_url(),
                message: "administration server unreachable".to_string(),
            });
        }
        Ok((state, output))
    }

    async fn nm_probe(&self) -> Result<(ServerState, String)> {
        let bundle = nm_bundle(&self.params, "status", self.host.address())
            .arg(&self.name)
            .arg("managed");
        let output = run_bundle(&self.host, &bundle).await?;
        let state = parse_status(patterns::MANAGED_SERVER_STATUS, &output, "managed server status")?;
        Ok((state, output))
    }

    async fn probe(&self) -> Result<(ServerState, String)> {
        self.with_fallback("status", self.admin_probe(), self.nm_probe())
            .await
    }

    pub async fn status(&self) -> Result<ServerState> {
        let (state, _) = self.probe().await?;
        tracing::info!(server = %self.name, host = %self.host.address(), state = %state, "Managed server status");
        Ok(state)
    }

    pub async fn start(&self) -> Result<ControlOutcome> {
        let state = self.status().await?;
        if state.is_up() {
            return Ok(ControlOutcome::Running);
        }
        tracing::info!(server = %self.name, from = %state, "Starting managed server");
        let via_admin = async {
            let bundle = admin_bundle(&self.params, "start").arg(&self.name);
            run_bundle(&self.host, &bundle).await.map(|_| ())
        };
        let via_nm = async {
            let bundle = nm_bundle(&self.params, "start", self.host.address())
                .arg(&self.name)
                .arg("managed");
            run_bundle(&self.host, &bundle).await.map(|_| ())
        };
        self.with_fallback("start", via_admin, via_nm).await?;
        Ok(ControlOutcome::Starting)
    }

    pub async fn stop(&self) -> Result<ControlOutcome> {
        let state = self.status().await?;
        if state.is_down() {
            return Ok(ControlOutcome::Shutdown);
        }
        tracing::info!(server = %self.name, from = %state, "Stopping managed server");
        let via_admin = async {
            let bundle = admin_bundle(&self.params, "shutdown")
                .arg(&self.name)
                .arg(SHUTDOWN_TIMEOUT_S.to_string());
            run_bundle(&self.host, &bundle).await.map(|_| ())
        };
        let via_nm = async {
            let bundle = nm_bundle(&self.params, "kill", self.host.address())
                .arg(&self.name)
                .arg("managed");
            run_bundle(&self.host, &bundle).await.map(|_| ())
        };
        self.with_fallback("stop", via_admin, via_nm).await?;
        Ok(ControlOutcome::Stopping)
    }

    pub async fn wait_running(&self, budget: &PollBudget) -> Result<()> {
        let label = format!("managed server {}", self.name);
        wait_running(&label, budget, || self.probe()).await
    }

    pub async fn wait_stopped(&self, budget: &PollBudget) -> Result<()> {
        let label = format!("managed server {}", self.name);
        wait_stopped(&label, budget, || self.probe()).await
    }
}
