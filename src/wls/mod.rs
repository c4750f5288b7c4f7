//! Drivers for the administration server, managed servers and node manager.
//!
//! Every control verb returns a [`ControlOutcome`]; when it reports
//! `Starting` or `Stopping`, the caller owns the poll via `wait_running` /
//! `wait_stopped`.

pub mod admin;
pub mod managed;
pub mod nodemanager;
pub mod params;
pub mod state;

use std::future::Future;

pub use admin::AdminServerDriver;
pub use managed::ManagedServerDriver;
pub use nodemanager::NodeManagerDriver;
pub use params::WlsParams;
pub use state::{ControlOutcome, NmOutcome, NmState, ServerState};

use crate::constants::{patterns, scripts};
use crate::error::Result;
use crate::matcher::OutputMatcher;
use crate::remote::{RemoteHost, ScriptBundle, ScriptBundleRunner};
use crate::wait::{poll_until, PollBudget};

/// A node manager control call against `nm_host`.
pub(crate) fn nm_bundle(params: &WlsParams, action: &str, nm_host: &str) -> ScriptBundle {
    ScriptBundle::new(&params.scripts_dir, scripts::WLS_NM_CONTROL)
        .dependency(&params.scripts_dir, scripts::WLS_COMMON)
        .interpreter(params.wlst())
        .exec_as(&params.os_user)
        .arg(action)
        .args(params.nm_args(nm_host))
}

/// A control call through the administration server.
pub(crate) fn admin_bundle(params: &WlsParams, action: &str) -> ScriptBundle {
    ScriptBundle::new(&params.scripts_dir, scripts::WLS_ADMIN_CONTROL)
        .dependency(&params.scripts_dir, scripts::WLS_COMMON)
        .interpreter(params.wlst())
        .exec_as(&params.os_user)
        .arg(action)
        .args(params.admin_args())
}

pub(crate) async fn run_bundle(host: &RemoteHost, bundle: &ScriptBundle) -> Result<String> {
    ScriptBundleRunner::new(host).run(bundle).await
}

/// Parse the `<KIND> SERVER STATUS = <TOKEN>` line of a status call.
pub(crate) fn parse_status(pattern: &str, output: &str, what: &str) -> Result<ServerState> {
    if OutputMatcher::contains(patterns::NM_CONNECT_ERROR, output, false)? {
        return Ok(ServerState::ErrorWhileConnectingToNm);
    }
    let token = OutputMatcher::require(pattern, output, what)?;
    Ok(ServerState::from_token(&token))
}

/// A `RUNNING` report only counts when the output carries no `ERROR`.
pub(crate) fn started_state(state: ServerState, output: &str) -> ServerState {
    if state == ServerState::Running
        && OutputMatcher::contains(patterns::ERROR, output, false).unwrap_or(true)
    {
        tracing::warn!("Status reports RUNNING alongside an ERROR, not accepting it yet");
        return ServerState::Unknown;
    }
    state
}

/// Collapse a probe error into a state the poller understands.
pub(crate) fn observed(label: &str, probe: Result<(ServerState, String)>) -> (ServerState, String) {
    match probe {
        Ok(pair) => pair,
        Err(e) if e.is_connectivity() => {
            tracing::error!(server = label, error = %e, "Status probe could not connect");
            (ServerState::ErrorWhileConnectingToNm, String::new())
        }
        Err(e) => {
            tracing::warn!(server = label, error = %e, "Status probe failed");
            (ServerState::Unknown, String::new())
        }
    }
}

/// Poll `probe` until the server is `RUNNING` with a clean status output.
pub(crate) async fn wait_running<F, Fut>(label: &str, budget: &PollBudget, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(ServerState, String)>>,
{
    poll_until(
        budget.interval,
        budget.total,
        budget.start,
        || {
            let fut = probe();
            async move {
                let (state, output) = observed(label, fut.await);
                started_state(state, &output)
            }
        },
        |s| *s == ServerState::Running,
        label,
    )
    .await
    .into_result(label, ServerState::Running.as_str())
}

/// Poll `probe` until the server reports a stop-completing state.
pub(crate) async fn wait_stopped<F, Fut>(label: &str, budget: &PollBudget, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(ServerState, String)>>,
{
    poll_until(
        budget.interval,
        budget.total,
        budget.start,
        || {
            let fut = probe();
            async move { observed(label, fut.await).0 }
        },
        |s| {
            if s.completes_stop() && *s != ServerState::Shutdown {
                tracing::warn!(server = label, state = %s, "Treating state as stopped");
            }
            s.completes_stop()
        },
        label,
    )
    .await
    .into_result(label, ServerState::Shutdown.as_str())
}
