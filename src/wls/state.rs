use std::fmt;

use crate::wait::Observed;

/// Lifecycle state of an administration or managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Running,
    Starting,
    Shutdown,
    Suspending,
    ShuttingDown,
    Admin,
    FailedNotRestartable,
    Unknown,
    ErrorWhileConnectingToNm,
}

impl ServerState {
    /// Parse a status token. Anything unrecognised is `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => ServerState::Running,
            "STARTING" => ServerState::Starting,
            "SHUTDOWN" => ServerState::Shutdown,
            "SUSPENDING" => ServerState::Suspending,
            "SHUTTING_DOWN" => ServerState::ShuttingDown,
            "ADMIN" => ServerState::Admin,
            "FAILED_NOT_RESTARTABLE" => ServerState::FailedNotRestartable,
            "ERROR_WHILE_CONNECTING_TO_NM" => ServerState::ErrorWhileConnectingToNm,
            _ => ServerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Running => "RUNNING",
            ServerState::Starting => "STARTING",
            ServerState::Shutdown => "SHUTDOWN",
            ServerState::Suspending => "SUSPENDING",
            ServerState::ShuttingDown => "SHUTTING_DOWN",
            ServerState::Admin => "ADMIN",
            ServerState::FailedNotRestartable => "FAILED_NOT_RESTARTABLE",
            ServerState::Unknown => "UNKNOWN",
            ServerState::ErrorWhileConnectingToNm => "ERROR_WHILE_CONNECTING_TO_NM",
        }
    }

    /// Already up or on its way up; `start` is a no-op.
    pub fn is_up(&self) -> bool {
        matches!(self, ServerState::Running | ServerState::Starting)
    }

    /// Already down or on its way down; `stop` is a no-op.
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            ServerState::Shutdown
                | ServerState::Suspending
                | ServerState::ShuttingDown
                | ServerState::Admin
        )
    }

    /// Accepted as the end of a stop. `FAILED_NOT_RESTARTABLE` and `UNKNOWN`
    /// are what the vendor reports for a killed server.
    pub fn completes_stop(&self) -> bool {
        matches!(
            self,
            ServerState::Shutdown | ServerState::FailedNotRestartable | ServerState::Unknown
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Observed for ServerState {
    fn is_connection_error(&self) -> bool {
        *self == ServerState::ErrorWhileConnectingToNm
    }
}

/// Node manager reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmState {
    Running,
    NotRunning,
}

impl fmt::Display for NmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmState::Running => f.write_str("NM_RUNNING"),
            NmState::NotRunning => f.write_str("NM_NOT_RUNNING"),
        }
    }
}

impl Observed for NmState {}

/// What a control verb did. `Starting`/`Stopping` mean the caller must poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Running,
    Starting,
    Shutdown,
    Stopping,
}

impl ControlOutcome {
    /// True when the verb was a no-op because the state already held.
    pub fn is_noop(&self) -> bool {
        matches!(self, ControlOutcome::Running | ControlOutcome::Shutdown)
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOutcome::Running => f.write_str("RUNNING"),
            ControlOutcome::Starting => f.write_str("STARTING"),
            ControlOutcome::Shutdown => f.write_str("SHUTDOWN"),
            ControlOutcome::Stopping => f.write_str("STOPPING"),
        }
    }
}

/// Node manager verbs report whether they had to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmOutcome {
    AlreadyRunning,
    AlreadyStopped,
    Triggered,
}
