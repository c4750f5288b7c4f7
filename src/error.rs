//! Error kinds shared by every driver, workflow and pipeline.
//!
//! Drivers raise; workflows only add context and stop. Each variant maps to one
//! failure class an operator can act on.

use thiserror::Error;

/// The stage of a remote invocation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStage {
    /// Creating the staging directory or uploading the bundle.
    Stage,
    /// Running the primary script.
    Run,
    /// Removing the staging directory.
    Cleanup,
    /// A plain command outside of a script bundle.
    Command,
}

impl std::fmt::Display for ExecStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecStage::Stage => write!(f, "stage"),
            ExecStage::Run => write!(f, "run"),
            ExecStage::Cleanup => write!(f, "cleanup"),
            ExecStage::Command => write!(f, "command"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DrError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connectivity error on {host}: {message}")]
    Connectivity { host: String, message: String },

    #[error("remote {stage} failed on {host} (exit {exit_code}): {output}")]
    RemoteExec {
        host: String,
        stage: ExecStage,
        exit_code: i32,
        output: String,
    },

    #[error("could not parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("timed out after {waited_s}s waiting for {label} to reach {expected} (last: {last})")]
    StateTimeout {
        label: String,
        expected: String,
        last: String,
        waited_s: u64,
    },

    #[error("Data Guard configuration unhealthy after {attempts} attempt(s): status {status}")]
    DgHealth { status: String, attempts: u32 },

    #[error("cloud SDK call {operation} failed: {message}")]
    Sdk { operation: String, message: String },

    #[error("replication diverged for {data_class} on {node}: {count} difference(s), see {diff_file}")]
    Divergence {
        data_class: String,
        node: String,
        count: usize,
        diff_file: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl DrError {
    pub fn config(msg: impl Into<String>) -> Self {
        DrError::Config(msg.into())
    }

    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        DrError::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn sdk(operation: impl Into<String>, message: impl Into<String>) -> Self {
        DrError::Sdk {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// True for SSH connect/auth failures, which pollers treat as terminal.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DrError::Connectivity { .. })
    }
}

pub type Result<T> = std::result::Result<T, DrError>;
