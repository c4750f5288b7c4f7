use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `(address, os_user, ssh_key_path)`: who we log in as, and where.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostTarget {
    pub address: String,
    pub os_user: String,
    pub ssh_key_path: PathBuf,
}

impl HostTarget {
    pub fn new(address: impl Into<String>, os_user: impl Into<String>, key: impl AsRef<Path>) -> Self {
        Self {
            address: address.into(),
            os_user: os_user.into(),
            ssh_key_path: key.as_ref().to_path_buf(),
        }
    }

    /// Pool key: at most one live session per `(address, os_user)`.
    pub fn pair(&self) -> (String, String) {
        (self.address.clone(), self.os_user.clone())
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.os_user, self.address)
    }
}

/// Captured output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, the way an operator would see them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// An open SSH session to one host.
///
/// `exec` runs a shell command line as the connection user; privilege
/// switching is layered on top by [`crate::remote::host::RemoteHost`].
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn target(&self) -> &HostTarget;

    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Cheap liveness probe; never errors.
    async fn is_reachable(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Opens sessions; the seam tests replace with in-memory hosts.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, target: &HostTarget) -> Result<Box<dyn RemoteSession>>;
}
