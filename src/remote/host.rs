use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::session::{CommandOutput, HostTarget, RemoteSession, SessionFactory};
use crate::constants::{REBOOT_PROBE_INTERVAL, SECRET_MASK};
use crate::error::{DrError, ExecStage, Result};

/// Which OS identity a remote command runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAs {
    /// The SSH login user, no privilege switch.
    Connection,
    /// `sudo` to root.
    Root,
    /// `sudo su - <user>`.
    User(String),
}

impl RunAs {
    pub fn user(name: impl Into<String>) -> Self {
        RunAs::User(name.into())
    }
}

/// Replace every registered secret in `text` with the mask.
pub fn mask_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, s| acc.replace(s.as_str(), SECRET_MASK))
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A scoped SSH session to one host, with privilege switching and masking.
///
/// The session is opened lazily by [`connect`](Self::connect) and released by
/// [`close`](Self::close); the underlying transport also releases on drop.
/// Commands are serialised through an internal lock, so one session is never
/// used by two tasks at once.
pub struct RemoteHost {
    target: HostTarget,
    factory: Arc<dyn SessionFactory>,
    session: Mutex<Option<Box<dyn RemoteSession>>>,
    secrets: StdMutex<Vec<String>>,
}

impl RemoteHost {
    pub fn new(target: HostTarget, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            target,
            factory,
            session: Mutex::new(None),
            secrets: StdMutex::new(Vec::new()),
        }
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    /// Register a value that must never appear in logs.
    pub fn register_secret(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        if let Ok(mut secrets) = self.secrets.lock() {
            if !secrets.iter().any(|s| s == secret) {
                secrets.push(secret.to_string());
            }
        }
    }

    pub fn mask(&self, text: &str) -> String {
        match self.secrets.lock() {
            Ok(secrets) => mask_secrets(text, &secrets),
            Err(_) => text.to_string(),
        }
    }

    /// Open the session. Calling it again on a live session only warns.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            tracing::warn!(host = %self.target, "Already connected, reusing session");
            return Ok(());
        }
        tracing::info!(host = %self.target, "Connecting");
        *guard = Some(self.factory.open(&self.target).await?);
        Ok(())
    }

    /// Close the session; safe to call when already closed.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            tracing::debug!(host = %self.target, "Closing session");
            session.close().await?;
        }
        Ok(())
    }

    fn wrap(&self, run_as: &RunAs, cmd: &str) -> String {
        match run_as {
            RunAs::Connection => cmd.to_string(),
            RunAs::User(u) if *u == self.target.os_user => cmd.to_string(),
            RunAs::Root => format!("sudo sh -c {}", shell_quote(cmd)),
            RunAs::User(u) => format!("sudo su - {} -c {}", u, shell_quote(cmd)),
        }
    }

    /// Run `cmd` as `run_as`. With `warn_only`, a non-zero exit is logged
    /// and returned instead of raised.
    pub async fn run_as(&self, run_as: &RunAs, cmd: &str, warn_only: bool) -> Result<CommandOutput> {
        let line = self.wrap(run_as, cmd);
        tracing::debug!(host = %self.target, command = %self.mask(&line), "Running remote command");

        let output = {
            let guard = self.session.lock().await;
            let session = guard.as_ref().ok_or_else(|| DrError::Connectivity {
                host: self.target.to_string(),
                message: "not connected".to_string(),
            })?;
            session.exec(&line).await?
        };

        if !output.success() {
            let text = self.mask(&output.combined());
            if warn_only {
                tracing::warn!(
                    host = %self.target,
                    exit_code = output.exit_code,
                    output = %text,
                    "Remote command failed (ignored)"
                );
            } else {
                return Err(DrError::RemoteExec {
                    host: self.target.to_string(),
                    stage: ExecStage::Command,
                    exit_code: output.exit_code,
                    output: text,
                });
            }
        }
        Ok(output)
    }

    /// Run as the connection user.
    pub async fn run(&self, cmd: &str, warn_only: bool) -> Result<CommandOutput> {
        self.run_as(&RunAs::Connection, cmd, warn_only).await
    }

    pub async fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        tracing::debug!(host = %self.target, local = %local.display(), remote = remote, "Uploading");
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(|| self.not_connected())?;
        session.upload(local, remote).await
    }

    pub async fn copy_from(&self, remote: &str, local: &Path) -> Result<()> {
        tracing::debug!(host = %self.target, remote = remote, local = %local.display(), "Downloading");
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(|| self.not_connected())?;
        session.download(remote, local).await
    }

    pub async fn delete_dir(&self, run_as: &RunAs, path: &str) -> Result<()> {
        self.run_as(run_as, &format!("rm -rf {}", shell_quote(path)), false)
            .await?;
        Ok(())
    }

    /// Reboot now, wait for the host to drop, then reconnect within `timeout`.
    pub async fn reboot(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        tracing::info!(host = %self.target, "Rebooting host");
        match self.run_as(&RunAs::Root, "shutdown -r now", true).await {
            Ok(_) => {}
            Err(e) if e.is_connectivity() => {}
            Err(e) => return Err(e),
        }
        self.close().await.ok();

        let probe = self.factory.open(&self.target).await;
        let mut went_down = probe.is_err();
        if let Ok(session) = probe {
            while !went_down && Instant::now() < deadline {
                went_down = !session.is_reachable().await;
                if !went_down {
                    tokio::time::sleep(REBOOT_PROBE_INTERVAL).await;
                }
            }
            session.close().await.ok();
        }
        if !went_down {
            return Err(self.reboot_timeout(timeout, "still reachable"));
        }

        while Instant::now() < deadline {
            tokio::time::sleep(REBOOT_PROBE_INTERVAL).await;
            if let Ok(session) = self.factory.open(&self.target).await {
                *self.session.lock().await = Some(session);
                tracing::info!(host = %self.target, "Host back after reboot");
                return Ok(());
            }
        }
        Err(self.reboot_timeout(timeout, "unreachable"))
    }

    fn reboot_timeout(&self, timeout: Duration, last: &str) -> DrError {
        DrError::StateTimeout {
            label: format!("reboot of {}", self.target),
            expected: "reconnectable".to_string(),
            last: last.to_string(),
            waited_s: timeout.as_secs(),
        }
    }

    fn not_connected(&self) -> DrError {
        DrError::Connectivity {
            host: self.target.to_string(),
            message: "not connected".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
        assert_eq!(shell_quote("plain"), "'plain'");
    }

    #[test]
    fn test_mask_secrets_replaces_every_occurrence() {
        let masked = mask_secrets("pw=s3cr3t again s3cr3t", &["s3cr3t".to_string(), String::new()]);
        assert_eq!(masked, "pw=******** again ********");
    }
}
