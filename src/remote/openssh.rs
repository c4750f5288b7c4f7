use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::process::{run_command, CommandResult, LocalCommand};
use super::session::{CommandOutput, HostTarget, RemoteSession, SessionFactory};
use crate::error::{DrError, Result};

/// ssh exits with 255 when the transport itself failed.
const SSH_TRANSPORT_FAILURE: i32 = 255;
const CONNECT_TIMEOUT_S: u32 = 20;
const CONTROL_PERSIST_S: u32 = 600;

/// A session backed by the system `ssh`/`scp` binaries and a control master.
pub struct OpenSshSession {
    target: HostTarget,
    control_path: PathBuf,
    closed: AtomicBool,
}

impl OpenSshSession {
    /// Start the control master; the first round-trip proves auth works.
    pub async fn connect(target: &HostTarget) -> Result<Self> {
        let control_path = std::env::temp_dir().join(format!(
            "drs-{}-{}@{}",
            std::process::id(),
            target.os_user,
            target.address
        ));
        let session = Self {
            target: target.clone(),
            control_path,
            closed: AtomicBool::new(false),
        };

        let probe = session.ssh_command().arg("true");
        let result = run_command(&probe).await?;
        if !result.success() {
            session.closed.store(true, Ordering::SeqCst);
            return Err(DrError::Connectivity {
                host: target.to_string(),
                message: result.error_message(),
            });
        }
        tracing::debug!(host = %target, "SSH control master started");
        Ok(session)
    }

    fn common_options(&self) -> Vec<String> {
        vec![
            "-i".into(),
            self.target.ssh_key_path.display().to_string(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT_S),
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPersist={}", CONTROL_PERSIST_S),
            "-o".into(),
            format!("ControlPath={}", self.control_path.display()),
        ]
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.target.os_user, self.target.address)
    }

    fn ssh_command(&self) -> LocalCommand {
        LocalCommand::new("ssh")
            .args(self.common_options())
            .arg(self.destination())
    }

    fn scp_command(&self) -> LocalCommand {
        LocalCommand::new("scp").arg("-q").args(self.common_options())
    }

    fn transport_error(&self, result: &CommandResult) -> DrError {
        DrError::Connectivity {
            host: self.target.to_string(),
            message: result.error_message(),
        }
    }

    fn exit_control_master(&self) -> std::io::Result<std::process::Output> {
        std::process::Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-O")
            .arg("exit")
            .arg(self.destination())
            .output()
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    fn target(&self) -> &HostTarget {
        &self.target
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let cmd = self.ssh_command().arg("--").arg(command);
        let result = run_command(&cmd).await?;
        if result.exit_code == SSH_TRANSPORT_FAILURE {
            return Err(self.transport_error(&result));
        }
        Ok(CommandOutput {
            stdout: result.stdout_lines.join("\n"),
            stderr: result.stderr_lines.join("\n"),
            exit_code: result.exit_code,
        })
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let cmd = self
            .scp_command()
            .arg(local.display().to_string())
            .arg(format!("{}:{}", self.destination(), remote));
        let result = run_command(&cmd).await?;
        if !result.success() {
            return Err(self.transport_error(&result));
        }
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let cmd = self
            .scp_command()
            .arg(format!("{}:{}", self.destination(), remote))
            .arg(local.display().to_string());
        let result = run_command(&cmd).await?;
        if !result.success() {
            return Err(self.transport_error(&result));
        }
        Ok(())
    }

    async fn is_reachable(&self) -> bool {
        let probe = LocalCommand::new("ssh")
            .args([
                "-i".to_string(),
                self.target.ssh_key_path.display().to_string(),
                "-o".into(),
                "BatchMode=yes".into(),
                "-o".into(),
                "StrictHostKeyChecking=no".into(),
                "-o".into(),
                "ConnectTimeout=5".into(),
                "-o".into(),
                "ControlMaster=no".into(),
                "-o".into(),
                "ControlPath=none".into(),
            ])
            .arg(self.destination())
            .arg("true");
        matches!(run_command(&probe).await, Ok(r) if r.success())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let cmd = LocalCommand::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-O")
            .arg("exit")
            .arg(self.destination());
        let result = run_command(&cmd).await?;
        if !result.success() {
            tracing::debug!(host = %self.target, error = %result.error_message(), "Control master already gone");
        }
        Ok(())
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.exit_control_master();
        }
    }
}

/// Opens [`OpenSshSession`]s.
#[derive(Debug, Default, Clone)]
pub struct OpenSshFactory;

#[async_trait]
impl SessionFactory for OpenSshFactory {
    async fn open(&self, target: &HostTarget) -> Result<Box<dyn RemoteSession>> {
        Ok(Box::new(OpenSshSession::connect(target).await?))
    }
}
