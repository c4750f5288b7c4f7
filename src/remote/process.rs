use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{DrError, Result};

/// Result of a local process execution.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout(&self) -> String {
        self.stdout_lines.join("\n")
    }

    /// Extract a human-readable error message from the result.
    pub fn error_message(&self) -> String {
        let stderr = self.stderr_lines.join("\n");
        if !stderr.trim().is_empty() {
            return stderr;
        }

        // Fall back to the tail of stdout
        let meaningful: Vec<&String> = self
            .stdout_lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if !meaningful.is_empty() {
            return meaningful
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("\n");
        }

        format!("exit code {}", self.exit_code)
    }
}

/// A local command invocation.
#[derive(Debug, Clone)]
pub struct LocalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Arguments that must not reach the logs verbatim.
    pub secrets: Vec<String>,
}

impl LocalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    /// The command line with secrets masked, for logging.
    pub fn display(&self) -> String {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.as_str()))
            .collect::<Vec<_>>()
            .join(" ");
        crate::remote::host::mask_secrets(&line, &self.secrets)
    }
}

/// Seam over local process execution (rsync, ssh, the cloud CLI).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &LocalCommand) -> Result<CommandResult>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct LocalRunner;

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: &LocalCommand) -> Result<CommandResult> {
        run_command(command).await
    }
}

/// Spawn a local process and capture its output line by line.
pub async fn run_command(command: &LocalCommand) -> Result<CommandResult> {
    tracing::debug!(command = %command.display(), "Running local command");

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    if let Some(dir) = &command.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        DrError::config(format!("failed to spawn {}: {}", command.program, e))
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DrError::config("child stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| DrError::config("child stderr not captured"))?;

    let mut stdout_stream = BufReader::new(stdout).lines();
    let mut stderr_stream = BufReader::new(stderr).lines();

    let secrets = command.secrets.clone();
    let stdout_handle = tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = stdout_stream.next_line().await {
            tracing::debug!(stream = "stdout", "{}", crate::remote::host::mask_secrets(&line, &secrets));
            lines.push(line);
        }
        lines
    });

    let secrets = command.secrets.clone();
    let stderr_handle = tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = stderr_stream.next_line().await {
            tracing::debug!(stream = "stderr", "{}", crate::remote::host::mask_secrets(&line, &secrets));
            lines.push(line);
        }
        lines
    });

    let stdout_lines = stdout_handle
        .await
        .map_err(|e| DrError::config(format!("stdout reader failed: {}", e)))?;
    let stderr_lines = stderr_handle
        .await
        .map_err(|e| DrError::config(format!("stderr reader failed: {}", e)))?;

    let status = child.wait().await?;
    let exit_code = status.code().unwrap_or(-1);

    tracing::debug!(program = %command.program, exit_code = exit_code, "Local command completed");

    Ok(CommandResult {
        exit_code,
        stdout_lines,
        stderr_lines,
    })
}
