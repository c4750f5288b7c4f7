use std::path::{Path, PathBuf};

use chrono::Local;

use super::host::{shell_quote, RemoteHost, RunAs};
use crate::constants::STAGING_PREFIX;
use crate::error::{DrError, ExecStage, Result};

/// A primary script, its dependencies, and how to invoke it.
#[derive(Debug, Clone)]
pub struct ScriptBundle {
    pub primary: PathBuf,
    pub dependencies: Vec<PathBuf>,
    pub args: Vec<String>,
    pub interpreter: String,
    /// Run as this OS user; `None` runs as the connection user.
    pub exec_user: Option<String>,
}

impl ScriptBundle {
    pub fn new(scripts_dir: &Path, primary: &str) -> Self {
        Self {
            primary: scripts_dir.join(primary),
            dependencies: Vec::new(),
            args: Vec::new(),
            interpreter: "bash".to_string(),
            exec_user: None,
        }
    }

    pub fn dependency(mut self, scripts_dir: &Path, name: &str) -> Self {
        self.dependencies.push(scripts_dir.join(name));
        self
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

    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn exec_as(mut self, user: impl Into<String>) -> Self {
        self.exec_user = Some(user.into());
        self
    }

    fn primary_name(&self) -> Result<String> {
        file_name(&self.primary)
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| DrError::config(format!("invalid script path {}", path.display())))
}

/// `/tmp/DRS-<yyyymmddhhmmss>-<8 upper-case letters>`.
pub fn staging_dir_name() -> String {
    let letters: String = uuid::Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(8)
        .map(|b| (b'A' + b % 26) as char)
        .collect();
    format!(
        "{}{}-{}",
        STAGING_PREFIX,
        Local::now().format("%Y%m%d%H%M%S"),
        letters
    )
}

/// Runs a [`ScriptBundle`] as one unit: stage, run, clean.
pub struct ScriptBundleRunner<'a> {
    host: &'a RemoteHost,
}

impl<'a> ScriptBundleRunner<'a> {
    pub fn new(host: &'a RemoteHost) -> Self {
        Self { host }
    }

    /// Stage the bundle, run it, and always remove the staging directory.
    ///
    /// Returns the combined stdout/stderr of the primary script.
    pub async fn run(&self, bundle: &ScriptBundle) -> Result<String> {
        let dir = staging_dir_name();
        let primary = bundle.primary_name()?;
        tracing::info!(
            host = %self.host.target(),
            script = %primary,
            staging = %dir,
            "Running script bundle"
        );

        let staged = self.stage(bundle, &dir).await;
        let outcome = match staged {
            Ok(()) => self.execute(bundle, &dir, &primary).await,
            Err(e) => Err(e),
        };

        // Cleanup never masks the outcome of the run.
        if let Err(e) = self.host.delete_dir(&RunAs::Root, &dir).await {
            tracing::warn!(
                host = %self.host.target(),
                staging = %dir,
                error = %e,
                "Failed to remove staging directory"
            );
        }

        outcome
    }

    async fn stage(&self, bundle: &ScriptBundle, dir: &str) -> Result<()> {
        self.host
            .run_as(&RunAs::Connection, &format!("mkdir -m 700 {}", shell_quote(dir)), false)
            .await
            .map_err(|e| restage(e, ExecStage::Stage))?;

        for script in std::iter::once(&bundle.primary).chain(bundle.dependencies.iter()) {
            let name = file_name(script)?;
            self.host
                .copy_to(script, &format!("{}/{}", dir, name))
                .await
                .map_err(|e| restage(e, ExecStage::Stage))?;
        }

        if let Some(user) = &bundle.exec_user {
            if *user != self.host.target().os_user {
                self.host
                    .run_as(&RunAs::Root, &format!("chown -R {} {}", shell_quote(user), shell_quote(dir)), false)
                    .await
                    .map_err(|e| restage(e, ExecStage::Stage))?;
            }
        }
        Ok(())
    }

    async fn execute(&self, bundle: &ScriptBundle, dir: &str, primary: &str) -> Result<String> {
        let args = bundle
            .args
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ");
        let cmd = format!(
            "cd {} && {} {} {}",
            shell_quote(dir),
            bundle.interpreter,
            primary,
            args
        );
        let run_as = match &bundle.exec_user {
            Some(user) => RunAs::User(user.clone()),
            None => RunAs::Connection,
        };

        let output = self.host.run_as(&run_as, cmd.trim_end(), true).await?;
        let text = output.combined();
        if !output.success() {
            return Err(DrError::RemoteExec {
                host: self.host.target().to_string(),
                stage: ExecStage::Run,
                exit_code: output.exit_code,
                output: self.host.mask(&text),
            });
        }
        Ok(text)
    }
}

/// Re-tag a command failure with the bundle stage it happened in.
fn restage(err: DrError, stage: ExecStage) -> DrError {
    match err {
        DrError::RemoteExec {
            host,
            exit_code,
            output,
            ..
        } => DrError::RemoteExec {
            host,
            stage,
            exit_code,
            output,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_dir_name_shape() {
        let name = staging_dir_name();
        let re = regex::Regex::new(r"^/tmp/DRS-\d{14}-[A-Z]{8}$").unwrap();
        assert!(re.is_match(&name), "{}", name);
    }

    #[test]
    fn test_staging_dir_names_differ() {
        assert_ne!(staging_dir_name(), staging_dir_name());
    }

    #[test]
    fn test_bundle_builder() {
        let dir = Path::new("/opt/scripts");
        let b = ScriptBundle::new(dir, "main.sh")
            .dependency(dir, "lib.sh")
            .args(["a", "b"])
            .exec_as("oracle");
        assert_eq!(b.primary, PathBuf::from("/opt/scripts/main.sh"));
        assert_eq!(b.dependencies, vec![PathBuf::from("/opt/scripts/lib.sh")]);
        assert_eq!(b.args, vec!["a", "b"]);
        assert_eq!(b.exec_user.as_deref(), Some("oracle"));
        assert_eq!(b.interpreter, "bash");
    }
}
