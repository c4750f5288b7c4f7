use std::path::{Path, PathBuf};

use regex::Regex;

use super::DataClass;
use crate::constants::patterns;
use crate::error::{DrError, Result};
use crate::remote::{HostTarget, LocalCommand};

/// One side of a transfer: a local directory or a path on a remote host.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Local(PathBuf),
    Remote {
        target: HostTarget,
        path: String,
        /// Owner of the remote files; rsync runs as this user over sudo.
        os_user: String,
    },
}

impl Endpoint {
    /// rsync location; directories get a trailing `/` so their content is
    /// copied, not the directory itself.
    fn location(&self, is_dir: bool) -> String {
        let slash = |p: String| {
            if is_dir && !p.ends_with('/') {
                format!("{}/", p)
            } else {
                p
            }
        };
        match self {
            Endpoint::Local(p) => slash(p.display().to_string()),
            Endpoint::Remote { target, path, .. } => {
                format!("{}@{}:{}", target.os_user, target.address, slash(path.clone()))
            }
        }
    }

    fn remote(&self) -> Option<(&HostTarget, &str)> {
        match self {
            Endpoint::Remote { target, os_user, .. } => Some((target, os_user.as_str())),
            Endpoint::Local(_) => None,
        }
    }
}

/// Paths each data class never transfers.
pub fn excludes(class: DataClass) -> &'static [&'static str] {
    match class {
        DataClass::Products => &["*.log", "*.out", "*.lok", "cfgtoollogs/", "*/logs/"],
        DataClass::PrivateConfig => &[
            "*.log",
            "*.out",
            "*.lok",
            "*.pid",
            "*.DAT",
            "servers/*/tmp/",
            "servers/*/cache/",
            "servers/*/logs/",
            "nodemanager/*.log*",
        ],
        DataClass::SharedConfig => &["*.log", "*.out", "*.lok", "*.DAT", "servers/*/tmp/"],
        DataClass::Tnsnames => &[],
    }
}

/// A source → target copy of one data class.
#[derive(Debug, Clone)]
pub struct RsyncJob {
    pub source: Endpoint,
    pub target: Endpoint,
    pub excludes: Vec<String>,
    pub delete: bool,
    /// Directory tree copy; `false` for a single file.
    pub is_dir: bool,
}

impl RsyncJob {
    pub fn new(class: DataClass, source: Endpoint, target: Endpoint, delete: bool) -> Self {
        Self {
            source,
            target,
            excludes: excludes(class).iter().map(|s| s.to_string()).collect(),
            delete,
            is_dir: class != DataClass::Tnsnames,
        }
    }

    fn transport_args(&self) -> Vec<String> {
        let remote = self.source.remote().or_else(|| self.target.remote());
        let mut args = Vec::new();
        if let Some((target, os_user)) = remote {
            args.push("-e".to_string());
            args.push(format!(
                "ssh -i {} -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
                target.ssh_key_path.display()
            ));
            args.push(format!("--rsync-path=sudo -u {} rsync", os_user));
        }
        args
    }

    fn finish(&self, mut args: Vec<String>) -> LocalCommand {
        args.extend(self.transport_args());
        for e in &self.excludes {
            args.push(format!("--exclude={}", e));
        }
        args.push(self.source.location(self.is_dir));
        args.push(self.target.location(self.is_dir));
        LocalCommand::new("rsync").args(args)
    }

    /// `rsync -avz [--delete] --modify-window=1`.
    pub fn copy_command(&self) -> LocalCommand {
        let mut args = vec!["-avz".to_string()];
        if self.delete {
            args.push("--delete".to_string());
        }
        args.push("--modify-window=1".to_string());
        self.finish(args)
    }

    /// `rsync -niaHc --no-times`: itemize what a copy would still change.
    pub fn diff_command(&self) -> LocalCommand {
        let mut args = vec!["-niaHc".to_string(), "--no-times".to_string()];
        if self.delete {
            args.push("--delete".to_string());
        }
        self.finish(args)
    }

    /// Resend only the paths listed in `list`, relative to the source root.
    pub fn files_from_command(&self, list: &Path) -> LocalCommand {
        self.finish(vec![
            "-avz".to_string(),
            "--modify-window=1".to_string(),
            format!("--files-from={}", list.display()),
        ])
    }
}

/// A genuine difference reported by the dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub deletion: bool,
}

/// Parse itemized dry-run output. Directory lines and paths matching the
/// noise pattern (logs, `*.DAT`) are dropped.
pub fn parse_diff(lines: &[String]) -> Result<Vec<DiffEntry>> {
    let itemized = Regex::new(patterns::RSYNC_ITEMIZED)
        .map_err(|e| DrError::parse("rsync itemize pattern", e.to_string()))?;
    let noise = Regex::new(patterns::RSYNC_NOISE)
        .map_err(|e| DrError::parse("rsync noise pattern", e.to_string()))?;

    let mut entries = Vec::new();
    for line in lines {
        let Some(caps) = itemized.captures(line.trim_end()) else {
            continue;
        };
        let Some(path) = caps.get(1).map(|m| m.as_str().trim().to_string()) else {
            continue;
        };
        if path.ends_with('/') || path == "." || noise.is_match(&path) {
            continue;
        }
        entries.push(DiffEntry {
            deletion: line.starts_with("*deleting"),
            path,
        });
    }
    Ok(entries)
}
