//! Replicator: typed pull/push passes between the primary, a local staging
//! tree and the cloud hosts, closed by a dry-run diff with retries.

pub mod layout;
pub mod rsync;
pub mod tnsnames;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

pub use layout::StagingLayout;
pub use rsync::{DiffEntry, Endpoint, RsyncJob};

use crate::config::{EnvConfig, ReplicationConfig};
use crate::error::{DrError, ExecStage, Result};
use crate::remote::host::shell_quote;
use crate::remote::{CommandRunner, HostPool, LocalCommand, RunAs, SessionFactory};
use crate::workflow::WorkflowReport;

// ─── Selectors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataClass {
    Products,
    PrivateConfig,
    SharedConfig,
    Tnsnames,
}

impl DataClass {
    /// The classes a bare `pull`/`push` transfers.
    pub const BULK: [DataClass; 3] = [DataClass::Products, DataClass::PrivateConfig, DataClass::SharedConfig];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Products => "products",
            DataClass::PrivateConfig => "private_config",
            DataClass::SharedConfig => "shared_config",
            DataClass::Tnsnames => "tnsnames",
        }
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instance {
    Wls,
    Ohs,
}

impl Instance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instance::Wls => "wls",
            Instance::Ohs => "ohs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Primary → staging.
    Pull,
    /// Staging → cloud.
    Push,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
        }
    }
}

/// Which instances and data classes a pass covers.
#[derive(Debug, Clone)]
pub struct Selection {
    pub instances: Vec<Instance>,
    pub classes: Vec<DataClass>,
}

impl Selection {
    /// No instance means WLS, plus OHS when the topology has one; no class
    /// means every bulk class.
    pub fn new(instance: Option<Instance>, classes: Vec<DataClass>, uses_ohs: bool) -> Self {
        let instances = match instance {
            Some(i) => vec![i],
            None if uses_ohs => vec![Instance::Wls, Instance::Ohs],
            None => vec![Instance::Wls],
        };
        let mut classes: Vec<DataClass> = if classes.is_empty() {
            DataClass::BULK.to_vec()
        } else {
            classes.into_iter().filter(|c| *c != DataClass::Tnsnames).collect()
        };
        classes.sort();
        classes.dedup();
        Self { instances, classes }
    }
}

/// One endpoint pair of a pass.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub class: DataClass,
    pub instance: Instance,
    /// 1-based node index within the instance's host list.
    pub node: usize,
    pub host: String,
    pub job: RsyncJob,
}

impl Transfer {
    fn label(&self, direction: Direction) -> String {
        format!(
            "{} {} {}node{} ({})",
            direction.as_str(),
            self.class,
            self.instance.as_str(),
            self.node,
            self.host
        )
    }
}

// ─── Replicator ─────────────────────────────────────────────────────────────

pub struct Replicator {
    config: Arc<ReplicationConfig>,
    layout: StagingLayout,
    runner: Arc<dyn CommandRunner>,
    pool: HostPool,
}

impl Replicator {
    pub fn new(config: ReplicationConfig, runner: Arc<dyn CommandRunner>, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            layout: StagingLayout::from_config(&config),
            config: Arc::new(config),
            runner,
            pool: HostPool::new(factory),
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    pub fn selection(&self, instance: Option<Instance>, classes: Vec<DataClass>) -> Selection {
        Selection::new(instance, classes, self.config.uses_ohs())
    }

    /// Verify the staging layout, creating what is missing. No data moves.
    pub async fn init(&self, report: &mut WorkflowReport) -> Result<()> {
        let created = report
            .step("verify staging layout", async { self.layout.ensure() })
            .await?;
        if created.is_empty() {
            tracing::info!(stage = %self.layout.root().display(), "Staging layout already complete");
        }
        Ok(())
    }

    pub async fn pull(&self, report: &mut WorkflowReport, sel: &Selection) -> Result<()> {
        self.scoped(self.pass(report, Direction::Pull, sel)).await
    }

    pub async fn push(&self, report: &mut WorkflowReport, sel: &Selection) -> Result<()> {
        self.scoped(self.pass(report, Direction::Push, sel)).await
    }

    /// `pull` immediately followed by `push`.
    pub async fn lifecycle(&self, report: &mut WorkflowReport, sel: &Selection) -> Result<()> {
        self.scoped(async {
            self.pass(report, Direction::Pull, sel).await?;
            self.pass(report, Direction::Push, sel).await
        })
        .await
    }

    /// Pull the alias file from the primary, point it at the cloud database,
    /// and push it to every cloud WLS host.
    pub async fn tnsnames(&self, report: &mut WorkflowReport) -> Result<()> {
        self.scoped(self.tnsnames_steps(report)).await
    }

    async fn scoped<F>(&self, body: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let result = body.await;
        if let Err(e) = self.pool.close_all().await {
            tracing::warn!(error = %e, "Failed to close every session");
        }
        result
    }

    fn env(&self, direction: Direction) -> &EnvConfig {
        match direction {
            Direction::Pull => &self.config.prem,
            Direction::Push => &self.config.oci,
        }
    }

    fn remote_path(&self, instance: Instance, class: DataClass) -> Option<&str> {
        let d = &self.config.directories;
        let path = match (instance, class) {
            (Instance::Wls, DataClass::Products) => &d.wls_products,
            (Instance::Wls, DataClass::PrivateConfig) => &d.wls_private_config,
            (Instance::Wls, DataClass::SharedConfig) => &d.wls_shared_config,
            (Instance::Ohs, DataClass::Products) => &d.ohs_products,
            (Instance::Ohs, DataClass::PrivateConfig) => &d.ohs_private_config,
            _ => return None,
        };
        Some(path.as_str()).filter(|p| !p.is_empty())
    }

    /// Every endpoint pair of a pass, in execution order.
    pub fn plan(&self, direction: Direction, sel: &Selection) -> Vec<Transfer> {
        let env = self.env(direction);
        let slots = self.config.options.products_slots;
        let mut transfers = Vec::new();

        for &instance in &sel.instances {
            let hosts = match instance {
                Instance::Wls => &env.wls_nodes,
                Instance::Ohs => &env.ohs_nodes,
            };
            for &class in &sel.classes {
                let Some(remote_path) = self.remote_path(instance, class) else {
                    continue;
                };
                let nodes: Vec<usize> = match (class, direction) {
                    (DataClass::Products, Direction::Pull) => (1..=hosts.len().min(slots)).collect(),
                    (DataClass::SharedConfig, _) => (1..=hosts.len().min(1)).collect(),
                    _ => (1..=hosts.len()).collect(),
                };
                for node in nodes {
                    let host = hosts[node - 1].clone();
                    let remote = Endpoint::Remote {
                        target: env.target(&host),
                        path: remote_path.to_string(),
                        os_user: env.os_user.clone(),
                    };
                    let local = Endpoint::Local(self.layout.dir_for(instance, class, node));
                    let (source, target) = match direction {
                        Direction::Pull => (remote, local),
                        Direction::Push => (local, remote),
                    };
                    transfers.push(Transfer {
                        class,
                        instance,
                        node,
                        host,
                        job: RsyncJob::new(class, source, target, self.config.options.delete),
                    });
                }
            }
        }
        transfers
    }

    async fn pass(&self, report: &mut WorkflowReport, direction: Direction, sel: &Selection) -> Result<()> {
        report
            .step("verify staging layout", async { self.layout.ensure().map(|_| ()) })
            .await?;
        for t in self.plan(direction, sel) {
            let label = t.label(direction);
            report.step(&label, self.transfer(direction, &t)).await?;
        }
        Ok(())
    }

    /// Copy, then diff; resend what differs up to `rsync_retries` times.
    async fn transfer(&self, direction: Direction, t: &Transfer) -> Result<()> {
        let env = self.env(direction);
        let host = self.pool.get(&env.target(&t.host)).await?;
        if direction == Direction::Push {
            if let Endpoint::Remote { path, .. } = &t.job.target {
                let dir = if t.job.is_dir {
                    path.clone()
                } else {
                    parent_of(path)
                };
                let q = shell_quote(&dir);
                host.run_as(
                    &RunAs::Root,
                    &format!("[ -d {q} ] || {{ mkdir -p {q} && chown {}: {q}; }}", env.os_user),
                    false,
                )
                .await?;
            }
        }

        self.run_rsync(&t.host, &t.job.copy_command()).await?;
        let mut diff = self.diff(t).await?;

        let retries = self.config.options.rsync_retries;
        let mut attempt = 0;
        while !diff.is_empty() && attempt < retries {
            attempt += 1;
            let diff_file = self.write_diff_file(t, &diff)?;
            tracing::warn!(
                host = %t.host,
                class = %t.class,
                differences = diff.len(),
                attempt,
                diff_file = %diff_file.display(),
                "Differences after copy, resending"
            );
            self.resend(t, &diff).await?;
            diff = self.diff(t).await?;
        }

        if diff.is_empty() {
            tracing::info!(host = %t.host, class = %t.class, "Replica in sync");
            return Ok(());
        }
        let diff_file = self.write_diff_file(t, &diff)?;
        Err(DrError::Divergence {
            data_class: t.class.to_string(),
            node: t.host.clone(),
            count: diff.len(),
            diff_file: diff_file.display().to_string(),
        })
    }

    async fn resend(&self, t: &Transfer, diff: &[DiffEntry]) -> Result<()> {
        let changed: Vec<&str> = diff
            .iter()
            .filter(|d| !d.deletion)
            .map(|d| d.path.as_str())
            .collect();
        if !changed.is_empty() && t.job.is_dir {
            let mut list = tempfile::NamedTempFile::new()?;
            for path in &changed {
                writeln!(list, "{}", path)?;
            }
            list.flush()?;
            self.run_rsync(&t.host, &t.job.files_from_command(list.path()))
                .await?;
        }
        if diff.iter().any(|d| d.deletion) || !t.job.is_dir {
            self.run_rsync(&t.host, &t.job.copy_command()).await?;
        }
        Ok(())
    }

    async fn diff(&self, t: &Transfer) -> Result<Vec<DiffEntry>> {
        let result = self.run_rsync(&t.host, &t.job.diff_command()).await?;
        rsync::parse_diff(&result.stdout_lines)
    }

    async fn run_rsync(&self, host: &str, command: &LocalCommand) -> Result<crate::remote::CommandResult> {
        let result = self.runner.run(command).await?;
        if !result.success() {
            return Err(DrError::RemoteExec {
                host: host.to_string(),
                stage: ExecStage::Command,
                exit_code: result.exit_code,
                output: result.error_message(),
            });
        }
        Ok(result)
    }

    /// `<stage>/diffs/<class>_<node>_<yyyymmdd-hhmmss>.txt`
    fn write_diff_file(&self, t: &Transfer, diff: &[DiffEntry]) -> Result<PathBuf> {
        let dir = self.layout.diffs();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "{}_{}_{}.txt",
            t.class,
            t.host,
            Local::now().format("%Y%m%d-%H%M%S")
        ));
        let mut body = String::new();
        for d in diff {
            if d.deletion {
                body.push_str("*deleting ");
            }
            body.push_str(&d.path);
            body.push('\n');
        }
        std::fs::write(&path, body)?;
        Ok(path)
    }

    async fn tnsnames_steps(&self, report: &mut WorkflowReport) -> Result<()> {
        let c = &self.config;
        let jdbc = c
            .jdbc
            .as_ref()
            .ok_or_else(|| DrError::config("the JDBC section is required for tnsnames"))?;
        if c.directories.tns_admin.is_empty() {
            return Err(DrError::config("DIRECTORIES.tns_admin is required for tnsnames"));
        }
        let source_host = c
            .prem
            .wls_nodes
            .first()
            .ok_or_else(|| DrError::config("PREM_ENV.wls_nodes is empty"))?;
        let remote_file = format!(
            "{}/{}",
            c.directories.tns_admin.trim_end_matches('/'),
            tnsnames::TNSNAMES_FILE
        );
        let stage = self.layout.tnsnames();
        let pulled = stage.join(tnsnames::TNSNAMES_FILE);
        let rewritten_dir = stage.join("oci");
        let rewritten = rewritten_dir.join(tnsnames::TNSNAMES_FILE);

        report
            .step("verify staging layout", async { self.layout.ensure().map(|_| ()) })
            .await?;

        let pull = Transfer {
            class: DataClass::Tnsnames,
            instance: Instance::Wls,
            node: 1,
            host: source_host.clone(),
            job: RsyncJob::new(
                DataClass::Tnsnames,
                Endpoint::Remote {
                    target: c.prem.target(source_host),
                    path: remote_file.clone(),
                    os_user: c.prem.os_user.clone(),
                },
                Endpoint::Local(pulled.clone()),
                false,
            ),
        };
        report
            .step(&pull.label(Direction::Pull), self.transfer(Direction::Pull, &pull))
            .await?;

        report
            .step("rewrite tnsnames for the cloud database", async {
                let text = std::fs::read_to_string(&pulled)?;
                let (out, replaced) = tnsnames::rewrite(&text, jdbc)?;
                if replaced == 0 {
                    tracing::warn!(file = %pulled.display(), "No premises tokens found in tnsnames");
                }
                std::fs::create_dir_all(&rewritten_dir)?;
                std::fs::write(&rewritten, out)?;
                Ok::<_, DrError>(())
            })
            .await?;

        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        for (i, host) in c.oci.wls_nodes.iter().enumerate() {
            let push = Transfer {
                class: DataClass::Tnsnames,
                instance: Instance::Wls,
                node: i + 1,
                host: host.clone(),
                job: RsyncJob::new(
                    DataClass::Tnsnames,
                    Endpoint::Local(rewritten.clone()),
                    Endpoint::Remote {
                        target: c.oci.target(host),
                        path: remote_file.clone(),
                        os_user: c.oci.os_user.clone(),
                    },
                    false,
                ),
            };
            let label = push.label(Direction::Push);
            report
                .step(&label, async {
                    let remote = self.pool.get(&c.oci.target(host)).await?;
                    let q = shell_quote(&remote_file);
                    remote
                        .run_as(
                            &RunAs::user(&c.oci.os_user),
                            &format!("[ ! -f {q} ] || cp -p {q} {q}_{stamp}.bak"),
                            true,
                        )
                        .await?;
                    self.transfer(Direction::Push, &push).await
                })
                .await?;
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.display().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_defaults() {
        let sel = Selection::new(None, vec![], true);
        assert_eq!(sel.instances, vec![Instance::Wls, Instance::Ohs]);
        assert_eq!(sel.classes, DataClass::BULK.to_vec());
        let sel = Selection::new(Some(Instance::Wls), vec![DataClass::SharedConfig, DataClass::Tnsnames], true);
        assert_eq!(sel.classes, vec![DataClass::SharedConfig]);
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/u01/network/admin/tnsnames.ora"), "/u01/network/admin");
        assert_eq!(parent_of("tnsnames.ora"), "/");
    }
}
