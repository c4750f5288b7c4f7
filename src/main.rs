use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

/// Reset SIGPIPE to default behavior so piping (e.g. `drs health-check | less`) exits cleanly
/// instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use drs::cloud::{CloudApi, OciCli};
use drs::config::loader::{self, ConfigMode};
use drs::discovery::{self, Inventory, OsFacts, PromptChooser};
use drs::output::formatter;
use drs::provision::{self, Provisioner, TopologyPlan};
use drs::remote::{HostPool, LocalRunner, SessionFactory};
use drs::remote::openssh::OpenSshFactory;
use drs::replicate::{DataClass, Instance, Replicator};
use drs::state::StateStore;
use drs::workflow::{Orchestrator, WorkflowReport};

/// drs - WebLogic disaster-recovery orchestrator and hybrid-DR provisioner
#[derive(Parser)]
#[command(name = "drs", version, about, long_about = None)]
struct Cli {
    /// Orchestrator YAML or replication INI (format detected by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for per-action log files
    #[arg(long, global = true, default_value = "log")]
    log_dir: PathBuf,

    /// Working directory for state documents and locks
    #[arg(short, long, global = true, default_value = ".drs")]
    working_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the standby to snapshot, configure both sites for DR, convert back
    DrSetup,

    /// Planned role swap between primary and standby
    Switchover,

    /// Promote the standby after losing the primary
    Failover,

    /// Turn a failed-over former primary back into a standby
    Reinstate,

    /// Report database role, Data Guard status and server states of both sites
    HealthCheck,

    /// Verify and create the local staging layout
    Init,

    /// Copy primary data into the staging area
    Pull {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Copy staged data to the cloud hosts
    Push {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Pull immediately followed by push
    Lifecycle {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Replicate tnsnames.ora pointed at the cloud database
    Tnsnames,

    /// Build the standby topology in the cloud
    Provision {
        /// Inventory CSV (operator answers when --auto-discovery is set)
        #[arg(long)]
        input_file: PathBuf,

        /// Discover the primary from the staged configuration first
        #[arg(long)]
        auto_discovery: bool,

        /// OCI CLI config file
        #[arg(long)]
        oci_config: Option<PathBuf>,

        /// Resource-state document (default: <working-dir>/sysconfig_<timestamp>.json)
        #[arg(long)]
        sysconfig_file: Option<PathBuf>,

        /// Directory holding the remote scripts
        #[arg(long, default_value = "remote_scripts")]
        scripts_dir: PathBuf,
    },

    /// Delete every resource recorded in a state document
    Cleanup {
        /// Resource-state document written by provision
        #[arg(long)]
        sysconfig_file: PathBuf,

        /// Only delete resources recorded under this compartment
        #[arg(long)]
        comp_id: Option<String>,

        /// OCI CLI config file
        #[arg(long)]
        oci_config: Option<PathBuf>,
    },

    /// Merge operator answers with the replicated primary configuration
    Discover {
        /// Operator answers CSV
        #[arg(long)]
        input_file: PathBuf,

        /// Root of the replicated primary configuration
        #[arg(long)]
        config_root: PathBuf,

        /// Inventory CSV to write
        #[arg(long)]
        output: PathBuf,
    },

    /// List the resources recorded in a state document
    State {
        #[arg(long)]
        sysconfig_file: PathBuf,
    },

    /// Validate configuration without running anything
    Validate,
}

impl Commands {
    /// Name used for the log file and the report title.
    fn action(&self) -> &'static str {
        match self {
            Commands::DrSetup => "dr-setup",
            Commands::Switchover => "switchover",
            Commands::Failover => "failover",
            Commands::Reinstate => "reinstate",
            Commands::HealthCheck => "health-check",
            Commands::Init => "init",
            Commands::Pull { .. } => "pull",
            Commands::Push { .. } => "push",
            Commands::Lifecycle { .. } => "lifecycle",
            Commands::Tnsnames => "tnsnames",
            Commands::Provision { .. } => "provision",
            Commands::Cleanup { .. } => "cleanup",
            Commands::Discover { .. } => "discover",
            Commands::State { .. } => "state",
            Commands::Validate => "validate",
        }
    }
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Restrict the pass to one instance type
    #[arg(long, value_enum)]
    instance: Option<InstanceArg>,

    /// Data class to replicate (repeatable; default: all)
    #[arg(long = "data", value_enum)]
    data: Vec<DataArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum InstanceArg {
    Wls,
    Ohs,
}

impl From<InstanceArg> for Instance {
    fn from(arg: InstanceArg) -> Self {
        match arg {
            InstanceArg::Wls => Instance::Wls,
            InstanceArg::Ohs => Instance::Ohs,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum DataArg {
    Products,
    PrivateConfig,
    SharedConfig,
}

impl From<DataArg> for DataClass {
    fn from(arg: DataArg) -> Self {
        match arg {
            DataArg::Products => DataClass::Products,
            DataArg::PrivateConfig => DataClass::PrivateConfig,
            DataArg::SharedConfig => DataClass::SharedConfig,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let log_file = match init_logging(&cli) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::DrSetup
        | Commands::Switchover
        | Commands::Failover
        | Commands::Reinstate => cmd_workflow(&cli).await,
        Commands::HealthCheck => cmd_health_check(&cli).await,
        Commands::Init
        | Commands::Pull { .. }
        | Commands::Push { .. }
        | Commands::Lifecycle { .. }
        | Commands::Tnsnames => cmd_replicate(&cli).await,
        Commands::Provision {
            ref input_file,
            auto_discovery,
            ref oci_config,
            ref sysconfig_file,
            ref scripts_dir,
        } => {
            cmd_provision(
                &cli,
                input_file,
                auto_discovery,
                oci_config.clone(),
                sysconfig_file.as_deref(),
                scripts_dir,
            )
            .await
        }
        Commands::Cleanup {
            ref sysconfig_file,
            ref comp_id,
            ref oci_config,
        } => cmd_cleanup(&cli, sysconfig_file, comp_id.as_deref(), oci_config.clone()).await,
        Commands::Discover {
            ref input_file,
            ref config_root,
            ref output,
        } => cmd_discover(input_file, config_root, output),
        Commands::State { ref sysconfig_file } => cmd_state(sysconfig_file),
        Commands::Validate => cmd_validate(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(action = cli.command.action(), error = %format!("{:#}", e), "Action failed");
            eprintln!(
                "{} {:#} (log: {})",
                "ERROR:".red().bold(),
                e,
                log_file.display()
            );
            ExitCode::FAILURE
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Console events go to stderr; every event also lands in a fresh
/// `<log_dir>/<action>_<timestamp>.log`.
fn init_logging(cli: &Cli) -> Result<PathBuf> {
    std::fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("cannot create log directory {}", cli.log_dir.display()))?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let path = cli
        .log_dir
        .join(format!("{}_{}.log", cli.command.action(), stamp));
    let file = File::create(&path).with_context(|| format!("cannot create log file {}", path.display()))?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(path)
}

fn config_path<'a>(cli: &'a Cli) -> Result<&'a Path> {
    cli.config
        .as_deref()
        .with_context(|| format!("--config is required for {}", cli.command.action()))
}

fn session_factory() -> Arc<dyn SessionFactory> {
    Arc::new(OpenSshFactory)
}

fn orchestrator(cli: &Cli) -> Result<Orchestrator> {
    let config = loader::load_dr_config(config_path(cli)?)?;
    Ok(Orchestrator::new(config, session_factory()))
}

fn replicator(cli: &Cli) -> Result<Replicator> {
    let config = loader::load_replication_config(config_path(cli)?)?;
    Ok(Replicator::new(config, Arc::new(LocalRunner), session_factory()))
}

fn oci_cli(config_file: Option<PathBuf>, region: Option<String>) -> Arc<dyn CloudApi> {
    Arc::new(OciCli::new(Arc::new(LocalRunner), config_file, region))
}

/// Context naming the step a workflow stopped at.
fn failure_context(report: &WorkflowReport) -> String {
    match report.failed_step() {
        Some(step) => format!("{} failed at step '{}'", report.workflow, step.name),
        None => format!("{} failed", report.workflow),
    }
}

/// Print the report, then turn the workflow result into the command result.
fn finish(report: &WorkflowReport, result: drs::Result<()>) -> Result<()> {
    formatter::print_workflow_report(report);
    result.with_context(|| failure_context(report))?;
    formatter::print_success(&format!("{} completed.", report.workflow));
    Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_workflow(cli: &Cli) -> Result<()> {
    let orch = orchestrator(cli)?;
    let action = cli.command.action();
    let mut report = WorkflowReport::new(action);
    formatter::print_step(&format!("Running {}", action));

    let result = match cli.command {
        Commands::DrSetup => orch.dr_setup(&mut report).await,
        Commands::Switchover => orch.switchover(&mut report).await,
        Commands::Failover => orch.failover(&mut report).await,
        Commands::Reinstate => orch.reinstate(&mut report).await,
        _ => bail!("{} is not an orchestrator workflow", action),
    };
    finish(&report, result)
}

async fn cmd_health_check(cli: &Cli) -> Result<()> {
    let orch = orchestrator(cli)?;
    let health = orch.health_check().await.context("health-check failed")?;
    formatter::print_health_report(&health);

    let problems = health.problems();
    for problem in &problems {
        formatter::print_error(problem);
    }
    if !problems.is_empty() {
        bail!("health-check found {} problem(s): {}", problems.len(), problems.join("; "));
    }
    formatter::print_success("Both sites are healthy.");
    Ok(())
}

async fn cmd_replicate(cli: &Cli) -> Result<()> {
    let replicator = replicator(cli)?;
    let action = cli.command.action();
    let mut report = WorkflowReport::new(action);
    let selection = |args: &SelectionArgs| {
        replicator.selection(
            args.instance.map(Instance::from),
            args.data.iter().copied().map(DataClass::from).collect(),
        )
    };
    formatter::print_step(&format!("Running {}", action));

    let result = match &cli.command {
        Commands::Init => replicator.init(&mut report).await,
        Commands::Pull { selection: args } => replicator.pull(&mut report, &selection(args)).await,
        Commands::Push { selection: args } => replicator.push(&mut report, &selection(args)).await,
        Commands::Lifecycle { selection: args } => {
            replicator.lifecycle(&mut report, &selection(args)).await
        }
        Commands::Tnsnames => replicator.tnsnames(&mut report).await,
        _ => bail!("{} is not a replication verb", action),
    };
    finish(&report, result)
}

/// Probe the first premises WLS node for its OS facts.
async fn probe_primary(cli: &Cli, scripts_dir: &Path) -> Result<(PathBuf, OsFacts)> {
    let config = loader::load_replication_config(config_path(cli)?)
        .context("--auto-discovery needs the replication INI as --config")?;
    let node = config
        .prem
        .wls_nodes
        .first()
        .context("PREM_ENV lists no WLS node to probe")?;
    let pool = HostPool::new(session_factory());
    let probed = async {
        let host = pool.get(&config.prem.target(node)).await?;
        discovery::osinfo::probe(&host, scripts_dir, &config.prem.os_user).await
    }
    .await;
    if let Err(e) = pool.close_all().await {
        tracing::warn!(error = %e, "Failed to close every session");
    }
    let facts = probed.with_context(|| format!("OS probe of {} failed", node))?;
    Ok((config.directories.stage_dir.clone(), facts))
}

async fn cmd_provision(
    cli: &Cli,
    input_file: &Path,
    auto_discovery: bool,
    oci_config: Option<PathBuf>,
    sysconfig_file: Option<&Path>,
    scripts_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(&cli.working_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");

    let inventory = if auto_discovery {
        formatter::print_step("Discovering the primary");
        let (config_root, os) = probe_primary(cli, scripts_dir).await?;
        let output = cli.working_dir.join(format!("inventory_{}.csv", stamp));
        let mut chooser = PromptChooser::stdin();
        let inv = discovery::run(input_file, &config_root, &output, Some(os), &mut chooser)
            .context("discovery failed")?;
        formatter::print_success(&format!("Inventory written to {}", output.display()));
        inv
    } else {
        let mut inv = Inventory::load_csv(input_file)?;
        inv.validate()?;
        inv
    };

    let plan = TopologyPlan::from_inventory(&inventory)?;
    let sysconfig = sysconfig_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cli.working_dir.join(format!("sysconfig_{}.json", stamp)));
    let api = oci_cli(oci_config, Some(plan.region.clone()));
    let provisioner = Provisioner::new(plan, api, session_factory());

    formatter::print_step(&format!("Provisioning into {}", sysconfig.display()));
    let (result, report) = provision::provision(&provisioner, &sysconfig, &cli.working_dir).await;
    formatter::print_workflow_report(&report);
    let topology = result
        .with_context(|| failure_context(&report))
        .with_context(|| format!("state recorded so far is in {}", sysconfig.display()))?;

    if let Some(ip) = &topology.load_balancer_ip {
        println!("  {} {}", "Load balancer IP:".bold(), ip);
    }
    for node in &topology.wls_nodes {
        println!("  {} {} {}", "WLS node".bold(), node.index, node.private_ip);
    }
    for node in &topology.ohs_nodes {
        println!("  {} {} {}", "OHS node".bold(), node.index, node.private_ip);
    }
    formatter::print_success(&format!("Provisioned. State: {}", sysconfig.display()));
    Ok(())
}

async fn cmd_cleanup(
    cli: &Cli,
    sysconfig_file: &Path,
    comp_id: Option<&str>,
    oci_config: Option<PathBuf>,
) -> Result<()> {
    let api = oci_cli(oci_config, None);
    formatter::print_step(&format!("Cleaning up {}", sysconfig_file.display()));
    let summary = provision::run_cleanup(api.as_ref(), sysconfig_file, &cli.working_dir, comp_id).await?;
    formatter::print_cleanup_summary(&summary);
    if summary.skipped > 0 {
        formatter::print_warning(&format!(
            "{} entr{} left in place (adopted, already deleted, or outside the compartment filter).",
            summary.skipped,
            if summary.skipped == 1 { "y" } else { "ies" }
        ));
    }
    if !summary.is_success() {
        bail!(
            "cleanup could not delete {} resource(s): {}",
            summary.failed.len(),
            summary.failed.join(", ")
        );
    }
    formatter::print_success("Cleanup complete.");
    Ok(())
}

fn cmd_discover(input_file: &Path, config_root: &Path, output: &Path) -> Result<()> {
    let mut chooser = PromptChooser::stdin();
    let inv = discovery::run(input_file, config_root, output, None, &mut chooser)
        .context("discovery failed")?;
    formatter::print_success(&format!(
        "Inventory with {} key(s) written to {}",
        inv.keys().count(),
        output.display()
    ));
    Ok(())
}

fn cmd_state(sysconfig_file: &Path) -> Result<()> {
    let store = StateStore::load(sysconfig_file)?;
    formatter::print_resource_list(store.doc());
    Ok(())
}

fn cmd_validate(cli: &Cli) -> Result<()> {
    let path = config_path(cli)?;
    match loader::detect_mode(path)? {
        ConfigMode::Yaml => {
            loader::load_dr_config(path)?;
        }
        ConfigMode::Ini => {
            loader::load_replication_config(path)?;
        }
    }
    formatter::print_success(&format!("Configuration {} is valid.", path.display()));
    Ok(())
}
