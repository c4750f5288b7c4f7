mod common;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use common::{fail, ok, FakeHosts, Invocation};
use drs::config::load_dr_config;
use drs::db::{DatabaseDriver, DbParams, DbRole};
use drs::error::ExecStage;
use drs::remote::{CommandOutput, HostTarget, RemoteHost, ScriptBundle, ScriptBundleRunner};
use drs::workflow::{Orchestrator, StepOutcome, WorkflowReport};
use drs::DrError;

const NM_ERROR: &str = "ERROR_WHILE_CONNECTING_TO_NM\n";

// ─── Simulated DR pair ──────────────────────────────────────────────────────

/// Broker, node managers and servers of both sites, driven by the vendor
/// script calls the orchestrator issues.
struct DrSim {
    primary: String,
    standby: String,
    needs_reinstate: bool,
    dg_statuses: VecDeque<&'static str>,
    nm_running: BTreeSet<String>,
    servers: BTreeMap<(String, String), &'static str>,
    /// The next admin status poll after a start reports a connection error.
    admin_glitch: bool,
    admin_polls_after_start: usize,
    show_config_calls: usize,
    snapshot_open: bool,
    /// Host whose standby FMW setup script fails.
    broken_setup_host: Option<String>,
}

fn site_of(host: &str) -> String {
    if host.contains("prim") {
        "prim".to_string()
    } else {
        "stby".to_string()
    }
}

impl DrSim {
    fn new() -> Self {
        let mut servers = BTreeMap::new();
        for name in ["AdminServer", "WLS1", "WLS2"] {
            servers.insert(("prim".to_string(), name.to_string()), "RUNNING");
            servers.insert(("stby".to_string(), name.to_string()), "SHUTDOWN");
        }
        Self {
            primary: "ORCL_PRIM".to_string(),
            standby: "ORCL_STBY".to_string(),
            needs_reinstate: false,
            dg_statuses: VecDeque::new(),
            nm_running: ["wlsprim1", "wlsprim2"].iter().map(|h| h.to_string()).collect(),
            servers,
            admin_glitch: false,
            admin_polls_after_start: 0,
            show_config_calls: 0,
            snapshot_open: false,
            broken_setup_host: None,
        }
    }

    fn state(&self, site: &str, name: &str) -> &'static str {
        self.servers
            .get(&(site.to_string(), name.to_string()))
            .copied()
            .unwrap_or("UNKNOWN")
    }

    fn set(&mut self, site: &str, name: &str, state: &'static str) {
        self.servers.insert((site.to_string(), name.to_string()), state);
    }

    /// Report the current state, then let transient states settle.
    fn observe(&mut self, site: &str, name: &str) -> &'static str {
        let current = self.state(site, name);
        let next = match current {
            "STARTING" => "RUNNING",
            "SHUTTING_DOWN" => "SHUTDOWN",
            other => other,
        };
        self.set(site, name, next);
        current
    }

    fn broker_listing(&mut self) -> String {
        self.show_config_calls += 1;
        let status = self
            .dg_statuses
            .pop_front()
            .unwrap_or(if self.needs_reinstate { "WARNING" } else { "SUCCESS" });
        format!(
            "Configuration - soadr\n\n  Protection Mode: MaxPerformance\n  Members:\n  {p} - Primary database\n    {s} - Physical standby database\n\nFast-Start Failover:  Disabled\n\nConfiguration Status:\n{status}   (status updated 12 seconds ago)\n",
            p = self.primary,
            s = self.standby,
            status = status
        )
    }

    fn node_manager(&mut self, host: &str, inv: &Invocation) -> CommandOutput {
        let (action, nm_host, server, kind) = (inv.arg(0), inv.arg(1), inv.arg(8), inv.arg(9));
        let site = site_of(host);
        if !self.nm_running.contains(nm_host) {
            return ok(NM_ERROR);
        }
        match action {
            "version" => ok("Connecting to Node Manager ...\nNODE MANAGER VERSION = 14.1.1.0.0\n"),
            "status" => {
                if kind == "admin" && self.state(&site, server) == "STARTING" {
                    self.admin_polls_after_start += 1;
                    if self.admin_glitch {
                        self.admin_glitch = false;
                        return ok(NM_ERROR);
                    }
                }
                let state = self.observe(&site, server);
                ok(&format!("{} SERVER STATUS = {}\n", kind.to_uppercase(), state))
            }
            "start" => {
                self.set(&site, server, "STARTING");
                ok("Starting server ...\n")
            }
            "kill" => {
                self.set(&site, server, "SHUTDOWN");
                ok("Killed\n")
            }
            other => fail(2, &format!("unknown action {}", other)),
        }
    }

    fn admin(&mut self, inv: &Invocation) -> CommandOutput {
        let url_host = inv
            .arg(1)
            .trim_start_matches("t3://")
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string();
        let site = site_of(&url_host);
        let server = inv.arg(4);
        if self.state(&site, "AdminServer") != "RUNNING" {
            return match inv.arg(0) {
                "status" => ok(NM_ERROR),
                _ => fail(1, "Error connecting to the administration server\n"),
            };
        }
        match inv.arg(0) {
            "status" => {
                let state = self.observe(&site, server);
                ok(&format!("MANAGED SERVER STATUS = {}\n", state))
            }
            "start" => {
                self.set(&site, server, "STARTING");
                ok("Starting server ...\n")
            }
            "shutdown" => {
                self.set(&site, server, "SHUTTING_DOWN");
                ok("Shutting down ...\n")
            }
            other => fail(2, &format!("unknown action {}", other)),
        }
    }

    fn handle(&mut self, host: &str, inv: &Invocation) -> CommandOutput {
        if let Some(script) = inv.script.as_deref() {
            return match script {
                "dg_show_configuration_verbose.sh" => {
                    let listing = self.broker_listing();
                    ok(&listing)
                }
                "dg_switchover_to_standby_db.sh" => {
                    let target = inv.arg(3).to_string();
                    std::mem::swap(&mut self.primary, &mut self.standby);
                    ok(&format!(
                        "Performing switchover NOW, please wait...\nSwitchover succeeded, new primary is \"{}\"\n",
                        target.to_lowercase()
                    ))
                }
                "dg_failover_to_standby_db.sh" => {
                    let target = inv.arg(3).to_string();
                    std::mem::swap(&mut self.primary, &mut self.standby);
                    self.needs_reinstate = true;
                    ok(&format!("Failover succeeded, new primary is \"{}\"\n", target.to_lowercase()))
                }
                "dg_reinstate_db.sh" => {
                    let db = inv.arg(3).to_string();
                    self.needs_reinstate = false;
                    ok(&format!("Reinstatement of database \"{}\" succeeded\n", db.to_lowercase()))
                }
                "dg_convert_to_snapshot_standby.sh" | "dg_convert_to_physical_standby.sh" => {
                    self.snapshot_open = script.contains("snapshot");
                    ok(&format!("Converting database...\nDatabase \"{}\" converted successfully\n", inv.arg(3)))
                }
                "fmw_dr_setup_standby.sh" if self.broken_setup_host.as_deref() == Some(host) => {
                    fail(1, "Error: unable to update the domain\n")
                }
                s if s.starts_with("fmw_") => ok("Done\n"),
                "wls_nm_control.py" => self.node_manager(host, inv),
                "wls_admin_control.py" => self.admin(inv),
                other => fail(127, &format!("unexpected script {}", other)),
            };
        }
        if inv.command.contains("startNodeManager.sh") {
            self.nm_running.insert(host.to_string());
            return ok("");
        }
        if inv.command.contains("boot.properties") {
            return ok("");
        }
        fail(127, &format!("unexpected command {}", inv.command))
    }
}

fn sim_hosts(sim: &Arc<Mutex<DrSim>>) -> FakeHosts {
    let sim = Arc::clone(sim);
    FakeHosts::new(move |host, inv| sim.lock().unwrap().handle(host, inv))
}

fn orchestrator(dir: &TempDir, hosts: &FakeHosts) -> Orchestrator {
    let path = common::write_dr_config(dir);
    let config = load_dr_config(&path).unwrap();
    Orchestrator::new(config, hosts.factory())
}

fn step_index(report: &WorkflowReport, name: &str) -> usize {
    report
        .steps
        .iter()
        .position(|s| s.name == name)
        .unwrap_or_else(|| panic!("no step named {}", name))
}

// ─── Switchover ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_switchover_moves_roles_and_servers() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("switchover");
    orch.switchover(&mut report).await.unwrap();
    assert!(report.is_success());

    let s = sim.lock().unwrap();
    assert_eq!(s.primary, "ORCL_STBY");
    assert_eq!(s.standby, "ORCL_PRIM");
    for name in ["AdminServer", "WLS1", "WLS2"] {
        assert_eq!(s.state("stby", name), "RUNNING", "{} on standby", name);
        assert_eq!(s.state("prim", name), "SHUTDOWN", "{} on primary", name);
    }
    assert!(s.nm_running.contains("wlsstby1"));
    assert!(s.nm_running.contains("wlsstby2"));
    drop(s);

    let stop_admin = step_index(&report, "primary: stop admin server AdminServer");
    let broker = step_index(&report, "broker switchover");
    let start_admin = step_index(&report, "standby: start admin server AdminServer");
    assert!(step_index(&report, "stop managed server WLS1 on wlsprim1") < stop_admin);
    assert!(stop_admin < broker);
    assert!(broker < start_admin);
    assert!(start_admin < step_index(&report, "standby: start managed server WLS2 on wlsstby2"));

    let shutdowns: Vec<Invocation> = hosts
        .script_calls("wls_admin_control.py")
        .into_iter()
        .map(|(_, inv)| inv)
        .filter(|inv| inv.arg(0) == "shutdown")
        .collect();
    assert!(!shutdowns.is_empty());
    for inv in &shutdowns {
        assert_eq!(inv.arg(5), "600", "{:?}", inv.args);
    }

    let calls = hosts.script_calls("dg_switchover_to_standby_db.sh");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "dbprim");
    assert_eq!(calls[0].1.run_as.as_deref(), Some("oracle"));
    assert_eq!(calls[0].1.arg(3), "ORCL_STBY");
}

#[tokio::test(start_paused = true)]
async fn test_switchover_cleans_staging_and_sessions() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("switchover");
    orch.switchover(&mut report).await.unwrap();

    assert!(hosts.staged_total() > 10);
    assert!(hosts.live_staging_dirs().is_empty());
    let chowns: Vec<String> = hosts
        .invocations()
        .into_iter()
        .map(|(_, inv)| inv.command)
        .filter(|c| c.starts_with("chown -R "))
        .collect();
    assert!(!chowns.is_empty());
    for c in &chowns {
        assert!(c.starts_with("chown -R 'oracle' '/tmp/DRS-"), "{}", c);
    }
    let (opened, closed) = hosts.sessions();
    assert_eq!(opened, 6);
    assert_eq!(opened, closed);
    assert_eq!(orch.pool().len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_switchover_refuses_wrong_standby_role() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    sim.lock().unwrap().standby = "ORCL_OTHER".to_string();
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("switchover");
    let err = orch.switchover(&mut report).await.unwrap_err();
    assert!(matches!(err, DrError::Parse { .. }));
    assert_eq!(report.failed_step().unwrap().name, "check standby database role");
    // Nothing was stopped.
    assert_eq!(sim.lock().unwrap().state("prim", "WLS1"), "RUNNING");
    assert!(hosts.script_calls("wls_admin_control.py").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_node_manager_connection_error_ends_poll_at_once() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    sim.lock().unwrap().admin_glitch = true;
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("switchover");
    let err = orch.switchover(&mut report).await.unwrap_err();
    assert!(err.is_connectivity(), "unexpected error: {}", err);

    let failed = report.failed_step().unwrap();
    assert_eq!(failed.name, "standby: start admin server AdminServer");
    assert!(failed.elapsed < Duration::from_secs(5));
    assert_eq!(sim.lock().unwrap().admin_polls_after_start, 1);
    assert!(hosts.live_staging_dirs().is_empty());
    let (opened, closed) = hosts.sessions();
    assert_eq!(opened, closed);
}

// ─── Data Guard checks ──────────────────────────────────────────────────────

async fn db_driver(dir: &TempDir, hosts: &FakeHosts) -> DatabaseDriver {
    let key = common::write_key(dir.path(), "db_key");
    let host = RemoteHost::new(HostTarget::new("dbprim", "opc", &key), hosts.factory());
    host.connect().await.unwrap();
    DatabaseDriver::new(
        Arc::new(host),
        Arc::new(DbParams {
            scripts_dir: dir.path().to_path_buf(),
            os_user: "oracle".to_string(),
            oracle_home: "/u01/app/oracle/product/19c/dbhome_1".to_string(),
            oracle_sid: "ORCL1".to_string(),
            db_unique_name: "ORCL_PRIM".to_string(),
            dg_retry_delay: Duration::from_secs(180),
        }),
    )
}

#[tokio::test(start_paused = true)]
async fn test_dg_warning_is_retried_until_success() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    sim.lock().unwrap().dg_statuses = VecDeque::from(vec!["WARNING", "WARNING"]);
    let hosts = sim_hosts(&sim);
    let db = db_driver(&dir, &hosts).await;

    let began = tokio::time::Instant::now();
    db.verify_dg_config("ORCL_PRIM", DbRole::Primary, "S3cret_sys", 3)
        .await
        .unwrap();
    let waited = began.elapsed();
    assert!(waited >= Duration::from_secs(360), "waited {:?}", waited);
    assert!(waited < Duration::from_secs(361), "waited {:?}", waited);
    assert_eq!(sim.lock().unwrap().show_config_calls, 3);
}

#[tokio::test(start_paused = true)]
async fn test_dg_warning_exhausts_attempts() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    sim.lock().unwrap().dg_statuses = VecDeque::from(vec!["WARNING", "WARNING", "WARNING"]);
    let hosts = sim_hosts(&sim);
    let db = db_driver(&dir, &hosts).await;

    let err = db
        .verify_dg_config("ORCL_PRIM", DbRole::Primary, "S3cret_sys", 3)
        .await
        .unwrap_err();
    match err {
        DrError::DgHealth { status, attempts } => {
            assert_eq!(status, "WARNING");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_dg_wrong_role_fails_without_retry() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    let hosts = sim_hosts(&sim);
    let db = db_driver(&dir, &hosts).await;

    let began = tokio::time::Instant::now();
    let err = db
        .verify_dg_config("ORCL_STBY", DbRole::Primary, "S3cret_sys", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, DrError::Parse { .. }));
    assert_eq!(began.elapsed(), Duration::ZERO);
    assert_eq!(sim.lock().unwrap().show_config_calls, 1);
}

// ─── Script bundles ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_bundle_still_removes_staging_and_masks_secrets() {
    let dir = TempDir::new().unwrap();
    let hosts = FakeHosts::new(|_, inv| {
        if inv.is_script("dg_reinstate_db.sh") {
            fail(3, &format!("ORA-01017: invalid password {}\n", inv.arg(0)))
        } else {
            ok("")
        }
    });
    let key = common::write_key(dir.path(), "id_rsa");
    let host = RemoteHost::new(HostTarget::new("dbprim", "opc", &key), hosts.factory());
    host.connect().await.unwrap();
    host.register_secret("S3cret_sys");

    let bundle = ScriptBundle::new(dir.path(), "dg_reinstate_db.sh")
        .dependency(dir.path(), "db_common.sh")
        .exec_as("oracle")
        .arg("S3cret_sys");
    let err = ScriptBundleRunner::new(&host).run(&bundle).await.unwrap_err();
    match err {
        DrError::RemoteExec {
            stage,
            exit_code,
            output,
            ..
        } => {
            assert_eq!(stage, ExecStage::Run);
            assert_eq!(exit_code, 3);
            assert!(output.contains("********"));
            assert!(!output.contains("S3cret_sys"));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(hosts.live_staging_dirs().is_empty());
    let invocations = hosts.invocations();
    let (_, last) = invocations.last().unwrap();
    assert_eq!(last.run_as.as_deref(), Some("root"));
    assert!(last.command.starts_with("rm -rf '/tmp/DRS-"));

    let uploads = hosts.uploads();
    assert_eq!(uploads.len(), 2);
    assert!(uploads[0].1.ends_with("/dg_reinstate_db.sh"));
    assert!(uploads[1].1.ends_with("/db_common.sh"));
}

// ─── Failover, reinstate, health ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_failover_with_primary_site_down_then_reinstate() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    let hosts = sim_hosts(&sim);
    hosts.set_unreachable("dbprim");
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("failover");
    orch.failover(&mut report).await.unwrap();
    assert!(report.is_success());
    let stop = &report.steps[step_index(&report, "stop primary application tier")];
    assert!(matches!(stop.outcome, StepOutcome::Warning(_)));
    {
        let s = sim.lock().unwrap();
        assert_eq!(s.primary, "ORCL_STBY");
        assert!(s.needs_reinstate);
        assert_eq!(s.state("stby", "WLS1"), "RUNNING");
    }

    let hosts_back = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts_back);
    let mut report = WorkflowReport::new("reinstate");
    orch.reinstate(&mut report).await.unwrap();
    assert!(report.is_success());
    assert!(!sim.lock().unwrap().needs_reinstate);
    let calls = hosts_back.script_calls("dg_reinstate_db.sh");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "dbstby");
    assert_eq!(calls[0].1.arg(3), "ORCL_PRIM");
}

#[tokio::test(start_paused = true)]
async fn test_health_check_reports_both_sites() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let health = orch.health_check().await.unwrap();
    assert_eq!(health.dg_status.as_deref(), Some("SUCCESS"));
    assert_eq!(health.sites.len(), 2);
    assert_eq!(health.sites[0].db_role, Some(DbRole::Primary));
    assert_eq!(health.sites[1].db_role, Some(DbRole::PhysicalStandby));
    assert!(health.is_healthy(), "problems: {:?}", health.problems());
    let (opened, closed) = hosts.sessions();
    assert_eq!(opened, closed);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_flags_stopped_primary_server() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    sim.lock().unwrap().set("prim", "WLS2", "SHUTDOWN");
    let hosts = sim_hosts(&sim);
    hosts.set_unreachable("wlsstby1");
    let orch = orchestrator(&dir, &hosts);

    let health = orch.health_check().await.unwrap();
    assert!(health.sites[1].error.is_some());
    let problems = health.problems();
    assert_eq!(problems.len(), 1, "problems: {:?}", problems);
    assert!(problems[0].contains("WLS2"));
    assert!(problems[0].contains("SHUTDOWN"));
}

// ─── DR setup ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_dr_setup_runs_standby_under_snapshot() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("dr-setup");
    orch.dr_setup(&mut report).await.unwrap();
    assert!(report.is_success());
    assert!(!sim.lock().unwrap().snapshot_open);

    let primary_setup = step_index(&report, "primary: FMW DR setup");
    let snapshot = step_index(&report, "standby: convert database to snapshot standby");
    let physical = step_index(&report, "standby: convert database to physical standby");
    assert!(primary_setup < snapshot);
    assert!(snapshot < step_index(&report, "standby: FMW DR setup on wlsstby1"));
    assert!(step_index(&report, "standby: FMW DR setup on wlsstby2") < physical);

    let standby_runs: Vec<String> = hosts
        .script_calls("fmw_dr_setup_standby.sh")
        .into_iter()
        .map(|(host, _)| host)
        .collect();
    assert_eq!(standby_runs, vec!["wlsstby1".to_string(), "wlsstby2".to_string()]);
    assert!(hosts.live_staging_dirs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dr_setup_restores_physical_standby_after_failure() {
    let dir = TempDir::new().unwrap();
    let sim = Arc::new(Mutex::new(DrSim::new()));
    sim.lock().unwrap().broken_setup_host = Some("wlsstby2".to_string());
    let hosts = sim_hosts(&sim);
    let orch = orchestrator(&dir, &hosts);

    let mut report = WorkflowReport::new("dr-setup");
    let err = orch.dr_setup(&mut report).await.unwrap_err();
    assert!(matches!(err, DrError::RemoteExec { .. }), "{:?}", err);
    assert_eq!(report.failed_step().unwrap().name, "standby: FMW DR setup on wlsstby2");

    // the database went back to physical standby anyway
    assert!(!sim.lock().unwrap().snapshot_open);
    assert_eq!(hosts.script_calls("dg_convert_to_physical_standby.sh").len(), 1);
    assert_eq!(hosts.script_calls("dg_show_configuration_verbose.sh").len(), 1);
}
