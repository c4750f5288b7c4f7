mod common;

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use drs::discovery::{self, Chooser, Inventory};
use drs::Result;

/// Answers the way an operator script would and remembers what was asked.
struct Recording {
    pick_last: bool,
    asked: Vec<String>,
}

impl Recording {
    fn new(pick_last: bool) -> Self {
        Self {
            pick_last,
            asked: Vec::new(),
        }
    }
}

impl Chooser for Recording {
    fn choose(&mut self, key: &str, candidates: &[String]) -> Result<String> {
        self.asked.push(key.to_string());
        let pick = if self.pick_last {
            candidates.last()
        } else {
            candidates.first()
        };
        Ok(pick.cloned().unwrap_or_default())
    }
}

/// The operator's answer file: the full inventory minus every key discovery
/// reads from the replicated tree, and minus `also_drop`.
fn write_answers(dir: &Path, also_drop: &[&str]) -> PathBuf {
    let full = std::fs::read_to_string(common::write_inventory(dir)).unwrap();
    let discovered = [
        "prem.wls.domain_name,",
        "prem.wls.admin_server,",
        "oci.network.ports.admin,",
        "oci.network.ports.wlsservers,",
        "oci.network.ports.nodemanager,",
        "oci.network.ports.ohs_http,",
        "prem.wls.hostnames,",
        "oci.lbr.virtual_hostnames,",
    ];
    let kept: Vec<&str> = full
        .lines()
        .filter(|l| !discovered.iter().any(|k| l.starts_with(k)))
        .filter(|l| !also_drop.iter().any(|k| l.starts_with(&format!("{},", k))))
        .collect();
    let path = dir.join("answers.csv");
    std::fs::write(&path, kept.join("\n") + "\n").unwrap();
    path
}

fn tree(dir: &Path) -> PathBuf {
    let root = dir.join("replica");
    common::write_domain_tree(&root);
    root
}

#[test]
fn test_discovery_fills_inventory_from_replicated_tree() {
    let dir = TempDir::new().unwrap();
    let answers = write_answers(dir.path(), &[]);
    let root = tree(dir.path());
    let out = dir.path().join("out.csv");

    let mut chooser = Recording::new(false);
    let inv = discovery::run(&answers, &root, &out, None, &mut chooser).unwrap();

    // the answered backend port is among the discovered ones, so nothing is asked
    assert!(chooser.asked.is_empty(), "{:?}", chooser.asked);
    assert_eq!(inv.get("prem.wls.domain_name").as_deref(), Some("soadomain"));
    assert_eq!(inv.get("prem.wls.admin_server").as_deref(), Some("AdminServer"));
    assert_eq!(inv.get("oci.network.ports.admin").as_deref(), Some("7001"));
    assert_eq!(inv.list("oci.network.ports.wlsservers"), vec!["8001"]);
    assert_eq!(inv.list("oci.network.ports.nodemanager"), vec!["5556"]);
    assert_eq!(inv.list("oci.network.ports.ohs_http"), vec!["4443", "7777"]);
    assert_eq!(inv.list("oci.lbr.virtual_hostnames"), vec!["app.example.com"]);
    assert_eq!(inv.get("oci.lbr.ohs_backend_port").as_deref(), Some("7777"));
    assert_eq!(
        inv.list("prem.wls.hostnames"),
        vec!["wlsprem1.prem.example.com", "wlsprem2.prem.example.com"]
    );

    let reloaded = Inventory::load_csv(&out).unwrap();
    assert_eq!(reloaded.get("prem.wls.domain_name").as_deref(), Some("soadomain"));
}

#[test]
fn test_discovery_output_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    let answers = write_answers(dir.path(), &[]);
    let root = tree(dir.path());
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");

    discovery::run(&answers, &root, &first, None, &mut Recording::new(false)).unwrap();
    discovery::run(&answers, &root, &second, None, &mut Recording::new(false)).unwrap();

    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
    let text = String::from_utf8(a).unwrap();
    assert!(text.starts_with("key,type,value\n"));
}

#[test]
fn test_ambiguous_value_goes_to_the_chooser() {
    let dir = TempDir::new().unwrap();
    let answers = write_answers(dir.path(), &["oci.lbr.ohs_backend_port"]);
    let root = tree(dir.path());
    let out = dir.path().join("out.csv");

    let mut chooser = Recording::new(true);
    let inv = discovery::run(&answers, &root, &out, None, &mut chooser).unwrap();
    assert_eq!(chooser.asked, vec!["oci.lbr.ohs_backend_port"]);
    assert_eq!(inv.get("oci.lbr.ohs_backend_port").as_deref(), Some("7777"));
}

#[test]
fn test_operator_sequence_is_kept() {
    let dir = TempDir::new().unwrap();
    let answers = write_answers(dir.path(), &[]);
    let mut text = std::fs::read_to_string(&answers).unwrap();
    text.push_str("oci.network.ports.wlsservers,port,\"8001,9001\"\n");
    std::fs::write(&answers, text).unwrap();
    let root = tree(dir.path());
    let out = dir.path().join("out.csv");

    let inv = discovery::run(&answers, &root, &out, None, &mut Recording::new(false)).unwrap();
    assert_eq!(inv.list("oci.network.ports.wlsservers"), vec!["8001", "9001"]);
}

#[test]
fn test_several_domains_ask_which_one() {
    let dir = TempDir::new().unwrap();
    let answers = write_answers(dir.path(), &[]);
    let root = tree(dir.path());
    let copy = root.join("domains/olddomain/config");
    std::fs::create_dir_all(&copy).unwrap();
    std::fs::write(
        copy.join("config.xml"),
        "<domain xmlns=\"http://xmlns.oracle.com/weblogic/domain\"><name>olddomain</name><admin-server-name>AdminServer</admin-server-name>\
         <server><name>AdminServer</name><listen-port>7001</listen-port></server></domain>",
    )
    .unwrap();
    let out = dir.path().join("out.csv");

    // sorted paths: olddomain before soadomain, so the last one is soadomain
    let mut chooser = Recording::new(true);
    let inv = discovery::run(&answers, &root, &out, None, &mut chooser).unwrap();
    assert_eq!(chooser.asked.first().map(String::as_str), Some("domain config.xml"));
    assert_eq!(inv.get("prem.wls.domain_name").as_deref(), Some("soadomain"));
}

#[test]
fn test_missing_domain_config_is_error() {
    let dir = TempDir::new().unwrap();
    let answers = write_answers(dir.path(), &[]);
    let empty = dir.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    let out = dir.path().join("out.csv");

    let err = discovery::run(&answers, &empty, &out, None, &mut Recording::new(false)).unwrap_err();
    assert!(err.to_string().contains("config.xml"), "{}", err);
    assert!(!out.exists());
}
