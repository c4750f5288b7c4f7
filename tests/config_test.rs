mod common;

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use drs::config::{load_dr_config, load_replication_config, load_tree};
use drs::config::types::Scope;
use drs::DrError;

/// The YAML fixture rewritten as INI: sequences become comma lists.
fn dr_ini(key: &Path, scripts: &Path) -> String {
    let yaml = common::dr_yaml(key, scripts);
    let mut out = String::new();
    for line in yaml.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(' ') {
            out.push_str(&format!("[{}]\n", line.trim_end_matches(':')));
            continue;
        }
        let (k, v) = line.trim().split_once(':').unwrap();
        let v = v.trim().trim_start_matches('[').trim_end_matches(']');
        out.push_str(&format!("{} = {}\n", k, v));
    }
    out
}

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_load_valid_dr_config() {
    let dir = TempDir::new().unwrap();
    let path = common::write_dr_config(&dir);
    let config = load_dr_config(&path).unwrap();

    assert_eq!(config.db_prim.db_unique_name, "ORCL_PRIM");
    assert_eq!(config.db_stby.host, "dbstby");
    assert_eq!(config.db_prim.listener_port, 1521);
    assert_eq!(config.db_prim.os_user, "oracle");
    assert_eq!(config.wls_prim.hosts, vec!["wlsprim1", "wlsprim2"]);
    assert_eq!(config.wls_prim.admin_host, "wlsprim1");
    assert_eq!(config.wls_prim.admin_url(), "t3://wlsprim1:7001");
    assert_eq!(config.wls_stby.servers_on("wlsstby2").len(), 1);
    assert_eq!(config.wls_prim.nm_type, "ssl");
    assert!(config.general.parallel_stop);
    assert_eq!(config.general.dg_retry_delay, Duration::from_secs(180));
    assert_eq!(config.general.nm_settle, Duration::from_secs(1));
    assert!(config.secrets().contains(&"S3cret_sys".to_string()));
}

#[test]
fn test_yaml_and_ini_agree() {
    let dir = TempDir::new().unwrap();
    let key = common::write_key(dir.path(), "id_rsa");
    let scripts = dir.path().join("scripts");
    let yaml = write(&dir, "drs.yaml", &common::dr_yaml(&key, &scripts));
    let ini = write(&dir, "drs.ini", &dr_ini(&key, &scripts));

    let a = load_dr_config(&yaml).unwrap();
    let b = load_dr_config(&ini).unwrap();
    assert_eq!(a.wls_stby.managed_servers, b.wls_stby.managed_servers);
    assert_eq!(a.wls_stby.hosts, b.wls_stby.hosts);
    assert_eq!(a.general.poll_interval, b.general.poll_interval);
    assert_eq!(a.general.parallel_stop, b.general.parallel_stop);
    assert_eq!(a.db_stby.sysdba_password, b.db_stby.sysdba_password);
}

#[test]
fn test_keys_and_scopes_are_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "mixed.ini", "[general]\nPoll_Interval_S = 9\n[Options]\nDELETE = yes\n");
    let tree = load_tree(&path).unwrap();
    assert_eq!(tree.get(Scope::General, "poll_interval_s"), Some("9"));
    assert!(tree.bool_or(Scope::Options, "delete", false).unwrap());
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "drs.toml", "GENERAL = 1\n");
    let err = load_tree(&path).unwrap_err();
    assert!(matches!(err, DrError::Config(_)), "{:?}", err);
}

#[test]
fn test_unknown_scope_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "drs.yaml", "NOT_A_SCOPE:\n  a: 1\n");
    let err = load_tree(&path).unwrap_err().to_string();
    assert!(err.contains("NOT_A_SCOPE"), "{}", err);
}

#[test]
fn test_missing_required_key_is_named() {
    let dir = TempDir::new().unwrap();
    let key = common::write_key(dir.path(), "id_rsa");
    let yaml = common::dr_yaml(&key, dir.path()).replace("  db_unique_name: ORCL_STBY\n", "");
    let path = write(&dir, "drs.yaml", &yaml);
    let err = load_dr_config(&path).unwrap_err().to_string();
    assert!(err.contains("db_unique_name"), "{}", err);
}

#[test]
fn test_validation_collects_every_problem() {
    let dir = TempDir::new().unwrap();
    let key = common::write_key(dir.path(), "id_rsa");
    let yaml = common::dr_yaml(&key, dir.path())
        .replace("[WLS1@wlsstby1, WLS2@wlsstby2]", "[WLS1@wlsstby1, WLS2@elsewhere]")
        .replace("db_unique_name: ORCL_STBY", "db_unique_name: ORCL_PRIM");
    let path = write(&dir, "drs.yaml", &yaml);
    let err = load_dr_config(&path).unwrap_err().to_string();
    assert!(err.contains("undeclared host 'elsewhere'"), "{}", err);
    assert!(err.contains("share db_unique_name"), "{}", err);
}

#[cfg(unix)]
#[test]
fn test_world_readable_key_is_rejected() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = common::write_dr_config(&dir);
    let key = dir.path().join("id_rsa");
    std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o644)).unwrap();
    let err = load_dr_config(&path).unwrap_err().to_string();
    assert!(err.contains("expected 600"), "{}", err);
}

#[test]
fn test_bad_managed_server_entry() {
    let dir = TempDir::new().unwrap();
    let key = common::write_key(dir.path(), "id_rsa");
    let yaml = common::dr_yaml(&key, dir.path()).replace("WLS2@wlsprim2", "WLS2");
    let path = write(&dir, "drs.yaml", &yaml);
    let err = load_dr_config(&path).unwrap_err().to_string();
    assert!(err.contains("name@host"), "{}", err);
}

// ─── Replicator ─────────────────────────────────────────────────────────────

#[test]
fn test_load_replication_config() {
    let dir = TempDir::new().unwrap();
    let path = common::write_replication_config(&dir, 2);
    let config = load_replication_config(&path).unwrap();
    assert_eq!(config.prem.wls_nodes, vec!["p1", "p2"]);
    assert_eq!(config.oci.ssh_user, "opc");
    assert_eq!(config.options.rsync_retries, 2);
    assert!(config.options.delete);
    assert_eq!(config.options.products_slots, 2);
    assert!(!config.uses_ohs());
    let jdbc = config.jdbc.unwrap();
    assert_eq!(jdbc.oci_scan_address, "oci-scan.oci.example.com");
}

#[test]
fn test_replication_node_counts_must_match() {
    let dir = TempDir::new().unwrap();
    let key = common::write_key(dir.path(), "id_rsa");
    let ini = common::replication_ini(&dir.path().join("stage"), &key, 0)
        .replace("wls_nodes = o1, o2", "wls_nodes = o1, o2, o3");
    let path = write(&dir, "replication.ini", &ini);
    let err = load_replication_config(&path).unwrap_err().to_string();
    assert!(err.contains("PREM_ENV has 2 WLS nodes but OCI_ENV has 3"), "{}", err);
}

#[test]
fn test_replication_ohs_needs_directories() {
    let dir = TempDir::new().unwrap();
    let key = common::write_key(dir.path(), "id_rsa");
    let ini = common::replication_ini(&dir.path().join("stage"), &key, 0)
        .replace("wls_nodes = p1, p2\n", "wls_nodes = p1, p2\nohs_nodes = h1, h2\n")
        .replace("wls_nodes = o1, o2\n", "wls_nodes = o1, o2\nohs_nodes = k1, k2\n");
    let path = write(&dir, "replication.ini", &ini);
    let err = load_replication_config(&path).unwrap_err().to_string();
    assert!(err.contains("DIRECTORIES.ohs_products"), "{}", err);
    assert!(err.contains("DIRECTORIES.ohs_private_config"), "{}", err);
}

#[test]
fn test_key_outside_section_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "replication.ini", "stage_dir = /tmp\n[DIRECTORIES]\n");
    let err = load_replication_config(&path).unwrap_err().to_string();
    assert!(err.contains("[SECTION]"), "{}", err);
}
