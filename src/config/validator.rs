use std::collections::HashSet;
use std::path::Path;

use crate::error::{DrError, Result};

use super::types::{DrConfig, ReplicationConfig, WlsSiteConfig};

/// Validate the orchestrator configuration. Every problem found is listed in
/// one `Config` error.
pub fn validate_dr(config: &DrConfig) -> Result<()> {
    let mut problems = Vec::new();

    for (scope, key) in [
        ("DB_PRIM", &config.db_prim.ssh_key),
        ("DB_STBY", &config.db_stby.ssh_key),
        ("WLS_PRIM", &config.wls_prim.ssh_key),
        ("WLS_STBY", &config.wls_stby.ssh_key),
    ] {
        check_ssh_key(scope, key, &mut problems);
    }

    check_wls_site("WLS_PRIM", &config.wls_prim, &mut problems);
    check_wls_site("WLS_STBY", &config.wls_stby, &mut problems);

    if config.wls_prim.hosts.len() != config.wls_stby.hosts.len() {
        problems.push(format!(
            "WLS_PRIM declares {} hosts but WLS_STBY declares {}",
            config.wls_prim.hosts.len(),
            config.wls_stby.hosts.len()
        ));
    }
    if config.wls_prim.managed_servers.len() != config.wls_stby.managed_servers.len() {
        problems.push(format!(
            "WLS_PRIM declares {} managed servers but WLS_STBY declares {}",
            config.wls_prim.managed_servers.len(),
            config.wls_stby.managed_servers.len()
        ));
    }
    if config.db_prim.db_unique_name == config.db_stby.db_unique_name {
        problems.push(format!(
            "DB_PRIM and DB_STBY share db_unique_name '{}'",
            config.db_prim.db_unique_name
        ));
    }
    if config.general.dg_retries == 0 {
        problems.push("GENERAL.dg_retries must be at least 1".to_string());
    }

    finish(problems)
}

/// Validate the replicator configuration.
pub fn validate_replication(config: &ReplicationConfig) -> Result<()> {
    let mut problems = Vec::new();

    check_ssh_key("PREM_ENV", &config.prem.ssh_key, &mut problems);
    check_ssh_key("OCI_ENV", &config.oci.ssh_key, &mut problems);

    for (scope, env) in [("PREM_ENV", &config.prem), ("OCI_ENV", &config.oci)] {
        if env.wls_nodes.len() < 2 {
            problems.push(format!(
                "{}.wls_nodes must list at least 2 hosts, found {}",
                scope,
                env.wls_nodes.len()
            ));
        }
        if config.uses_ohs() && env.ohs_nodes.len() < 2 {
            problems.push(format!(
                "{}.ohs_nodes must list at least 2 hosts when OHS is used, found {}",
                scope,
                env.ohs_nodes.len()
            ));
        }
        check_duplicates(scope, "wls_nodes", &env.wls_nodes, &mut problems);
    }

    if config.prem.wls_nodes.len() != config.oci.wls_nodes.len() {
        problems.push(format!(
            "PREM_ENV has {} WLS nodes but OCI_ENV has {}",
            config.prem.wls_nodes.len(),
            config.oci.wls_nodes.len()
        ));
    }
    if config.prem.ohs_nodes.len() != config.oci.ohs_nodes.len() {
        problems.push(format!(
            "PREM_ENV has {} OHS nodes but OCI_ENV has {}",
            config.prem.ohs_nodes.len(),
            config.oci.ohs_nodes.len()
        ));
    }
    if config.uses_ohs() {
        if config.directories.ohs_products.is_empty() {
            problems.push("DIRECTORIES.ohs_products is missing or empty".to_string());
        }
        if config.directories.ohs_private_config.is_empty() {
            problems.push("DIRECTORIES.ohs_private_config is missing or empty".to_string());
        }
    }

    finish(problems)
}

fn check_wls_site(scope: &str, site: &WlsSiteConfig, problems: &mut Vec<String>) {
    if site.hosts.len() < 2 {
        problems.push(format!(
            "{}.hosts must list at least 2 hosts, found {}",
            scope,
            site.hosts.len()
        ));
    }
    if !site.ohs_hosts.is_empty() && site.ohs_hosts.len() < 2 {
        problems.push(format!(
            "{}.ohs_hosts must list at least 2 hosts when OHS is used, found {}",
            scope,
            site.ohs_hosts.len()
        ));
    }
    check_duplicates(scope, "hosts", &site.hosts, problems);

    let hosts: HashSet<&str> = site.hosts.iter().map(|h| h.as_str()).collect();
    if !hosts.contains(site.admin_host.as_str()) {
        problems.push(format!(
            "{}.admin_host '{}' is not one of the declared hosts",
            scope, site.admin_host
        ));
    }
    for ms in &site.managed_servers {
        if !hosts.contains(ms.host.as_str()) {
            problems.push(format!(
                "{}: managed server '{}' is placed on undeclared host '{}'",
                scope, ms.name, ms.host
            ));
        }
    }
}

fn check_duplicates(scope: &str, key: &str, values: &[String], problems: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for v in values {
        if !seen.insert(v.as_str()) {
            problems.push(format!("{}.{} lists '{}' twice", scope, key, v));
        }
    }
}

/// The key must exist and be readable by its owner only.
fn check_ssh_key(scope: &str, path: &Path, problems: &mut Vec<String>) {
    match std::fs::metadata(path) {
        Err(e) => problems.push(format!(
            "{}.ssh_key '{}' is not accessible: {}",
            scope,
            path.display(),
            e
        )),
        Ok(meta) if !meta.is_file() => problems.push(format!(
            "{}.ssh_key '{}' is not a regular file",
            scope,
            path.display()
        )),
        Ok(meta) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = meta.permissions().mode() & 0o777;
                if mode != 0o600 {
                    problems.push(format!(
                        "{}.ssh_key '{}' has mode {:o}, expected 600",
                        scope,
                        path.display(),
                        mode
                    ));
                }
            }
        }
    }
}

fn finish(problems: Vec<String>) -> Result<()> {
    if problems.is_empty() {
        return Ok(());
    }
    for p in &problems {
        tracing::error!(problem = %p, "Configuration check failed");
    }
    Err(DrError::config(problems.join("; ")))
}
