use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DrError, Result};
use crate::remote::HostTarget;

// ─── Scopes ─────────────────────────────────────────────────────────────────

/// Named configuration scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    General,
    DbPrim,
    DbStby,
    WlsPrim,
    WlsStby,
    Directories,
    OciEnv,
    PremEnv,
    Options,
    Jdbc,
}

impl Scope {
    pub const ALL: [Scope; 10] = [
        Scope::General,
        Scope::DbPrim,
        Scope::DbStby,
        Scope::WlsPrim,
        Scope::WlsStby,
        Scope::Directories,
        Scope::OciEnv,
        Scope::PremEnv,
        Scope::Options,
        Scope::Jdbc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::General => "GENERAL",
            Scope::DbPrim => "DB_PRIM",
            Scope::DbStby => "DB_STBY",
            Scope::WlsPrim => "WLS_PRIM",
            Scope::WlsStby => "WLS_STBY",
            Scope::Directories => "DIRECTORIES",
            Scope::OciEnv => "OCI_ENV",
            Scope::PremEnv => "PREM_ENV",
            Scope::Options => "OPTIONS",
            Scope::Jdbc => "JDBC",
        }
    }

    pub fn parse(name: &str) -> Option<Scope> {
        let upper = name.trim().to_ascii_uppercase();
        Scope::ALL.iter().copied().find(|s| s.as_str() == upper)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Config tree ────────────────────────────────────────────────────────────

/// Scope → key → string value. Keys are stored lower-case, values trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    scopes: BTreeMap<Scope, BTreeMap<String, String>>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, scope: Scope, key: &str, value: &str) {
        self.scopes
            .entry(scope)
            .or_default()
            .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains_key(&scope)
    }

    pub fn get(&self, scope: Scope, key: &str) -> Option<&str> {
        self.scopes
            .get(&scope)
            .and_then(|m| m.get(&key.to_ascii_lowercase()))
            .map(|s| s.as_str())
    }

    /// A non-empty value, or `None`.
    pub fn value(&self, scope: Scope, key: &str) -> Option<&str> {
        self.get(scope, key).filter(|v| !v.is_empty())
    }

    pub fn require(&self, scope: Scope, key: &str) -> Result<&str> {
        self.value(scope, key)
            .ok_or_else(|| DrError::config(format!("{}.{} is missing or empty", scope, key)))
    }

    pub fn get_or<'a>(&'a self, scope: Scope, key: &str, default: &'a str) -> &'a str {
        self.value(scope, key).unwrap_or(default)
    }

    pub fn bool_or(&self, scope: Scope, key: &str, default: bool) -> Result<bool> {
        match self.value(scope, key) {
            None => Ok(default),
            Some(v) => parse_bool(v)
                .ok_or_else(|| DrError::config(format!("{}.{} must be yes/no, got '{}'", scope, key, v))),
        }
    }

    pub fn u64_or(&self, scope: Scope, key: &str, default: u64) -> Result<u64> {
        match self.value(scope, key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| DrError::config(format!("{}.{} must be an integer, got '{}'", scope, key, v))),
        }
    }

    pub fn require_port(&self, scope: Scope, key: &str) -> Result<u16> {
        let v = self.require(scope, key)?;
        v.parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| DrError::config(format!("{}.{} is not a valid port: '{}'", scope, key, v)))
    }

    /// Comma-separated list, empty items dropped.
    pub fn list(&self, scope: Scope, key: &str) -> Vec<String> {
        self.get(scope, key)
            .map(split_list)
            .unwrap_or_default()
    }

    pub fn keys(&self, scope: Scope) -> Vec<&str> {
        self.scopes
            .get(&scope)
            .map(|m| m.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}

// ─── Orchestrator configuration ─────────────────────────────────────────────

/// Settings that govern every DR workflow.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub scripts_dir: PathBuf,
    pub parallel_stop: bool,
    pub dg_retries: u32,
    pub dg_retry_delay: Duration,
    pub poll_interval: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub nm_settle: Duration,
}

/// One database site.
#[derive(Debug, Clone)]
pub struct DbSiteConfig {
    pub host: String,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
    pub os_user: String,
    pub oracle_home: String,
    pub oracle_sid: String,
    pub db_unique_name: String,
    pub scan_address: String,
    pub listener_port: u16,
    pub service_name: String,
    pub sysdba_password: String,
}

impl DbSiteConfig {
    pub fn target(&self) -> HostTarget {
        HostTarget::new(&self.host, &self.ssh_user, &self.ssh_key)
    }
}

/// A managed server and the host it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedServerRef {
    pub name: String,
    pub host: String,
}

/// One WebLogic site.
#[derive(Debug, Clone)]
pub struct WlsSiteConfig {
    pub hosts: Vec<String>,
    pub ohs_hosts: Vec<String>,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
    pub os_user: String,
    pub mw_home: String,
    pub domain_name: String,
    pub domain_dir: String,
    pub admin_host: String,
    pub admin_port: u16,
    pub admin_server_name: String,
    pub wls_user: String,
    pub wls_password: String,
    pub nm_user: String,
    pub nm_password: String,
    pub nm_port: u16,
    pub nm_type: String,
    pub managed_servers: Vec<ManagedServerRef>,
}

impl WlsSiteConfig {
    pub fn target(&self, host: &str) -> HostTarget {
        HostTarget::new(host, &self.ssh_user, &self.ssh_key)
    }

    pub fn admin_url(&self) -> String {
        format!("t3://{}:{}", self.admin_host, self.admin_port)
    }

    pub fn servers_on(&self, host: &str) -> Vec<&ManagedServerRef> {
        self.managed_servers.iter().filter(|m| m.host == host).collect()
    }
}

/// The typed orchestrator configuration.
#[derive(Debug, Clone)]
pub struct DrConfig {
    pub general: GeneralConfig,
    pub db_prim: DbSiteConfig,
    pub db_stby: DbSiteConfig,
    pub wls_prim: WlsSiteConfig,
    pub wls_stby: WlsSiteConfig,
}

impl DrConfig {
    pub fn from_tree(tree: &ConfigTree) -> Result<Self> {
        Ok(Self {
            general: general_from(tree)?,
            db_prim: db_site_from(tree, Scope::DbPrim)?,
            db_stby: db_site_from(tree, Scope::DbStby)?,
            wls_prim: wls_site_from(tree, Scope::WlsPrim)?,
            wls_stby: wls_site_from(tree, Scope::WlsStby)?,
        })
    }

    /// Every password, for log masking.
    pub fn secrets(&self) -> Vec<String> {
        vec![
            self.db_prim.sysdba_password.clone(),
            self.db_stby.sysdba_password.clone(),
            self.wls_prim.wls_password.clone(),
            self.wls_prim.nm_password.clone(),
            self.wls_stby.wls_password.clone(),
            self.wls_stby.nm_password.clone(),
        ]
    }
}

fn general_from(tree: &ConfigTree) -> Result<GeneralConfig> {
    let g = Scope::General;
    Ok(GeneralConfig {
        scripts_dir: PathBuf::from(tree.get_or(g, "scripts_dir", "remote_scripts")),
        parallel_stop: tree.bool_or(g, "parallel_stop", false)?,
        dg_retries: tree.u64_or(g, "dg_retries", 3)? as u32,
        dg_retry_delay: Duration::from_secs(
            tree.u64_or(g, "dg_retry_delay_s", crate::constants::DG_RETRY_DELAY.as_secs())?,
        ),
        poll_interval: Duration::from_secs(tree.u64_or(
            g,
            "poll_interval_s",
            crate::constants::SERVER_POLL_INTERVAL.as_secs(),
        )?),
        start_timeout: Duration::from_secs(tree.u64_or(
            g,
            "start_timeout_s",
            crate::constants::DEFAULT_START_TIMEOUT_S,
        )?),
        stop_timeout: Duration::from_secs(tree.u64_or(
            g,
            "stop_timeout_s",
            crate::constants::DEFAULT_STOP_TIMEOUT_S,
        )?),
        nm_settle: Duration::from_secs(tree.u64_or(
            g,
            "nm_settle_s",
            crate::constants::NM_SETTLE_DELAY.as_secs(),
        )?),
    })
}

fn db_site_from(tree: &ConfigTree, s: Scope) -> Result<DbSiteConfig> {
    Ok(DbSiteConfig {
        host: tree.require(s, "host")?.to_string(),
        ssh_user: tree.require(s, "ssh_user")?.to_string(),
        ssh_key: PathBuf::from(tree.require(s, "ssh_key")?),
        os_user: tree.get_or(s, "os_user", "oracle").to_string(),
        oracle_home: tree.require(s, "oracle_home")?.to_string(),
        oracle_sid: tree.require(s, "oracle_sid")?.to_string(),
        db_unique_name: tree.require(s, "db_unique_name")?.to_string(),
        scan_address: tree.require(s, "scan_address")?.to_string(),
        listener_port: match tree.value(s, "listener_port") {
            Some(_) => tree.require_port(s, "listener_port")?,
            None => 1521,
        },
        service_name: tree.require(s, "service_name")?.to_string(),
        sysdba_password: tree.require(s, "sysdba_password")?.to_string(),
    })
}

fn wls_site_from(tree: &ConfigTree, s: Scope) -> Result<WlsSiteConfig> {
    let hosts = tree.list(s, "hosts");
    let managed_servers = tree
        .list(s, "managed_servers")
        .into_iter()
        .map(|entry| parse_managed_server(s, &entry))
        .collect::<Result<Vec<_>>>()?;
    Ok(WlsSiteConfig {
        admin_host: tree
            .value(s, "admin_host")
            .map(str::to_string)
            .or_else(|| hosts.first().cloned())
            .ok_or_else(|| DrError::config(format!("{}.admin_host is missing or empty", s)))?,
        hosts,
        ohs_hosts: tree.list(s, "ohs_hosts"),
        ssh_user: tree.require(s, "ssh_user")?.to_string(),
        ssh_key: PathBuf::from(tree.require(s, "ssh_key")?),
        os_user: tree.get_or(s, "os_user", "oracle").to_string(),
        mw_home: tree.require(s, "mw_home")?.to_string(),
        domain_name: tree.require(s, "domain_name")?.to_string(),
        domain_dir: tree.require(s, "domain_dir")?.to_string(),
        admin_port: tree.require_port(s, "admin_port")?,
        admin_server_name: tree.get_or(s, "admin_server_name", "AdminServer").to_string(),
        wls_user: tree.require(s, "wls_user")?.to_string(),
        wls_password: tree.require(s, "wls_password")?.to_string(),
        nm_user: tree.require(s, "nm_user")?.to_string(),
        nm_password: tree.require(s, "nm_password")?.to_string(),
        nm_port: tree.require_port(s, "nm_port")?,
        nm_type: tree.get_or(s, "nm_type", "ssl").to_string(),
        managed_servers,
    })
}

/// `name@host`.
fn parse_managed_server(scope: Scope, entry: &str) -> Result<ManagedServerRef> {
    match entry.split_once('@') {
        Some((name, host)) if !name.trim().is_empty() && !host.trim().is_empty() => {
            Ok(ManagedServerRef {
                name: name.trim().to_string(),
                host: host.trim().to_string(),
            })
        }
        _ => Err(DrError::config(format!(
            "{}.managed_servers entry '{}' must be name@host",
            scope, entry
        ))),
    }
}

// ─── Replicator configuration ───────────────────────────────────────────────

/// Hosts and credentials of one environment (premises or cloud).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub wls_nodes: Vec<String>,
    pub ohs_nodes: Vec<String>,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
    /// Owner of the replicated files.
    pub os_user: String,
}

impl EnvConfig {
    pub fn target(&self, host: &str) -> HostTarget {
        HostTarget::new(host, &self.ssh_user, &self.ssh_key)
    }
}

/// Source and target paths of each data class.
#[derive(Debug, Clone)]
pub struct DirectoriesConfig {
    pub stage_dir: PathBuf,
    pub wls_products: String,
    pub wls_private_config: String,
    pub wls_shared_config: String,
    pub ohs_products: String,
    pub ohs_private_config: String,
    pub tns_admin: String,
}

#[derive(Debug, Clone)]
pub struct OptionsConfig {
    pub rsync_retries: u32,
    pub delete: bool,
    pub products_slots: usize,
}

#[derive(Debug, Clone)]
pub struct JdbcConfig {
    pub prem_service_name: String,
    pub prem_scan_address: String,
    pub oci_service_name: String,
    pub oci_scan_address: String,
}

/// The typed replicator configuration.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub directories: DirectoriesConfig,
    pub prem: EnvConfig,
    pub oci: EnvConfig,
    pub options: OptionsConfig,
    pub jdbc: Option<JdbcConfig>,
}

impl ReplicationConfig {
    pub fn from_tree(tree: &ConfigTree) -> Result<Self> {
        let d = Scope::Directories;
        let o = Scope::Options;
        let j = Scope::Jdbc;
        let jdbc = if tree.has_scope(j) {
            Some(JdbcConfig {
                prem_service_name: tree.require(j, "prem_service_name")?.to_string(),
                prem_scan_address: tree.require(j, "prem_scan_address")?.to_string(),
                oci_service_name: tree.require(j, "oci_service_name")?.to_string(),
                oci_scan_address: tree.require(j, "oci_scan_address")?.to_string(),
            })
        } else {
            None
        };
        Ok(Self {
            directories: DirectoriesConfig {
                stage_dir: PathBuf::from(tree.require(d, "stage_dir")?),
                wls_products: tree.require(d, "wls_products")?.to_string(),
                wls_private_config: tree.require(d, "wls_private_config")?.to_string(),
                wls_shared_config: tree.require(d, "wls_shared_config")?.to_string(),
                ohs_products: tree.get_or(d, "ohs_products", "").to_string(),
                ohs_private_config: tree.get_or(d, "ohs_private_config", "").to_string(),
                tns_admin: tree.get_or(d, "tns_admin", "").to_string(),
            },
            prem: env_from(tree, Scope::PremEnv)?,
            oci: env_from(tree, Scope::OciEnv)?,
            options: OptionsConfig {
                rsync_retries: tree.u64_or(o, "rsync_retries", 0)? as u32,
                delete: tree.bool_or(o, "delete", false)?,
                products_slots: tree.u64_or(o, "products_slots", 2)?.max(1) as usize,
            },
            jdbc,
        })
    }

    pub fn uses_ohs(&self) -> bool {
        !self.prem.ohs_nodes.is_empty() || !self.oci.ohs_nodes.is_empty()
    }
}

fn env_from(tree: &ConfigTree, s: Scope) -> Result<EnvConfig> {
    Ok(EnvConfig {
        wls_nodes: tree.list(s, "wls_nodes"),
        ohs_nodes: tree.list(s, "ohs_nodes"),
        ssh_user: tree.require(s, "ssh_user")?.to_string(),
        ssh_key: PathBuf::from(tree.require(s, "ssh_key")?),
        os_user: tree.get_or(s, "os_user", "oracle").to_string(),
    })
}
