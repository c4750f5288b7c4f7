//! Discovery: read the replicated primary configuration, merge it with the
//! operator's answers, and emit the canonical inventory CSV.

pub mod chooser;
pub mod domain;
pub mod inventory;
pub mod nodemanager;
pub mod ohs;
pub mod osinfo;
pub mod schema;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use chooser::{Chooser, FirstChooser, PromptChooser};
pub use domain::{parse_domain_config, DomainFacts};
pub use inventory::{Inventory, InventoryValue};
pub use ohs::OhsFacts;
pub use osinfo::OsFacts;
pub use schema::FieldType;

use crate::error::{DrError, Result};

/// Everything discovered before merging with the operator's answers.
#[derive(Debug, Clone)]
pub struct DiscoveredFacts {
    pub domain: DomainFacts,
    pub nm_ports: BTreeSet<u16>,
    pub ohs: OhsFacts,
    pub os: Option<OsFacts>,
}

/// Every `config/config.xml` under `root`, sorted.
pub fn find_domain_configs(root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/config/config.xml", root.display());
    let paths = glob::glob(&pattern).map_err(|e| DrError::config(format!("bad glob {}: {}", pattern, e)))?;
    let mut files: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
    files.sort();
    Ok(files)
}

/// Parse the replicated tree under `config_root`. With more than one domain
/// configuration in the tree, the chooser picks which one describes the primary.
pub fn scan(config_root: &Path, os: Option<OsFacts>, chooser: &mut dyn Chooser) -> Result<DiscoveredFacts> {
    if !config_root.is_dir() {
        return Err(DrError::config(format!(
            "config root {} is not a directory",
            config_root.display()
        )));
    }
    let configs = find_domain_configs(config_root)?;
    let config_xml = match configs.len() {
        0 => {
            return Err(DrError::config(format!(
                "no config/config.xml under {}",
                config_root.display()
            )))
        }
        1 => configs[0].clone(),
        _ => {
            let shown: Vec<String> = configs.iter().map(|p| p.display().to_string()).collect();
            PathBuf::from(chooser.choose("domain config.xml", &shown)?)
        }
    };
    // <domain_root>/config/config.xml
    let domain_root = config_xml
        .parent()
        .and_then(Path::parent)
        .ok_or_else(|| DrError::config(format!("unexpected location {}", config_xml.display())))?;

    tracing::info!(config = %config_xml.display(), "Parsing domain configuration");
    let xml = std::fs::read_to_string(&config_xml)?;
    let domain = parse_domain_config(&xml, domain_root)?;

    let nm_ports = nodemanager::collect_listen_ports(config_root)?;
    let ohs = ohs::collect(config_root)?;
    tracing::info!(
        domain = %domain.domain_name,
        servers = domain.servers.len(),
        nm_ports = nm_ports.len(),
        ohs_ports = ohs.http_ports.len(),
        "Replicated configuration scanned"
    );

    Ok(DiscoveredFacts {
        domain,
        nm_ports,
        ohs,
        os,
    })
}

fn strings<T: ToString>(items: impl IntoIterator<Item = T>) -> Vec<String> {
    items.into_iter().map(|i| i.to_string()).collect()
}

/// Writes discovered values into the inventory under the merge rules.
struct Merger<'a> {
    inv: &'a mut Inventory,
    chooser: &'a mut dyn Chooser,
}

impl Merger<'_> {
    fn field_type(key: &str) -> FieldType {
        schema::lookup(key).map(|f| f.ty).unwrap_or(FieldType::Opt)
    }

    /// One value for `key`. An operator answer that is among the candidates
    /// wins without prompting; a lone candidate with no answer is taken;
    /// anything else goes to the chooser with the answer offered first.
    fn single(&mut self, key: &str, mut candidates: Vec<String>) -> Result<()> {
        candidates.dedup();
        if candidates.is_empty() {
            return Ok(());
        }
        let ty = Self::field_type(key);
        let answer = self.inv.get(key);
        let value = match answer {
            Some(a) if candidates.contains(&a) => a,
            None if candidates.len() == 1 => candidates.remove(0),
            Some(a) => {
                let mut offered = vec![a];
                offered.extend(candidates);
                self.chooser.choose(key, &offered)?
            }
            None => self.chooser.choose(key, &candidates)?,
        };
        self.inv.set(key, ty, value);
        Ok(())
    }

    /// A sequence for `key`, unless the operator already gave one.
    fn multiple(&mut self, key: &str, values: Vec<String>) {
        if values.is_empty() || !self.inv.list(key).is_empty() {
            return;
        }
        let ty = Self::field_type(key);
        self.inv.set_seq(key, ty, values);
    }
}

/// Merge `facts` into the operator's `answers` and validate the result.
pub fn merge(facts: &DiscoveredFacts, answers: Inventory, chooser: &mut dyn Chooser) -> Result<Inventory> {
    let mut inv = answers;
    let mut m = Merger { inv: &mut inv, chooser };
    let d = &facts.domain;

    m.single("prem.wls.domain_name", vec![d.domain_name.clone()])?;
    m.single("prem.wls.admin_server", vec![d.admin_server_name.clone()])?;
    if let Some(admin) = d.admin() {
        let ports: BTreeSet<u16> = admin.ports().collect();
        m.single("oci.network.ports.admin", strings(ports))?;
    }
    m.multiple("oci.network.ports.wlsservers", strings(d.managed_ports()));
    m.multiple("oci.network.ports.nodemanager", strings(&facts.nm_ports));
    m.multiple("oci.network.ports.coherence", strings(&d.coherence_ports));

    let hostnames: BTreeSet<String> = d
        .servers
        .iter()
        .filter_map(|s| s.listen_address.clone())
        .filter(|a| !a.is_empty())
        .collect();
    m.multiple("prem.wls.hostnames", hostnames.into_iter().collect());

    if !facts.ohs.is_empty() {
        m.multiple("oci.network.ports.ohs_http", strings(&facts.ohs.http_ports));
        m.multiple("oci.lbr.virtual_hostnames", facts.ohs.virtual_hostnames.iter().cloned().collect());
        m.single("oci.lbr.ohs_backend_port", strings(&facts.ohs.http_ports))?;
    }

    if let Some(os) = &facts.os {
        m.single("prem.wls.os_user", vec![os.os_user.clone()])?;
        m.single("prem.wls.os_group", vec![os.os_group.clone()])?;
        m.single("prem.wls.uid", vec![os.uid.to_string()])?;
        m.single("prem.wls.gid", vec![os.gid.to_string()])?;
        m.single("oci.wls.ocpu", vec![os.ocpus().to_string()])?;
        m.single("oci.wls.memory_gb", vec![os.mem_gb.to_string()])?;
        if let Some(domain) = &os.search_domain {
            m.single("prem.network.search_domain", vec![domain.clone()])?;
        }
    }

    inv.validate()?;
    Ok(inv)
}

/// Full discovery: operator answers + replicated tree → validated CSV.
pub fn run(
    input_file: &Path,
    config_root: &Path,
    output: &Path,
    os: Option<OsFacts>,
    chooser: &mut dyn Chooser,
) -> Result<Inventory> {
    let answers = Inventory::load_csv(input_file)?;
    let facts = scan(config_root, os, chooser)?;
    let inv = merge(&facts, answers, chooser)?;
    inv.write_csv(output)?;
    tracing::info!(output = %output.display(), keys = inv.keys().count(), "Inventory written");
    Ok(inv)
}
