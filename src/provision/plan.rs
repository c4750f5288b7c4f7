use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::discovery::Inventory;
use crate::error::{DrError, Result};

/// Login user of the stock cloud images.
pub const CLOUD_SSH_USER: &str = "opc";

/// Port the LBR terminates TLS on.
pub const HTTPS_PORT: u16 = 443;

// ─── Tiers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Web,
    Mid,
    Db,
    Fss,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Web, Tier::Mid, Tier::Db, Tier::Fss];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Web => "webtier",
            Tier::Mid => "midtier",
            Tier::Db => "dbtier",
            Tier::Fss => "fsstier",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetPlan {
    pub tier: Tier,
    pub cidr: String,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapePlan {
    pub shape: String,
    pub ocpus: f64,
    pub memory_gb: u64,
    pub image_id: String,
}

/// Load balancer inputs; absent when the topology has no OHS tier.
#[derive(Debug, Clone, PartialEq)]
pub struct LbrPlan {
    pub virtual_hostnames: Vec<String>,
    pub ohs_backend_port: u16,
    pub admin_port: Option<u16>,
    pub http_port: u16,
    pub internal_port: Option<u16>,
    pub min_bandwidth_mbps: u64,
    pub max_bandwidth_mbps: u64,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub ca_file: Option<PathBuf>,
}

impl LbrPlan {
    /// Ports clients reach the LBR on.
    pub fn listener_ports(&self) -> BTreeSet<u16> {
        let mut ports = BTreeSet::from([HTTPS_PORT, self.http_port]);
        ports.extend(self.admin_port);
        ports.extend(self.internal_port);
        ports
    }
}

// ─── Topology plan ──────────────────────────────────────────────────────────

/// Everything the provisioner builds, read once from a validated inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyPlan {
    pub compartment_id: String,
    pub region: String,
    pub ssh_public_key: PathBuf,
    pub ssh_private_key: PathBuf,

    pub vcn_name: String,
    pub vcn_cidr: String,
    pub vcn_dns_label: String,
    pub add_igw_route: bool,
    pub subnets: Vec<SubnetPlan>,
    pub prem_cidr: String,
    pub search_domain: String,

    pub admin_port: u16,
    pub wls_ports: Vec<u16>,
    pub nm_ports: Vec<u16>,
    pub coherence_ports: Vec<u16>,
    pub ohs_http_ports: Vec<u16>,

    pub domain_name: String,
    pub prem_wls_hostnames: Vec<String>,
    pub os_user: String,
    pub os_group: String,
    pub uid: u64,
    pub gid: u64,

    pub wls_count: usize,
    pub wls_shape: ShapePlan,
    pub ohs_count: usize,
    pub ohs_shape: Option<ShapePlan>,

    pub round_robin: bool,
    pub products_count: usize,
    pub block_volume_gb: u64,
    pub products_path: String,
    pub private_config_path: String,
    pub shared_config_path: String,
    pub runtime_path: String,

    pub lbr: Option<LbrPlan>,
}

fn shape(inv: &Inventory, prefix: &str) -> Result<ShapePlan> {
    let ocpu_key = format!("{}.ocpu", prefix);
    let ocpus_raw = inv.require(&ocpu_key)?;
    let ocpus = ocpus_raw
        .parse::<f64>()
        .map_err(|_| DrError::config(format!("inventory key '{}' is not a number: {}", ocpu_key, ocpus_raw)))?;
    Ok(ShapePlan {
        shape: inv.require(&format!("{}.shape", prefix))?,
        ocpus,
        memory_gb: inv.int(&format!("{}.memory_gb", prefix))?,
        image_id: inv.require(&format!("{}.image_id", prefix))?,
    })
}

/// DNS label for a VCN: lowercase alphanumerics, leading letter, at most
/// 15 characters.
pub fn dns_label(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .skip_while(|c| !c.is_ascii_alphabetic())
        .take(15)
        .collect();
    if cleaned.is_empty() {
        "drvcn".to_string()
    } else {
        cleaned
    }
}

impl TopologyPlan {
    /// Build the plan from an inventory that already passed
    /// [`Inventory::validate`].
    pub fn from_inventory(inv: &Inventory) -> Result<Self> {
        let ssh_public_key = PathBuf::from(inv.require("oci.ssh_public_key")?);
        let ssh_private_key = match inv.get("oci.ssh_private_key") {
            Some(p) => PathBuf::from(p),
            None => {
                let public = ssh_public_key.display().to_string();
                match public.strip_suffix(".pub") {
                    Some(private) => PathBuf::from(private),
                    None => {
                        return Err(DrError::config(format!(
                            "cannot derive the private key from {}; set oci.ssh_private_key",
                            public
                        )))
                    }
                }
            }
        };

        let subnets = Tier::ALL
            .iter()
            .map(|tier| {
                Ok(SubnetPlan {
                    tier: *tier,
                    cidr: inv.require(&format!("oci.network.{}.cidr", tier))?,
                    private: inv.yes(&format!("oci.network.{}.private", tier))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let wls_count = inv.int("oci.wls.nodes_count")? as usize;
        if wls_count == 0 {
            return Err(DrError::config("oci.wls.nodes_count must be at least 1"));
        }
        let prem_wls_hostnames = inv.list("prem.wls.hostnames");
        if prem_wls_hostnames.len() < wls_count {
            return Err(DrError::config(format!(
                "prem.wls.hostnames lists {} hosts but oci.wls.nodes_count is {}",
                prem_wls_hostnames.len(),
                wls_count
            )));
        }
        let ohs_count = inv.int_or("oci.ohs.nodes_count", 0)? as usize;
        let ohs_shape = if ohs_count > 0 {
            Some(shape(inv, "oci.ohs")?)
        } else {
            None
        };

        let lbr = if ohs_count > 0 {
            let ohs_backend_port = inv
                .port("oci.lbr.ohs_backend_port")?
                .ok_or_else(|| DrError::config("inventory key 'oci.lbr.ohs_backend_port' is missing"))?;
            Some(LbrPlan {
                virtual_hostnames: inv.list("oci.lbr.virtual_hostnames"),
                ohs_backend_port,
                admin_port: inv.port("oci.lbr.admin_port")?,
                http_port: inv.port("oci.lbr.http_port")?.unwrap_or(80),
                internal_port: inv.port("oci.lbr.internal_port")?,
                min_bandwidth_mbps: inv.int_or("oci.lbr.min_bandwidth_mbps", 10)?,
                max_bandwidth_mbps: inv.int_or("oci.lbr.max_bandwidth_mbps", 100)?,
                cert_file: PathBuf::from(inv.require("oci.lbr.cert_file")?),
                key_file: PathBuf::from(inv.require("oci.lbr.key_file")?),
                ca_file: inv.get("oci.lbr.ca_file").map(PathBuf::from),
            })
        } else {
            tracing::info!("No OHS nodes declared, load balancer provisioning is skipped");
            None
        };

        let products_count = inv.int_or("oci.storage.products_count", 2)? as usize;
        if products_count == 0 {
            return Err(DrError::config("oci.storage.products_count must be at least 1"));
        }

        let vcn_name = inv.require("oci.network.vcn_name")?;
        Ok(Self {
            compartment_id: inv.require("oci.compartment_id")?,
            region: inv.require("oci.region")?,
            ssh_public_key,
            ssh_private_key,
            vcn_dns_label: dns_label(&vcn_name),
            vcn_name,
            vcn_cidr: inv.require("oci.network.vcn_cidr")?,
            add_igw_route: inv.yes("oci.network.add_igw_route")?,
            subnets,
            prem_cidr: inv.require("prem.network.cidr")?,
            search_domain: inv.require("prem.network.search_domain")?,
            admin_port: inv
                .port("oci.network.ports.admin")?
                .ok_or_else(|| DrError::config("inventory key 'oci.network.ports.admin' is missing"))?,
            wls_ports: inv.ports("oci.network.ports.wlsservers")?,
            nm_ports: inv.ports("oci.network.ports.nodemanager")?,
            coherence_ports: inv.ports("oci.network.ports.coherence")?,
            ohs_http_ports: inv.ports("oci.network.ports.ohs_http")?,
            domain_name: inv.require("prem.wls.domain_name")?,
            prem_wls_hostnames,
            os_user: inv.require("prem.wls.os_user")?,
            os_group: inv.require("prem.wls.os_group")?,
            uid: inv.int("prem.wls.uid")?,
            gid: inv.int("prem.wls.gid")?,
            wls_count,
            wls_shape: shape(inv, "oci.wls")?,
            ohs_count,
            ohs_shape,
            round_robin: inv.yes("oci.storage.round_robin")?,
            products_count,
            block_volume_gb: inv.int_or("oci.storage.block_volume_gb", 50)?,
            products_path: inv.require("oci.storage.products_path")?,
            private_config_path: inv.require("oci.storage.private_config_path")?,
            shared_config_path: inv.require("oci.storage.shared_config_path")?,
            runtime_path: inv.require("oci.storage.runtime_path")?,
            lbr,
        })
    }

    pub fn subnet(&self, tier: Tier) -> &SubnetPlan {
        // `from_inventory` fills every tier.
        &self.subnets[Tier::ALL.iter().position(|t| *t == tier).unwrap_or(0)]
    }

    /// Display-name prefix shared by every created resource.
    pub fn prefix(&self) -> &str {
        &self.vcn_name
    }

    /// Availability domain of the 1-based `index`-th placed item.
    pub fn placement<'a>(&self, index: usize, ads: &'a [String]) -> Result<&'a str> {
        if ads.is_empty() {
            return Err(DrError::sdk("list availability domains", "region reports none"));
        }
        let slot = if self.round_robin {
            (index.max(1) - 1) % ads.len()
        } else {
            0
        };
        Ok(&ads[slot])
    }

    /// Products filesystem slot serving WLS node `node` (both 1-based).
    pub fn products_slot(&self, node: usize) -> usize {
        (node.max(1) - 1) % self.products_count + 1
    }

    /// Every WLS-side port: admin, managed servers, node managers, coherence.
    pub fn wls_side_ports(&self) -> BTreeSet<u16> {
        let mut ports = BTreeSet::from([self.admin_port]);
        ports.extend(&self.wls_ports);
        ports.extend(&self.nm_ports);
        ports.extend(&self.coherence_ports);
        ports
    }

    /// Short primary host name WLS node `node` stands in for.
    pub fn prem_short_hostname(&self, node: usize) -> Option<&str> {
        self.prem_wls_hostnames
            .get(node.max(1) - 1)
            .map(|h| h.split('.').next().unwrap_or(h))
    }
}
