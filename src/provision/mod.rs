//! CloudProvisioner: builds the standby topology in a cloud compartment from
//! the discovery inventory, recording every resource in the state document
//! as soon as the call that produced it returns.

pub mod cleanup;
pub mod compute;
pub mod dns;
pub mod init_script;
pub mod lbr;
pub mod network;
pub mod plan;
pub mod storage;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

pub use cleanup::{delete_all, run_cleanup, CleanupSummary, CLEANUP_ORDER};
pub use plan::{LbrPlan, SubnetPlan, Tier, TopologyPlan};

use crate::cloud::{CloudApi, CloudResource, ResourceKind};
use crate::constants::INIT_SCRIPT_GRACE;
use crate::error::Result;
use crate::remote::{HostPool, SessionFactory};
use crate::state::{FileLock, ResourceStatus, StateStore};
use crate::workflow::WorkflowReport;

// ─── Built topology ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountTargetFacts {
    pub id: String,
    pub export_set_id: String,
    pub fqdn: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFacts {
    /// 1-based position within its tier.
    pub index: usize,
    pub id: String,
    pub private_ip: String,
    pub availability_domain: String,
}

/// Identifiers gathered while the pipeline runs. Later steps read what
/// earlier steps produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub availability_domains: Vec<String>,
    pub vcn_id: String,
    pub default_route_table_id: String,
    pub default_security_list_id: String,
    pub internet_gateway_id: String,
    pub service_gateway_id: String,
    pub services_cidr: String,
    pub nat_gateway_id: String,
    pub private_route_table_id: String,
    pub public_route_table_id: String,
    pub security_lists: BTreeMap<Tier, String>,
    pub subnets: BTreeMap<Tier, String>,
    pub dhcp_options_id: String,
    /// Block volume id per WLS node, with its AD.
    pub volumes: Vec<(String, String)>,
    /// `products<k>`, `shared`, `runtime` → (id, AD).
    pub file_systems: BTreeMap<String, (String, String)>,
    /// Keyed by availability domain.
    pub mount_targets: BTreeMap<String, MountTargetFacts>,
    /// Export path per filesystem key.
    pub exports: BTreeMap<String, String>,
    pub load_balancer_id: Option<String>,
    pub load_balancer_ip: Option<String>,
    pub wls_nodes: Vec<NodeFacts>,
    pub ohs_nodes: Vec<NodeFacts>,
    pub dns_view_id: Option<String>,
    pub dns_zone_id: Option<String>,
}

impl Topology {
    pub fn subnet(&self, tier: Tier) -> &str {
        self.subnets.get(&tier).map(String::as_str).unwrap_or_default()
    }

    /// NFS source (`fqdn:/path`) of filesystem `key`.
    pub fn nfs_source(&self, key: &str) -> Option<String> {
        let (_, ad) = self.file_systems.get(key)?;
        let mt = self.mount_targets.get(ad)?;
        let path = self.exports.get(key)?;
        Some(format!("{}:{}", mt.fqdn, path))
    }
}

// ─── Build context ──────────────────────────────────────────────────────────

/// State shared by every provisioning step.
pub(crate) struct Build<'a> {
    pub(crate) api: &'a dyn CloudApi,
    pub(crate) store: &'a mut StateStore,
    pub(crate) plan: &'a TopologyPlan,
    pub(crate) pool: &'a HostPool,
    pub(crate) topo: Topology,
    pub(crate) init_grace: Duration,
}

/// Address of the resource sub-resources of `kind` are deleted with.
fn parent_address(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::DnsRecord => Some("dns_zone"),
        k if k.is_sub_resource() => Some("load_balancer"),
        _ => None,
    }
}

impl Build<'_> {
    /// Adopt `name` if the cloud already has it, else create it from `spec`.
    /// Either way the result is recorded at `address` before returning.
    /// `scope` narrows the lookup (VCN, filesystem, load balancer).
    pub(crate) async fn ensure(
        &mut self,
        address: &str,
        kind: ResourceKind,
        name: &str,
        scope: Option<&str>,
        spec: Value,
    ) -> Result<CloudResource> {
        let compartment = &self.plan.compartment_id;
        let parent = parent_address(kind);
        if let Some(found) = self.api.find(kind, compartment, name, scope).await? {
            tracing::info!(address, kind = %kind, id = %found.id, "Adopting existing resource");
            self.store
                .record(address, kind, &found.id, name, ResourceStatus::Preexisting, parent)?;
            return Ok(found);
        }
        let created = self.api.create(kind, &spec).await?;
        tracing::info!(address, kind = %kind, id = %created.id, "Created resource");
        self.store
            .record(address, kind, &created.id, name, ResourceStatus::Created, parent)?;
        Ok(created)
    }

    pub(crate) fn set_extra(&mut self, address: &str, values: &[(&str, &str)]) -> Result<()> {
        let map = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.store.set_extra(address, map)
    }
}

// ─── Pipeline ───────────────────────────────────────────────────────────────

/// Runs the provisioning steps in their fixed order.
pub struct Provisioner {
    plan: TopologyPlan,
    api: Arc<dyn CloudApi>,
    pool: HostPool,
    init_grace: Duration,
}

impl Provisioner {
    pub fn new(plan: TopologyPlan, api: Arc<dyn CloudApi>, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            plan,
            api,
            pool: HostPool::new(factory),
            init_grace: INIT_SCRIPT_GRACE,
        }
    }

    /// Override the wait before instance init scripts are checked.
    pub fn with_init_grace(mut self, grace: Duration) -> Self {
        self.init_grace = grace;
        self
    }

    pub fn plan(&self) -> &TopologyPlan {
        &self.plan
    }

    /// Build the topology, recording into `store`. A failed step stops the
    /// run; everything recorded so far stays in the document.
    pub async fn run(&self, store: &mut StateStore, report: &mut WorkflowReport) -> Result<Topology> {
        let mut b = Build {
            api: self.api.as_ref(),
            store,
            plan: &self.plan,
            pool: &self.pool,
            topo: Topology::default(),
            init_grace: self.init_grace,
        };
        let result = Self::steps(&mut b, report).await;
        if let Err(e) = self.pool.close_all().await {
            tracing::warn!(error = %e, "Failed to close every session");
        }
        result.map(|_| b.topo)
    }

    async fn steps(b: &mut Build<'_>, report: &mut WorkflowReport) -> Result<()> {
        report.step("virtual network", b.vcn()).await?;
        report.step("gateways", b.gateways()).await?;
        report.step("route tables", b.route_tables()).await?;
        report.step("security lists", b.security_lists()).await?;
        report.step("subnets", b.subnets()).await?;
        report.step("dhcp options", b.dhcp_options()).await?;
        report.step("block volumes", b.block_volumes()).await?;
        report.step("file systems", b.file_systems()).await?;
        report.step("mount targets", b.mount_targets()).await?;
        report.step("exports", b.exports()).await?;
        if b.plan.lbr.is_some() {
            report.step("load balancer", b.load_balancer()).await?;
        }
        report.step("wls instances", b.wls_instances()).await?;
        if b.plan.ohs_count > 0 {
            report.step("ohs instances", b.ohs_instances()).await?;
        }
        report.step("init script check", b.check_init_scripts()).await?;
        report.step("block volume attachments", b.attach_volumes()).await?;
        report.step("private dns", b.private_dns()).await?;
        if b.plan.lbr.is_some() {
            report.step("load balancer artifacts", b.lbr_artifacts()).await?;
        }
        Ok(())
    }
}

/// Lock name guarding `sysconfig`, shared by provision and cleanup.
pub fn lock_name(sysconfig: &Path) -> String {
    sysconfig
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sysconfig".to_string())
}

/// Provision under the document lock. The report is returned alongside the
/// result so a failed run can still be printed.
pub async fn provision(
    provisioner: &Provisioner,
    sysconfig: &Path,
    working_dir: &Path,
) -> (Result<Topology>, WorkflowReport) {
    let mut report = WorkflowReport::new("provision");
    let lock = match FileLock::acquire(working_dir, &lock_name(sysconfig)) {
        Ok(l) => l,
        Err(e) => return (Err(e), report),
    };
    let mut store = match StateStore::open_or_create(sysconfig, &provisioner.plan().compartment_id) {
        Ok(s) => s,
        Err(e) => return (Err(e), report),
    };
    tracing::info!(sysconfig = %sysconfig.display(), "Provisioning");
    let result = provisioner.run(&mut store, &mut report).await;
    if let Err(e) = lock.release() {
        tracing::warn!(error = %e, "Failed to release the state lock");
    }
    (result, report)
}
