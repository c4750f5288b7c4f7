use std::path::Path;

use serde_json::{json, Value};

use super::network::{route_rule_request, IGW_ROUTE_TABLE};
use crate::cloud::{CloudApi, ResourceKind};
use crate::error::Result;
use crate::state::{FileLock, ResourceRecord, ResourceStatus, StateStore};

/// Reverse-dependency deletion order of top-level resources.
pub const CLEANUP_ORDER: [ResourceKind; 17] = [
    ResourceKind::VolumeAttachment,
    ResourceKind::Instance,
    ResourceKind::BlockVolume,
    ResourceKind::Export,
    ResourceKind::MountTarget,
    ResourceKind::FileSystem,
    ResourceKind::LoadBalancer,
    ResourceKind::Subnet,
    ResourceKind::RouteTable,
    ResourceKind::SecurityList,
    ResourceKind::DhcpOptions,
    ResourceKind::NatGateway,
    ResourceKind::ServiceGateway,
    ResourceKind::InternetGateway,
    ResourceKind::DnsZone,
    ResourceKind::DnsView,
    ResourceKind::Vcn,
];

/// Sub-resources still standing after the main pass live under a parent
/// this tool did not create; they are deleted one by one in this order.
const SUB_RESOURCE_ORDER: [ResourceKind; 6] = [
    ResourceKind::LbListener,
    ResourceKind::LbRuleSet,
    ResourceKind::LbHostname,
    ResourceKind::LbBackendSet,
    ResourceKind::LbCertificate,
    ResourceKind::DnsRecord,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub failed: Vec<String>,
    pub skipped: usize,
}

impl CleanupSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drop the rules of `route_table` that target `gateway`. The table itself
/// belongs to the VCN and stays.
async fn strip_gateway_routes(api: &dyn CloudApi, route_table: &str, gateway: &str) -> Result<()> {
    let rt = api.get(ResourceKind::RouteTable, route_table).await?;
    let rules: Vec<Value> = rt
        .attrs
        .get("route-rules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let kept: Vec<Value> = rules
        .iter()
        .filter(|r| r.get("network-entity-id").and_then(Value::as_str) != Some(gateway))
        .map(route_rule_request)
        .collect();
    if kept.len() == rules.len() {
        return Ok(());
    }
    api.update(ResourceKind::RouteTable, route_table, &json!({ "routeRules": kept }))
        .await?;
    tracing::info!(route_table, gateway, "Removed gateway route from route table");
    Ok(())
}

fn in_scope(rec: &ResourceRecord, compartment: Option<&str>) -> bool {
    compartment.map_or(true, |c| rec.compartment_id == c)
}

/// Delete every deletable entry of `store`, rewriting the document after
/// each attempt. Failures are recorded as `FAILED_DELETE` and the pass
/// carries on.
pub async fn delete_all(
    api: &dyn CloudApi,
    store: &mut StateStore,
    compartment: Option<&str>,
) -> Result<CleanupSummary> {
    let skipped = store
        .doc()
        .resources
        .values()
        .filter(|r| !r.status.is_deletable() || !in_scope(r, compartment))
        .count();
    let mut summary = CleanupSummary {
        skipped,
        ..Default::default()
    };

    for kind in CLEANUP_ORDER.iter().chain(SUB_RESOURCE_ORDER.iter()) {
        let targets: Vec<(String, ResourceRecord)> = store
            .doc()
            .of_kind(*kind)
            .into_iter()
            .filter(|(_, r)| r.status.is_deletable() && in_scope(r, compartment))
            .map(|(a, r)| (a.clone(), r.clone()))
            .collect();
        for (address, rec) in targets {
            let parent_id = rec
                .parent
                .as_deref()
                .and_then(|p| store.id_of(p))
                .map(str::to_string);
            let route_table = rec
                .extra
                .get(IGW_ROUTE_TABLE)
                .filter(|_| *kind == ResourceKind::InternetGateway);
            if let Some(rt) = route_table {
                if let Err(e) = strip_gateway_routes(api, rt, &rec.id).await {
                    tracing::warn!(address = %address, route_table = %rt, error = %e, "Could not remove gateway route");
                }
            }
            tracing::info!(address = %address, kind = %kind, id = %rec.id, "Deleting");
            match api.delete(*kind, &rec.id, parent_id.as_deref()).await {
                Ok(()) => {
                    store.set_status(&address, ResourceStatus::Deleted)?;
                    summary.deleted += 1;
                    for child in store.doc().children_of(&address) {
                        let deletable = store.get(&child).is_some_and(|c| c.status.is_deletable());
                        if deletable {
                            tracing::debug!(address = %child, parent = %address, "Removed with parent");
                            store.set_status(&child, ResourceStatus::Deleted)?;
                            summary.deleted += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Delete failed");
                    store.set_status(&address, ResourceStatus::FailedDelete)?;
                    summary.failed.push(address);
                }
            }
        }
    }
    Ok(summary)
}

/// `cleanup` under the document lock.
pub async fn run_cleanup(
    api: &dyn CloudApi,
    sysconfig: &Path,
    working_dir: &Path,
    compartment: Option<&str>,
) -> Result<CleanupSummary> {
    let lock = FileLock::acquire(working_dir, &super::lock_name(sysconfig))?;
    let mut store = StateStore::load(sysconfig)?;
    tracing::info!(
        sysconfig = %sysconfig.display(),
        resources = store.doc().resources.len(),
        "Cleaning up"
    );
    let summary = delete_all(api, &mut store, compartment).await;
    lock.release()?;
    summary
}
