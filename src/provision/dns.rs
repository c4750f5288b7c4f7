use serde_json::json;

use super::Build;
use crate::cloud::ResourceKind;
use crate::error::Result;
use crate::state::ResourceStatus;

const RECORD_TTL: u64 = 300;

impl Build<'_> {
    /// Step 16. The primary's short WLS host names resolve to the cloud
    /// nodes from inside the VCN.
    pub(crate) async fn private_dns(&mut self) -> Result<()> {
        let plan = self.plan;
        let name = format!("{}-view", plan.prefix());
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "displayName": name,
            "scope": "PRIVATE",
        });
        let view = self.ensure("dns_view", ResourceKind::DnsView, &name, None, spec).await?;

        let spec = json!({
            "compartmentId": plan.compartment_id,
            "name": plan.search_domain,
            "zoneType": "PRIMARY",
            "scope": "PRIVATE",
            "viewId": view.id,
        });
        let zone = self
            .ensure("dns_zone", ResourceKind::DnsZone, &plan.search_domain, None, spec)
            .await?;

        let nodes = self.topo.wls_nodes.clone();
        for node in &nodes {
            let Some(short) = plan.prem_short_hostname(node.index) else {
                continue;
            };
            let domain = format!("{}.{}", short, plan.search_domain);
            let address = format!("dns_record.{}", short);
            let current = self
                .store
                .get(&address)
                .filter(|r| r.status != ResourceStatus::Deleted)
                .and_then(|r| r.extra.get("rdata"))
                .cloned();
            if current.as_deref() == Some(node.private_ip.as_str()) {
                tracing::debug!(domain = %domain, "A record already in place");
                continue;
            }
            let spec = json!({
                "zoneNameOrId": zone.id,
                "domain": domain,
                "rtype": "A",
                "scope": "PRIVATE",
                "viewId": view.id,
                "items": [{ "domain": domain, "rtype": "A", "rdata": node.private_ip, "ttl": RECORD_TTL }],
            });
            self.api.create(ResourceKind::DnsRecord, &spec).await?;
            self.store.record(
                &address,
                ResourceKind::DnsRecord,
                &domain,
                &domain,
                ResourceStatus::Created,
                Some("dns_zone"),
            )?;
            self.set_extra(&address, &[("rdata", node.private_ip.as_str())])?;
            tracing::info!(domain = %domain, ip = %node.private_ip, "A record set");
        }

        self.api.attach_view_to_vcn_resolver(&self.topo.vcn_id, &view.id).await?;
        self.topo.dns_view_id = Some(view.id);
        self.topo.dns_zone_id = Some(zone.id);
        Ok(())
    }
}
