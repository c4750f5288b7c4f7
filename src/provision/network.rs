use std::collections::BTreeSet;

use serde_json::{json, Value};

use super::plan::{Tier, TopologyPlan, HTTPS_PORT};
use super::Build;
use crate::cloud::ResourceKind;
use crate::error::{DrError, Result};

const ANYWHERE: &str = "0.0.0.0/0";
/// Extra on the internet gateway naming the route table given a rule to it.
pub(crate) const IGW_ROUTE_TABLE: &str = "route_table";
const TCP: &str = "6";
const UDP: &str = "17";
const DB_LISTENER_PORT: u16 = 1521;
const NFS_TCP_PORTS: [(u16, u16); 2] = [(111, 111), (2048, 2050)];
const NFS_UDP_PORTS: [(u16, u16); 2] = [(111, 111), (2048, 2048)];

// ─── Security rules ─────────────────────────────────────────────────────────

/// One ingress rule: protocol number, source CIDR, destination port range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ingress {
    pub protocol: &'static str,
    pub source: String,
    pub ports: (u16, u16),
}

impl Ingress {
    fn tcp(source: &str, port: u16) -> Self {
        Self {
            protocol: TCP,
            source: source.to_string(),
            ports: (port, port),
        }
    }

    fn to_json(&self) -> Value {
        let range = json!({ "destinationPortRange": { "min": self.ports.0, "max": self.ports.1 } });
        let options = if self.protocol == UDP { "udpOptions" } else { "tcpOptions" };
        json!({
            "protocol": self.protocol,
            "source": self.source,
            "sourceType": "CIDR_BLOCK",
            "isStateless": false,
            options: range,
        })
    }
}

/// Ingress rules of each tier's security list.
pub fn ingress_rules(plan: &TopologyPlan, tier: Tier) -> Vec<Ingress> {
    let mut rules = BTreeSet::new();
    let vcn = plan.vcn_cidr.as_str();
    let prem = plan.prem_cidr.as_str();
    let web = plan.subnet(Tier::Web);
    let mid = plan.subnet(Tier::Mid).cidr.as_str();
    match tier {
        Tier::Web => {
            for src in [vcn, prem] {
                rules.insert(Ingress::tcp(src, 22));
            }
            for port in &plan.ohs_http_ports {
                rules.insert(Ingress::tcp(vcn, *port));
            }
            if let Some(lbr) = &plan.lbr {
                let sources: Vec<&str> = if web.private { vec![vcn, prem] } else { vec![ANYWHERE] };
                for port in lbr.listener_ports() {
                    for src in &sources {
                        rules.insert(Ingress::tcp(src, port));
                    }
                }
            }
        }
        Tier::Mid => {
            let mut ports = plan.wls_side_ports();
            ports.insert(22);
            for src in [mid, web.cidr.as_str(), prem] {
                for port in &ports {
                    rules.insert(Ingress::tcp(src, *port));
                }
            }
        }
        Tier::Db => {
            for port in [22, DB_LISTENER_PORT] {
                rules.insert(Ingress::tcp(mid, port));
            }
        }
        Tier::Fss => {
            for src in [mid, web.cidr.as_str()] {
                for range in NFS_TCP_PORTS {
                    rules.insert(Ingress {
                        protocol: TCP,
                        source: src.to_string(),
                        ports: range,
                    });
                }
                for range in NFS_UDP_PORTS {
                    rules.insert(Ingress {
                        protocol: UDP,
                        source: src.to_string(),
                        ports: range,
                    });
                }
            }
        }
    }
    rules.into_iter().collect()
}

fn egress_all() -> Value {
    json!([{ "protocol": "all", "destination": ANYWHERE, "destinationType": "CIDR_BLOCK", "isStateless": false }])
}

/// A kebab-case route rule from a response, as a camelCase request rule.
pub(crate) fn route_rule_request(rule: &Value) -> Value {
    let field = |k: &str| rule.get(k).cloned().unwrap_or(Value::Null);
    json!({
        "destination": field("destination"),
        "destinationType": field("destination-type"),
        "networkEntityId": field("network-entity-id"),
    })
}

// ─── Steps 1-6 ──────────────────────────────────────────────────────────────

impl Build<'_> {
    /// Step 1. The default route table and security list ids are read
    /// whether the VCN was created or adopted.
    pub(crate) async fn vcn(&mut self) -> Result<()> {
        let plan = self.plan;
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "displayName": plan.vcn_name,
            "cidrBlocks": [plan.vcn_cidr],
            "dnsLabel": plan.vcn_dns_label,
        });
        let vcn = self.ensure("vcn", ResourceKind::Vcn, &plan.vcn_name, None, spec).await?;
        self.topo.default_route_table_id = vcn.attr("default-route-table-id").unwrap_or_default().to_string();
        self.topo.default_security_list_id = vcn
            .attr("default-security-list-id")
            .unwrap_or_default()
            .to_string();
        self.topo.vcn_id = vcn.id;
        self.topo.availability_domains = self.api.availability_domains(&plan.compartment_id).await?;
        if self.topo.availability_domains.is_empty() {
            return Err(DrError::sdk("list availability domains", "region reports none"));
        }
        tracing::info!(
            vcn = %self.topo.vcn_id,
            ads = self.topo.availability_domains.len(),
            "Virtual network ready"
        );
        Ok(())
    }

    /// Step 2.
    pub(crate) async fn gateways(&mut self) -> Result<()> {
        let plan = self.plan;
        let prefix = plan.prefix();
        let vcn = self.topo.vcn_id.clone();

        let name = format!("{}-igw", prefix);
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "vcnId": vcn,
            "displayName": name,
            "isEnabled": true,
        });
        let igw = self
            .ensure("internet_gateway", ResourceKind::InternetGateway, &name, Some(&vcn), spec)
            .await?;
        self.topo.internet_gateway_id = igw.id;

        let services = self.api.all_services().await?;
        self.topo.services_cidr = services.attr("cidr-block").unwrap_or_default().to_string();
        let name = format!("{}-sgw", prefix);
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "vcnId": vcn,
            "displayName": name,
            "services": [{ "serviceId": services.id }],
        });
        let sgw = self
            .ensure("service_gateway", ResourceKind::ServiceGateway, &name, Some(&vcn), spec)
            .await?;
        self.topo.service_gateway_id = sgw.id;

        let name = format!("{}-natgw", prefix);
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "vcnId": vcn,
            "displayName": name,
        });
        let nat = self
            .ensure("nat_gateway", ResourceKind::NatGateway, &name, Some(&vcn), spec)
            .await?;
        self.topo.nat_gateway_id = nat.id;

        if plan.add_igw_route {
            self.add_igw_default_route().await?;
        }
        Ok(())
    }

    /// Add `0.0.0.0/0 → igw` to the VCN's default route table if absent.
    /// The table is recorded on the gateway so cleanup can take the rule
    /// out again.
    async fn add_igw_default_route(&mut self) -> Result<()> {
        let rt_id = self.topo.default_route_table_id.clone();
        if rt_id.is_empty() {
            return Err(DrError::sdk("update route table", "VCN reports no default route table"));
        }
        let rt = self.api.get(ResourceKind::RouteTable, &rt_id).await?;
        let existing: Vec<Value> = rt
            .attrs
            .get("route-rules")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let igw = self.topo.internet_gateway_id.as_str();
        if existing
            .iter()
            .any(|r| r.get("network-entity-id").and_then(Value::as_str) == Some(igw))
        {
            tracing::info!(route_table = %rt_id, "Default route table already routes to the internet gateway");
            return Ok(());
        }
        let mut rules: Vec<Value> = existing.iter().map(route_rule_request).collect();
        rules.push(json!({
            "destination": ANYWHERE,
            "destinationType": "CIDR_BLOCK",
            "networkEntityId": igw,
        }));
        self.api
            .update(ResourceKind::RouteTable, &rt_id, &json!({ "routeRules": rules }))
            .await?;
        self.set_extra("internet_gateway", &[(IGW_ROUTE_TABLE, rt_id.as_str())])?;
        tracing::info!(route_table = %rt_id, "Added internet gateway route to the default route table");
        Ok(())
    }

    /// Step 3.
    pub(crate) async fn route_tables(&mut self) -> Result<()> {
        let plan = self.plan;
        let vcn = self.topo.vcn_id.clone();

        let name = format!("{}-private-rt", plan.prefix());
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "vcnId": vcn,
            "displayName": name,
            "routeRules": [
                {
                    "destination": self.topo.services_cidr,
                    "destinationType": "SERVICE_CIDR_BLOCK",
                    "networkEntityId": self.topo.service_gateway_id,
                },
                {
                    "destination": ANYWHERE,
                    "destinationType": "CIDR_BLOCK",
                    "networkEntityId": self.topo.nat_gateway_id,
                },
            ],
        });
        let private = self
            .ensure("route_table.private", ResourceKind::RouteTable, &name, Some(&vcn), spec)
            .await?;
        self.topo.private_route_table_id = private.id;

        let name = format!("{}-public-rt", plan.prefix());
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "vcnId": vcn,
            "displayName": name,
            "routeRules": [{
                "destination": ANYWHERE,
                "destinationType": "CIDR_BLOCK",
                "networkEntityId": self.topo.internet_gateway_id,
            }],
        });
        let public = self
            .ensure("route_table.public", ResourceKind::RouteTable, &name, Some(&vcn), spec)
            .await?;
        self.topo.public_route_table_id = public.id;
        Ok(())
    }

    /// Step 4.
    pub(crate) async fn security_lists(&mut self) -> Result<()> {
        let plan = self.plan;
        let vcn = self.topo.vcn_id.clone();
        for tier in Tier::ALL {
            let rules: Vec<Value> = ingress_rules(plan, tier).iter().map(Ingress::to_json).collect();
            tracing::debug!(tier = %tier, rules = rules.len(), "Security list rules");
            let spec = json!({
                "compartmentId": plan.compartment_id,
                "vcnId": vcn,
                "displayName": tier.as_str(),
                "ingressSecurityRules": rules,
                "egressSecurityRules": egress_all(),
            });
            let address = format!("security_list.{}", tier);
            let list = self
                .ensure(&address, ResourceKind::SecurityList, tier.as_str(), Some(&vcn), spec)
                .await?;
            self.topo.security_lists.insert(tier, list.id);
        }
        Ok(())
    }

    /// Step 5.
    pub(crate) async fn subnets(&mut self) -> Result<()> {
        let plan = self.plan;
        let vcn = self.topo.vcn_id.clone();
        for subnet in &plan.subnets {
            let route_table = if subnet.private {
                &self.topo.private_route_table_id
            } else {
                &self.topo.public_route_table_id
            };
            let security_list = self.topo.security_lists.get(&subnet.tier).cloned().unwrap_or_default();
            let spec = json!({
                "compartmentId": plan.compartment_id,
                "vcnId": vcn,
                "displayName": subnet.tier.as_str(),
                "cidrBlock": subnet.cidr,
                "dnsLabel": subnet.tier.as_str(),
                "prohibitPublicIpOnVnic": subnet.private,
                "routeTableId": route_table,
                "securityListIds": [security_list],
            });
            let address = format!("subnet.{}", subnet.tier);
            let created = self
                .ensure(&address, ResourceKind::Subnet, subnet.tier.as_str(), Some(&vcn), spec)
                .await?;
            self.topo.subnets.insert(subnet.tier, created.id);
        }
        Ok(())
    }

    /// Step 6. Only the mid and web tiers resolve the primary's search
    /// domain; a subnet already on these options is left alone.
    pub(crate) async fn dhcp_options(&mut self) -> Result<()> {
        let plan = self.plan;
        let vcn = self.topo.vcn_id.clone();
        let name = format!("{}-dhcp", plan.prefix());
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "vcnId": vcn,
            "displayName": name,
            "options": [
                { "type": "DomainNameServer", "serverType": "VcnLocalPlusInternet" },
                { "type": "SearchDomain", "searchDomainNames": [plan.search_domain] },
            ],
        });
        let dhcp = self
            .ensure("dhcp_options", ResourceKind::DhcpOptions, &name, Some(&vcn), spec)
            .await?;
        self.topo.dhcp_options_id = dhcp.id.clone();

        for tier in [Tier::Mid, Tier::Web] {
            let subnet_id = self.topo.subnet(tier).to_string();
            let subnet = self.api.get(ResourceKind::Subnet, &subnet_id).await?;
            if subnet.attr("dhcp-options-id") == Some(dhcp.id.as_str()) {
                continue;
            }
            self.api
                .update(ResourceKind::Subnet, &subnet_id, &json!({ "dhcpOptionsId": dhcp.id }))
                .await?;
            tracing::info!(tier = %tier, subnet = %subnet_id, "Attached DHCP options");
        }
        Ok(())
    }
}
