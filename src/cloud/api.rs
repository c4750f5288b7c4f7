use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Every cloud resource kind the provisioner creates or adopts. Backends
/// are registered inline with their backend set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vcn,
    InternetGateway,
    ServiceGateway,
    NatGateway,
    RouteTable,
    SecurityList,
    Subnet,
    DhcpOptions,
    BlockVolume,
    FileSystem,
    MountTarget,
    Export,
    LoadBalancer,
    LbCertificate,
    LbBackendSet,
    LbHostname,
    LbRuleSet,
    LbListener,
    Instance,
    VolumeAttachment,
    DnsView,
    DnsZone,
    DnsRecord,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vcn => "vcn",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::ServiceGateway => "service_gateway",
            ResourceKind::NatGateway => "nat_gateway",
            ResourceKind::RouteTable => "route_table",
            ResourceKind::SecurityList => "security_list",
            ResourceKind::Subnet => "subnet",
            ResourceKind::DhcpOptions => "dhcp_options",
            ResourceKind::BlockVolume => "block_volume",
            ResourceKind::FileSystem => "file_system",
            ResourceKind::MountTarget => "mount_target",
            ResourceKind::Export => "export",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::LbCertificate => "lb_certificate",
            ResourceKind::LbBackendSet => "lb_backend_set",
            ResourceKind::LbHostname => "lb_hostname",
            ResourceKind::LbRuleSet => "lb_rule_set",
            ResourceKind::LbListener => "lb_listener",
            ResourceKind::Instance => "instance",
            ResourceKind::VolumeAttachment => "volume_attachment",
            ResourceKind::DnsView => "dns_view",
            ResourceKind::DnsZone => "dns_zone",
            ResourceKind::DnsRecord => "dns_record",
        }
    }

    /// Removed together with their parent rather than on their own.
    pub fn is_sub_resource(&self) -> bool {
        matches!(
            self,
            ResourceKind::LbCertificate
                | ResourceKind::LbBackendSet
                | ResourceKind::LbHostname
                | ResourceKind::LbRuleSet
                | ResourceKind::LbListener
                | ResourceKind::DnsRecord
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource as returned by the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudResource {
    pub id: String,
    pub lifecycle_state: String,
    /// The full response body, kebab-case keys.
    pub attrs: Value,
}

impl CloudResource {
    pub fn from_json(data: Value) -> Self {
        Self {
            id: data.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            lifecycle_state: data
                .get("lifecycle-state")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            attrs: data,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

/// Seam over the cloud SDK. Specs and responses are JSON in the SDK's own
/// kebab-case shape.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Look a resource up by display name within `compartment`; `parent`
    /// narrows the search (the VCN for network resources, the load balancer
    /// for its artifacts).
    async fn find(
        &self,
        kind: ResourceKind,
        compartment: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<CloudResource>>;

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<CloudResource>;

    /// Create and wait until usable.
    async fn create(&self, kind: ResourceKind, spec: &Value) -> Result<CloudResource>;

    async fn update(&self, kind: ResourceKind, id: &str, spec: &Value) -> Result<CloudResource>;

    /// Delete and wait until gone. `parent` is required for sub-resources.
    async fn delete(&self, kind: ResourceKind, id: &str, parent: Option<&str>) -> Result<()>;

    async fn availability_domains(&self, compartment: &str) -> Result<Vec<String>>;

    /// The regional "all services" entry used by service gateways.
    async fn all_services(&self) -> Result<CloudResource>;

    async fn instance_private_ip(&self, instance_id: &str) -> Result<String>;

    async fn attach_view_to_vcn_resolver(&self, vcn_id: &str, view_id: &str) -> Result<()>;
}
