use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::api::{CloudApi, CloudResource, ResourceKind};
use crate::constants::{CLOUD_RETRIES, CLOUD_RETRY_BASE};
use crate::error::{DrError, Result};
use crate::remote::{CommandResult, CommandRunner, LocalCommand};
use crate::wait::with_retry;

/// [`CloudApi`] over the `oci` command line, JSON in and out.
pub struct OciCli {
    runner: Arc<dyn CommandRunner>,
    config_file: Option<PathBuf>,
    region: Option<String>,
}

/// CLI command group of each kind.
fn group(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Vcn => &["network", "vcn"],
        ResourceKind::InternetGateway => &["network", "internet-gateway"],
        ResourceKind::ServiceGateway => &["network", "service-gateway"],
        ResourceKind::NatGateway => &["network", "nat-gateway"],
        ResourceKind::RouteTable => &["network", "route-table"],
        ResourceKind::SecurityList => &["network", "security-list"],
        ResourceKind::Subnet => &["network", "subnet"],
        ResourceKind::DhcpOptions => &["network", "dhcp-options"],
        ResourceKind::BlockVolume => &["bv", "volume"],
        ResourceKind::FileSystem => &["fs", "file-system"],
        ResourceKind::MountTarget => &["fs", "mount-target"],
        ResourceKind::Export => &["fs", "export"],
        ResourceKind::LoadBalancer => &["lb", "load-balancer"],
        ResourceKind::LbCertificate => &["lb", "certificate"],
        ResourceKind::LbBackendSet => &["lb", "backend-set"],
        ResourceKind::LbHostname => &["lb", "hostname"],
        ResourceKind::LbRuleSet => &["lb", "rule-set"],
        ResourceKind::LbListener => &["lb", "listener"],
        ResourceKind::Instance => &["compute", "instance"],
        ResourceKind::VolumeAttachment => &["compute", "volume-attachment"],
        ResourceKind::DnsView => &["dns", "view"],
        ResourceKind::DnsZone => &["dns", "zone"],
        ResourceKind::DnsRecord => &["dns", "record", "rrset"],
    }
}

/// Flag naming the resource in get/update/delete.
fn id_flag(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Vcn => "--vcn-id",
        ResourceKind::InternetGateway => "--ig-id",
        ResourceKind::ServiceGateway => "--service-gateway-id",
        ResourceKind::NatGateway => "--nat-gateway-id",
        ResourceKind::RouteTable => "--rt-id",
        ResourceKind::SecurityList => "--security-list-id",
        ResourceKind::Subnet => "--subnet-id",
        ResourceKind::DhcpOptions => "--dhcp-id",
        ResourceKind::BlockVolume => "--volume-id",
        ResourceKind::FileSystem => "--file-system-id",
        ResourceKind::MountTarget => "--mount-target-id",
        ResourceKind::Export => "--export-id",
        ResourceKind::LoadBalancer => "--load-balancer-id",
        ResourceKind::LbCertificate => "--certificate-name",
        ResourceKind::LbBackendSet => "--backend-set-name",
        ResourceKind::LbHostname => "--name",
        ResourceKind::LbRuleSet => "--rule-set-name",
        ResourceKind::LbListener => "--listener-name",
        ResourceKind::Instance => "--instance-id",
        ResourceKind::VolumeAttachment => "--volume-attachment-id",
        ResourceKind::DnsView => "--view-id",
        ResourceKind::DnsZone | ResourceKind::DnsRecord => "--zone-name-or-id",
    }
}

fn create_verb(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Instance => "launch",
        ResourceKind::VolumeAttachment => "attach",
        ResourceKind::DnsRecord => "update",
        _ => "create",
    }
}

fn delete_verb(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Instance => "terminate",
        ResourceKind::VolumeAttachment => "detach",
        _ => "delete",
    }
}

/// Lifecycle state `create --wait-for-state` waits for. Load balancer calls
/// return a work request instead of the resource.
fn ready_state(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Instance => Some("RUNNING"),
        ResourceKind::VolumeAttachment => Some("ATTACHED"),
        ResourceKind::Export | ResourceKind::DnsRecord => None,
        ResourceKind::DnsView | ResourceKind::DnsZone => Some("ACTIVE"),
        ResourceKind::FileSystem | ResourceKind::MountTarget => Some("ACTIVE"),
        k if k == ResourceKind::LoadBalancer || k.is_sub_resource() => Some("SUCCEEDED"),
        _ => Some("AVAILABLE"),
    }
}

/// Flag scoping `list` to a parent.
fn parent_flag(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::InternetGateway
        | ResourceKind::ServiceGateway
        | ResourceKind::NatGateway
        | ResourceKind::RouteTable
        | ResourceKind::SecurityList
        | ResourceKind::Subnet
        | ResourceKind::DhcpOptions => Some("--vcn-id"),
        ResourceKind::Export => Some("--file-system-id"),
        k if k.is_sub_resource() && k != ResourceKind::DnsRecord => Some("--load-balancer-id"),
        _ => None,
    }
}

/// Field holding a resource's name in list output.
fn name_field(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::LbCertificate => "certificate-name",
        ResourceKind::DnsZone
        | ResourceKind::LbBackendSet
        | ResourceKind::LbHostname
        | ResourceKind::LbRuleSet
        | ResourceKind::LbListener => "name",
        ResourceKind::Export => "path",
        _ => "display-name",
    }
}

/// Load balancer artifacts are addressed by name.
fn sub_resource_name(spec: &Value) -> Option<String> {
    spec.get("name")
        .or_else(|| spec.get("certificateName"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Throttling and service-side failures are worth another attempt.
fn is_transient(err: &DrError) -> bool {
    match err {
        DrError::Sdk { message, .. } => [
            "TooManyRequests",
            "InternalServerError",
            "ServiceUnavailable",
            "\"status\": 429",
            "\"status\": 503",
        ]
        .iter()
        .any(|marker| message.contains(marker)),
        _ => false,
    }
}

/// The `data` member of a CLI response; empty output is `Null`.
pub fn response_data(stdout: &str) -> Result<Value> {
    if stdout.trim().is_empty() {
        return Ok(Value::Null);
    }
    let v: Value = serde_json::from_str(stdout)?;
    Ok(v.get("data").cloned().unwrap_or(v))
}

impl OciCli {
    pub fn new(runner: Arc<dyn CommandRunner>, config_file: Option<PathBuf>, region: Option<String>) -> Self {
        Self {
            runner,
            config_file,
            region,
        }
    }

    fn command(&self, kind: ResourceKind, verb: &str) -> LocalCommand {
        let mut cmd = LocalCommand::new("oci").args(group(kind).iter().copied()).arg(verb);
        if let Some(cfg) = &self.config_file {
            cmd = cmd.arg("--config-file").arg(cfg.display().to_string());
        }
        if let Some(region) = &self.region {
            cmd = cmd.arg("--region").arg(region.clone());
        }
        cmd
    }

    async fn run(&self, operation: &str, cmd: LocalCommand) -> Result<CommandResult> {
        let runner = &self.runner;
        let cmd = &cmd;
        with_retry(CLOUD_RETRIES, CLOUD_RETRY_BASE, operation, is_transient, || async move {
            let result = runner.run(cmd).await?;
            if !result.success() {
                return Err(DrError::sdk(operation, result.error_message()));
            }
            Ok(result)
        })
        .await
    }

    /// Write `spec` to a temp file for `--from-json file://…`.
    fn spec_file(spec: &Value) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        serde_json::to_writer(&mut file, spec)?;
        file.flush()?;
        Ok(file)
    }

    fn resource(kind: ResourceKind, data: Value, spec: &Value) -> CloudResource {
        let mut r = CloudResource::from_json(data);
        // Work requests carry the target in `resources` or not at all.
        if kind == ResourceKind::LoadBalancer || kind.is_sub_resource() {
            let target = r
                .attrs
                .get("resources")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(|first| first.get("identifier"))
                .and_then(Value::as_str)
                .map(str::to_string);
            r.id = match kind {
                ResourceKind::LoadBalancer => target.unwrap_or(r.id),
                _ => sub_resource_name(spec).unwrap_or(r.id),
            };
        }
        if kind == ResourceKind::DnsRecord {
            if let Some(domain) = spec.get("domain").and_then(Value::as_str) {
                r.id = domain.to_string();
            }
        }
        r
    }
}

#[async_trait]
impl CloudApi for OciCli {
    async fn find(
        &self,
        kind: ResourceKind,
        compartment: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<CloudResource>> {
        let mut cmd = self.command(kind, "list");
        if !kind.is_sub_resource() {
            cmd = cmd.arg("--compartment-id").arg(compartment).arg("--all");
        }
        if let (Some(flag), Some(p)) = (parent_flag(kind), parent) {
            cmd = cmd.arg(flag).arg(p);
        }
        let result = self.run(&format!("list {}", kind), cmd).await?;
        let data = response_data(&result.stdout())?;
        let field = name_field(kind);
        let found = data.as_array().and_then(|items| {
            items.iter().find(|item| {
                let state = item.get("lifecycle-state").and_then(Value::as_str).unwrap_or("");
                item.get(field).and_then(Value::as_str) == Some(name)
                    && !matches!(state, "TERMINATED" | "TERMINATING" | "DELETED" | "DELETING")
            })
        });
        Ok(found.cloned().map(CloudResource::from_json))
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<CloudResource> {
        let cmd = self.command(kind, "get").arg(id_flag(kind)).arg(id);
        let result = self.run(&format!("get {}", kind), cmd).await?;
        Ok(CloudResource::from_json(response_data(&result.stdout())?))
    }

    async fn create(&self, kind: ResourceKind, spec: &Value) -> Result<CloudResource> {
        let file = Self::spec_file(spec)?;
        let mut cmd = self
            .command(kind, create_verb(kind))
            .arg("--from-json")
            .arg(format!("file://{}", file.path().display()));
        if let Some(state) = ready_state(kind) {
            cmd = cmd.arg("--wait-for-state").arg(state);
        }
        if kind == ResourceKind::DnsRecord {
            cmd = cmd.arg("--force");
        }
        let result = self.run(&format!("create {}", kind), cmd).await?;
        let data = response_data(&result.stdout())?;
        Ok(Self::resource(kind, data, spec))
    }

    async fn update(&self, kind: ResourceKind, id: &str, spec: &Value) -> Result<CloudResource> {
        let file = Self::spec_file(spec)?;
        let cmd = self
            .command(kind, "update")
            .arg(id_flag(kind))
            .arg(id)
            .arg("--from-json")
            .arg(format!("file://{}", file.path().display()))
            .arg("--force");
        let result = self.run(&format!("update {}", kind), cmd).await?;
        Ok(CloudResource::from_json(response_data(&result.stdout())?))
    }

    async fn delete(&self, kind: ResourceKind, id: &str, parent: Option<&str>) -> Result<()> {
        if kind == ResourceKind::DnsRecord {
            let zone = parent.ok_or_else(|| DrError::sdk("delete dns_record", "zone id is required"))?;
            let cmd = self
                .command(kind, "delete")
                .args(["--zone-name-or-id", zone, "--domain", id, "--rtype", "A", "--force"]);
            self.run("delete dns_record", cmd).await?;
            return Ok(());
        }
        let mut cmd = self.command(kind, delete_verb(kind)).arg(id_flag(kind)).arg(id);
        if let (Some(flag), Some(p)) = (parent_flag(kind), parent) {
            if kind.is_sub_resource() {
                cmd = cmd.arg(flag).arg(p);
            }
        }
        cmd = cmd.arg("--force");
        if matches!(kind, ResourceKind::Instance | ResourceKind::BlockVolume) {
            cmd = cmd.arg("--wait-for-state").arg("TERMINATED");
        }
        self.run(&format!("delete {}", kind), cmd).await?;
        Ok(())
    }

    async fn availability_domains(&self, compartment: &str) -> Result<Vec<String>> {
        let mut cmd = LocalCommand::new("oci").args(["iam", "availability-domain", "list"]);
        if let Some(cfg) = &self.config_file {
            cmd = cmd.arg("--config-file").arg(cfg.display().to_string());
        }
        cmd = cmd.arg("--compartment-id").arg(compartment);
        let result = self.run("list availability domains", cmd).await?;
        let data = response_data(&result.stdout())?;
        let mut names: Vec<String> = data
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn all_services(&self) -> Result<CloudResource> {
        let cmd = LocalCommand::new("oci").args(["network", "service", "list", "--all"]);
        let result = self.run("list services", cmd).await?;
        let data = response_data(&result.stdout())?;
        data.as_array()
            .and_then(|items| {
                items.iter().find(|s| {
                    s.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.starts_with("All ") && n.ends_with("Services In Oracle Services Network"))
                })
            })
            .cloned()
            .map(CloudResource::from_json)
            .ok_or_else(|| DrError::sdk("list services", "no 'All Services' entry in this region"))
    }

    async fn instance_private_ip(&self, instance_id: &str) -> Result<String> {
        let cmd = LocalCommand::new("oci")
            .args(["compute", "instance", "list-vnics", "--instance-id"])
            .arg(instance_id);
        let result = self.run("list vnics", cmd).await?;
        let data = response_data(&result.stdout())?;
        data.as_array()
            .and_then(|v| v.first())
            .and_then(|v| v.get("private-ip"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DrError::sdk("list vnics", format!("no private IP for {}", instance_id)))
    }

    async fn attach_view_to_vcn_resolver(&self, vcn_id: &str, view_id: &str) -> Result<()> {
        let cmd = LocalCommand::new("oci")
            .args(["network", "vcn-dns-resolver-association", "get", "--vcn-id"])
            .arg(vcn_id);
        let result = self.run("get vcn resolver", cmd).await?;
        let data = response_data(&result.stdout())?;
        let resolver = data
            .get("dns-resolver-id")
            .and_then(Value::as_str)
            .ok_or_else(|| DrError::sdk("get vcn resolver", format!("VCN {} has no resolver", vcn_id)))?
            .to_string();

        let views = serde_json::json!([{ "viewId": view_id }]);
        let cmd = LocalCommand::new("oci")
            .args(["dns", "resolver", "update", "--resolver-id"])
            .arg(resolver)
            .arg("--attached-views")
            .arg(views.to_string())
            .arg("--force")
            .arg("--wait-for-state")
            .arg("ACTIVE");
        self.run("attach view to resolver", cmd).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers each call with the next canned result.
    struct Canned(Mutex<Vec<CommandResult>>);

    #[async_trait]
    impl CommandRunner for Canned {
        async fn run(&self, _command: &LocalCommand) -> Result<CommandResult> {
            Ok(self.0.lock().unwrap().remove(0))
        }
    }

    fn failed(stderr: &str) -> CommandResult {
        CommandResult {
            exit_code: 1,
            stderr_lines: vec![stderr.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_call_is_retried() {
        let ok = CommandResult {
            exit_code: 0,
            stdout_lines: vec![r#"{"data": [{"id": "ocid1.vcn.1", "lifecycle-state": "AVAILABLE"}]}"#.to_string()],
            ..Default::default()
        };
        let runner = Arc::new(Canned(Mutex::new(vec![
            failed("ServiceError: {\"code\": \"TooManyRequests\", \"status\": 429}"),
            ok,
        ])));
        let cli = OciCli::new(runner.clone(), None, None);
        let result = cli.run("list vcn", LocalCommand::new("oci")).await.unwrap();
        assert!(result.success());
        assert!(runner.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let runner = Arc::new(Canned(Mutex::new(vec![
            failed("ServiceError: {\"code\": \"NotAuthorizedOrNotFound\", \"status\": 404}"),
            failed("unused"),
        ])));
        let cli = OciCli::new(runner.clone(), None, None);
        let err = cli.run("get vcn", LocalCommand::new("oci")).await.unwrap_err();
        assert!(err.to_string().contains("NotAuthorizedOrNotFound"), "{}", err);
        assert_eq!(runner.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_response_data_unwraps_data_member() {
        let v = response_data(r#"{"data": {"id": "ocid1.vcn", "lifecycle-state": "AVAILABLE"}}"#).unwrap();
        let r = CloudResource::from_json(v);
        assert_eq!(r.id, "ocid1.vcn");
        assert_eq!(r.lifecycle_state, "AVAILABLE");
        assert_eq!(response_data("  ").unwrap(), Value::Null);
    }

    #[test]
    fn test_load_balancer_id_comes_from_work_request() {
        let data = serde_json::json!({
            "id": "ocid1.workrequest",
            "resources": [{"identifier": "ocid1.loadbalancer.x"}]
        });
        let r = OciCli::resource(ResourceKind::LoadBalancer, data, &Value::Null);
        assert_eq!(r.id, "ocid1.loadbalancer.x");
        let r = OciCli::resource(
            ResourceKind::LbListener,
            serde_json::json!({"id": "ocid1.workrequest"}),
            &serde_json::json!({"name": "HTTPS"}),
        );
        assert_eq!(r.id, "HTTPS");
        let r = OciCli::resource(
            ResourceKind::LbCertificate,
            serde_json::json!({"id": "ocid1.workrequest"}),
            &serde_json::json!({"certificateName": "hydr-cert"}),
        );
        assert_eq!(r.id, "hydr-cert");
    }
}
