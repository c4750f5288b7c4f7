use serde_json::{json, Value};

use super::plan::{LbrPlan, Tier, TopologyPlan, HTTPS_PORT};
use super::Build;
use crate::cloud::ResourceKind;
use crate::error::{DrError, Result};

pub const ADMIN_BACKEND_SET: &str = "admin_backendset";
pub const HTTP_BACKEND_SET: &str = "ohs_backendset";
pub const INTERNAL_BACKEND_SET: &str = "internal_backendset";
/// Holds no backends; the HTTP listener only redirects.
pub const EMPTY_BACKEND_SET: &str = "empty_backendset";

pub const SSL_HEADERS_RULE_SET: &str = "SSLHeaders";
pub const HTTP_REDIRECT_RULE_SET: &str = "HTTP_to_HTTPS_redirect";

pub const ADMIN_LISTENER: &str = "Admin_listener";
pub const HTTPS_LISTENER: &str = "HTTPS_listener";
pub const HTTP_LISTENER: &str = "HTTP_listener";
pub const INTERNAL_LISTENER: &str = "Internal_listener";

/// `(backend set, backend port)` pairs; the port is `None` for the
/// redirect sink.
pub fn backend_sets(lbr: &LbrPlan) -> Vec<(&'static str, Option<u16>)> {
    let mut sets = Vec::new();
    if let Some(port) = lbr.admin_port {
        sets.push((ADMIN_BACKEND_SET, Some(port)));
    }
    sets.push((HTTP_BACKEND_SET, Some(lbr.ohs_backend_port)));
    if let Some(port) = lbr.internal_port {
        sets.push((INTERNAL_BACKEND_SET, Some(port)));
    }
    sets.push((EMPTY_BACKEND_SET, None));
    sets
}

/// Name of a virtual hostname artifact.
pub fn hostname_artifact(hostname: &str) -> String {
    hostname.replace('.', "_")
}

fn ssl_headers_rules() -> Value {
    json!([
        { "action": "ADD_HTTP_REQUEST_HEADER", "header": "WL-Proxy-SSL", "value": "true" },
        { "action": "ADD_HTTP_REQUEST_HEADER", "header": "is_ssl", "value": "ssl" },
    ])
}

fn redirect_rules() -> Value {
    json!([{
        "action": "REDIRECT",
        "conditions": [{ "attributeName": "PATH", "attributeValue": "/", "operator": "FORCE_LONGEST_PREFIX_MATCH" }],
        "responseCode": 301,
        "redirectUri": {
            "protocol": "https",
            "host": "{host}",
            "port": HTTPS_PORT,
            "path": "/{path}",
            "query": "?{query}",
        },
    }])
}

fn lbr_of(plan: &TopologyPlan) -> Result<&LbrPlan> {
    plan.lbr
        .as_ref()
        .ok_or_else(|| DrError::config("load balancer requested without OHS nodes"))
}

impl Build<'_> {
    fn load_balancer_id(&self) -> Result<String> {
        self.topo
            .load_balancer_id
            .clone()
            .ok_or_else(|| DrError::sdk("configure load balancer", "load balancer was not created"))
    }

    /// Step 11. Private iff the web tier is private.
    pub(crate) async fn load_balancer(&mut self) -> Result<()> {
        let plan = self.plan;
        let lbr = lbr_of(plan)?;
        let name = format!("{}-lbr", plan.prefix());
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "displayName": name,
            "shapeName": "flexible",
            "shapeDetails": {
                "minimumBandwidthInMbps": lbr.min_bandwidth_mbps,
                "maximumBandwidthInMbps": lbr.max_bandwidth_mbps,
            },
            "subnetIds": [self.topo.subnet(Tier::Web)],
            "isPrivate": plan.subnet(Tier::Web).private,
        });
        let lb = self
            .ensure("load_balancer", ResourceKind::LoadBalancer, &name, None, spec)
            .await?;
        let details = self.api.get(ResourceKind::LoadBalancer, &lb.id).await?;
        let ip = details
            .attrs
            .get("ip-addresses")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|a| a.get("ip-address"))
            .and_then(Value::as_str)
            .ok_or_else(|| DrError::sdk("get load_balancer", format!("{} has no IP address", lb.id)))?
            .to_string();
        self.set_extra("load_balancer", &[("ip", ip.as_str())])?;
        tracing::info!(lbr = %lb.id, ip = %ip, "Load balancer ready");
        self.topo.load_balancer_id = Some(lb.id);
        self.topo.load_balancer_ip = Some(ip);
        Ok(())
    }

    /// Step 17.
    pub(crate) async fn lbr_artifacts(&mut self) -> Result<()> {
        let plan = self.plan;
        let lbr = lbr_of(plan)?;
        let lb = self.load_balancer_id()?;
        let cert_name = format!("{}-cert", plan.prefix());

        let mut spec = json!({
            "loadBalancerId": lb,
            "certificateName": cert_name,
            "publicCertificateFile": lbr.cert_file.display().to_string(),
            "privateKeyFile": lbr.key_file.display().to_string(),
        });
        if let Some(ca) = &lbr.ca_file {
            spec["caCertificateFile"] = json!(ca.display().to_string());
        }
        self.ensure("lb_certificate", ResourceKind::LbCertificate, &cert_name, Some(&lb), spec)
            .await?;

        let ohs_ips: Vec<String> = self.topo.ohs_nodes.iter().map(|n| n.private_ip.clone()).collect();
        let health_port = lbr.ohs_backend_port;
        for (set, port) in backend_sets(lbr) {
            let backends: Vec<Value> = match port {
                Some(p) => ohs_ips
                    .iter()
                    .map(|ip| json!({ "ipAddress": ip, "port": p, "weight": 1 }))
                    .collect(),
                None => Vec::new(),
            };
            let spec = json!({
                "loadBalancerId": lb,
                "name": set,
                "policy": "ROUND_ROBIN",
                "backends": backends,
                "healthChecker": { "protocol": "TCP", "port": port.unwrap_or(health_port) },
            });
            self.ensure(&format!("lb_backend_set.{}", set), ResourceKind::LbBackendSet, set, Some(&lb), spec)
                .await?;
        }

        let mut hostnames = Vec::new();
        for vh in &lbr.virtual_hostnames {
            let name = hostname_artifact(vh);
            let spec = json!({ "loadBalancerId": lb, "name": name, "hostname": vh });
            self.ensure(&format!("lb_hostname.{}", name), ResourceKind::LbHostname, &name, Some(&lb), spec)
                .await?;
            hostnames.push(name);
        }

        for (rule_set, items) in [
            (SSL_HEADERS_RULE_SET, ssl_headers_rules()),
            (HTTP_REDIRECT_RULE_SET, redirect_rules()),
        ] {
            let spec = json!({ "loadBalancerId": lb, "name": rule_set, "items": items });
            self.ensure(&format!("lb_rule_set.{}", rule_set), ResourceKind::LbRuleSet, rule_set, Some(&lb), spec)
                .await?;
        }

        let ssl = json!({ "certificateName": cert_name, "verifyPeerCertificate": false });
        let mut listeners = Vec::new();
        if let Some(port) = lbr.admin_port {
            listeners.push((ADMIN_LISTENER, port, ADMIN_BACKEND_SET, Value::Null, Vec::<&str>::new()));
        }
        listeners.push((HTTPS_LISTENER, HTTPS_PORT, HTTP_BACKEND_SET, ssl, vec![SSL_HEADERS_RULE_SET]));
        listeners.push((HTTP_LISTENER, lbr.http_port, EMPTY_BACKEND_SET, Value::Null, vec![HTTP_REDIRECT_RULE_SET]));
        if let Some(port) = lbr.internal_port {
            listeners.push((INTERNAL_LISTENER, port, INTERNAL_BACKEND_SET, Value::Null, Vec::new()));
        }
        for (name, port, backend_set, ssl, rule_sets) in listeners {
            let mut spec = json!({
                "loadBalancerId": lb,
                "name": name,
                "port": port,
                "protocol": "HTTP",
                "defaultBackendSetName": backend_set,
                "hostnameNames": hostnames,
                "ruleSetNames": rule_sets,
            });
            if !ssl.is_null() {
                spec["sslConfiguration"] = ssl;
            }
            self.ensure(&format!("lb_listener.{}", name), ResourceKind::LbListener, name, Some(&lb), spec)
                .await?;
        }
        Ok(())
    }
}
