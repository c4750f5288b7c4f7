use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use crate::error::{DrError, Result};

pub const DOMAIN_NS: &str = "http://xmlns.oracle.com/weblogic/domain";

/// WebLogic's listen port when a server does not set one.
const DEFAULT_LISTEN_PORT: u16 = 7001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFacts {
    pub name: String,
    pub listen_address: Option<String>,
    pub listen_port: u16,
    pub ssl_port: Option<u16>,
    pub administration_port: Option<u16>,
    pub nap_ports: Vec<u16>,
}

impl ServerFacts {
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::once(self.listen_port)
            .chain(self.ssl_port)
            .chain(self.administration_port)
            .chain(self.nap_ports.iter().copied())
    }
}

/// What the domain configuration tells about the primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFacts {
    pub domain_name: String,
    pub admin_server_name: String,
    pub servers: Vec<ServerFacts>,
    pub coherence_ports: BTreeSet<u16>,
}

impl DomainFacts {
    pub fn admin(&self) -> Option<&ServerFacts> {
        self.servers.iter().find(|s| s.name == self.admin_server_name)
    }

    /// Every port of every non-admin server, ascending.
    pub fn managed_ports(&self) -> BTreeSet<u16> {
        self.servers
            .iter()
            .filter(|s| s.name != self.admin_server_name)
            .flat_map(|s| s.ports())
            .collect()
    }
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name && c.tag_name().namespace() == Some(DOMAIN_NS))
}

fn children<'a, 'i: 'a>(node: Node<'a, 'i>, name: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name && c.tag_name().namespace() == Some(DOMAIN_NS))
}

fn text(node: Node, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn port(node: Node, name: &str, what: &str) -> Result<Option<u16>> {
    match text(node, name) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| DrError::parse(what, format!("'{}' is not a port", v))),
    }
}

/// Parse `config.xml`. `domain_root` resolves `descriptor-file-name`
/// references to coherence cluster descriptors.
pub fn parse_domain_config(xml: &str, domain_root: &Path) -> Result<DomainFacts> {
    let doc = Document::parse(xml).map_err(|e| DrError::parse("domain config.xml", e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "domain" || root.tag_name().namespace() != Some(DOMAIN_NS) {
        return Err(DrError::parse(
            "domain config.xml",
            format!("root element is not <domain xmlns=\"{}\">", DOMAIN_NS),
        ));
    }

    let domain_name = text(root, "name")
        .ok_or_else(|| DrError::parse("domain config.xml", "missing <name>"))?;
    let admin_server_name = text(root, "admin-server-name")
        .ok_or_else(|| DrError::parse("domain config.xml", "missing <admin-server-name>"))?;

    let mut servers = Vec::new();
    for s in children(root, "server") {
        let name = text(s, "name").ok_or_else(|| DrError::parse("domain config.xml", "<server> without <name>"))?;
        let what = format!("server {}", name);
        let ssl_port = match child(s, "ssl") {
            Some(ssl) => port(ssl, "listen-port", &what)?,
            None => None,
        };
        let mut nap_ports = Vec::new();
        for nap in children(s, "network-access-point") {
            if let Some(p) = port(nap, "listen-port", &what)? {
                nap_ports.push(p);
            }
        }
        servers.push(ServerFacts {
            listen_address: text(s, "listen-address"),
            listen_port: port(s, "listen-port", &what)?.unwrap_or(DEFAULT_LISTEN_PORT),
            ssl_port,
            administration_port: port(s, "administration-port", &what)?,
            nap_ports,
            name,
        });
    }

    let mut coherence_ports = BTreeSet::new();
    for res in children(root, "coherence-cluster-system-resource") {
        let Some(descriptor) = text(res, "descriptor-file-name") else {
            continue;
        };
        let path: PathBuf = domain_root.join("config").join(&descriptor);
        let path = if path.exists() { path } else { domain_root.join(&descriptor) };
        match std::fs::read_to_string(&path) {
            Ok(body) => coherence_ports.extend(parse_coherence_ports(&body)?),
            Err(e) => tracing::warn!(
                descriptor = %path.display(),
                error = %e,
                "Coherence descriptor not readable, skipping its ports"
            ),
        }
    }

    Ok(DomainFacts {
        domain_name,
        admin_server_name,
        servers,
        coherence_ports,
    })
}

/// `unicast-listen-port` and `cluster-listen-port` of a coherence descriptor.
pub fn parse_coherence_ports(xml: &str) -> Result<BTreeSet<u16>> {
    let doc = Document::parse(xml).map_err(|e| DrError::parse("coherence descriptor", e.to_string()))?;
    let mut ports = BTreeSet::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        let name = node.tag_name().name();
        if name == "unicast-listen-port" || name == "cluster-listen-port" {
            if let Some(p) = node.text().and_then(|t| t.trim().parse::<u16>().ok()) {
                if p > 0 {
                    ports.insert(p);
                }
            }
        }
    }
    Ok(ports)
}
