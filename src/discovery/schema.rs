use std::fmt;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::types::parse_bool;
use crate::error::{DrError, Result};

/// Type column of an inventory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Port,
    Fqdn,
    Cidr,
    Int,
    Path,
    Name,
    Ip,
    Ocpu,
    YesNo,
    /// No validation.
    Opt,
}

impl FieldType {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "port" => FieldType::Port,
            "fqdn" => FieldType::Fqdn,
            "cidr" => FieldType::Cidr,
            "int" => FieldType::Int,
            "path" => FieldType::Path,
            "name" => FieldType::Name,
            "ip" => FieldType::Ip,
            "ocpu" => FieldType::Ocpu,
            "yesno" => FieldType::YesNo,
            "opt" => FieldType::Opt,
            other => return Err(DrError::config(format!("unknown inventory type '{}'", other))),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Port => "port",
            FieldType::Fqdn => "fqdn",
            FieldType::Cidr => "cidr",
            FieldType::Int => "int",
            FieldType::Path => "path",
            FieldType::Name => "name",
            FieldType::Ip => "ip",
            FieldType::Ocpu => "ocpu",
            FieldType::YesNo => "yesno",
            FieldType::Opt => "opt",
        }
    }

    /// True if `value` is acceptable for this type.
    pub fn accepts(&self, value: &str) -> bool {
        let v = value.trim();
        match self {
            FieldType::Opt => true,
            FieldType::Port => v.parse::<u16>().map(|p| p > 0).unwrap_or(false),
            FieldType::Int => v.parse::<u64>().is_ok(),
            FieldType::Ocpu => v.parse::<f64>().map(|n| n > 0.0 && n.is_finite()).unwrap_or(false),
            FieldType::YesNo => parse_bool(v).is_some(),
            FieldType::Ip => v.parse::<Ipv4Addr>().is_ok(),
            FieldType::Cidr => is_cidr(v),
            FieldType::Path => !v.is_empty() && !v.contains('\n'),
            FieldType::Name => name_re().is_match(v),
            FieldType::Fqdn => v.parse::<Ipv4Addr>().is_err() && v.len() <= 253 && fqdn_re().is_match(v),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._:@-]+$").expect("static regex"))
}

fn fqdn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.?$")
            .expect("static regex")
    })
}

fn is_cidr(v: &str) -> bool {
    match v.split_once('/') {
        Some((ip, bits)) => {
            ip.parse::<Ipv4Addr>().is_ok() && bits.parse::<u8>().map(|b| b <= 32).unwrap_or(false)
        }
        None => false,
    }
}

/// One inventory key.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub ty: FieldType,
    pub required: bool,
    /// Kept as an ordered sequence instead of prompting for one value.
    pub multiple: bool,
    pub default: Option<&'static str>,
}

const fn field(key: &'static str, ty: FieldType, required: bool) -> FieldSpec {
    FieldSpec {
        key,
        ty,
        required,
        multiple: false,
        default: None,
    }
}

const fn multi(key: &'static str, ty: FieldType, required: bool) -> FieldSpec {
    FieldSpec {
        key,
        ty,
        required,
        multiple: true,
        default: None,
    }
}

const fn with_default(key: &'static str, ty: FieldType, default: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        ty,
        required: true,
        multiple: false,
        default: Some(default),
    }
}

use FieldType::*;

/// Every key the provisioner reads.
pub const SCHEMA: &[FieldSpec] = &[
    // ─── Tenancy ────────────────────────────────────────────────────────
    field("oci.compartment_id", Name, true),
    field("oci.region", Name, true),
    field("oci.ssh_public_key", Path, true),
    field("oci.ssh_private_key", Path, false),
    // ─── Network ────────────────────────────────────────────────────────
    field("oci.network.vcn_name", Name, true),
    field("oci.network.vcn_cidr", Cidr, true),
    with_default("oci.network.add_igw_route", YesNo, "no"),
    field("oci.network.webtier.cidr", Cidr, true),
    with_default("oci.network.webtier.private", YesNo, "no"),
    field("oci.network.midtier.cidr", Cidr, true),
    with_default("oci.network.midtier.private", YesNo, "yes"),
    field("oci.network.dbtier.cidr", Cidr, true),
    with_default("oci.network.dbtier.private", YesNo, "yes"),
    field("oci.network.fsstier.cidr", Cidr, true),
    with_default("oci.network.fsstier.private", YesNo, "yes"),
    field("oci.network.ports.admin", Port, true),
    multi("oci.network.ports.wlsservers", Port, true),
    multi("oci.network.ports.nodemanager", Port, true),
    multi("oci.network.ports.coherence", Port, false),
    multi("oci.network.ports.ohs_http", Port, false),
    field("prem.network.cidr", Cidr, true),
    field("prem.network.search_domain", Fqdn, true),
    // ─── Primary facts ──────────────────────────────────────────────────
    field("prem.wls.domain_name", Name, true),
    field("prem.wls.admin_server", Name, true),
    multi("prem.wls.hostnames", Fqdn, true),
    multi("prem.ohs.hostnames", Fqdn, false),
    with_default("prem.wls.os_user", Name, "oracle"),
    with_default("prem.wls.os_group", Name, "oinstall"),
    field("prem.wls.uid", Int, true),
    field("prem.wls.gid", Int, true),
    // ─── Compute ────────────────────────────────────────────────────────
    field("oci.wls.nodes_count", Int, true),
    field("oci.wls.shape", Name, true),
    field("oci.wls.ocpu", Ocpu, true),
    field("oci.wls.memory_gb", Int, true),
    field("oci.wls.image_id", Name, true),
    with_default("oci.ohs.nodes_count", Int, "0"),
    field("oci.ohs.shape", Name, false),
    field("oci.ohs.ocpu", Ocpu, false),
    field("oci.ohs.memory_gb", Int, false),
    field("oci.ohs.image_id", Name, false),
    // ─── Storage ────────────────────────────────────────────────────────
    with_default("oci.storage.round_robin", YesNo, "yes"),
    with_default("oci.storage.products_count", Int, "2"),
    with_default("oci.storage.block_volume_gb", Int, "50"),
    with_default("oci.storage.products_path", Path, "/u01/oracle/products"),
    with_default("oci.storage.private_config_path", Path, "/u02/oracle/config"),
    with_default("oci.storage.shared_config_path", Path, "/u01/shared"),
    with_default("oci.storage.runtime_path", Path, "/u01/runtime"),
    // ─── Load balancer ──────────────────────────────────────────────────
    multi("oci.lbr.virtual_hostnames", Fqdn, false),
    field("oci.lbr.ohs_backend_port", Port, false),
    field("oci.lbr.admin_port", Port, false),
    with_default("oci.lbr.http_port", Port, "80"),
    field("oci.lbr.internal_port", Port, false),
    with_default("oci.lbr.min_bandwidth_mbps", Int, "10"),
    with_default("oci.lbr.max_bandwidth_mbps", Int, "100"),
    field("oci.lbr.cert_file", Path, false),
    field("oci.lbr.key_file", Path, false),
    field("oci.lbr.ca_file", Path, false),
];

pub fn lookup(key: &str) -> Option<&'static FieldSpec> {
    SCHEMA.iter().find(|f| f.key == key)
}
