use std::collections::BTreeMap;
use std::path::Path;

use crate::constants::{patterns, scripts};
use crate::error::{DrError, Result};
use crate::matcher::OutputMatcher;
use crate::remote::{RemoteHost, ScriptBundle, ScriptBundleRunner};

/// Facts about a primary host, as printed by `host_get_osinfo.sh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsFacts {
    pub hostname: String,
    pub os_user: String,
    pub os_group: String,
    pub uid: u32,
    pub gid: u32,
    pub cpus: u32,
    pub mem_gb: u64,
    pub search_domain: Option<String>,
    /// `df --output=target` of the host.
    pub mountpoints: Vec<String>,
}

impl OsFacts {
    pub fn parse(output: &str) -> Result<Self> {
        let values: BTreeMap<String, String> = OutputMatcher::extract_pairs(patterns::OSINFO_LINE, output)?
            .into_iter()
            .collect();
        let get = |k: &str| -> Result<&str> {
            values
                .get(k)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DrError::parse("host OS info", format!("{} missing", k)))
        };
        let num = |k: &str| -> Result<u64> {
            let v = get(k)?;
            v.parse()
                .map_err(|_| DrError::parse("host OS info", format!("{}='{}' is not a number", k, v)))
        };

        Ok(Self {
            hostname: get("HOSTNAME")?.to_string(),
            os_user: get("USER")?.to_string(),
            os_group: get("GROUP")?.to_string(),
            uid: num("UID")? as u32,
            gid: num("GID")? as u32,
            cpus: num("CPUS")? as u32,
            mem_gb: num("MEM_GB")?,
            search_domain: values.get("DOMAIN").filter(|d| !d.is_empty()).cloned(),
            mountpoints: values
                .get("MOUNTS")
                .map(|m| crate::config::types::split_list(m))
                .unwrap_or_default(),
        })
    }

    /// Cloud OCPUs matching the host's CPU count (two vCPUs per OCPU).
    pub fn ocpus(&self) -> u32 {
        (self.cpus / 2).max(1)
    }

    /// Short hostname, without the search domain.
    pub fn short_hostname(&self) -> &str {
        self.hostname.split('.').next().unwrap_or(&self.hostname)
    }
}

/// Run the OS probe on `host` for the WebLogic owner `os_user`.
pub async fn probe(host: &RemoteHost, scripts_dir: &Path, os_user: &str) -> Result<OsFacts> {
    let bundle = ScriptBundle::new(scripts_dir, scripts::HOST_GET_OSINFO).arg(os_user);
    let output = ScriptBundleRunner::new(host).run(&bundle).await?;
    let facts = OsFacts::parse(&output)?;
    tracing::info!(
        host = %host.address(),
        uid = facts.uid,
        gid = facts.gid,
        cpus = facts.cpus,
        mem_gb = facts.mem_gb,
        "Collected host OS facts"
    );
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_osinfo_output() {
        let out = "HOSTNAME=wls1.example.com\nUSER=oracle\nGROUP=oinstall\nUID=1001\nGID=1002\n\
                   CPUS=8\nMEM_GB=64\nDOMAIN=example.com\nMOUNTS=/,/u01,/u02\nnoise line\n";
        let facts = OsFacts::parse(out).unwrap();
        assert_eq!(facts.uid, 1001);
        assert_eq!(facts.ocpus(), 4);
        assert_eq!(facts.short_hostname(), "wls1");
        assert_eq!(facts.search_domain.as_deref(), Some("example.com"));
        assert_eq!(facts.mountpoints, vec!["/", "/u01", "/u02"]);
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let err = OsFacts::parse("USER=oracle\n").unwrap_err();
        assert!(matches!(err, DrError::Parse { .. }));
    }
}
