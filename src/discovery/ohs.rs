use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::constants::patterns;
use crate::error::{DrError, Result};
use crate::matcher::OutputMatcher;

/// Ports and virtual host names found in the HTTP proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OhsFacts {
    pub http_ports: BTreeSet<u16>,
    /// `ServerName` values usable as load balancer virtual hostnames.
    pub virtual_hostnames: BTreeSet<String>,
}

impl OhsFacts {
    pub fn is_empty(&self) -> bool {
        self.http_ports.is_empty() && self.virtual_hostnames.is_empty()
    }

    /// Fold one `.conf` body into the facts.
    pub fn absorb(&mut self, source: &str, body: &str) -> Result<()> {
        let mut ports = OutputMatcher::extract_all(patterns::OHS_LISTEN, body)?;
        ports.extend(OutputMatcher::extract_all(patterns::OHS_VIRTUAL_HOST, body)?);
        for p in ports {
            let port = p
                .parse::<u16>()
                .map_err(|_| DrError::parse(source, format!("'{}' is not a port", p)))?;
            self.http_ports.insert(port);
        }

        for name in OutputMatcher::extract_all(patterns::OHS_SERVER_NAME, body)? {
            if OutputMatcher::contains(patterns::IPV4_LITERAL, &name, false)? {
                tracing::warn!(file = source, server_name = %name, "ServerName is an IP literal, not a virtual hostname candidate");
                continue;
            }
            self.virtual_hostnames.insert(name.to_ascii_lowercase());
        }
        Ok(())
    }
}

/// Every `*.conf` under `root`, sorted.
pub fn find_conf_files(root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*.conf", root.display());
    let paths = glob::glob(&pattern).map_err(|e| DrError::config(format!("bad glob {}: {}", pattern, e)))?;
    let mut files: Vec<PathBuf> = paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect();
    files.sort();
    Ok(files)
}

pub fn collect(root: &Path) -> Result<OhsFacts> {
    let mut facts = OhsFacts::default();
    for file in find_conf_files(root)? {
        let body = match std::fs::read_to_string(&file) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Skipping unreadable conf file");
                continue;
            }
        };
        facts.absorb(&file.display().to_string(), &body)?;
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorbs_listen_virtualhost_and_server_name() {
        let body = "Listen 7777\nListen 10.0.0.5:4443\n\
                    <VirtualHost *:7777>\n  ServerName https://soa.example.com:443\n</VirtualHost>\n\
                    <VirtualHost ohs1:8890>\n  ServerName 10.1.1.1\n</VirtualHost>\n\
                    # ServerName commented.example.com\n";
        let mut facts = OhsFacts::default();
        facts.absorb("moduleconf/soa.conf", body).unwrap();
        assert_eq!(facts.http_ports.iter().copied().collect::<Vec<_>>(), vec![4443, 7777, 8890]);
        assert_eq!(
            facts.virtual_hostnames.iter().cloned().collect::<Vec<_>>(),
            vec!["soa.example.com".to_string()]
        );
    }
}
