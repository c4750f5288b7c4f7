use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{DrError, Result};

/// Value of `key` in a Java properties body. `#` and `!` start comments;
/// both `=` and `:` separate key and value.
pub fn property<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .filter_map(|l| {
            let idx = l.find(['=', ':'])?;
            Some((l[..idx].trim(), l[idx + 1..].trim()))
        })
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Every `nodemanager.properties` under `root`, sorted.
pub fn find_properties_files(root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/nodemanager.properties", root.display());
    let paths = glob::glob(&pattern).map_err(|e| DrError::config(format!("bad glob {}: {}", pattern, e)))?;
    let mut files: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
    files.sort();
    Ok(files)
}

/// `ListenPort` of every node manager in the replicated tree.
pub fn collect_listen_ports(root: &Path) -> Result<BTreeSet<u16>> {
    let mut ports = BTreeSet::new();
    for file in find_properties_files(root)? {
        let body = std::fs::read_to_string(&file)?;
        match property(&body, "ListenPort") {
            Some(v) => {
                let port = v.parse::<u16>().map_err(|_| {
                    DrError::parse(file.display().to_string(), format!("ListenPort '{}' is not a port", v))
                })?;
                tracing::debug!(file = %file.display(), port, "Node manager port");
                ports.insert(port);
            }
            None => tracing::warn!(file = %file.display(), "No ListenPort, node manager uses its default"),
        }
    }
    Ok(ports)
}
