use std::path::Path;

use crate::error::{DrError, Result};

use super::types::{ConfigTree, DrConfig, ReplicationConfig, Scope};
use super::validator;

/// Detected configuration file format.
#[derive(Debug, PartialEq)]
pub enum ConfigMode {
    Yaml,
    Ini,
}

/// Detect the format from the file extension.
pub fn detect_mode(path: &Path) -> Result<ConfigMode> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(ConfigMode::Yaml),
        Some("ini") | Some("properties") | Some("cfg") => Ok(ConfigMode::Ini),
        _ => Err(DrError::config(format!(
            "cannot tell the format of '{}' (expected .yaml, .yml, .ini or .properties)",
            path.display()
        ))),
    }
}

/// Read a configuration file of either format into a [`ConfigTree`].
pub fn load_tree(path: &Path) -> Result<ConfigTree> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DrError::config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let tree = match detect_mode(path)? {
        ConfigMode::Yaml => {
            tracing::info!(path = %path.display(), "Loading YAML configuration");
            parse_yaml(&content)?
        }
        ConfigMode::Ini => {
            tracing::info!(path = %path.display(), "Loading INI configuration");
            parse_ini(&content)?
        }
    };
    Ok(tree)
}

/// Load and validate the orchestrator configuration.
pub fn load_dr_config(path: &Path) -> Result<DrConfig> {
    let tree = load_tree(path)?;
    let config = DrConfig::from_tree(&tree)?;
    validator::validate_dr(&config)?;
    Ok(config)
}

/// Load and validate the replicator configuration.
pub fn load_replication_config(path: &Path) -> Result<ReplicationConfig> {
    let tree = load_tree(path)?;
    let config = ReplicationConfig::from_tree(&tree)?;
    validator::validate_replication(&config)?;
    Ok(config)
}

/// Top-level mapping of scope → mapping of key → scalar or list of scalars.
pub fn parse_yaml(content: &str) -> Result<ConfigTree> {
    let root: serde_yaml::Value = serde_yaml::from_str(content)?;
    let mapping = root
        .as_mapping()
        .ok_or_else(|| DrError::config("top level of the YAML file must be a mapping"))?;

    let mut tree = ConfigTree::new();
    for (scope_key, body) in mapping {
        let scope_name = scope_key
            .as_str()
            .ok_or_else(|| DrError::config("scope names must be strings"))?;
        let scope = Scope::parse(scope_name)
            .ok_or_else(|| DrError::config(format!("unknown configuration scope '{}'", scope_name)))?;
        // An empty scope is allowed.
        if body.is_null() {
            continue;
        }
        let entries = body
            .as_mapping()
            .ok_or_else(|| DrError::config(format!("scope {} must be a mapping", scope)))?;
        for (k, v) in entries {
            let key = k
                .as_str()
                .ok_or_else(|| DrError::config(format!("{}: keys must be strings", scope)))?;
            tree.set(scope, key, &yaml_leaf(scope, key, v)?);
        }
    }
    Ok(tree)
}

fn yaml_leaf(scope: Scope, key: &str, value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(if *b { "yes" } else { "no" }.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Sequence(items) => {
            let parts = items
                .iter()
                .map(|i| yaml_leaf(scope, key, i))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        _ => Err(DrError::config(format!(
            "{}.{} must be a scalar or a list of scalars",
            scope, key
        ))),
    }
}

/// INI sections named after scopes. Keys outside any section are rejected.
pub fn parse_ini(content: &str) -> Result<ConfigTree> {
    let ini = ini::Ini::load_from_str(content)
        .map_err(|e| DrError::config(format!("invalid INI file: {}", e)))?;

    let mut tree = ConfigTree::new();
    for (section, props) in ini.iter() {
        let Some(name) = section else {
            if props.iter().next().is_some() {
                return Err(DrError::config("INI keys must sit inside a [SECTION]"));
            }
            continue;
        };
        let scope = Scope::parse(name)
            .ok_or_else(|| DrError::config(format!("unknown configuration section [{}]", name)))?;
        for (k, v) in props.iter() {
            tree.set(scope, k, v);
        }
        if props.iter().next().is_none() {
            tree.set(scope, "", "");
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mode() {
        assert_eq!(detect_mode(Path::new("drs.yaml")).unwrap(), ConfigMode::Yaml);
        assert_eq!(detect_mode(Path::new("a/b.yml")).unwrap(), ConfigMode::Yaml);
        assert_eq!(detect_mode(Path::new("replication.ini")).unwrap(), ConfigMode::Ini);
        assert!(detect_mode(Path::new("config.toml")).is_err());
    }

    #[test]
    fn test_yaml_lists_and_bools_flatten() {
        let tree = parse_yaml(
            "GENERAL:\n  parallel_stop: true\n  dg_retries: 4\nWLS_PRIM:\n  hosts: [h1, h2]\n",
        )
        .unwrap();
        assert_eq!(tree.get(Scope::General, "parallel_stop"), Some("yes"));
        assert_eq!(tree.get(Scope::General, "dg_retries"), Some("4"));
        assert_eq!(tree.list(Scope::WlsPrim, "hosts"), vec!["h1", "h2"]);
    }

    #[test]
    fn test_yaml_unknown_scope_rejected() {
        let err = parse_yaml("BOGUS:\n  a: b\n").unwrap_err();
        assert!(err.to_string().contains("BOGUS"));
    }

    #[test]
    fn test_yaml_nested_mapping_rejected() {
        assert!(parse_yaml("GENERAL:\n  nested:\n    a: b\n").is_err());
    }

    #[test]
    fn test_ini_sections_become_scopes() {
        let tree = parse_ini(
            "[OPTIONS]\nrsync_retries = 3\ndelete = yes\n\n[PREM_ENV]\nwls_nodes = a, b\n",
        )
        .unwrap();
        assert_eq!(tree.get(Scope::Options, "rsync_retries"), Some("3"));
        assert_eq!(tree.list(Scope::PremEnv, "wls_nodes"), vec!["a", "b"]);
    }

    #[test]
    fn test_ini_unknown_section_rejected() {
        assert!(parse_ini("[NOPE]\na = b\n").is_err());
    }
}
