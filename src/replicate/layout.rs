use std::path::{Path, PathBuf};

use super::{DataClass, Instance};
use crate::config::ReplicationConfig;
use crate::error::{DrError, Result};

/// Local staging tree that sits between the primary and the cloud hosts.
///
/// ```text
/// <stage>/wls_products_<slot>      one per products slot
/// <stage>/wls_shared_config
/// <stage>/wlsnode<i>_private_config
/// <stage>/ohs_products_<slot>
/// <stage>/ohsnode<j>_private_config
/// <stage>/tnsnames
/// <stage>/diffs
/// ```
#[derive(Debug, Clone)]
pub struct StagingLayout {
    root: PathBuf,
    products_slots: usize,
    wls_nodes: usize,
    ohs_nodes: usize,
}

impl StagingLayout {
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self {
            root: config.directories.stage_dir.clone(),
            products_slots: config.options.products_slots,
            wls_nodes: config.prem.wls_nodes.len().max(config.oci.wls_nodes.len()),
            ohs_nodes: config.prem.ohs_nodes.len().max(config.oci.ohs_nodes.len()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Products slot of 1-based node `i`: `((i-1) mod slots) + 1`.
    pub fn slot_of(&self, node: usize) -> usize {
        (node.saturating_sub(1) % self.products_slots.max(1)) + 1
    }

    pub fn products(&self, instance: Instance, slot: usize) -> PathBuf {
        self.root.join(format!("{}_products_{}", instance.as_str(), slot))
    }

    pub fn private_config(&self, instance: Instance, node: usize) -> PathBuf {
        self.root
            .join(format!("{}node{}_private_config", instance.as_str(), node))
    }

    pub fn shared_config(&self) -> PathBuf {
        self.root.join("wls_shared_config")
    }

    pub fn tnsnames(&self) -> PathBuf {
        self.root.join("tnsnames")
    }

    pub fn diffs(&self) -> PathBuf {
        self.root.join("diffs")
    }

    /// Staging directory of `class` for 1-based `node`.
    pub fn dir_for(&self, instance: Instance, class: DataClass, node: usize) -> PathBuf {
        match class {
            DataClass::Products => self.products(instance, self.slot_of(node)),
            DataClass::PrivateConfig => self.private_config(instance, node),
            DataClass::SharedConfig => self.shared_config(),
            DataClass::Tnsnames => self.tnsnames(),
        }
    }

    /// Every directory the layout needs, in creation order.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.root.clone()];
        let wls_slots = self.products_slots.min(self.wls_nodes.max(1));
        dirs.extend((1..=wls_slots).map(|s| self.products(Instance::Wls, s)));
        dirs.push(self.shared_config());
        dirs.extend((1..=self.wls_nodes).map(|i| self.private_config(Instance::Wls, i)));
        if self.ohs_nodes > 0 {
            let ohs_slots = self.products_slots.min(self.ohs_nodes);
            dirs.extend((1..=ohs_slots).map(|s| self.products(Instance::Ohs, s)));
            dirs.extend((1..=self.ohs_nodes).map(|j| self.private_config(Instance::Ohs, j)));
        }
        dirs.push(self.tnsnames());
        dirs.push(self.diffs());
        dirs
    }

    pub fn missing(&self) -> Vec<PathBuf> {
        self.required_dirs().into_iter().filter(|d| !d.is_dir()).collect()
    }

    /// Create whatever is missing; returns what was created.
    pub fn ensure(&self) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for dir in self.required_dirs() {
            if dir.is_dir() {
                continue;
            }
            if dir.exists() {
                return Err(DrError::config(format!(
                    "staging path {} exists and is not a directory",
                    dir.display()
                )));
            }
            std::fs::create_dir_all(&dir)?;
            tracing::info!(dir = %dir.display(), "Created staging directory");
            created.push(dir);
        }
        Ok(created)
    }
}
