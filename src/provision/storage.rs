use serde_json::json;

use super::plan::Tier;
use super::{Build, MountTargetFacts};
use crate::cloud::ResourceKind;
use crate::error::{DrError, Result};

/// Filesystem keys in creation order: `products1..N`, then shared and runtime.
pub fn filesystem_keys(products_count: usize) -> Vec<String> {
    let mut keys: Vec<String> = (1..=products_count).map(|k| format!("products{}", k)).collect();
    keys.push("shared".to_string());
    keys.push("runtime".to_string());
    keys
}

/// Export path of filesystem `key`.
pub fn export_path(key: &str) -> String {
    format!("/{}", key)
}

impl Build<'_> {
    /// Step 7. Volume `i` lands in the AD WLS node `i` will use.
    pub(crate) async fn block_volumes(&mut self) -> Result<()> {
        let plan = self.plan;
        let ads = self.topo.availability_domains.clone();
        for i in 1..=plan.wls_count {
            let ad = plan.placement(i, &ads)?.to_string();
            let name = format!("{}-wls{}-bv", plan.prefix(), i);
            let spec = json!({
                "compartmentId": plan.compartment_id,
                "availabilityDomain": ad,
                "displayName": name,
                "sizeInGBs": plan.block_volume_gb,
            });
            let volume = self
                .ensure(&format!("block_volume.wls.{}", i), ResourceKind::BlockVolume, &name, None, spec)
                .await?;
            self.topo.volumes.push((volume.id, ad));
        }
        Ok(())
    }

    /// Step 8. Products slot `k` is placed round-robin; shared config and
    /// runtime go to the first AD.
    pub(crate) async fn file_systems(&mut self) -> Result<()> {
        let plan = self.plan;
        let ads = self.topo.availability_domains.clone();
        for (pos, key) in filesystem_keys(plan.products_count).into_iter().enumerate() {
            let ad = if pos < plan.products_count {
                plan.placement(pos + 1, &ads)?.to_string()
            } else {
                ads[0].clone()
            };
            let name = format!("{}-{}", plan.prefix(), key);
            let spec = json!({
                "compartmentId": plan.compartment_id,
                "availabilityDomain": ad,
                "displayName": name,
            });
            let fs = self
                .ensure(&format!("file_system.{}", key), ResourceKind::FileSystem, &name, None, spec)
                .await?;
            self.topo.file_systems.insert(key, (fs.id, ad));
        }
        Ok(())
    }

    /// Step 9. One mount target per AD holding a filesystem.
    pub(crate) async fn mount_targets(&mut self) -> Result<()> {
        let plan = self.plan;
        let subnet = self.topo.subnet(Tier::Fss).to_string();
        let mut in_use: Vec<String> = Vec::new();
        for ad in &self.topo.availability_domains {
            if self.topo.file_systems.values().any(|(_, fs_ad)| fs_ad == ad) {
                in_use.push(ad.clone());
            }
        }
        for (j, ad) in in_use.into_iter().enumerate() {
            let n = j + 1;
            let name = format!("{}-mt{}", plan.prefix(), n);
            let label = format!("fssmt{}", n);
            let spec = json!({
                "compartmentId": plan.compartment_id,
                "availabilityDomain": ad,
                "subnetId": subnet,
                "displayName": name,
                "hostnameLabel": label,
            });
            let address = format!("mount_target.{}", n);
            let mt = self
                .ensure(&address, ResourceKind::MountTarget, &name, None, spec)
                .await?;
            let export_set_id = mt
                .attr("export-set-id")
                .ok_or_else(|| DrError::sdk("create mount_target", format!("{} has no export set", mt.id)))?
                .to_string();
            let fqdn = format!(
                "{}.{}.{}.oraclevcn.com",
                label,
                Tier::Fss.as_str(),
                plan.vcn_dns_label
            );
            self.set_extra(&address, &[("fqdn", fqdn.as_str()), ("availability_domain", ad.as_str())])?;
            self.topo.mount_targets.insert(
                ad,
                MountTargetFacts {
                    id: mt.id,
                    export_set_id,
                    fqdn,
                },
            );
        }
        Ok(())
    }

    /// Step 10.
    pub(crate) async fn exports(&mut self) -> Result<()> {
        let plan = self.plan;
        let file_systems = self.topo.file_systems.clone();
        for key in filesystem_keys(plan.products_count) {
            let Some((fs_id, ad)) = file_systems.get(&key) else {
                continue;
            };
            let export_set = self
                .topo
                .mount_targets
                .get(ad)
                .map(|mt| mt.export_set_id.clone())
                .ok_or_else(|| DrError::sdk("create export", format!("no mount target in {}", ad)))?;
            let path = export_path(&key);
            let spec = json!({
                "exportSetId": export_set,
                "fileSystemId": fs_id,
                "path": path,
            });
            let address = format!("export.{}", key);
            self.ensure(&address, ResourceKind::Export, &path, Some(fs_id), spec)
                .await?;
            self.set_extra(&address, &[("export_path", path.as_str())])?;
            self.topo.exports.insert(key, path);
        }
        Ok(())
    }
}
