use std::collections::BTreeSet;

use serde_json::{json, Value};

use super::init_script::{InitScript, NfsMount, INIT_LOG};
use super::plan::{ShapePlan, Tier, CLOUD_SSH_USER};
use super::{Build, NodeFacts};
use crate::cloud::ResourceKind;
use crate::constants::patterns;
use crate::error::{DrError, Result};
use crate::matcher::OutputMatcher;
use crate::remote::{HostTarget, RemoteHost, RunAs};

/// Which tier an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Wls,
    Ohs,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Wls => "wls",
            Role::Ohs => "ohs",
        }
    }
}

/// Commands that log a node into the iSCSI target of an attachment.
pub fn iscsi_login_commands(iqn: &str, ipv4: &str, port: u64) -> Vec<String> {
    let portal = format!("{}:{}", ipv4, port);
    vec![
        format!("iscsiadm -m node -o new -T {} -p {}", iqn, portal),
        format!(
            "iscsiadm -m node -o update -T {} -n node.startup -v automatic",
            iqn
        ),
        format!("iscsiadm -m node -T {} -p {} -l", iqn, portal),
    ]
}

/// Stable device path of an iSCSI attachment.
pub fn iscsi_device(iqn: &str, ipv4: &str, port: u64) -> String {
    format!("/dev/disk/by-path/ip-{}:{}-iscsi-{}-lun-1", ipv4, port, iqn)
}

impl Build<'_> {
    fn wls_init_script(&self, node: usize) -> InitScript {
        let plan = self.plan;
        let mut mounts = Vec::new();
        let products = format!("products{}", plan.products_slot(node));
        for (key, mount_point) in [
            (products.as_str(), &plan.products_path),
            ("shared", &plan.shared_config_path),
            ("runtime", &plan.runtime_path),
        ] {
            if let Some(source) = self.topo.nfs_source(key) {
                mounts.push(NfsMount {
                    source,
                    mount_point: mount_point.clone(),
                });
            }
        }
        let lbr_alias = match (&plan.lbr, &self.topo.load_balancer_ip) {
            (Some(lbr), Some(ip)) => Some((ip.clone(), lbr.virtual_hostnames.clone())),
            _ => None,
        };
        InitScript {
            os_user: plan.os_user.clone(),
            os_group: plan.os_group.clone(),
            uid: plan.uid,
            gid: plan.gid,
            directories: vec![plan.private_config_path.clone()],
            mounts,
            firewall_ports: plan.wls_side_ports(),
            lbr_alias,
        }
    }

    fn ohs_init_script(&self) -> InitScript {
        let plan = self.plan;
        InitScript {
            os_user: plan.os_user.clone(),
            os_group: plan.os_group.clone(),
            uid: plan.uid,
            gid: plan.gid,
            directories: vec![plan.products_path.clone(), plan.private_config_path.clone()],
            mounts: Vec::new(),
            firewall_ports: plan.ohs_http_ports.iter().copied().collect::<BTreeSet<_>>(),
            lbr_alias: None,
        }
    }

    async fn launch(
        &mut self,
        role: Role,
        index: usize,
        shape: &ShapePlan,
        tier: Tier,
        ad: String,
        script: InitScript,
    ) -> Result<NodeFacts> {
        let plan = self.plan;
        let public_key = std::fs::read_to_string(&plan.ssh_public_key).map_err(|e| {
            DrError::config(format!(
                "cannot read SSH public key {}: {}",
                plan.ssh_public_key.display(),
                e
            ))
        })?;
        let name = format!("{}-{}{}", plan.prefix(), role.as_str(), index);
        let spec = json!({
            "compartmentId": plan.compartment_id,
            "availabilityDomain": ad,
            "displayName": name,
            "shape": shape.shape,
            "shapeConfig": { "ocpus": shape.ocpus, "memoryInGBs": shape.memory_gb },
            "sourceDetails": { "sourceType": "image", "imageId": shape.image_id },
            "subnetId": self.topo.subnet(tier),
            "assignPublicIp": !plan.subnet(tier).private,
            "hostnameLabel": format!("{}node{}", role.as_str(), index),
            "metadata": {
                "ssh_authorized_keys": public_key.trim(),
                "user_data": script.user_data(),
            },
        });
        let address = format!("instance.{}.{}", role.as_str(), index);
        let instance = self
            .ensure(&address, ResourceKind::Instance, &name, None, spec)
            .await?;
        let private_ip = self.api.instance_private_ip(&instance.id).await?;
        self.set_extra(&address, &[("private_ip", private_ip.as_str())])?;
        tracing::info!(instance = %name, ip = %private_ip, ad = %ad, "Instance ready");
        Ok(NodeFacts {
            index,
            id: instance.id,
            private_ip,
            availability_domain: ad,
        })
    }

    /// Step 12. WLS node `i` shares its block volume's AD.
    pub(crate) async fn wls_instances(&mut self) -> Result<()> {
        let plan = self.plan;
        for i in 1..=plan.wls_count {
            let ad = match self.topo.volumes.get(i - 1) {
                Some((_, ad)) => ad.clone(),
                None => plan.placement(i, &self.topo.availability_domains)?.to_string(),
            };
            let script = self.wls_init_script(i);
            let node = self.launch(Role::Wls, i, &plan.wls_shape, Tier::Mid, ad, script).await?;
            self.topo.wls_nodes.push(node);
        }
        Ok(())
    }

    /// Step 13.
    pub(crate) async fn ohs_instances(&mut self) -> Result<()> {
        let plan = self.plan;
        let Some(shape) = &plan.ohs_shape else {
            return Ok(());
        };
        for j in 1..=plan.ohs_count {
            let ad = plan.placement(j, &self.topo.availability_domains)?.to_string();
            let script = self.ohs_init_script();
            let node = self.launch(Role::Ohs, j, shape, Tier::Web, ad, script).await?;
            self.topo.ohs_nodes.push(node);
        }
        Ok(())
    }

    fn node_target(&self, ip: &str) -> HostTarget {
        HostTarget::new(ip, CLOUD_SSH_USER, &self.plan.ssh_private_key)
    }

    async fn node_host(&self, ip: &str) -> Result<std::sync::Arc<RemoteHost>> {
        self.pool.get(&self.node_target(ip)).await
    }

    /// Step 14. A node whose script did not finish is reported, not fatal.
    pub(crate) async fn check_init_scripts(&mut self) -> Result<()> {
        tracing::info!(wait_s = self.init_grace.as_secs(), "Waiting for instance init scripts");
        tokio::time::sleep(self.init_grace).await;
        let nodes: Vec<(Role, NodeFacts)> = self
            .topo
            .wls_nodes
            .iter()
            .map(|n| (Role::Wls, n.clone()))
            .chain(self.topo.ohs_nodes.iter().map(|n| (Role::Ohs, n.clone())))
            .collect();
        for (role, node) in nodes {
            let checked = async {
                let host = self.node_host(&node.private_ip).await?;
                let out = host.run_as(&RunAs::Root, &format!("cat {}", INIT_LOG), true).await?;
                OutputMatcher::contains(patterns::INIT_SUCCESS, &out.stdout, false)
            }
            .await;
            match checked {
                Ok(true) => tracing::info!(role = role.as_str(), node = node.index, "Init script succeeded"),
                Ok(false) => tracing::warn!(
                    role = role.as_str(),
                    node = node.index,
                    ip = %node.private_ip,
                    log = INIT_LOG,
                    "Init script did not report SUCCESS"
                ),
                Err(e) => tracing::warn!(
                    role = role.as_str(),
                    node = node.index,
                    ip = %node.private_ip,
                    error = %e,
                    "Could not check init script"
                ),
            }
        }
        Ok(())
    }

    /// Step 15. Attach each block volume, log in over iSCSI, format once,
    /// mount by UUID on the private config path.
    pub(crate) async fn attach_volumes(&mut self) -> Result<()> {
        let plan = self.plan;
        let pairs: Vec<(NodeFacts, String)> = self
            .topo
            .wls_nodes
            .iter()
            .cloned()
            .zip(self.topo.volumes.iter().map(|(id, _)| id.clone()))
            .collect();
        for (node, volume_id) in pairs {
            let name = format!("{}-wls{}-bva", plan.prefix(), node.index);
            let spec = json!({
                "instanceId": node.id,
                "volumeId": volume_id,
                "type": "iscsi",
                "displayName": name,
            });
            let address = format!("volume_attachment.wls.{}", node.index);
            let mut attachment = self
                .ensure(&address, ResourceKind::VolumeAttachment, &name, None, spec)
                .await?;
            if attachment.attr("iqn").is_none() {
                attachment = self.api.get(ResourceKind::VolumeAttachment, &attachment.id).await?;
            }
            let iqn = attachment
                .attr("iqn")
                .ok_or_else(|| DrError::sdk("attach volume", format!("{} reports no iqn", attachment.id)))?
                .to_string();
            let ipv4 = attachment.attr("ipv4").unwrap_or_default().to_string();
            let port = attachment.attrs.get("port").and_then(Value::as_u64).unwrap_or(3260);

            let host = self.node_host(&node.private_ip).await?;
            for cmd in iscsi_login_commands(&iqn, &ipv4, port) {
                // Login fails harmlessly when a resumed run is already logged in.
                host.run_as(&RunAs::Root, &cmd, true).await?;
            }
            let device = iscsi_device(&iqn, &ipv4, port);
            let probe = host.run_as(&RunAs::Root, &format!("blkid {}", device), true).await?;
            if OutputMatcher::extract(patterns::BLKID_UUID, &probe.stdout)?.is_none() {
                tracing::info!(node = node.index, device = %device, "Formatting block volume");
                host.run_as(&RunAs::Root, &format!("mkfs.xfs -f {}", device), false).await?;
            }
            let probe = host.run_as(&RunAs::Root, &format!("blkid {}", device), false).await?;
            let uuid = OutputMatcher::require(patterns::BLKID_UUID, &probe.stdout, "blkid")?;

            let mount_point = &plan.private_config_path;
            let fstab = format!("UUID={} {} xfs defaults,_netdev,nofail 0 2", uuid, mount_point);
            let script = format!(
                "mkdir -p {mp} && (grep -q 'UUID={uuid} ' /etc/fstab || echo '{fstab}' >> /etc/fstab) \
                 && (mountpoint -q {mp} || mount {mp}) && chown {user}:{group} {mp}",
                mp = mount_point,
                uuid = uuid,
                fstab = fstab,
                user = plan.os_user,
                group = plan.os_group
            );
            host.run_as(&RunAs::Root, &script, false).await?;
            self.set_extra(&address, &[("uuid", uuid.as_str()), ("device", device.as_str())])?;
            tracing::info!(node = node.index, uuid = %uuid, mount = %mount_point, "Block volume mounted");
        }
        Ok(())
    }
}
