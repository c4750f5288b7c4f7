use std::collections::BTreeSet;
use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Log file the init script appends to; `SUCCESS` is its last line when
/// every command passed.
pub const INIT_LOG: &str = "/var/log/drs_init.log";

/// One NFS mount: `fqdn:/export` on `mount_point`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsMount {
    pub source: String,
    pub mount_point: String,
}

/// Inputs of a node's first-boot script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitScript {
    pub os_user: String,
    pub os_group: String,
    pub uid: u64,
    pub gid: u64,
    /// Directories created and handed to the OS user.
    pub directories: Vec<String>,
    pub mounts: Vec<NfsMount>,
    pub firewall_ports: BTreeSet<u16>,
    /// `(lbr ip, virtual hostnames)` written to `/etc/hosts`.
    pub lbr_alias: Option<(String, Vec<String>)>,
}

impl InitScript {
    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "#!/bin/bash");
        let _ = writeln!(s, "exec >>{} 2>&1", INIT_LOG);
        let _ = writeln!(s, "set -e");
        let _ = writeln!(s, "echo \"init started $(date)\"");
        let _ = writeln!(
            s,
            "getent group {g} >/dev/null || groupadd -g {gid} {g}",
            g = self.os_group,
            gid = self.gid
        );
        let _ = writeln!(
            s,
            "id -u {u} >/dev/null 2>&1 || useradd -u {uid} -g {gid} -m {u}",
            u = self.os_user,
            uid = self.uid,
            gid = self.gid
        );

        for dir in self.directories.iter().chain(self.mounts.iter().map(|m| &m.mount_point)) {
            let _ = writeln!(s, "mkdir -p {}", dir);
        }
        if !self.mounts.is_empty() {
            let _ = writeln!(s, "yum -y -q install nfs-utils || true");
        }
        for m in &self.mounts {
            let line = format!("{} {} nfs defaults,_netdev,nofail,vers=3 0 0", m.source, m.mount_point);
            let _ = writeln!(s, "grep -q '^{src} ' /etc/fstab || echo '{line}' >> /etc/fstab", src = m.source);
            let _ = writeln!(s, "mountpoint -q {mp} || mount {mp}", mp = m.mount_point);
        }
        for dir in self.directories.iter().chain(self.mounts.iter().map(|m| &m.mount_point)) {
            let _ = writeln!(s, "chown {}:{} {}", self.os_user, self.os_group, dir);
        }

        if !self.firewall_ports.is_empty() {
            for port in &self.firewall_ports {
                let _ = writeln!(s, "firewall-cmd --permanent --add-port={}/tcp", port);
            }
            let _ = writeln!(s, "firewall-cmd --reload");
        }

        if let Some((ip, names)) = &self.lbr_alias {
            if !names.is_empty() {
                let entry = format!("{} {}", ip, names.join(" "));
                let _ = writeln!(s, "grep -q '^{ip} ' /etc/hosts || echo '{entry}' >> /etc/hosts");
            }
        }
        let _ = writeln!(s, "echo SUCCESS");
        s
    }

    /// Base64 of the rendered script, as instance metadata carries it.
    pub fn user_data(&self) -> String {
        BASE64.encode(self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wls_script() -> InitScript {
        InitScript {
            os_user: "oracle".into(),
            os_group: "oinstall".into(),
            uid: 1001,
            gid: 1002,
            directories: vec!["/u02/oracle/config".into()],
            mounts: vec![NfsMount {
                source: "fssmt1.fsstier.hydrvcn.oraclevcn.com:/products1".into(),
                mount_point: "/u01/oracle/products".into(),
            }],
            firewall_ports: BTreeSet::from([7001, 5556]),
            lbr_alias: Some(("10.5.1.20".into(), vec!["app.example.com".into()])),
        }
    }

    #[test]
    fn test_render_carries_ids_mounts_ports_and_alias() {
        let text = wls_script().render();
        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains("groupadd -g 1002 oinstall"));
        assert!(text.contains("useradd -u 1001 -g 1002 -m oracle"));
        assert!(text.contains("fssmt1.fsstier.hydrvcn.oraclevcn.com:/products1 /u01/oracle/products nfs"));
        assert!(text.contains("--add-port=5556/tcp"));
        assert!(text.contains("echo '10.5.1.20 app.example.com' >> /etc/hosts"));
        assert!(text.trim_end().ends_with("echo SUCCESS"));
    }

    #[test]
    fn test_no_alias_without_lbr() {
        let script = InitScript {
            lbr_alias: None,
            ..wls_script()
        };
        assert!(!script.render().contains("/etc/hosts"));
        let decoded = BASE64.decode(script.user_data()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), script.render());
    }
}
