use std::path::PathBuf;
use std::time::Duration;

use crate::config::{GeneralConfig, WlsSiteConfig};

/// Everything the server drivers need to reach one WebLogic domain.
#[derive(Debug, Clone)]
pub struct WlsParams {
    pub domain_name: String,
    pub domain_dir: String,
    pub mw_home: String,
    /// OS user that owns the domain and runs the vendor shells.
    pub os_user: String,
    pub admin_host: String,
    pub admin_port: u16,
    pub admin_server_name: String,
    pub wls_user: String,
    pub wls_password: String,
    pub nm_port: u16,
    pub nm_type: String,
    pub nm_user: String,
    pub nm_password: String,
    pub scripts_dir: PathBuf,
    pub nm_settle: Duration,
}

impl WlsParams {
    pub fn from_site(site: &WlsSiteConfig, general: &GeneralConfig) -> Self {
        Self {
            domain_name: site.domain_name.clone(),
            domain_dir: site.domain_dir.clone(),
            mw_home: site.mw_home.clone(),
            os_user: site.os_user.clone(),
            admin_host: site.admin_host.clone(),
            admin_port: site.admin_port,
            admin_server_name: site.admin_server_name.clone(),
            wls_user: site.wls_user.clone(),
            wls_password: site.wls_password.clone(),
            nm_port: site.nm_port,
            nm_type: site.nm_type.clone(),
            nm_user: site.nm_user.clone(),
            nm_password: site.nm_password.clone(),
            scripts_dir: general.scripts_dir.clone(),
            nm_settle: general.nm_settle,
        }
    }

    pub fn admin_url(&self) -> String {
        format!("t3://{}:{}", self.admin_host, self.admin_port)
    }

    /// The administration shell used as interpreter for the control scripts.
    pub fn wlst(&self) -> String {
        format!("{}/oracle_common/common/bin/wlst.sh", self.mw_home)
    }

    /// Leading argv for every node manager call against `nm_host`.
    pub fn nm_args(&self, nm_host: &str) -> Vec<String> {
        vec![
            nm_host.to_string(),
            self.nm_port.to_string(),
            self.nm_type.clone(),
            self.nm_user.clone(),
            self.nm_password.clone(),
            self.domain_name.clone(),
            self.domain_dir.clone(),
        ]
    }

    /// Leading argv for every call through the administration server.
    pub fn admin_args(&self) -> Vec<String> {
        vec![
            self.admin_url(),
            self.wls_user.clone(),
            self.wls_password.clone(),
        ]
    }

    pub fn secrets(&self) -> [&str; 2] {
        [&self.wls_password, &self.nm_password]
    }
}
