use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{DbSiteConfig, GeneralConfig};
use crate::constants::patterns;

/// Data Guard role of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbRole {
    Primary,
    PhysicalStandby,
    SnapshotStandby,
}

impl DbRole {
    /// The role as the broker prints it in its configuration listing.
    pub fn broker_label(&self) -> &'static str {
        match self {
            DbRole::Primary => patterns::ROLE_PRIMARY,
            DbRole::PhysicalStandby => patterns::ROLE_PHYSICAL_STANDBY,
            DbRole::SnapshotStandby => patterns::ROLE_SNAPSHOT_STANDBY,
        }
    }
}

impl fmt::Display for DbRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbRole::Primary => f.write_str("Primary"),
            DbRole::PhysicalStandby => f.write_str("PhysicalStandby"),
            DbRole::SnapshotStandby => f.write_str("SnapshotStandby"),
        }
    }
}

/// Identity columns of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbIdentity {
    pub db_name: String,
    pub db_unique_name: String,
    pub is_cluster: bool,
}

/// One reading of the broker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DgSnapshot {
    pub status: String,
    pub role: Option<DbRole>,
}

impl DgSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case(crate::constants::tokens::SUCCESS)
    }
}

/// What the database driver needs to run vendor scripts on one DB host.
#[derive(Debug, Clone)]
pub struct DbParams {
    pub scripts_dir: PathBuf,
    pub os_user: String,
    pub oracle_home: String,
    pub oracle_sid: String,
    pub db_unique_name: String,
    pub dg_retry_delay: Duration,
}

impl DbParams {
    pub fn from_site(site: &DbSiteConfig, general: &GeneralConfig) -> Self {
        Self {
            scripts_dir: general.scripts_dir.clone(),
            os_user: site.os_user.clone(),
            oracle_home: site.oracle_home.clone(),
            oracle_sid: site.oracle_sid.clone(),
            db_unique_name: site.db_unique_name.clone(),
            dg_retry_delay: general.dg_retry_delay,
        }
    }
}
