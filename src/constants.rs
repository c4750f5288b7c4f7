//! Fixed names, timings and the vendor-output regex table.
//!
//! Every pattern matched against remote output lives in [`patterns`]; no other
//! module spells a regex for vendor text.

use std::time::Duration;

/// Prefix of per-invocation staging directories on remote hosts.
pub const STAGING_PREFIX: &str = "/tmp/DRS-";

/// Mask written over secrets in log lines.
pub const SECRET_MASK: &str = "********";

// ─── Timings ────────────────────────────────────────────────────────────────

pub const SERVER_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DG_RETRY_DELAY: Duration = Duration::from_secs(180);
pub const NM_SETTLE_DELAY: Duration = Duration::from_secs(45);
pub const SHUTDOWN_TIMEOUT_S: u64 = 600;
pub const DEFAULT_START_TIMEOUT_S: u64 = 1800;
pub const DEFAULT_STOP_TIMEOUT_S: u64 = 900;
pub const INIT_SCRIPT_GRACE: Duration = Duration::from_secs(180);
pub const REBOOT_PROBE_INTERVAL: Duration = Duration::from_secs(10);
pub const CLOUD_RETRIES: u32 = 4;
pub const CLOUD_RETRY_BASE: Duration = Duration::from_secs(5);

// ─── Remote scripts ─────────────────────────────────────────────────────────

/// Names of the scripts shipped under `remote_scripts/`.
pub mod scripts {
    pub const DB_IS_CLUSTER: &str = "db_get_is_cluster.sh";
    pub const DB_NAME: &str = "db_get_db_name.sh";
    pub const DB_UNIQUE_NAME: &str = "db_get_db_unique_name.sh";
    pub const DB_COMMON: &str = "db_common.sh";
    pub const DG_SHOW_CONFIGURATION_VERBOSE: &str = "dg_show_configuration_verbose.sh";
    pub const DG_CONVERT_TO_SNAPSHOT: &str = "dg_convert_to_snapshot_standby.sh";
    pub const DG_CONVERT_TO_PHYSICAL: &str = "dg_convert_to_physical_standby.sh";
    pub const DG_SWITCHOVER: &str = "dg_switchover_to_standby_db.sh";
    pub const DG_FAILOVER: &str = "dg_failover_to_standby_db.sh";
    pub const DG_REINSTATE: &str = "dg_reinstate_db.sh";

    pub const WLS_ADMIN_CONTROL: &str = "wls_admin_control.py";
    pub const WLS_NM_CONTROL: &str = "wls_nm_control.py";
    pub const WLS_COMMON: &str = "wls_common.py";

    pub const HOST_GET_OSINFO: &str = "host_get_osinfo.sh";

    pub const FMW_PRIMARY_CHECK_DB_CONNECTIVITY: &str = "fmw_primary_check_db_connectivity.sh";
    pub const FMW_PRIMARY_CHECK_CONNECTIVITY_TO_STBY_ADMIN: &str =
        "fmw_primary_check_connectivity_to_stby_admin.sh";
    pub const FMW_DR_SETUP_PRIMARY: &str = "fmw_dr_setup_primary.sh";
    pub const FMW_STANDBY_CHECK_DB_CONNECTIVITY: &str = "fmw_standby_check_db_connectivity.sh";
    pub const FMW_DR_SETUP_STANDBY: &str = "fmw_dr_setup_standby.sh";
    pub const FMW_DR_COMMON: &str = "fmw_dr_common.sh";
}

/// Status tokens printed by the WLS control scripts.
pub mod tokens {
    pub const ERROR_WHILE_CONNECTING_TO_NM: &str = "ERROR_WHILE_CONNECTING_TO_NM";
    pub const ERROR: &str = "ERROR";
    pub const RUNNING: &str = "RUNNING";
    pub const SUCCESS: &str = "SUCCESS";
}

// ─── Regex table ────────────────────────────────────────────────────────────

pub mod patterns {
    use regex::escape;

    /// Broker role descriptions as printed by `show configuration verbose`.
    pub const ROLE_PRIMARY: &str = "Primary database";
    pub const ROLE_PHYSICAL_STANDBY: &str = "Physical standby database";
    pub const ROLE_SNAPSHOT_STANDBY: &str = "Snapshot standby database";

    /// Top-level broker verdict; group 1 is the status word.
    pub const DG_CONFIGURATION_STATUS: &str = r"Configuration Status:\s*(\w+)";

    /// `v$parameter cluster_database` value.
    pub const DB_CLUSTER_VALUE: &str = r"(?im)^\s*(TRUE|FALSE)\s*$";

    pub const ADMIN_SERVER_STATUS: &str = r"ADMIN SERVER STATUS = (\S+)";
    pub const MANAGED_SERVER_STATUS: &str = r"MANAGED SERVER STATUS = (\S+)";
    pub const NODE_MANAGER_VERSION: &str = r"NODE MANAGER VERSION = (\S+)";
    pub const NM_CONNECT_ERROR: &str = r"ERROR_WHILE_CONNECTING_TO_NM";
    pub const RUNNING: &str = r"\bRUNNING\b";
    pub const ERROR: &str = r"\bERROR\b";

    /// `KEY=VALUE` lines printed by `host_get_osinfo.sh`; groups: key, value.
    pub const OSINFO_LINE: &str = r"(?m)^([A-Z_]+)=(.*)$";

    /// Marker the instance init script appends to its log on success.
    pub const INIT_SUCCESS: &str = r"(?m)^SUCCESS\s*$";

    /// `blkid` output; group 1 is the filesystem UUID.
    pub const BLKID_UUID: &str = r#"\bUUID="([0-9A-Fa-f-]+)""#;

    /// One line of `rsync -i` itemized output; group 1 is the path.
    pub const RSYNC_ITEMIZED: &str = r"^(?:[<>ch.*][fdLDS][^ ]{9}|\*deleting)\s+(.+)$";

    /// Paths that never count as replication divergence.
    pub const RSYNC_NOISE: &str = r"(?i)(\.log(\.\d+)?$|\.out(\d+)?$|\.DAT$|/logs?/|/tmp/)";

    /// OHS `Listen` directive; group 1 is the port.
    pub const OHS_LISTEN: &str = r"(?im)^\s*Listen\s+(?:\S*:)?(\d+)\s*$";

    /// OHS `<VirtualHost host:port>`; group 1 is the port.
    pub const OHS_VIRTUAL_HOST: &str = r"(?im)^\s*<VirtualHost\s+[^>]*?:(\d+)\s*>";

    /// OHS `ServerName`; group 1 host, group 2 optional port.
    pub const OHS_SERVER_NAME: &str = r"(?im)^\s*ServerName\s+(?:https?://)?([^:\s/]+)(?::(\d+))?";

    /// A literal IPv4 address.
    pub const IPV4_LITERAL: &str = r"^\d{1,3}(?:\.\d{1,3}){3}$";

    /// `<db> - <role>` line in the broker configuration listing.
    pub fn dg_member_role(db_unique_name: &str, role: &str) -> String {
        format!(r"(?im)^\s*{}\s+-\s+{}", escape(db_unique_name), escape(role))
    }

    pub fn dg_converted(db_unique_name: &str) -> String {
        format!(
            r#"(?i)Database "{}" converted successfully"#,
            escape(db_unique_name)
        )
    }

    pub fn dg_switchover_succeeded(new_primary: &str) -> String {
        format!(
            r#"(?i)Switchover succeeded, new primary is "{}""#,
            escape(new_primary)
        )
    }

    pub fn dg_failover_succeeded(new_primary: &str) -> String {
        format!(
            r#"(?i)Failover succeeded, new primary is "{}""#,
            escape(new_primary)
        )
    }

    pub fn dg_reinstated(db_unique_name: &str) -> String {
        format!(
            r#"(?i)Reinstatement of database "{}" succeeded"#,
            escape(db_unique_name)
        )
    }

    /// Case-insensitive occurrence of a tnsnames value. Host names contain
    /// `-` and `.`, so token boundaries are checked by the caller.
    pub fn tns_token(value: &str) -> String {
        format!(r"(?i){}", escape(value))
    }
}
