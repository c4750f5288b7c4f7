pub mod loader;
pub mod types;
pub mod validator;

pub use loader::{load_dr_config, load_replication_config, load_tree};
pub use types::{
    ConfigTree, DbSiteConfig, DirectoriesConfig, DrConfig, EnvConfig, GeneralConfig, JdbcConfig,
    ManagedServerRef, OptionsConfig, ReplicationConfig, Scope, WlsSiteConfig,
};
