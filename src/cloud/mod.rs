pub mod api;
pub mod oci_cli;

pub use api::{CloudApi, CloudResource, ResourceKind};
pub use oci_cli::OciCli;
