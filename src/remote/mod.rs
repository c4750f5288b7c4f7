pub mod bundle;
pub mod host;
pub mod openssh;
pub mod pool;
pub mod process;
pub mod session;

pub use bundle::{ScriptBundle, ScriptBundleRunner};
pub use host::{RemoteHost, RunAs};
pub use pool::HostPool;
pub use process::{CommandResult, CommandRunner, LocalCommand, LocalRunner};
pub use session::{CommandOutput, HostTarget, RemoteSession, SessionFactory};
