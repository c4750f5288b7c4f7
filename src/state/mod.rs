pub mod lock;
pub mod models;
pub mod store;

pub use lock::FileLock;
pub use models::{ResourceRecord, ResourceStatus, StateDocument};
pub use store::StateStore;
