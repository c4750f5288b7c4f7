pub mod poller;
pub mod retry;

pub use poller::{poll, poll_until, Observed, PollBudget, PollFailure, PollOutcome};
pub use retry::with_retry;
