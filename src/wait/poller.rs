use std::fmt;
use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::Instant;

use crate::error::DrError;

/// A state a poller can observe.
pub trait Observed: PartialEq + fmt::Display {
    /// Connection failures end a poll at once instead of being retried.
    fn is_connection_error(&self) -> bool {
        false
    }
}

/// Why a poll did not reach its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    ConnectionError { last: String },
    TimedOut { last: String, waited: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failure(PollFailure),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success)
    }

    /// Turn a failure into the terminal error for `label`.
    pub fn into_result(self, label: &str, expected: &str) -> crate::Result<()> {
        match self {
            PollOutcome::Success => Ok(()),
            PollOutcome::Failure(PollFailure::ConnectionError { last }) => {
                Err(DrError::Connectivity {
                    host: label.to_string(),
                    message: format!("status probe reported {}", last),
                })
            }
            PollOutcome::Failure(PollFailure::TimedOut { last, waited }) => {
                Err(DrError::StateTimeout {
                    label: label.to_string(),
                    expected: expected.to_string(),
                    last,
                    waited_s: waited.as_secs(),
                })
            }
        }
    }
}

/// Interval and deadline shared by every poll of one workflow.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub interval: Duration,
    pub total: Duration,
    pub start: Instant,
}

impl PollBudget {
    /// A budget whose clock starts now.
    pub fn new(interval: Duration, total: Duration) -> Self {
        Self {
            interval,
            total,
            start: Instant::now(),
        }
    }
}

/// Wait until `status_fn` returns `expected`.
///
/// The budget is `total_timeout - (now - start)`, floored at zero, so callers
/// share one deadline across a whole workflow. The status is always sampled at
/// least once.
pub async fn poll<S, F, Fut>(
    interval: Duration,
    total_timeout: Duration,
    start: Instant,
    status_fn: F,
    expected: &S,
    label: &str,
) -> PollOutcome
where
    S: Observed,
    F: FnMut() -> Fut,
    Fut: Future<Output = S>,
{
    poll_until(interval, total_timeout, start, status_fn, |s| s == expected, label).await
}

/// Like [`poll`] with an arbitrary acceptance predicate.
pub async fn poll_until<S, F, Fut, P>(
    interval: Duration,
    total_timeout: Duration,
    start: Instant,
    mut status_fn: F,
    accept: P,
    label: &str,
) -> PollOutcome
where
    S: Observed,
    F: FnMut() -> Fut,
    Fut: Future<Output = S>,
    P: Fn(&S) -> bool,
{
    let budget = total_timeout.saturating_sub(start.elapsed());
    let began = Instant::now();
    let deadline = began + budget;
    let spinner = spinner(label);

    loop {
        let state = status_fn().await;
        spinner.set_message(format!("{}: {}", label, state));

        if accept(&state) {
            tracing::info!(label = label, state = %state, "Reached expected state");
            spinner.finish_and_clear();
            return PollOutcome::Success;
        }
        if state.is_connection_error() {
            tracing::error!(label = label, state = %state, "Connection error while polling, giving up");
            spinner.finish_and_clear();
            return PollOutcome::Failure(PollFailure::ConnectionError {
                last: state.to_string(),
            });
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::error!(label = label, state = %state, "Polling budget exhausted");
            spinner.finish_and_clear();
            return PollOutcome::Failure(PollFailure::TimedOut {
                last: state.to_string(),
                waited: now - began,
            });
        }

        tracing::debug!(label = label, state = %state, "Not there yet, sleeping");
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

fn spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(250));
    pb
}
