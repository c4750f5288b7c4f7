use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;

/// How one workflow step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// The state already held, nothing was changed.
    NoOp,
    /// Failed, but the workflow carried on.
    Warning(String),
    Failed(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Done => f.write_str("done"),
            StepOutcome::NoOp => f.write_str("no-op"),
            StepOutcome::Warning(m) => write!(f, "warning: {}", m),
            StepOutcome::Failed(m) => write!(f, "failed: {}", m),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// Ordered record of what a workflow did.
#[derive(Debug)]
pub struct WorkflowReport {
    pub workflow: String,
    pub steps: Vec<StepRecord>,
    started: Instant,
}

impl WorkflowReport {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            steps: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, outcome: StepOutcome, elapsed: Duration) {
        self.steps.push(StepRecord {
            name: name.into(),
            outcome,
            elapsed,
        });
    }

    /// Run `fut` as step `name`; the outcome is recorded either way.
    pub async fn step<T, F>(&mut self, name: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tracing::info!(workflow = %self.workflow, step = name, "Starting step");
        let began = Instant::now();
        match fut.await {
            Ok(v) => {
                self.record(name, StepOutcome::Done, began.elapsed());
                Ok(v)
            }
            Err(e) => {
                tracing::error!(workflow = %self.workflow, step = name, error = %e, "Step failed");
                self.record(name, StepOutcome::Failed(e.to_string()), began.elapsed());
                Err(e)
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed_step().is_none()
    }
}
