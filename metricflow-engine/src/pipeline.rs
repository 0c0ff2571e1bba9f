//! Task run state machine
//!
//! ```text
//! Pending -> Running -> Finished | Skipped
//!                    -> Retrying -> Running ...
//!                    -> Failed   (retry budget exhausted)
//!                    -> Aborted  (control error, never retried)
//! ```
//!
//! One [`TaskRun::attempt`] executes the whole pipeline synchronously: fetch, extract,
//! transform, freeze, emit. A failed attempt returns [`Transition::Retry`] and leaves the
//! run in `Retrying`; dispatching the next attempt after the delay is up to the caller.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use metricflow_core::MetricFrame;
use metricflow_interfaces::{ModuleError, ModuleResult};
use metricflow_resilience::RetryDecision;

use crate::error::TaskError;
use crate::extract::record_metrics;
use crate::flow::Flow;
use crate::task::Task;

/// Status of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Pending,
    Running,
    Retrying,
    Finished,
    Skipped,
    Failed,
    Aborted,
}

impl RunStatus {
    /// Whether no further attempt may be made
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Finished | RunStatus::Skipped | RunStatus::Failed | RunStatus::Aborted
        )
    }

    /// Terminal states reached without error
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Retrying => "retrying",
            RunStatus::Finished => "finished",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }

    /// Numeric code reported to observers of a run
    pub fn code(&self) -> u8 {
        match self {
            RunStatus::Finished => 0,
            RunStatus::Skipped => 1,
            RunStatus::Failed => 2,
            RunStatus::Aborted => 3,
            RunStatus::Pending => 4,
            RunStatus::Running => 5,
            RunStatus::Retrying => 6,
        }
    }
}

impl TryFrom<u8> for RunStatus {
    type Error = TaskError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => RunStatus::Finished,
            1 => RunStatus::Skipped,
            2 => RunStatus::Failed,
            3 => RunStatus::Aborted,
            4 => RunStatus::Pending,
            5 => RunStatus::Running,
            6 => RunStatus::Retrying,
            other => return Err(TaskError::UnknownStatus(other)),
        })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Finished,
    Skipped,
    /// Attempt again after `after`; `retry` counts retries so far
    Retry { after: Duration, retry: u32 },
    Failed,
    Aborted,
}

impl Transition {
    /// Status the run is left in
    pub fn status(&self) -> RunStatus {
        match self {
            Transition::Finished => RunStatus::Finished,
            Transition::Skipped => RunStatus::Skipped,
            Transition::Retry { .. } => RunStatus::Retrying,
            Transition::Failed => RunStatus::Failed,
            Transition::Aborted => RunStatus::Aborted,
        }
    }
}

/// Failure of an attempt with the module that raised it
#[derive(Debug)]
pub struct AttemptFailure {
    pub module: String,
    pub error: ModuleError,
    pub elapsed: Duration,
}

/// One scheduled execution of a task, including its retries
#[derive(Debug)]
pub struct TaskRun {
    id: Uuid,
    task: String,
    status: RunStatus,
    attempts: u32,
    last_failure: Option<AttemptFailure>,
}

impl TaskRun {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            status: RunStatus::Pending,
            attempts: 0,
            last_failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Diagnostics of the most recent failed attempt
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.last_failure.as_ref()
    }

    /// Execute one attempt of the run
    pub fn attempt(&mut self, flow: &Flow) -> Result<Transition, TaskError> {
        if !matches!(self.status, RunStatus::Pending | RunStatus::Retrying) {
            return Err(TaskError::InvalidTransition {
                task: self.task.clone(),
                status: self.status.to_string(),
            });
        }

        let task = flow
            .task(&self.task)
            .ok_or_else(|| TaskError::UnknownTask(self.task.clone()))?;

        if self.attempts == 0 {
            flow.recent_task_ids().push(Utc::now(), self.id);
            tracing::info!(target: "task", task = %task.name, id = %self.id, "Running Task with id {}.", self.id);
        }

        self.status = RunStatus::Running;
        self.attempts += 1;
        let started = Instant::now();
        let mut last_module = String::from("<None>");

        let outcome = execute(flow, task, &mut last_module);
        let elapsed = started.elapsed();

        let transition = match outcome {
            Ok(status) => {
                let transition = match completed(status) {
                    Ok(transition) => transition,
                    Err(e) => {
                        self.status = RunStatus::Failed;
                        tracing::error!(
                            target: "task",
                            task = %task.name,
                            status = %status,
                            "Task run ended in an unrecognized state"
                        );
                        return Err(e);
                    }
                };
                let verb = if transition == Transition::Skipped {
                    "skipped after"
                } else {
                    "finished in"
                };
                tracing::info!(
                    target: "task",
                    task = %task.name,
                    "Task {} {:.3}s",
                    verb,
                    elapsed.as_secs_f64()
                );
                transition
            }
            Err(error) => self.handle_failure(flow, task, last_module, error, elapsed),
        };

        self.status = transition.status();
        Ok(transition)
    }

    fn handle_failure(
        &mut self,
        flow: &Flow,
        task: &Task,
        module: String,
        error: ModuleError,
        elapsed: Duration,
    ) -> Transition {
        let decision = task.retry.decide(self.attempts, &error);
        let detail = if flow.settings().print_traceback {
            error_chain(&error)
        } else {
            error.to_string()
        };

        let transition = match decision {
            RetryDecision::Retry { after, retry } => {
                tracing::warn!(
                    target: "task",
                    task = %task.name,
                    module = %module,
                    class = error.class(),
                    error = %detail,
                    elapsed = format!("{:.3}s", elapsed.as_secs_f64()),
                    "Retrying {}/{} times.",
                    retry,
                    task.retry.max_retries
                );
                Transition::Retry { after, retry }
            }
            RetryDecision::Exhausted => {
                tracing::error!(
                    target: "task",
                    task = %task.name,
                    module = %module,
                    class = error.class(),
                    error = %detail,
                    elapsed = format!("{:.3}s", elapsed.as_secs_f64()),
                    "Exhausted retries, terminating task."
                );
                Transition::Failed
            }
            RetryDecision::Abort => {
                tracing::warn!(
                    target: "task",
                    task = %task.name,
                    module = %module,
                    error = %detail,
                    "Task interrupted, not retrying."
                );
                Transition::Aborted
            }
        };

        self.last_failure = Some(AttemptFailure {
            module,
            error,
            elapsed,
        });
        transition
    }
}

/// Transition for the status a completed pipeline run returned
///
/// Only `Finished` and `Skipped` end a run without error; any other status is a bug.
fn completed(status: RunStatus) -> Result<Transition, TaskError> {
    match status {
        RunStatus::Finished => Ok(Transition::Finished),
        RunStatus::Skipped => Ok(Transition::Skipped),
        other => Err(TaskError::UnknownStatus(other.code())),
    }
}

fn error_chain(error: &ModuleError) -> String {
    let mut rendered = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        rendered.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    rendered
}

/// Run the pipeline once, returning `Finished` or `Skipped`
fn execute(flow: &Flow, task: &Task, last_module: &mut String) -> ModuleResult<RunStatus> {
    let source = flow
        .source(&task.source)
        .ok_or_else(|| ModuleError::config(format!("source `{}` is not built", task.source)))?;

    let created_at = source.modifiers.apply(Utc::now());
    let mut frame = MetricFrame::with_timestamp(&task.name, created_at, flow.metric_options());
    tracing::debug!(target: "task", task = %task.name, "Generated empty frame.");

    *last_module = source.info.name.clone();
    tracing::debug!(
        target: "task",
        task = %task.name,
        "Fetching from source {} ({})",
        source.info.name,
        source.info.type_name
    );
    let records = source.module.fetch(task.params.clone())?;

    let mut metrics = Vec::new();
    for record in records {
        metrics.extend(record_metrics(
            &frame,
            record,
            &task.result,
            &task.static_attributes,
        ));
    }
    frame.replace_all(metrics)?;

    if frame.is_empty() {
        return Ok(RunStatus::Skipped);
    }

    for transform in flow.transforms_for(&source.info.name, &task.name) {
        *last_module = transform.info.name.clone();
        tracing::debug!(
            target: "task",
            task = %task.name,
            "Passing frame[s={}] to transform {} ({}).",
            frame.len(),
            transform.info.name,
            transform.info.type_name
        );
        transform.module.apply(&mut frame)?;
    }

    tracing::debug!(target: "task", task = %task.name, "Freezing frame[s={}].", frame.len());
    frame.freeze();

    for sink in flow.sinks_for(&source.info.name, &task.name) {
        *last_module = sink.info.name.clone();
        tracing::debug!(
            target: "task",
            task = %task.name,
            "Passing frame[s={}] to sink {} ({}).",
            frame.len(),
            sink.info.name,
            sink.info.type_name
        );
        let mut copy = frame.copy();
        sink.modifiers.apply_to_frame(&mut copy)?;
        sink.module.emit(copy)?;
    }

    Ok(RunStatus::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Retrying,
            RunStatus::Finished,
            RunStatus::Skipped,
            RunStatus::Failed,
            RunStatus::Aborted,
        ] {
            assert_eq!(RunStatus::try_from(status.code()).unwrap(), status);
        }
    }

    #[test]
    fn test_completed_run_accepts_only_success_states() {
        assert_eq!(completed(RunStatus::Finished), Ok(Transition::Finished));
        assert_eq!(completed(RunStatus::Skipped), Ok(Transition::Skipped));
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Retrying,
            RunStatus::Failed,
            RunStatus::Aborted,
        ] {
            assert_eq!(
                completed(status),
                Err(TaskError::UnknownStatus(status.code()))
            );
        }
    }

    #[test]
    fn test_unknown_status_code_is_an_error() {
        assert_eq!(RunStatus::try_from(42), Err(TaskError::UnknownStatus(42)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Finished.is_success());
        assert!(RunStatus::Skipped.is_success());
        assert!(RunStatus::Failed.is_terminal() && !RunStatus::Failed.is_success());
        assert!(RunStatus::Aborted.is_terminal());
        assert!(!RunStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_transition_status() {
        let retry = Transition::Retry {
            after: Duration::from_secs(1),
            retry: 1,
        };
        assert_eq!(retry.status(), RunStatus::Retrying);
        assert_eq!(Transition::Skipped.status(), RunStatus::Skipped);
    }
}
