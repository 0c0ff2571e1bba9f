//! Local cron dispatcher
//!
//! Attempts run on tokio's blocking pool. A `Retry` transition re-dispatches the same
//! run after its delay; nothing inside an attempt waits.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use metricflow_engine::{Flow, RunStatus, TaskRun, Transition};

/// Drive one run of `task` until it reaches a terminal state
///
/// Returns `None` when an attempt panicked.
pub async fn drive(flow: Arc<Flow>, task: String) -> Option<TaskRun> {
    let mut run = TaskRun::new(task);
    loop {
        let attempt_flow = flow.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let transition = run.attempt(&attempt_flow);
            (run, transition)
        })
        .await;

        let (returned, transition) = match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(target: "dispatcher", error = %e, "Task attempt panicked");
                return None;
            }
        };
        run = returned;

        match transition {
            Ok(Transition::Retry { after, .. }) => tokio::time::sleep(after).await,
            Ok(_) => return Some(run),
            Err(e) => {
                tracing::error!(target: "dispatcher", task = %run.task(), error = %e, "Cannot attempt task");
                return Some(run);
            }
        }
    }
}

/// Names of enabled tasks, sorted
fn enabled_tasks(flow: &Flow) -> Vec<String> {
    let mut names: Vec<String> = flow
        .tasks()
        .iter()
        .filter(|t| t.enabled)
        .map(|t| t.name.clone())
        .collect();
    names.sort();
    names
}

/// Tasks whose next fire time is not after `now`
pub fn due_tasks(schedule: &BTreeMap<String, DateTime<Utc>>, now: DateTime<Utc>) -> Vec<String> {
    schedule
        .iter()
        .filter(|(_, next)| **next <= now)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Dispatches the enabled tasks of a flow
pub struct Dispatcher {
    flow: Arc<Flow>,
}

impl Dispatcher {
    pub fn new(flow: Arc<Flow>) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    /// Run every enabled task once, concurrently
    pub async fn run_once(&self) -> Vec<TaskRun> {
        let mut set = JoinSet::new();
        for name in enabled_tasks(&self.flow) {
            set.spawn(drive(self.flow.clone(), name));
        }

        let mut runs = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(e) => tracing::error!(target: "dispatcher", error = %e, "Task run aborted"),
            }
        }
        runs.sort_by(|a, b| a.task().cmp(b.task()));
        runs
    }

    /// Run tasks on their cron schedules until `shutdown` resolves
    ///
    /// Runs still in flight at shutdown are awaited.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let now = Utc::now();
        let mut schedule = BTreeMap::new();
        for name in enabled_tasks(&self.flow) {
            if let Some(next) = self.flow.task(&name).and_then(|t| t.next_run(now)) {
                schedule.insert(name, next);
            }
        }
        if schedule.is_empty() {
            tracing::warn!(target: "dispatcher", "No enabled task has an upcoming schedule");
        }

        let mut running = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let Some(earliest) = schedule.values().min().copied() else {
                (&mut shutdown).await;
                break;
            };
            let wait = (earliest - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "dispatcher", "Received shutdown signal");
                    break;
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_completion(joined);
                }
                _ = tokio::time::sleep(wait) => {
                    let now = Utc::now();
                    for name in due_tasks(&schedule, now) {
                        tracing::debug!(target: "dispatcher", task = %name, "Dispatching task");
                        running.spawn(drive(self.flow.clone(), name.clone()));

                        match self.flow.task(&name).and_then(|t| t.next_run(now)) {
                            Some(next) => {
                                schedule.insert(name, next);
                            }
                            None => {
                                schedule.remove(&name);
                            }
                        }
                    }
                }
            }
        }

        while let Some(joined) = running.join_next().await {
            log_completion(joined);
        }
    }
}

fn log_completion(joined: Result<Option<TaskRun>, tokio::task::JoinError>) {
    match joined {
        Ok(None) => {}
        Ok(Some(run)) if run.status() == RunStatus::Failed || run.status() == RunStatus::Aborted => {
            tracing::debug!(
                target: "dispatcher",
                task = %run.task(),
                status = %run.status(),
                attempts = run.attempts(),
                "Task run ended unsuccessfully"
            );
        }
        Ok(Some(run)) => {
            tracing::trace!(target: "dispatcher", task = %run.task(), status = %run.status(), "Task run completed");
        }
        Err(e) => tracing::error!(target: "dispatcher", error = %e, "Task run aborted"),
    }
}
