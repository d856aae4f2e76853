//! Asynchronous observation of remote tasks
//!
//! A [`TaskFuture`] owns a background tokio task that polls the service for
//! the status of one task until it completes, fails, or is cancelled. The
//! latest state is published through a `watch` channel so any number of
//! callers can inspect it or wait on it.

use crate::config::ClientConfig;
use crate::error::{DlhubError, DlhubResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

/// Observed state of a remote task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Completed(Value),
    Failed(String),
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }

    fn label(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Completed(_) => "completed",
            TaskState::Failed(_) => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    /// Interpret a status document; `None` means the task is still running
    pub fn from_status(status: &Value) -> Option<TaskState> {
        let label = status
            .get("status")
            .or_else(|| status.get("task"))
            .and_then(Value::as_str)?;

        match label {
            "COMPLETED" => Some(TaskState::Completed(
                status.get("result").cloned().unwrap_or(Value::Null),
            )),
            "FAILED" | "ERROR" => {
                let reason = ["reason", "error", "result"]
                    .iter()
                    .find_map(|key| status.get(*key))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| format!("task reported {}", label));
                Some(TaskState::Failed(reason))
            }
            _ => None,
        }
    }
}

/// Anything that can report the status of a task
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn task_status(&self, task_id: &str) -> DlhubResult<Value>;
}

/// Polling cadence and retry limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Upper bound for the delay after repeated transient failures
    pub max_backoff: Duration,
    /// Consecutive transient failures tolerated before the task is marked failed
    pub max_transient_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            max_transient_failures: 10,
        }
    }
}

impl From<&ClientConfig> for PollConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_backoff: config.max_poll_backoff(),
            max_transient_failures: config.max_transient_poll_failures,
        }
    }
}

#[derive(Debug, Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to a remote task being polled in the background
///
/// Dropping the handle stops the polling.
#[derive(Debug)]
pub struct TaskFuture {
    task_id: String,
    state: watch::Receiver<TaskState>,
    cancel: Arc<CancelSignal>,
    poller: JoinHandle<()>,
}

impl TaskFuture {
    /// Start polling `task_id` on the current tokio runtime
    pub fn spawn(source: Arc<dyn TaskStatusSource>, task_id: &str, config: PollConfig) -> Self {
        let (tx, rx) = watch::channel(TaskState::Pending);
        let cancel = Arc::new(CancelSignal::default());

        let poller = Poller {
            source,
            task_id: task_id.to_string(),
            config,
            cancel: cancel.clone(),
            state: tx,
        };
        let poller = tokio::spawn(poller.run());

        tracing::debug!(task_id = %task_id, "Started task poller");
        Self {
            task_id: task_id.to_string(),
            state: rx,
            cancel,
            poller,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Latest observed state
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// Stop polling
    ///
    /// Only local polling stops; the remote task keeps running. Has no effect
    /// once the task reached a terminal state.
    pub fn cancel(&self) {
        if !self.is_done() {
            tracing::info!(task_id = %self.task_id, "Cancelling task poller");
        }
        self.cancel.cancel();
    }

    /// Wait for a terminal state, at most `timeout` when given
    ///
    /// Returns the task result on completion. A timeout leaves the poller running.
    pub async fn wait(&self, timeout: Option<Duration>) -> DlhubResult<Value> {
        let mut state = self.state.clone();
        let terminal = async move {
            state
                .wait_for(TaskState::is_terminal)
                .await
                .map(|s| s.clone())
        };

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, terminal)
                .await
                .map_err(|_| DlhubError::Timeout(limit))?,
            None => terminal.await,
        };

        match outcome {
            Ok(TaskState::Completed(result)) => Ok(result),
            Ok(TaskState::Failed(reason)) => Err(DlhubError::TaskFailed {
                task_id: self.task_id.clone(),
                reason,
            }),
            Ok(TaskState::Cancelled) => Err(DlhubError::TaskCancelled(self.task_id.clone())),
            Ok(TaskState::Pending) | Err(_) => Err(DlhubError::TaskFailed {
                task_id: self.task_id.clone(),
                reason: "poller stopped without a result".to_string(),
            }),
        }
    }
}

impl Drop for TaskFuture {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

struct Poller {
    source: Arc<dyn TaskStatusSource>,
    task_id: String,
    config: PollConfig,
    cancel: Arc<CancelSignal>,
    state: watch::Sender<TaskState>,
}

impl Poller {
    async fn run(self) {
        let final_state = self.poll_until_done().await;

        match &final_state {
            TaskState::Completed(_) => {
                tracing::info!(task_id = %self.task_id, "Task completed");
            }
            TaskState::Failed(reason) => {
                tracing::warn!(task_id = %self.task_id, reason = %reason, "Task failed");
            }
            TaskState::Cancelled => {
                tracing::info!(task_id = %self.task_id, "Task polling cancelled");
            }
            TaskState::Pending => {}
        }

        crate::metrics::record_task_outcome(final_state.label());
        self.state.send_replace(final_state);
    }

    async fn poll_until_done(&self) -> TaskState {
        let mut delay = self.config.interval;
        let mut transient_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return TaskState::Cancelled;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.notify.notified() => return TaskState::Cancelled,
            }
            if self.cancel.is_cancelled() {
                return TaskState::Cancelled;
            }

            match self.source.task_status(&self.task_id).await {
                Ok(status) => {
                    crate::metrics::record_task_poll("ok");
                    transient_failures = 0;
                    delay = self.config.interval;

                    if let Some(state) = TaskState::from_status(&status) {
                        return state;
                    }
                    tracing::trace!(task_id = %self.task_id, status = %status, "Task still running");
                }
                Err(e) if e.is_transient() => {
                    crate::metrics::record_task_poll("transient_error");
                    transient_failures += 1;
                    if transient_failures > self.config.max_transient_failures {
                        return TaskState::Failed(format!(
                            "giving up after {} consecutive failures: {}",
                            transient_failures, e
                        ));
                    }

                    delay = (delay * 2).min(self.config.max_backoff);
                    tracing::warn!(
                        task_id = %self.task_id,
                        error = %e,
                        failures = transient_failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Task status check failed, retrying"
                    );
                }
                Err(e) => {
                    crate::metrics::record_task_poll("error");
                    return TaskState::Failed(e.to_string());
                }
            }
        }
    }
}
