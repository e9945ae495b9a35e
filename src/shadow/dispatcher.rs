//! Asynchronous shadow execution
//!
//! Routing hands shadow jobs to a bounded queue with `try_send` and returns
//! immediately. A fixed pool of worker tasks drains the queue, runs each job
//! through the caller-supplied [`ShadowExecutor`] and feeds the outcome back
//! into the [`ShadowCoordinator`]. A sweeper task expires stale pending
//! records on an interval.

use crate::config::ShadowSection;
use crate::shadow::coordinator::ShadowCoordinator;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Errors a shadow execution can report
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShadowExecutionError {
    #[error("Shadow agent '{agent_id}' failed: {message}")]
    Failed { agent_id: String, message: String },

    #[error("Shadow execution timed out after {0:?}")]
    Timeout(Duration),
}

impl ShadowExecutionError {
    pub fn failed<A: Into<String>, M: Into<String>>(agent_id: A, message: M) -> Self {
        Self::Failed {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }
}

/// Invokes a shadow agent with a tagged request copy
///
/// ```rust
/// use agent_router::shadow::{ShadowExecutionError, ShadowExecutor};
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct Constant;
///
/// #[async_trait]
/// impl ShadowExecutor for Constant {
///     async fn execute(
///         &self,
///         _shadow_agent_id: &str,
///         _request: &Value,
///     ) -> Result<Value, ShadowExecutionError> {
///         Ok(json!({"status": "ok"}))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let result = Constant.execute("canary", &json!({})).await.unwrap();
/// assert_eq!(result["status"], "ok");
/// # });
/// ```
#[async_trait]
pub trait ShadowExecutor: Send + Sync {
    async fn execute(
        &self,
        shadow_agent_id: &str,
        request: &Value,
    ) -> Result<Value, ShadowExecutionError>;
}

/// Why a job could not be queued
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Shadow dispatch queue is full")]
    QueueFull,
    #[error("Shadow dispatcher is shut down")]
    Closed,
}

/// One queued shadow execution
#[derive(Debug, Clone)]
pub struct ShadowJob {
    pub test_id: String,
    pub shadow_agent_id: String,
    pub request: Value,
}

/// Worker pool draining the shadow queue
pub struct ShadowDispatcher {
    sender: RwLock<Option<mpsc::Sender<ShadowJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    coordinator: ShadowCoordinator,
}

impl std::fmt::Debug for ShadowDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowDispatcher")
            .field("running", &self.is_running())
            .finish()
    }
}

impl ShadowDispatcher {
    /// Start the queue, workers and sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        executor: Arc<dyn ShadowExecutor>,
        coordinator: ShadowCoordinator,
        config: &ShadowSection,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let execution_timeout = config.execution_timeout();

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    receiver.clone(),
                    executor.clone(),
                    coordinator.clone(),
                    execution_timeout,
                ))
            })
            .collect::<Vec<_>>();

        let sweeper = spawn_sweeper(coordinator.clone(), config.sweep_interval());

        info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            "Shadow dispatcher started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            sweeper: Mutex::new(Some(sweeper)),
            coordinator,
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Queue a job without waiting. On failure the test is marked failed.
    pub fn try_dispatch(&self, job: ShadowJob) -> Result<(), DispatchError> {
        let test_id = job.test_id.clone();
        let result = match self
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(sender) => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::QueueFull,
                TrySendError::Closed(_) => DispatchError::Closed,
            }),
            None => Err(DispatchError::Closed),
        };

        if let Err(e) = result {
            self.coordinator.mark_failed(&test_id, &e.to_string());
        }
        result
    }

    /// Close the queue, let workers drain it, then stop the sweeper
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Shadow worker shutdown error: {}", e);
                }
            }
        }

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Shadow sweeper shutdown error: {}", e);
                }
            }
        }

        info!("Shadow dispatcher shut down");
    }
}

impl Drop for ShadowDispatcher {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<ShadowJob>>>,
    executor: Arc<dyn ShadowExecutor>,
    coordinator: ShadowCoordinator,
    execution_timeout: Duration,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker_id, "Shadow queue closed, worker stopping");
            break;
        };

        let span = crate::shadow_span!(
            test_id = %job.test_id,
            shadow_agent = %job.shadow_agent_id,
            worker_id
        );
        execute_job(&job, executor.as_ref(), &coordinator, execution_timeout)
            .instrument(span)
            .await;
    }
}

async fn execute_job(
    job: &ShadowJob,
    executor: &dyn ShadowExecutor,
    coordinator: &ShadowCoordinator,
    execution_timeout: Duration,
) {
    let outcome = tokio::time::timeout(
        execution_timeout,
        executor.execute(&job.shadow_agent_id, &job.request),
    )
    .await
    .unwrap_or(Err(ShadowExecutionError::Timeout(execution_timeout)));

    match outcome {
        Ok(result) => {
            debug!("Shadow execution finished");
            coordinator.attach_shadow_result(&job.test_id, result);
        }
        Err(e) => {
            coordinator.mark_failed(&job.test_id, &e.to_string());
        }
    }
}

fn spawn_sweeper(coordinator: ShadowCoordinator, every: Duration) -> JoinHandle<()> {
    // tokio rejects a zero period
    let mut interval = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
    tokio::spawn(async move {
        interval.tick().await; // First tick completes immediately, skip it

        loop {
            interval.tick().await;
            let expired = coordinator.expire_stale();
            if expired > 0 {
                debug!(expired, "Sweeper expired pending shadow tests");
            }
        }
    })
}
