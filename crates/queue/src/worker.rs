//! The background queue worker: polls `job_queue`, runs each job's
//! workflow to completion, and reports back to the queue.
//!
//! The queue itself lives in Postgres (`db::repository::jobs`); this
//! module only owns the poll loop and the bridge into
//! `engine::WorkflowExecutor`. Multiple worker processes can run the same
//! loop concurrently — `fetch_next_job`'s `FOR UPDATE SKIP LOCKED` is
//! what keeps them from double-processing a row.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use db::DbPool;
use engine::{EngineError, Workflow, WorkflowExecutor};

use crate::error::QueueError;

/// Tuning knobs for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll `job_queue` when it's empty.
    pub poll_interval: Duration,
    /// Upper bound on jobs this worker processes at once.
    pub max_parallel_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(2), max_parallel_jobs: 4 }
    }
}

/// Polls `job_queue` and drives each job's workflow via a shared
/// [`WorkflowExecutor`].
pub struct Worker {
    pool: DbPool,
    executor: Arc<WorkflowExecutor>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(pool: DbPool, executor: Arc<WorkflowExecutor>, config: WorkerConfig) -> Self {
        Self { pool, executor, config }
    }

    /// Run the poll loop until `shutdown` is cancelled. Returns once every
    /// in-flight job has finished.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("queue worker starting (max_parallel_jobs = {})", self.config.max_parallel_jobs);

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_jobs.max(1)));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match db::repository::jobs::fetch_next_job(&self.pool).await {
                Ok(Some(job)) => {
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    let pool = self.pool.clone();
                    let executor = self.executor.clone();
                    let job_cancellation = shutdown.clone();

                    in_flight.spawn(async move {
                        let _permit = permit;
                        process_job(&pool, &executor, job, job_cancellation).await;
                    });
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!("failed to poll job queue: {e}");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }

            // Drain any jobs that finished without blocking the poll loop.
            while in_flight.try_join_next().is_some() {}
        }

        info!("queue worker shutting down, waiting for {} in-flight jobs", in_flight.len());
        while in_flight.join_next().await.is_some() {}
    }
}

#[instrument(skip(pool, executor, job, cancellation), fields(job_id = %job.id, execution_id = %job.execution_id))]
async fn process_job(
    pool: &DbPool,
    executor: &WorkflowExecutor,
    job: db::models::JobRow,
    cancellation: CancellationToken,
) {
    match run_job(pool, executor, &job, cancellation).await {
        Ok(()) => {
            if let Err(e) = db::repository::jobs::complete_job(pool, job.id).await {
                error!("failed to mark job {} completed: {e}", job.id);
            }
        }
        Err(e) => {
            warn!("job {} failed: {e}", job.id);
            if let Err(e) = db::repository::jobs::fail_job(pool, job.id, job.max_attempts).await {
                error!("failed to mark job {} failed: {e}", job.id);
            }
        }
    }
}

async fn run_job(
    pool: &DbPool,
    executor: &WorkflowExecutor,
    job: &db::models::JobRow,
    cancellation: CancellationToken,
) -> Result<(), QueueError> {
    let workflow_row = db::repository::workflows::get_workflow(pool, job.workflow_id).await?;
    let workflow: Workflow = serde_json::from_value(workflow_row.definition)?;

    let result = executor
        .run_queued(&workflow, job.execution_id, job.payload.clone(), None, cancellation)
        .await?;

    if matches!(result.status, db::models::ExecutionStatus::Failed) {
        return Err(QueueError::Engine(EngineError::NodeFailed {
            node_id: "*".to_string(),
            message: result.error.unwrap_or_else(|| "execution failed".to_string()),
        }));
    }

    Ok(())
}
