//! Background job scheduler
//!
//! One tokio worker per enabled job ticks on the job's interval. A job never
//! overlaps itself: a tick or a manual trigger that finds the job running is
//! turned away with `Conflict`. Lifecycle events go to the event bus.

use crate::jobs::{Job, JobOutcome};
use chrono::{DateTime, Utc};
use graph_common::config::JobSchedule;
use graph_common::events::{EventBus, GraphEvent};
use graph_common::{Error, Result, SessionContext};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of the latest run of a job
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Completed { processed: usize, transactions: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: RunResult,
}

/// Job state as reported by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub enabled: bool,
    pub interval_secs: u64,
    pub running: bool,
    pub last_run: Option<LastRun>,
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    schedule: JobSchedule,
    running: AtomicBool,
    last_run: RwLock<Option<LastRun>>,
}

/// Clears the running flag when the run ends, including by panic or cancellation
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ScheduledJob {
    fn name(&self) -> &'static str {
        self.job.name()
    }

    async fn execute(&self, events: &EventBus, ctx: &SessionContext) -> Result<JobOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Conflict(format!("Job {} is already running", self.name())));
        }
        let _guard = RunGuard(&self.running);

        let started_at = Utc::now();
        events.emit_lossy(GraphEvent::JobStarted {
            job: self.name().to_string(),
            timestamp: started_at,
        });
        debug!(job = self.name(), "Job started");

        let result = self.job.run(ctx).await;
        let finished_at = Utc::now();
        let elapsed_ms = (finished_at - started_at).num_milliseconds();

        let recorded = match &result {
            Ok(outcome) => {
                info!(
                    job = self.name(),
                    processed = outcome.processed,
                    transactions = outcome.transactions,
                    elapsed_ms,
                    "Job completed"
                );
                events.emit_lossy(GraphEvent::JobCompleted {
                    job: self.name().to_string(),
                    processed: outcome.processed,
                    timestamp: finished_at,
                });
                RunResult::Completed {
                    processed: outcome.processed,
                    transactions: outcome.transactions,
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(job = self.name(), error = %e, elapsed_ms, "Job timed out");
                } else {
                    error!(job = self.name(), error = %e, elapsed_ms, "Job failed");
                }
                events.emit_lossy(GraphEvent::JobFailed {
                    job: self.name().to_string(),
                    reason: e.to_string(),
                    timestamp: finished_at,
                });
                RunResult::Failed { reason: e.to_string() }
            }
        };

        *self.last_run.write().await = Some(LastRun {
            started_at,
            finished_at,
            result: recorded,
        });
        result
    }
}

pub struct JobScheduler {
    jobs: Vec<Arc<ScheduledJob>>,
    events: EventBus,
    ctx: SessionContext,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(events: EventBus) -> Self {
        Self {
            jobs: Vec::new(),
            events,
            ctx: SessionContext::system(),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Add a job; registration order is the order of `run_all`
    pub fn register(&mut self, job: Arc<dyn Job>, schedule: JobSchedule) {
        debug!(job = job.name(), enabled = schedule.enabled, interval_secs = schedule.interval_secs, "Registered job");
        self.jobs.push(Arc::new(ScheduledJob {
            job,
            schedule,
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
        }));
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|entry| entry.name()).collect()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn one worker per enabled job
    ///
    /// The first run happens one interval after start.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        for entry in &self.jobs {
            if !entry.schedule.enabled {
                info!(job = entry.name(), "Job disabled by configuration");
                continue;
            }
            let period = Duration::from_secs(entry.schedule.interval_secs.max(1));
            info!(job = entry.name(), interval_secs = period.as_secs(), "Starting job worker");

            let entry = Arc::clone(entry);
            let events = self.events.clone();
            let ctx = self.ctx.clone().as_scheduled();
            let cancel = self.cancel.clone();

            workers.push(tokio::spawn(async move {
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(job = entry.name(), "Job worker stopping");
                            break;
                        }
                        _ = timer.tick() => {
                            // Failures are logged in execute; the next tick runs normally
                            if let Err(Error::Conflict(_)) = entry.execute(&events, &ctx).await {
                                debug!(job = entry.name(), "Skipping tick, job still running");
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Run one job immediately
    pub async fn run_now(&self, name: &str) -> Result<JobOutcome> {
        let entry = self
            .jobs
            .iter()
            .find(|entry| entry.name() == name)
            .ok_or_else(|| Error::NotFound(format!("Job {}", name)))?;
        entry.execute(&self.events, &self.ctx).await
    }

    /// Run every registered job once, in registration order
    ///
    /// A failed job does not stop the ones after it.
    pub async fn run_all(&self) -> Vec<(&'static str, Result<JobOutcome>)> {
        let mut results = Vec::with_capacity(self.jobs.len());
        for entry in &self.jobs {
            results.push((entry.name(), entry.execute(&self.events, &self.ctx).await));
        }
        results
    }

    pub async fn status(&self) -> Vec<JobStatus> {
        let mut statuses = Vec::with_capacity(self.jobs.len());
        for entry in &self.jobs {
            statuses.push(JobStatus {
                name: entry.name().to_string(),
                enabled: entry.schedule.enabled,
                interval_secs: entry.schedule.interval_secs,
                running: entry.running.load(Ordering::Acquire),
                last_run: entry.last_run.read().await.clone(),
            });
        }
        statuses
    }

    /// Cancel all workers and wait for them to stop
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Job worker ended abnormally");
            }
        }
        info!("Job scheduler stopped");
    }
}
