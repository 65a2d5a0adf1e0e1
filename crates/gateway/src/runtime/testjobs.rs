//! Test orchestrator — bounded background validation of ended episodes.
//!
//! An owned scheduler object: fixed worker pool, FIFO queue, per-episode
//! in-flight guard, bounded retries with backoff, and conserved status
//! counters. Lives entirely apart from the live request path; the episode
//! store is the only shared resource.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use ca_clients::{TesterClient, TesterRequest};
use ca_domain::config::{JobsConfig, TesterConfig};
use ca_domain::episode::{Environment, EpisodeStatus, TestOutcome};
use ca_domain::error::{Error, Result};
use ca_engine::apply_diff;
use ca_episodes::{EpisodeStore, ProblemLibrary};

use super::harness::{synthesize_harness, tester_cases};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job & status types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One queued validation unit for an ended episode.
#[derive(Debug, Clone)]
pub struct PendingTestJob {
    pub episode_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Queue counters. Conserved: `pending + in_flight + completed + failed`
/// equals the total number of jobs ever enqueued, at every observation
/// point — external coordination polls this as a drain barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStatus {
    pub fn total(&self) -> u64 {
        self.pending + self.in_flight + self.completed + self.failed
    }

    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }
}

// Counters live behind one mutex rather than four atomics so a concurrent
// reader can never observe a job mid-transition between buckets.
#[derive(Default)]
struct Counters {
    status: Mutex<QueueStatus>,
}

impl Counters {
    fn snapshot(&self) -> QueueStatus {
        *self.status.lock()
    }

    fn enqueued(&self) {
        self.status.lock().pending += 1;
    }

    // A job that never made it into the queue after all.
    fn enqueue_rolled_back(&self) {
        self.status.lock().pending -= 1;
    }

    fn started(&self) {
        let mut s = self.status.lock();
        s.pending -= 1;
        s.in_flight += 1;
    }

    fn finished(&self, ok: bool) {
        let mut s = self.status.lock();
        s.in_flight -= 1;
        if ok {
            s.completed += 1;
        } else {
            s.failed += 1;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-episode guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Explicit registry enforcing at-most-one pending-or-in-flight job per
/// episode. Checked at enqueue, cleared when the job finishes — kept apart
/// from the episode record so orchestrator state never leaks into the
/// store.
struct EpisodeGuard {
    active: Mutex<HashSet<Uuid>>,
}

impl EpisodeGuard {
    fn new() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Claim the episode. `false` when a job is already active for it.
    fn try_acquire(&self, episode_id: Uuid) -> bool {
        self.active.lock().insert(episode_id)
    }

    fn release(&self, episode_id: Uuid) {
        self.active.lock().remove(&episode_id);
    }

    fn is_active(&self, episode_id: Uuid) -> bool {
        self.active.lock().contains(&episode_id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct WorkerCtx {
    store: Arc<EpisodeStore>,
    problems: Arc<ProblemLibrary>,
    tester: Arc<dyn TesterClient>,
    tester_cfg: TesterConfig,
    counters: Arc<Counters>,
    guard: Arc<EpisodeGuard>,
    drained: Arc<Notify>,
}

/// Bounded-concurrency background validator.
pub struct TestOrchestrator {
    tx: Mutex<Option<mpsc::Sender<PendingTestJob>>>,
    store: Arc<EpisodeStore>,
    counters: Arc<Counters>,
    guard: Arc<EpisodeGuard>,
    drained: Arc<Notify>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TestOrchestrator {
    /// Create the queue and spawn the fixed worker pool.
    pub fn start(
        jobs_cfg: &JobsConfig,
        tester_cfg: TesterConfig,
        store: Arc<EpisodeStore>,
        problems: Arc<ProblemLibrary>,
        tester: Arc<dyn TesterClient>,
    ) -> Arc<Self> {
        let cfg = jobs_cfg.clamped();
        let (tx, rx) = mpsc::channel::<PendingTestJob>(cfg.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let counters = Arc::new(Counters::default());
        let guard = Arc::new(EpisodeGuard::new());
        let drained = Arc::new(Notify::new());

        let mut workers = Vec::with_capacity(cfg.workers);
        for worker_id in 0..cfg.workers {
            let rx = rx.clone();
            let ctx = WorkerCtx {
                store: store.clone(),
                problems: problems.clone(),
                tester: tester.clone(),
                tester_cfg: tester_cfg.clone(),
                counters: counters.clone(),
                guard: guard.clone(),
                drained: drained.clone(),
            };
            workers.push(tokio::spawn(worker_loop(worker_id, rx, ctx)));
        }

        tracing::info!(
            workers = cfg.workers,
            queue_capacity = cfg.queue_capacity,
            "test orchestrator started"
        );

        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            store,
            counters,
            guard,
            drained,
            workers: Mutex::new(workers),
        })
    }

    /// Enqueue a validation job for an ended episode.
    ///
    /// Rejects unknown episodes, episodes that are not `Ended`/`TestsPending`,
    /// and duplicate jobs for an episode that already has one pending or in
    /// flight. On success the episode is marked `TestsPending`.
    pub fn enqueue(&self, episode_id: Uuid) -> Result<()> {
        let episode = self
            .store
            .get(episode_id)
            .ok_or_else(|| Error::NotFound(format!("episode {episode_id}")))?;

        match episode.status {
            EpisodeStatus::Ended | EpisodeStatus::TestsPending => {}
            other => {
                return Err(Error::InvalidTransition(format!(
                    "episode {episode_id} is {other}, cannot queue validation"
                )));
            }
        }

        if !self.guard.try_acquire(episode_id) {
            return Err(Error::InvalidTransition(format!(
                "a validation job is already pending or in flight for episode {episode_id}"
            )));
        }

        if let Err(e) = self.store.mark_tests_pending(episode_id) {
            self.guard.release(episode_id);
            return Err(e);
        }

        let job = PendingTestJob {
            episode_id,
            enqueued_at: Utc::now(),
            attempts: 0,
        };

        // Count before sending: a worker may dequeue the instant the send
        // lands, and `pending` must already cover the job by then.
        self.counters.enqueued();
        let send_result = {
            let tx = self.tx.lock();
            match tx.as_ref() {
                Some(tx) => tx.try_send(job),
                None => {
                    self.counters.enqueue_rolled_back();
                    self.guard.release(episode_id);
                    return Err(Error::Other("test orchestrator is shut down".into()));
                }
            }
        };

        if let Err(e) = send_result {
            // Episode stays TestsPending — accurate, and retriable later.
            self.counters.enqueue_rolled_back();
            self.guard.release(episode_id);
            return Err(Error::Other(format!("validation queue rejected job: {e}")));
        }

        tracing::info!(episode_id = %episode_id, "validation job enqueued");
        Ok(())
    }

    /// Current queue counters.
    pub fn queue_status(&self) -> QueueStatus {
        self.counters.snapshot()
    }

    /// Whether an episode currently has a job pending or in flight.
    pub fn has_active_job(&self, episode_id: Uuid) -> bool {
        self.guard.is_active(episode_id)
    }

    /// Wait until the queue is fully drained (no pending, no in-flight).
    pub async fn drain(&self) {
        loop {
            if self.counters.snapshot().is_drained() {
                return;
            }
            // The timeout covers the window where a job finishes between
            // the check above and the wait registering.
            let _ = tokio::time::timeout(
                Duration::from_millis(50),
                self.drained.notified(),
            )
            .await;
        }
    }

    /// Graceful shutdown: stop accepting jobs, let workers finish whatever
    /// is already queued, and join them.
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "test worker panicked during shutdown");
            }
        }
        tracing::info!("test orchestrator stopped");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingTestJob>>>,
    ctx: WorkerCtx,
) {
    loop {
        // Workers park on `recv` — cooperative waiting, no polling. The
        // mutex only serializes who waits next, not job execution.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            tracing::debug!(worker_id, "queue closed, worker exiting");
            break;
        };

        let episode_id = job.episode_id;
        ctx.counters.started();
        tracing::info!(worker_id, episode_id = %episode_id, "validation job started");

        let outcome = validate_episode(&ctx, job).await;
        let ok = outcome.is_ok();
        if let Err(e) = outcome {
            // The episode stays TestsPending: "ran but failed to complete"
            // is distinguishable from "not yet run", and nothing is faked.
            tracing::warn!(
                worker_id,
                episode_id = %episode_id,
                error = %e,
                "validation job failed"
            );
        } else {
            tracing::info!(worker_id, episode_id = %episode_id, "validation job completed");
        }

        ctx.guard.release(episode_id);
        ctx.counters.finished(ok);
        ctx.drained.notify_waiters();
    }
}

/// Validate every unvalidated state of one episode.
///
/// Merging is per-state: each verdict is attached as soon as it arrives, so
/// a later failure never rolls back earlier results.
async fn validate_episode(ctx: &WorkerCtx, mut job: PendingTestJob) -> Result<()> {
    let episode = ctx
        .store
        .get(job.episode_id)
        .ok_or_else(|| Error::NotFound(format!("episode {}", job.episode_id)))?;

    let problem = ctx.problems.get(&episode.problem_id).ok_or_else(|| {
        Error::Other(format!(
            "problem '{}' not in library, cannot synthesize harness",
            episode.problem_id
        ))
    })?;

    let harness = synthesize_harness(problem);
    let cases = tester_cases(problem);

    for (state_index, state) in episode.states.iter().enumerate() {
        if state.env.is_some() {
            // Already merged by an earlier (partially successful) job.
            continue;
        }

        let code = apply_diff(&state.code, &state.diff);
        let request = TesterRequest {
            code,
            harness: harness.clone(),
            cases: cases.clone(),
        };

        let verdict = run_with_retry(ctx, &mut job, request).await?;
        let env = Environment {
            compiled: verdict.compiled,
            tests: verdict
                .results
                .into_iter()
                .map(|r| TestOutcome {
                    name: r.name,
                    passed: r.passed,
                    time_ms: r.time_ms,
                })
                .collect(),
            execution_time_ms: verdict.execution_time_ms,
        };

        ctx.store
            .attach_test_result(job.episode_id, state_index, env)?;
    }

    ctx.store.mark_tests_complete(job.episode_id)?;
    Ok(())
}

/// Call the tester with bounded retries and exponential backoff. Only
/// transient failures retry; the attempt limit is per job.
async fn run_with_retry(
    ctx: &WorkerCtx,
    job: &mut PendingTestJob,
    request: TesterRequest,
) -> Result<ca_clients::TesterResponse> {
    let max_attempts = ctx.tester_cfg.max_attempts.max(1);
    loop {
        job.attempts += 1;
        match ctx.tester.run_tests(request.clone()).await {
            Ok(verdict) => return Ok(verdict),
            Err(e) if e.is_transient() && job.attempts < max_attempts => {
                let backoff = Duration::from_millis(
                    ctx.tester_cfg.backoff_ms << (job.attempts - 1).min(16),
                );
                tracing::warn!(
                    episode_id = %job.episode_id,
                    attempt = job.attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "tester call failed, will retry"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
