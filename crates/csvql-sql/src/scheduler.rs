//! Job scheduler
//!
//! A throwaway worker pool for one query run. Each scheduled worker id gets
//! its own tokio task and a single-slot inbox, so dispatching to one worker
//! never waits on another. Finished workers push their [`JobResult`] onto one
//! shared result queue and bump a completion counter; [`Scheduler::results`]
//! waits for every worker through a [`JoinSet`] and then closes the queue.
//!
//! All workers share one [`Deadline`]. It is cancelled by [`Scheduler::close`]
//! or by a timer task when the run's time budget is spent. Jobs are
//! synchronous and run on the blocking pool; they are expected to poll
//! [`Deadline::is_done`] and return early with partial results.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::SqlError;
use crate::types::ProjectedRow;
use crate::Result;

/// Small integer naming a worker slot.
pub type WorkerId = usize;

// ---------------------------------------------------------------------------
// Worker state
// ---------------------------------------------------------------------------

/// Lifecycle of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unscheduled,
    Scheduled,
    Running,
    Finished,
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Cancellation signal plus a time bound shared by every job of a run.
///
/// Cancellation is a `watch` flag that only ever goes from `false` to `true`.
#[derive(Debug, Clone)]
pub struct Deadline {
    cancel_tx: Arc<watch::Sender<bool>>,
    expires_at: Instant,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            cancel_tx: Arc::new(watch::Sender::new(false)),
            expires_at: now.checked_add(timeout).unwrap_or(now + Duration::from_secs(86_400 * 365)),
        }
    }

    /// Cancelled, or past the time bound.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Resolves once the deadline is cancelled.
    pub async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel
        let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ---------------------------------------------------------------------------
// Jobs and results
// ---------------------------------------------------------------------------

/// Outcome of one job.
#[derive(Debug, Default)]
pub struct JobResult {
    pub id: WorkerId,
    /// Projected rows in production order
    pub payload: Vec<ProjectedRow>,
    /// Fatal errors; `payload` is empty when this is not
    pub errors: Vec<SqlError>,
    /// The job stopped early because the deadline fired
    pub deadline_exceeded: bool,
}

impl JobResult {
    pub fn rows(id: WorkerId, payload: Vec<ProjectedRow>) -> Self {
        Self {
            id,
            payload,
            ..Default::default()
        }
    }

    pub fn failed(id: WorkerId, error: SqlError) -> Self {
        Self {
            id,
            errors: vec![error],
            ..Default::default()
        }
    }

    fn abandoned(id: WorkerId) -> Self {
        Self {
            id,
            deadline_exceeded: true,
            ..Default::default()
        }
    }
}

type JobFn = Box<dyn FnOnce(WorkerId, Deadline) -> JobResult + Send + 'static>;

struct Dispatch {
    job: JobFn,
    deadline: Deadline,
}

// ---------------------------------------------------------------------------
// Internal bookkeeping
// ---------------------------------------------------------------------------

struct WorkerSlot {
    state: Arc<watch::Sender<WorkerState>>,
    inbox_tx: mpsc::Sender<Dispatch>,
    inbox_rx: Option<mpsc::Receiver<Dispatch>>,
    has_job: bool,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Worker pool for a single query run.
pub struct Scheduler {
    workers: BTreeMap<WorkerId, WorkerSlot>,
    deadline: Deadline,
    completed: Arc<AtomicUsize>,
    results_tx: Option<mpsc::UnboundedSender<JobResult>>,
    results_rx: mpsc::UnboundedReceiver<JobResult>,
    tasks: JoinSet<()>,
    timer: Option<JoinHandle<()>>,
    started: bool,
    collected: bool,
}

impl Scheduler {
    /// Create a scheduler whose shared deadline expires after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            workers: BTreeMap::new(),
            deadline: Deadline::new(timeout),
            completed: Arc::new(AtomicUsize::new(0)),
            results_tx: Some(results_tx),
            results_rx,
            tasks: JoinSet::new(),
            timer: None,
            started: false,
            collected: false,
        }
    }

    /// The deadline shared by every job of this run.
    pub fn deadline(&self) -> Deadline {
        self.deadline.clone()
    }

    /// Register a worker slot for `id`.
    pub fn schedule(&mut self, id: WorkerId) -> Result<()> {
        if self.started {
            return Err(SqlError::Scheduler(format!(
                "cannot schedule worker {id} after start"
            )));
        }
        if self.workers.contains_key(&id) {
            return Err(SqlError::DuplicateWorker(id));
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(WorkerState::Scheduled);
        self.workers.insert(
            id,
            WorkerSlot {
                state: Arc::new(state),
                inbox_tx,
                inbox_rx: Some(inbox_rx),
                has_job: false,
            },
        );
        debug!(worker_id = id, "worker scheduled");
        Ok(())
    }

    /// Address a job to worker `id`. Never blocks.
    pub fn send<F>(&mut self, id: WorkerId, job: F, deadline: Deadline) -> Result<()>
    where
        F: FnOnce(WorkerId, Deadline) -> JobResult + Send + 'static,
    {
        let slot = self
            .workers
            .get_mut(&id)
            .ok_or(SqlError::UnknownWorker(id))?;
        if slot.has_job {
            return Err(SqlError::JobAlreadySent(id));
        }

        slot.inbox_tx
            .try_send(Dispatch {
                job: Box::new(job),
                deadline,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SqlError::JobAlreadySent(id),
                mpsc::error::TrySendError::Closed(_) => {
                    SqlError::Scheduler(format!("worker {id} is no longer accepting jobs"))
                }
            })?;
        slot.has_job = true;
        Ok(())
    }

    /// Spawn one task per scheduled worker and the deadline timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(SqlError::Scheduler("scheduler already started".to_string()));
        }
        if self.workers.is_empty() {
            return Err(SqlError::Scheduler("no workers scheduled".to_string()));
        }
        if let Some((id, _)) = self.workers.iter().find(|(_, slot)| !slot.has_job) {
            return Err(SqlError::Scheduler(format!("worker {id} has no job")));
        }
        let results_tx = self
            .results_tx
            .clone()
            .ok_or_else(|| SqlError::Scheduler("result queue already closed".to_string()))?;

        for (&id, slot) in self.workers.iter_mut() {
            let Some(inbox) = slot.inbox_rx.take() else {
                continue;
            };
            self.tasks.spawn(run_worker(
                id,
                inbox,
                self.deadline.clone(),
                slot.state.clone(),
                results_tx.clone(),
                self.completed.clone(),
            ));
        }

        let deadline = self.deadline.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline.remaining()) => {
                    debug!("deadline expired, cancelling workers");
                    deadline.cancel();
                }
                _ = deadline.cancelled() => {}
            }
        }));

        self.started = true;
        info!(workers = self.workers.len(), "scheduler started");
        Ok(())
    }

    /// Wait for every worker and return their results.
    ///
    /// Results arrive in completion order. The result queue is closed here,
    /// once, after the completion counter reaches the scheduled count.
    pub async fn results(&mut self) -> Result<Vec<JobResult>> {
        if !self.started {
            return Err(SqlError::Scheduler("results requested before start".to_string()));
        }
        if self.collected {
            return Err(SqlError::Scheduler("results already collected".to_string()));
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task failed");
            }
        }

        let finished = self.completed.load(Ordering::Acquire);
        self.results_tx.take();
        self.collected = true;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let mut results = Vec::with_capacity(finished);
        while let Some(result) = self.results_rx.recv().await {
            results.push(result);
        }

        if finished != self.workers.len() {
            return Err(SqlError::Scheduler(format!(
                "{finished} of {} workers finished",
                self.workers.len()
            )));
        }

        Ok(results)
    }

    /// Cancel the shared deadline. Workers that have not picked up their job
    /// yet abandon it; running jobs see [`Deadline::is_done`].
    pub fn close(&self) {
        self.deadline.cancel();
        debug!("scheduler closed");
    }

    pub fn state(&self, id: WorkerId) -> WorkerState {
        self.workers
            .get(&id)
            .map(|slot| *slot.state.borrow())
            .unwrap_or(WorkerState::Unscheduled)
    }

    pub fn scheduled_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

async fn run_worker(
    id: WorkerId,
    mut inbox: mpsc::Receiver<Dispatch>,
    shared: Deadline,
    state: Arc<watch::Sender<WorkerState>>,
    results: mpsc::UnboundedSender<JobResult>,
    completed: Arc<AtomicUsize>,
) {
    let dispatch = tokio::select! {
        biased;
        _ = shared.cancelled() => None,
        dispatch = inbox.recv() => dispatch,
    };

    let result = match dispatch {
        None => {
            debug!(worker_id = id, "worker abandoned its job");
            JobResult::abandoned(id)
        }
        Some(Dispatch { job, deadline }) => {
            state.send_replace(WorkerState::Running);
            debug!(worker_id = id, "job started");
            match tokio::task::spawn_blocking(move || job(id, deadline)).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(worker_id = id, error = %e, "job panicked");
                    JobResult::failed(id, SqlError::JobPanicked(id))
                }
            }
        }
    };

    state.send_replace(WorkerState::Finished);
    if results.send(result).is_err() {
        warn!(worker_id = id, "result queue closed before job finished");
    }
    completed.fetch_add(1, Ordering::AcqRel);
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn row(value: &str) -> ProjectedRow {
        ProjectedRow::from([("v".to_string(), value.to_string())])
    }

    #[tokio::test]
    async fn test_single_job() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        assert_eq!(scheduler.state(1), WorkerState::Unscheduled);

        scheduler.schedule(1).unwrap();
        assert_eq!(scheduler.state(1), WorkerState::Scheduled);

        scheduler
            .send(1, |id, _| JobResult::rows(id, vec![row("a")]), scheduler.deadline())
            .unwrap();
        scheduler.start().unwrap();

        let results = scheduler.results().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[0].payload, vec![row("a")]);
        assert!(!results[0].deadline_exceeded);
        assert_eq!(scheduler.state(1), WorkerState::Finished);
    }

    #[tokio::test]
    async fn test_multiple_workers() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        for id in 0..4 {
            scheduler.schedule(id).unwrap();
        }
        for id in (0..4).rev() {
            scheduler
                .send(id, |id, _| JobResult::rows(id, vec![row(&id.to_string())]), scheduler.deadline())
                .unwrap();
        }
        scheduler.start().unwrap();

        let mut ids: Vec<_> = scheduler.results().await.unwrap().iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_worker() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        scheduler.schedule(7).unwrap();
        assert!(matches!(scheduler.schedule(7), Err(SqlError::DuplicateWorker(7))));
        assert_eq!(scheduler.scheduled_count(), 1);
    }

    #[tokio::test]
    async fn test_send_errors() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        let deadline = scheduler.deadline();
        assert!(matches!(
            scheduler.send(1, |id, _| JobResult::rows(id, vec![]), deadline.clone()),
            Err(SqlError::UnknownWorker(1))
        ));

        scheduler.schedule(1).unwrap();
        scheduler
            .send(1, |id, _| JobResult::rows(id, vec![]), deadline.clone())
            .unwrap();
        assert!(matches!(
            scheduler.send(1, |id, _| JobResult::rows(id, vec![]), deadline),
            Err(SqlError::JobAlreadySent(1))
        ));
    }

    #[tokio::test]
    async fn test_start_requires_jobs() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        assert!(scheduler.start().is_err());

        scheduler.schedule(1).unwrap();
        assert!(matches!(scheduler.start(), Err(SqlError::Scheduler(_))));
    }

    #[tokio::test]
    async fn test_results_before_start() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        assert!(scheduler.results().await.is_err());
    }

    #[tokio::test]
    async fn test_close_before_start_abandons_jobs() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        scheduler.schedule(1).unwrap();

        let flag = ran.clone();
        scheduler
            .send(
                1,
                move |id, _| {
                    flag.store(true, Ordering::SeqCst);
                    JobResult::rows(id, vec![row("x")])
                },
                scheduler.deadline(),
            )
            .unwrap();

        scheduler.close();
        scheduler.start().unwrap();
        let results = scheduler.results().await.unwrap();

        assert!(!ran.load(Ordering::SeqCst));
        assert!(results[0].deadline_exceeded);
        assert!(results[0].payload.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_stops_long_job() {
        let mut scheduler = Scheduler::new(Duration::from_millis(50));
        scheduler.schedule(1).unwrap();
        scheduler
            .send(
                1,
                |id, deadline| {
                    let mut payload = Vec::new();
                    while !deadline.is_done() {
                        if payload.len() < 3 {
                            payload.push(row("partial"));
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    JobResult {
                        id,
                        payload,
                        errors: Vec::new(),
                        deadline_exceeded: true,
                    }
                },
                scheduler.deadline(),
            )
            .unwrap();
        scheduler.start().unwrap();

        let results = scheduler.results().await.unwrap();
        assert!(results[0].deadline_exceeded);
        assert_eq!(results[0].payload.len(), 3);
        assert!(scheduler.deadline().is_done());
    }

    #[tokio::test]
    async fn test_panicking_job_is_isolated() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        scheduler.schedule(1).unwrap();
        scheduler.schedule(2).unwrap();
        scheduler
            .send(1, |_, _| panic!("boom"), scheduler.deadline())
            .unwrap();
        scheduler
            .send(2, |id, _| JobResult::rows(id, vec![row("ok")]), scheduler.deadline())
            .unwrap();
        scheduler.start().unwrap();

        let mut results = scheduler.results().await.unwrap();
        results.sort_by_key(|r| r.id);

        assert!(matches!(results[0].errors[..], [SqlError::JobPanicked(1)]));
        assert!(results[1].errors.is_empty());
        assert_eq!(results[1].payload, vec![row("ok")]);
    }

    #[tokio::test]
    async fn test_results_collected_once() {
        let mut scheduler = Scheduler::new(Duration::from_secs(5));
        scheduler.schedule(0).unwrap();
        scheduler
            .send(0, |id, _| JobResult::rows(id, vec![]), scheduler.deadline())
            .unwrap();
        scheduler.start().unwrap();

        scheduler.results().await.unwrap();
        assert!(scheduler.results().await.is_err());
        assert!(scheduler.start().is_err());
    }

    #[test]
    fn test_deadline_expiry() {
        let deadline = Deadline::new(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(deadline.is_done());
        assert!(!deadline.is_cancelled());

        let deadline = Deadline::new(Duration::from_secs(60));
        assert!(!deadline.is_done());
        deadline.cancel();
        assert!(deadline.is_done());
    }
}
