// Scan Scheduler - Background job processor
//
// One long-lived dispatch loop hands queued scans to worker tasks, one task
// per running scan, each watched by a supervisor task. The store is the
// single source of truth: every state change is a compare-and-set on the
// stored status, so a cancel accepted by the store wins over any later write
// from the worker.

use super::estimate::{estimate_time_left, ProgressTracker};
use super::queue::FairQueue;
use super::{JobStatus, ScanId, ScanJob, ScanMode};
use crate::db::ScanStore;
use crate::findings::Finding;
use crate::scanner::{PipelineSet, ScanStage, StageContext};
use crate::target::validate_target;
use crate::{Result, ScanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler configuration, the `[scheduler]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scans running at once across all users
    pub max_concurrent_scans: usize,

    /// Scans running at once for a single user
    pub max_concurrent_per_user: usize,

    /// Scans that may wait in the queue
    pub queue_capacity: usize,

    /// Dispatch runs at least this often (milliseconds)
    pub scheduling_quantum_ms: u64,

    /// Extra attempts for a stage failing with a transient error
    pub stage_retries: u32,

    /// Pause between stage attempts (milliseconds)
    pub retry_backoff_ms: u64,

    /// Time a canceled scan gets to stop before its task is aborted (milliseconds)
    pub cancel_grace_ms: u64,

    pub max_runtime_quick_secs: u64,
    pub max_runtime_full_secs: u64,

    /// ETA baselines used until the first progress is reported
    pub baseline_quick_secs: u64,
    pub baseline_full_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 4,
            max_concurrent_per_user: 2,
            queue_capacity: 1000,
            scheduling_quantum_ms: 500,
            stage_retries: 2,
            retry_backoff_ms: 500,
            cancel_grace_ms: 2000,
            max_runtime_quick_secs: 600,
            max_runtime_full_secs: 3600,
            baseline_quick_secs: 60,
            baseline_full_secs: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn baseline(&self, mode: ScanMode) -> Duration {
        match mode {
            ScanMode::Quick => Duration::from_secs(self.baseline_quick_secs),
            ScanMode::Full => Duration::from_secs(self.baseline_full_secs),
        }
    }

    pub fn max_runtime(&self, mode: ScanMode) -> Duration {
        match mode {
            ScanMode::Quick => Duration::from_secs(self.max_runtime_quick_secs),
            ScanMode::Full => Duration::from_secs(self.max_runtime_full_secs),
        }
    }

    fn quantum(&self) -> Duration {
        Duration::from_millis(self.scheduling_quantum_ms.max(1))
    }

    fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Progress update broadcast to stream subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub scan_id: ScanId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_left: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn from_job(job: &ScanJob) -> Self {
        Self {
            scan_id: job.scan_id.clone(),
            status: job.status,
            progress: job.progress,
            stage: job.current_stage.clone(),
            estimated_time_left: job.eta_seconds,
            message: job.error.clone(),
            timestamp: Utc::now(),
        }
    }

    /// No more events follow for this scan
    pub fn is_final(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Last status and progress seen on one stream of events for a scan.
/// Rejects anything older than what was already seen: lower progress,
/// `queued` after `running`, or any event after a final one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCursor {
    last: Option<(JobStatus, u8)>,
}

impl ProgressCursor {
    /// Record `event` if it moves the stream forward
    pub fn admit(&mut self, event: &ProgressEvent) -> bool {
        if let Some((status, progress)) = self.last {
            if status.is_terminal() {
                return false;
            }
            let regressed = (status == JobStatus::Running && event.status == JobStatus::Queued)
                || event.progress < progress;
            if !event.status.is_terminal() && regressed {
                return false;
            }
        }
        self.last = Some((event.status, event.progress));
        true
    }

    /// A final event has been admitted
    pub fn is_closed(&self) -> bool {
        matches!(self.last, Some((status, _)) if status.is_terminal())
    }
}

/// Result of startup recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub failed: usize,
    pub requeued: usize,
}

struct RunningJob {
    owner: String,
    token: CancellationToken,
    abort: AbortHandle,
}

enum StageOutcome {
    Done,
    Canceled,
}

/// Scan scheduler and runner
pub struct Scheduler {
    store: Arc<dyn ScanStore>,
    pipelines: PipelineSet,
    config: SchedulerConfig,
    queue: Mutex<FairQueue>,
    running: Mutex<HashMap<ScanId, RunningJob>>,
    semaphore: Arc<Semaphore>,
    wake: Notify,
    progress_tx: broadcast::Sender<ProgressEvent>,
    /// Per-scan cursor of broadcast events; a worker write that lost a race
    /// with cancel is never published after the final event
    published: SyncMutex<HashMap<ScanId, ProgressCursor>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    /// Create new scheduler
    pub fn new(store: Arc<dyn ScanStore>, pipelines: PipelineSet, config: SchedulerConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_scans.max(1)));
        let (progress_tx, _) = broadcast::channel(1000);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            store,
            pipelines,
            queue: Mutex::new(FairQueue::new(config.queue_capacity)),
            config,
            running: Mutex::new(HashMap::new()),
            semaphore,
            wake: Notify::new(),
            progress_tx,
            published: SyncMutex::new(HashMap::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ScanStore> {
        self.store.clone()
    }

    /// Subscribe to progress updates
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Scans currently running
    pub async fn active_count(&self) -> usize {
        self.running.lock().await.len()
    }

    /// Scans waiting for a slot
    pub async fn queued_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Spawn the dispatch loop on the runtime
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.start().await {
                error!("Scan scheduler stopped: {}", e);
            }
        })
    }

    /// Run the dispatch loop until shutdown
    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!(
            "Starting scan scheduler with {} concurrent slots ({} per user)",
            self.config.max_concurrent_scans, self.config.max_concurrent_per_user
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                info!("Scan scheduler shutting down");
                break;
            }

            self.dispatch().await;

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.quantum()) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        Ok(())
    }

    /// Stop dispatching new scans
    pub fn shutdown(&self) -> Result<()> {
        info!("Initiating scheduler shutdown");
        self.shutdown_tx
            .send(true)
            .map_err(|e| ScanError::FatalScheduler(format!("shutdown signal lost: {}", e)))
    }

    /// Validate and queue a new scan
    pub async fn submit(&self, owner: &str, raw_target: &str, mode: ScanMode) -> Result<ScanJob> {
        let target = validate_target(raw_target)?;
        let job = ScanJob::new(owner, &target, mode);

        {
            let mut queue = self.queue.lock().await;
            if queue.is_full() {
                return Err(ScanError::QueueFull {
                    capacity: self.config.queue_capacity,
                });
            }
            self.store.insert_job(&job).await?;
            queue.push(owner, job.scan_id.clone())?;
        }

        info!(
            "Queued scan {} of {} ({} mode) for {}",
            job.scan_id, job.target, job.mode, owner
        );
        self.publish(&job);
        self.wake.notify_one();
        Ok(job)
    }

    /// Cancel a queued or running scan owned by `owner`
    ///
    /// A compare-and-set that loses to a worker write is retried against the
    /// fresh row. Status and progress only move forward, so the loop ends
    /// either in the cancel or in a terminal status (`Conflict`).
    pub async fn cancel(&self, owner: &str, scan_id: &ScanId) -> Result<ScanJob> {
        let job = loop {
            let mut job = self
                .store
                .get_job(Some(owner), scan_id)
                .await?
                .ok_or_else(|| ScanError::NotFound(format!("Scan {}", scan_id)))?;
            let expected = job.status;
            job.cancel()?;

            match self.store.save_job(expected, &job).await {
                Ok(()) => break job,
                Err(ScanError::Conflict(_)) => {
                    debug!("Cancel of {} raced a concurrent update, retrying", scan_id);
                }
                Err(e) => return Err(e),
            }
        };

        info!("Scan {} canceled by {}", scan_id, owner);
        self.queue.lock().await.remove(scan_id);

        // Published under the running lock so the supervisor cannot forget
        // this scan's cursor before the final event is out
        {
            let running = self.running.lock().await;
            self.publish(&job);
            if let Some(entry) = running.get(scan_id) {
                entry.token.cancel();

                let abort = entry.abort.clone();
                let grace = self.config.cancel_grace();
                let id = scan_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if !abort.is_finished() {
                        warn!("Scan {} did not stop within {:?}, aborting its task", id, grace);
                        abort.abort();
                    }
                });
            } else {
                self.forget_published(scan_id);
            }
        }

        self.wake.notify_one();
        Ok(job)
    }

    /// Fail jobs left running by a previous process and re-queue queued ones
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for mut job in self.store.list_jobs_by_status(JobStatus::Running).await? {
            job.fail("interrupted by restart")?;
            match self.store.save_job(JobStatus::Running, &job).await {
                Ok(()) => {
                    warn!("Scan {} was interrupted by a restart, marked failed", job.scan_id);
                    report.failed += 1;
                }
                Err(ScanError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let queued = self.store.list_jobs_by_status(JobStatus::Queued).await?;
        {
            let mut queue = self.queue.lock().await;
            for job in &queued {
                queue.push_unbounded(&job.owner, job.scan_id.clone());
            }
        }
        report.requeued = queued.len();

        if report.failed > 0 || report.requeued > 0 {
            info!(
                "Recovery: {} interrupted scan(s) failed, {} queued scan(s) restored",
                report.failed, report.requeued
            );
        }
        self.wake.notify_one();
        Ok(report)
    }

    /// Start as many queued scans as the caps allow
    async fn dispatch(self: &Arc<Self>) {
        loop {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                return;
            };

            let mut running = self.running.lock().await;
            let next = {
                let per_user = self.config.max_concurrent_per_user.max(1);
                let mut queue = self.queue.lock().await;
                queue.next(|owner| running.values().filter(|r| r.owner == owner).count() < per_user)
            };

            let Some((owner, scan_id)) = next else {
                return;
            };
            self.launch(&mut running, owner, scan_id, permit);
        }
    }

    fn launch(
        self: &Arc<Self>,
        running: &mut HashMap<ScanId, RunningJob>,
        owner: String,
        scan_id: ScanId,
        permit: OwnedSemaphorePermit,
    ) {
        let token = CancellationToken::new();

        let worker = {
            let scheduler = self.clone();
            let scan_id = scan_id.clone();
            let token = token.clone();
            tokio::spawn(async move { scheduler.run_job(scan_id, token).await })
        };

        running.insert(
            scan_id.clone(),
            RunningJob {
                owner,
                token,
                abort: worker.abort_handle(),
            },
        );

        let scheduler = self.clone();
        tokio::spawn(async move {
            let outcome = worker.await;
            scheduler.finish(&scan_id, outcome).await;
            drop(permit);
            scheduler.wake.notify_one();
        });
    }

    /// Supervisor side of a worker that has exited
    async fn finish(&self, scan_id: &ScanId, outcome: std::result::Result<(), JoinError>) {
        self.running.lock().await.remove(scan_id);

        if let Err(e) = outcome {
            if e.is_panic() {
                error!("Scan {} worker panicked", scan_id);
                self.fail_stored(scan_id, "internal error: scan task panicked").await;
            } else {
                debug!("Scan {} worker aborted", scan_id);
            }
        }
        self.forget_published(scan_id);
    }

    async fn run_job(self: Arc<Self>, scan_id: ScanId, token: CancellationToken) {
        let mut job = match self.store.get_job(None, &scan_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Scan {} disappeared before it could start", scan_id);
                return;
            }
            Err(e) => {
                error!("Failed to load scan {}: {}", scan_id, e);
                return;
            }
        };

        if job.status != JobStatus::Queued || job.start().is_err() {
            debug!("Scan {} is {}, not starting", scan_id, job.status);
            return;
        }

        match self.store.save_job(JobStatus::Queued, &job).await {
            Ok(()) => {}
            Err(ScanError::Conflict(_)) => {
                debug!("Scan {} was canceled before it started", scan_id);
                return;
            }
            Err(e) => {
                error!("Failed to start scan {}: {}", scan_id, e);
                return;
            }
        }

        info!(
            "Starting scan {} for target {} ({} mode)",
            job.scan_id, job.target, job.mode
        );
        self.publish(&job);

        let max_runtime = self.config.max_runtime(job.mode);
        let outcome = match tokio::time::timeout(max_runtime, self.execute(&mut job, &token)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ScanError::Timeout {
                duration: max_runtime,
            }),
        };

        match outcome {
            Ok(Some(findings)) => self.complete(job, findings).await,
            Ok(None) => info!("Scan {} stopped after cancellation", scan_id),
            Err(e) => self.fail(job, e).await,
        }
    }

    /// Run every stage. `Ok(None)` means the scan was canceled.
    async fn execute(
        &self,
        job: &mut ScanJob,
        token: &CancellationToken,
    ) -> Result<Option<Vec<Finding>>> {
        let target = validate_target(&job.target)?;
        let pipeline = self.pipelines.for_mode(job.mode).clone();
        let mut tracker = ProgressTracker::new(pipeline.total_weight());
        let mut ctx = StageContext::new(job.scan_id.clone(), target, job.mode);

        for stage in pipeline.stages() {
            if token.is_cancelled() {
                return Ok(None);
            }

            tracker.begin_stage(stage.weight());
            if !self.record(job, tracker.current(), Some(stage.name())).await? {
                return Ok(None);
            }

            if let StageOutcome::Canceled = self
                .run_stage_with_retries(stage.as_ref(), &mut ctx, job, &mut tracker, token)
                .await?
            {
                return Ok(None);
            }

            let progress = tracker.finish_stage();
            if !self.record(job, progress, None).await? {
                return Ok(None);
            }
        }

        Ok(Some(ctx.into_findings()))
    }

    async fn run_stage_with_retries(
        &self,
        stage: &dyn ScanStage,
        ctx: &mut StageContext,
        job: &mut ScanJob,
        tracker: &mut ProgressTracker,
        token: &CancellationToken,
    ) -> Result<StageOutcome> {
        let mut attempt = 0;
        loop {
            let snapshot = ctx.snapshot();
            match self.run_stage(stage, ctx, job, tracker, token).await {
                Err(e) if e.is_transient() && attempt < self.config.stage_retries => {
                    attempt += 1;
                    warn!(
                        "Stage {} of scan {} failed (attempt {}/{}): {}",
                        stage.name(),
                        job.scan_id,
                        attempt,
                        self.config.stage_retries + 1,
                        e
                    );
                    ctx.restore(snapshot);
                    tokio::select! {
                        _ = token.cancelled() => return Ok(StageOutcome::Canceled),
                        _ = tokio::time::sleep(self.config.retry_backoff()) => {}
                    }
                }
                other => return other,
            }
        }
    }

    /// Run one stage attempt, persisting intra-stage progress as it arrives.
    /// Cancellation drops the stage future, aborting its in-flight I/O.
    async fn run_stage(
        &self,
        stage: &dyn ScanStage,
        ctx: &mut StageContext,
        job: &mut ScanJob,
        tracker: &mut ProgressTracker,
        token: &CancellationToken,
    ) -> Result<StageOutcome> {
        let (fraction_tx, mut fraction_rx) = watch::channel(0.0f64);
        ctx.set_progress_sink(fraction_tx);

        let outcome = {
            let fut = stage.run(ctx, token.clone());
            tokio::pin!(fut);
            let mut fractions_open = true;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break Ok(StageOutcome::Canceled),
                    result = &mut fut => break result.map(|_| StageOutcome::Done),
                    changed = fraction_rx.changed(), if fractions_open => {
                        if changed.is_err() {
                            fractions_open = false;
                            continue;
                        }
                        let fraction = *fraction_rx.borrow_and_update();
                        let progress = tracker.checkpoint(fraction);
                        if progress > job.progress && !self.record(job, progress, None).await? {
                            break Ok(StageOutcome::Canceled);
                        }
                    }
                }
            }
        };

        ctx.clear_progress_sink();
        outcome
    }

    /// Persist progress; `false` when the store no longer has the job running
    async fn record(&self, job: &mut ScanJob, progress: u8, stage: Option<&str>) -> Result<bool> {
        let effective = progress.max(job.progress);
        let eta = estimate_time_left(self.config.baseline(job.mode), job.elapsed(), effective);
        job.record_progress(progress, stage, Some(eta.as_secs()))?;

        match self.store.save_job(JobStatus::Running, job).await {
            Ok(()) => {
                debug!(
                    "Scan {} at {}% ({})",
                    job.scan_id,
                    job.progress,
                    job.current_stage.as_deref().unwrap_or("-")
                );
                self.publish(job);
                Ok(true)
            }
            Err(ScanError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn complete(&self, mut job: ScanJob, findings: Vec<Finding>) {
        if let Err(e) = job.complete() {
            error!("Scan {} cannot complete: {}", job.scan_id, e);
            return;
        }

        match self.store.complete_job(&job, &findings).await {
            Ok(()) => {
                info!(
                    "Scan {} completed with {} finding(s) in {:?}",
                    job.scan_id,
                    findings.len(),
                    job.elapsed()
                );
                self.publish(&job);
            }
            Err(ScanError::Conflict(_)) => {
                info!(
                    "Scan {} was canceled before completion, discarding {} finding(s)",
                    job.scan_id,
                    findings.len()
                );
            }
            Err(e) => {
                error!("Failed to store results of scan {}: {}", job.scan_id, e);
                self.fail_stored(&job.scan_id, &format!("could not store results: {}", e))
                    .await;
            }
        }
    }

    async fn fail(&self, mut job: ScanJob, err: ScanError) {
        let reason = err.to_string();
        error!("Scan {} failed: {}", job.scan_id, reason);

        if job.fail(reason).is_err() {
            return;
        }
        match self.store.save_job(JobStatus::Running, &job).await {
            Ok(()) => self.publish(&job),
            Err(ScanError::Conflict(_)) => {
                debug!("Scan {} already left running, failure not recorded", job.scan_id)
            }
            Err(e) => error!("Failed to record failure of scan {}: {}", job.scan_id, e),
        }
    }

    /// Fail a job from outside its worker (after a panic or a store error)
    async fn fail_stored(&self, scan_id: &ScanId, reason: &str) {
        let job = match self.store.get_job(None, scan_id).await {
            Ok(Some(job)) if job.status == JobStatus::Running => job,
            Ok(_) => return,
            Err(e) => {
                error!("Failed to load scan {}: {}", scan_id, e);
                return;
            }
        };
        self.fail(job, ScanError::FatalScheduler(reason.to_string()))
            .await;
    }

    fn publish(&self, job: &ScanJob) {
        let event = ProgressEvent::from_job(job);
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        if !published.entry(job.scan_id.clone()).or_default().admit(&event) {
            debug!(
                "Dropping stale {} event ({}%) for scan {}",
                event.status, event.progress, job.scan_id
            );
            return;
        }
        let _ = self.progress_tx.send(event);
    }

    fn forget_published(&self, scan_id: &ScanId) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(scan_id);
    }
}
