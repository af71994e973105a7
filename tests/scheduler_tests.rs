// Scheduler Integration Tests

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;
    use vulnscan::db::{HistoryQuery, InMemoryScanStore, ScanStore};
    use vulnscan::findings::Finding;
    use vulnscan::findings::{RawSignal, SignalKind};
    use vulnscan::jobs::{Scheduler, SchedulerConfig};
    use vulnscan::scanner::{Pipeline, PipelineSet, ScanStage, StageContext};
    use vulnscan::target::validate_target;
    use vulnscan::{JobStatus, ScanError, ScanId, ScanJob, ScanMode};

    /// Reports progress in steps and leaves one signal behind
    struct SignalStage;

    #[async_trait]
    impl ScanStage for SignalStage {
        fn name(&self) -> &'static str {
            "signals"
        }

        async fn run(&self, ctx: &mut StageContext, _cancel: CancellationToken) -> vulnscan::Result<()> {
            for step in 1..=4 {
                ctx.report_fraction(step as f64 / 4.0);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            ctx.push_signal(RawSignal::new(SignalKind::MissingHsts, "/"));
            Ok(())
        }
    }

    /// Holds every scan until released, recording how many run at once
    struct GateStage {
        release: watch::Receiver<bool>,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct Gate {
        release: watch::Sender<bool>,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Gate {
        fn stage(&self) -> GateStage {
            GateStage {
                release: self.release.subscribe(),
                current: self.current.clone(),
                peak: self.peak.clone(),
            }
        }

        fn open(&self) {
            self.release.send_replace(true);
        }
    }

    fn gate() -> Gate {
        let (release, _) = watch::channel(false);
        Gate {
            release,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    struct Running(Arc<AtomicUsize>);

    impl Drop for Running {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ScanStage for GateStage {
        fn name(&self) -> &'static str {
            "gate"
        }

        async fn run(&self, _ctx: &mut StageContext, _cancel: CancellationToken) -> vulnscan::Result<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            let _running = Running(self.current.clone());
            self.peak.fetch_max(now, Ordering::SeqCst);

            let mut release = self.release.clone();
            while !*release.borrow_and_update() {
                if release.changed().await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    /// Fails with a transient error a fixed number of times
    struct FlakyStage {
        failures: usize,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ScanStage for FlakyStage {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn run(&self, ctx: &mut StageContext, _cancel: CancellationToken) -> vulnscan::Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            ctx.push_signal(RawSignal::new(SignalKind::MissingCsp, "/"));
            if attempt < self.failures {
                return Err(ScanError::transient("flaky", "connection reset"));
            }
            Ok(())
        }
    }

    /// Panics for targets named `panic.example.com`
    struct PanicStage;

    #[async_trait]
    impl ScanStage for PanicStage {
        fn name(&self) -> &'static str {
            "panicky"
        }

        async fn run(&self, ctx: &mut StageContext, _cancel: CancellationToken) -> vulnscan::Result<()> {
            if ctx.target.host() == "panic.example.com" {
                panic!("stage bug");
            }
            Ok(())
        }
    }

    /// Never finishes on its own
    struct HangStage;

    #[async_trait]
    impl ScanStage for HangStage {
        fn name(&self) -> &'static str {
            "hang"
        }

        async fn run(&self, _ctx: &mut StageContext, _cancel: CancellationToken) -> vulnscan::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    /// Reports ever finer progress until stopped
    struct TickStage;

    #[async_trait]
    impl ScanStage for TickStage {
        fn name(&self) -> &'static str {
            "tick"
        }

        async fn run(&self, ctx: &mut StageContext, _cancel: CancellationToken) -> vulnscan::Result<()> {
            let mut step = 1.0;
            loop {
                ctx.report_fraction(1.0 - 1.0 / (step + 1.0));
                step += 1.0;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    /// In-memory store where running jobs advance just before each of the
    /// first `races` cancel writes, the way a busy worker would
    struct RacingStore {
        inner: InMemoryScanStore,
        races: AtomicUsize,
    }

    #[async_trait]
    impl ScanStore for RacingStore {
        async fn insert_job(&self, job: &ScanJob) -> vulnscan::Result<()> {
            self.inner.insert_job(job).await
        }

        async fn get_job(&self, owner: Option<&str>, id: &ScanId) -> vulnscan::Result<Option<ScanJob>> {
            self.inner.get_job(owner, id).await
        }

        async fn list_jobs(&self, query: &HistoryQuery) -> vulnscan::Result<Vec<ScanJob>> {
            self.inner.list_jobs(query).await
        }

        async fn list_jobs_by_status(&self, status: JobStatus) -> vulnscan::Result<Vec<ScanJob>> {
            self.inner.list_jobs_by_status(status).await
        }

        async fn save_job(&self, expected: JobStatus, job: &ScanJob) -> vulnscan::Result<()> {
            if job.status == JobStatus::Canceled && self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                if let Some(mut current) = self.inner.get_job(None, &job.scan_id).await? {
                    let next = current.progress + 1;
                    current.record_progress(next, Some("tick"), None)?;
                    self.inner.save_job(JobStatus::Running, &current).await?;
                }
            }
            self.inner.save_job(expected, job).await
        }

        async fn complete_job(&self, job: &ScanJob, findings: &[Finding]) -> vulnscan::Result<()> {
            self.inner.complete_job(job, findings).await
        }

        async fn findings(&self, id: &ScanId) -> vulnscan::Result<Vec<Finding>> {
            self.inner.findings(id).await
        }

        async fn delete_job(&self, owner: &str, id: &ScanId) -> vulnscan::Result<bool> {
            self.inner.delete_job(owner, id).await
        }

        fn backend(&self) -> &'static str {
            "racing"
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            scheduling_quantum_ms: 20,
            retry_backoff_ms: 10,
            cancel_grace_ms: 200,
            ..SchedulerConfig::default()
        }
    }

    fn scheduler(
        stages: Vec<Arc<dyn ScanStage>>,
        config: SchedulerConfig,
    ) -> (Arc<Scheduler>, Arc<dyn ScanStore>) {
        let store: Arc<dyn ScanStore> = Arc::new(InMemoryScanStore::new());
        let pipelines = PipelineSet::uniform(Pipeline::new(stages));
        let scheduler = Arc::new(Scheduler::new(store.clone(), pipelines, config));
        (scheduler, store)
    }

    async fn wait_for<F>(store: &Arc<dyn ScanStore>, id: &ScanId, done: F) -> ScanJob
    where
        F: Fn(&ScanJob) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = store.get_job(None, id).await.unwrap().unwrap();
            if done(&job) {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "scan {} stuck in {}",
                id,
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_for_status(store: &Arc<dyn ScanStore>, id: &ScanId, status: JobStatus) -> ScanJob {
        wait_for(store, id, |job| job.status == status).await
    }

    async fn wait_for_active(scheduler: &Scheduler, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while scheduler.active_count().await != count {
            assert!(tokio::time::Instant::now() < deadline, "never reached {} active scans", count);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_scan_runs_to_completion() {
        let (scheduler, store) = scheduler(vec![Arc::new(SignalStage)], config());
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let done = wait_for_status(&store, &job.scan_id, JobStatus::Completed).await;
        assert_eq!(done.progress, 100);
        assert!(done.started_at.is_some());
        assert!(done.finished_at.is_some());
        assert_eq!(done.eta_seconds, None);

        let findings = store.findings(&job.scan_id).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].name, "Missing Strict-Transport-Security header");
        scheduler.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected_at_submit() {
        let (scheduler, store) = scheduler(vec![Arc::new(SignalStage)], config());
        let err = scheduler.submit("alice", "not a host!", ScanMode::Quick).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidTarget { .. }));

        let history = store
            .list_jobs(&HistoryQuery::for_owner("alice"))
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_progress_events_are_monotonic() {
        let (scheduler, _store) = scheduler(
            vec![Arc::new(SignalStage), Arc::new(SignalStage)],
            config(),
        );
        let mut events = scheduler.subscribe_progress();
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Full).await.unwrap();

        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event.scan_id != job.scan_id {
                continue;
            }
            let last = event.is_final();
            seen.push(event);
            if last {
                break;
            }
        }

        assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert!(seen.iter().any(|e| e.stage.as_deref() == Some("signals")));
        let last = seen.last().unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(last.progress, 100);
        assert!(seen[..seen.len() - 1].iter().all(|e| e.progress < 100));
    }

    #[tokio::test]
    async fn test_global_concurrency_cap() {
        let gate = gate();
        let mut cfg = config();
        cfg.max_concurrent_scans = 2;
        cfg.max_concurrent_per_user = 10;
        let (scheduler, store) = scheduler(vec![Arc::new(gate.stage())], cfg);
        scheduler.spawn();

        let mut ids = Vec::new();
        for user in ["a", "b", "c", "d", "e"] {
            ids.push(scheduler.submit(user, "example.com", ScanMode::Quick).await.unwrap().scan_id);
        }

        wait_for_active(&scheduler, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.active_count().await, 2);
        assert_eq!(scheduler.queued_count().await, 3);

        gate.open();
        for id in &ids {
            wait_for_status(&store, id, JobStatus::Completed).await;
        }
        assert_eq!(gate.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_user_cap_lets_other_users_through() {
        let gate = gate();
        let mut cfg = config();
        cfg.max_concurrent_scans = 3;
        cfg.max_concurrent_per_user = 1;
        let (scheduler, store) = scheduler(vec![Arc::new(gate.stage())], cfg);
        scheduler.spawn();

        let mut alice = Vec::new();
        for _ in 0..3 {
            alice.push(scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap().scan_id);
        }
        let bob = scheduler.submit("bob", "example.org", ScanMode::Quick).await.unwrap().scan_id;

        wait_for_status(&store, &bob, JobStatus::Running).await;
        wait_for_status(&store, &alice[0], JobStatus::Running).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A free global slot stays unused rather than running a second scan for alice
        assert_eq!(scheduler.active_count().await, 2);
        for id in &alice[1..] {
            let job = store.get_job(None, id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Queued);
        }

        gate.open();
        for id in alice.iter().chain([&bob]) {
            wait_for_status(&store, id, JobStatus::Completed).await;
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let stage = FlakyStage {
            failures: 2,
            attempts: attempts.clone(),
        };
        let (scheduler, store) = scheduler(vec![Arc::new(stage)], config());
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        wait_for_status(&store, &job.scan_id, JobStatus::Completed).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Signals of failed attempts are rolled back
        assert_eq!(store.findings(&job.scan_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_the_scan() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let stage = FlakyStage {
            failures: usize::MAX,
            attempts: attempts.clone(),
        };
        let mut cfg = config();
        cfg.stage_retries = 1;
        let (scheduler, store) = scheduler(vec![Arc::new(stage)], cfg);
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        let failed = wait_for_status(&store, &job.scan_id, JobStatus::Failed).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(failed.error.unwrap().contains("flaky"));
        assert!(store.findings(&job.scan_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_scan_is_isolated() {
        let (scheduler, store) = scheduler(vec![Arc::new(PanicStage)], config());
        scheduler.spawn();

        let bad = scheduler.submit("alice", "panic.example.com", ScanMode::Quick).await.unwrap();
        let good = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();

        let failed = wait_for_status(&store, &bad.scan_id, JobStatus::Failed).await;
        assert!(failed.error.unwrap().contains("panicked"));
        wait_for_status(&store, &good.scan_id, JobStatus::Completed).await;

        wait_for_active(&scheduler, 0).await;
        let next = scheduler.submit("bob", "example.org", ScanMode::Quick).await.unwrap();
        wait_for_status(&store, &next.scan_id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_scan_exceeding_max_runtime_fails() {
        let mut cfg = config();
        cfg.max_runtime_quick_secs = 1;
        let (scheduler, store) = scheduler(vec![Arc::new(HangStage)], cfg);
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        let failed = wait_for_status(&store, &job.scan_id, JobStatus::Failed).await;
        assert!(failed.error.is_some());
        wait_for_active(&scheduler, 0).await;
    }

    #[tokio::test]
    async fn test_cancel_running_scan() {
        let (scheduler, store) = scheduler(vec![Arc::new(HangStage)], config());
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        wait_for_status(&store, &job.scan_id, JobStatus::Running).await;

        let canceled = scheduler.cancel("alice", &job.scan_id).await.unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);

        wait_for_active(&scheduler, 0).await;
        let stored = store.get_job(None, &job.scan_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Canceled);
        assert!(store.findings(&job.scan_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_progress_writes_and_events() {
        let cfg = config();
        let grace = Duration::from_millis(cfg.cancel_grace_ms);
        let (scheduler, store) = scheduler(vec![Arc::new(TickStage)], cfg);
        let mut events = scheduler.subscribe_progress();
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        wait_for(&store, &job.scan_id, |j| j.status == JobStatus::Running && j.progress > 10).await;

        let asked = tokio::time::Instant::now();
        let canceled = scheduler.cancel("alice", &job.scan_id).await.unwrap();
        wait_for_active(&scheduler, 0).await;
        assert!(asked.elapsed() < grace + Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let stored = store.get_job(None, &job.scan_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Canceled);
        assert_eq!(stored.progress, canceled.progress);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.scan_id == job.scan_id {
                seen.push(event);
            }
        }
        assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
        let last = seen.last().unwrap();
        assert_eq!(last.status, JobStatus::Canceled);
        assert_eq!(seen.iter().filter(|e| e.is_final()).count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_outlasts_racing_progress_writes() {
        let store = Arc::new(RacingStore {
            inner: InMemoryScanStore::new(),
            races: AtomicUsize::new(12),
        });
        let store_dyn: Arc<dyn ScanStore> = store.clone();
        let scheduler = Scheduler::new(
            store_dyn.clone(),
            PipelineSet::uniform(Pipeline::new(vec![Arc::new(HangStage)])),
            config(),
        );

        let mut job = ScanJob::new("alice", &validate_target("example.com").unwrap(), ScanMode::Quick);
        job.start().unwrap();
        store_dyn.insert_job(&job).await.unwrap();

        let canceled = scheduler.cancel("alice", &job.scan_id).await.unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);
        assert_eq!(store.races.load(Ordering::SeqCst), 0);

        let stored = store_dyn.get_job(None, &job.scan_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Canceled);
        assert_eq!(stored.progress, 12);
    }

    #[tokio::test]
    async fn test_cancel_queued_scan_never_starts() {
        let gate = gate();
        let mut cfg = config();
        cfg.max_concurrent_scans = 1;
        let (scheduler, store) = scheduler(vec![Arc::new(gate.stage())], cfg);
        scheduler.spawn();

        let first = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        let second = scheduler.submit("bob", "example.org", ScanMode::Quick).await.unwrap();
        wait_for_status(&store, &first.scan_id, JobStatus::Running).await;

        scheduler.cancel("bob", &second.scan_id).await.unwrap();
        assert_eq!(scheduler.queued_count().await, 0);

        gate.open();
        wait_for_status(&store, &first.scan_id, JobStatus::Completed).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stored = store.get_job(None, &second.scan_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Canceled);
        assert!(stored.started_at.is_none());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (scheduler, store) = scheduler(vec![Arc::new(SignalStage)], config());
        scheduler.spawn();

        let job = scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        wait_for_status(&store, &job.scan_id, JobStatus::Completed).await;

        assert!(matches!(
            scheduler.cancel("bob", &job.scan_id).await,
            Err(ScanError::NotFound(_))
        ));
        assert!(matches!(
            scheduler.cancel("alice", &job.scan_id).await,
            Err(ScanError::Conflict(_))
        ));
        assert!(matches!(
            scheduler.cancel("alice", &ScanId::generate()).await,
            Err(ScanError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_full() {
        let mut cfg = config();
        cfg.queue_capacity = 1;
        let (scheduler, _store) = scheduler(vec![Arc::new(SignalStage)], cfg);

        scheduler.submit("alice", "example.com", ScanMode::Quick).await.unwrap();
        assert!(matches!(
            scheduler.submit("bob", "example.org", ScanMode::Quick).await,
            Err(ScanError::QueueFull { capacity: 1 })
        ));
    }

    #[tokio::test]
    async fn test_recovery_after_restart() {
        let (scheduler, store) = scheduler(vec![Arc::new(SignalStage)], config());

        let target = validate_target("example.com").unwrap();
        let mut interrupted = ScanJob::new("alice", &target, ScanMode::Quick);
        interrupted.start().unwrap();
        store.insert_job(&interrupted).await.unwrap();
        let waiting = ScanJob::new("alice", &target, ScanMode::Quick);
        store.insert_job(&waiting).await.unwrap();

        let report = scheduler.recover().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.requeued, 1);

        let failed = store.get_job(None, &interrupted.scan_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("interrupted by restart"));

        scheduler.spawn();
        wait_for_status(&store, &waiting.scan_id, JobStatus::Completed).await;
    }
}
