// Scanner module - Staged scan pipeline
//
// A scan is a fixed sequence of stages. Each stage reads the target, pushes
// raw signals and observations into the shared StageContext and may report
// intra-stage progress. The runner in jobs::executor drives the pipeline,
// handles retries, cancellation and progress persistence.

pub mod config;
pub mod stages;

pub use config::ScannerConfig;
pub use stages::{ClassificationStage, FingerprintStage, HttpProbeStage, ReconnaissanceStage};

use crate::findings::{classify, Finding, RawSignal};
use crate::jobs::{ScanId, ScanMode};
use crate::target::ScanTarget;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A TCP port that accepted a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub host: String,
    pub port: u16,
    pub service: String,
    pub banner: Option<String>,
}

/// What the HTTP probe saw for one base URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpObservation {
    pub url: String,
    pub status: Option<u16>,
    pub title: Option<String>,
    pub server: Option<String>,
    pub hsts: bool,
    pub csp: Option<String>,
    pub cookies: Vec<CookieObservation>,
    pub cert_days_left: Option<i64>,
}

/// Security flags of one Set-Cookie header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieObservation {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
}

/// Facts collected by the stages, shared with later stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observations {
    pub open_ports: Vec<OpenPort>,
    pub http: Vec<HttpObservation>,
}

/// Shared scan context for stage orchestration
pub struct StageContext {
    pub scan_id: ScanId,
    pub target: ScanTarget,
    pub mode: ScanMode,
    pub observations: Observations,
    pub signals: Vec<RawSignal>,
    /// Set by the classification stage
    pub findings: Option<Vec<Finding>>,
    fraction_tx: Option<watch::Sender<f64>>,
}

/// Mutable part of a context, used to roll back a failed stage attempt
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    observations: Observations,
    signals: Vec<RawSignal>,
    findings: Option<Vec<Finding>>,
}

impl StageContext {
    pub fn new(scan_id: ScanId, target: ScanTarget, mode: ScanMode) -> Self {
        Self {
            scan_id,
            target,
            mode,
            observations: Observations::default(),
            signals: Vec::new(),
            findings: None,
            fraction_tx: None,
        }
    }

    /// Install the channel intra-stage progress is reported on
    pub fn set_progress_sink(&mut self, tx: watch::Sender<f64>) {
        self.fraction_tx = Some(tx);
    }

    pub fn clear_progress_sink(&mut self) {
        self.fraction_tx = None;
    }

    /// Report how far the current stage has got (0.0 - 1.0)
    pub fn report_fraction(&self, fraction: f64) {
        if let Some(tx) = &self.fraction_tx {
            let _ = tx.send(fraction);
        }
    }

    pub fn push_signal(&mut self, signal: RawSignal) {
        self.signals.push(signal);
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            observations: self.observations.clone(),
            signals: self.signals.clone(),
            findings: self.findings.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: ContextSnapshot) {
        self.observations = snapshot.observations;
        self.signals = snapshot.signals;
        self.findings = snapshot.findings;
    }

    /// Final findings: the classification stage's output, or a fresh
    /// classification of the collected signals
    pub fn into_findings(self) -> Vec<Finding> {
        match self.findings {
            Some(findings) => findings,
            None => classify(self.scan_id.as_str(), &self.signals),
        }
    }
}

/// One step of the scan pipeline
#[async_trait]
pub trait ScanStage: Send + Sync {
    /// Stage name, recorded as the job's current stage
    fn name(&self) -> &'static str;

    /// Relative share of the pipeline's total work
    fn weight(&self) -> u32 {
        1
    }

    /// Run the stage. Stages should return `ScanError::TransientScan` for
    /// network failures worth retrying.
    async fn run(&self, ctx: &mut StageContext, cancel: CancellationToken) -> Result<()>;
}

/// Ordered list of stages
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn ScanStage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn ScanStage>>) -> Self {
        Self { stages }
    }

    /// The default engine for a scan mode. Quick scans skip fingerprinting.
    pub fn default_for(mode: ScanMode, config: &ScannerConfig) -> Self {
        let mut stages: Vec<Arc<dyn ScanStage>> = vec![
            Arc::new(ReconnaissanceStage::new(config.clone())),
            Arc::new(HttpProbeStage::new(config.clone())),
        ];
        if mode == ScanMode::Full {
            stages.push(Arc::new(FingerprintStage::new()));
        }
        stages.push(Arc::new(ClassificationStage::new()));
        Self { stages }
    }

    pub fn stages(&self) -> &[Arc<dyn ScanStage>] {
        &self.stages
    }

    pub fn total_weight(&self) -> u32 {
        self.stages.iter().map(|s| s.weight()).sum()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Pipelines per scan mode
#[derive(Clone)]
pub struct PipelineSet {
    quick: Pipeline,
    full: Pipeline,
}

impl PipelineSet {
    pub fn new(quick: Pipeline, full: Pipeline) -> Self {
        Self { quick, full }
    }

    /// Same pipeline for both modes
    pub fn uniform(pipeline: Pipeline) -> Self {
        Self {
            quick: pipeline.clone(),
            full: pipeline,
        }
    }

    /// The network scan engine
    pub fn default_engine(config: &ScannerConfig) -> Self {
        Self {
            quick: Pipeline::default_for(ScanMode::Quick, config),
            full: Pipeline::default_for(ScanMode::Full, config),
        }
    }

    pub fn for_mode(&self, mode: ScanMode) -> &Pipeline {
        match mode {
            ScanMode::Quick => &self.quick,
            ScanMode::Full => &self.full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::SignalKind;
    use crate::target::validate_target;

    fn context() -> StageContext {
        StageContext::new(
            ScanId::generate(),
            validate_target("example.com").unwrap(),
            ScanMode::Quick,
        )
    }

    #[test]
    fn test_default_pipelines() {
        let config = ScannerConfig::default();
        assert_eq!(
            Pipeline::default_for(ScanMode::Quick, &config).stage_names(),
            vec!["reconnaissance", "http_probe", "classification"]
        );
        assert_eq!(
            Pipeline::default_for(ScanMode::Full, &config).stage_names(),
            vec!["reconnaissance", "http_probe", "fingerprint", "classification"]
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let mut ctx = context();
        ctx.push_signal(RawSignal::new(SignalKind::MissingHsts, "/"));
        let snapshot = ctx.snapshot();

        ctx.push_signal(RawSignal::new(SignalKind::MissingCsp, "/"));
        assert_eq!(ctx.signals.len(), 2);

        ctx.restore(snapshot);
        assert_eq!(ctx.signals.len(), 1);
    }

    #[test]
    fn test_into_findings_classifies_when_unset() {
        let mut ctx = context();
        ctx.push_signal(RawSignal::new(SignalKind::MissingHsts, "/"));
        let findings = ctx.into_findings();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_report_fraction_without_sink_is_noop() {
        let ctx = context();
        ctx.report_fraction(0.5);

        let (tx, rx) = watch::channel(0.0);
        let mut ctx = context();
        ctx.set_progress_sink(tx);
        ctx.report_fraction(0.25);
        assert_eq!(*rx.borrow(), 0.25);
    }
}
