// Classification Stage - turn collected signals into findings

use crate::findings::classify;
use crate::scanner::{ScanStage, StageContext};
use crate::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ClassificationStage;

impl ClassificationStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClassificationStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanStage for ClassificationStage {
    fn name(&self) -> &'static str {
        "classification"
    }

    async fn run(&self, ctx: &mut StageContext, _cancel: CancellationToken) -> Result<()> {
        let findings = classify(ctx.scan_id.as_str(), &ctx.signals);
        debug!(
            "{}: {} signal(s) classified into {} finding(s)",
            ctx.scan_id,
            ctx.signals.len(),
            findings.len()
        );
        ctx.findings = Some(findings);
        Ok(())
    }
}
