// Fingerprint Stage - match banners and server headers against known CVEs
//
// String containment against a small product index. Matches are reported as
// possible exposures that need manual verification.

use crate::findings::{RawSignal, SignalKind};
use crate::scanner::stages::http_probe_stage::service_path;
use crate::scanner::stages::reconnaissance_stage::port_path;
use crate::scanner::{ScanStage, StageContext};
use crate::Result;
use async_trait::async_trait;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

/// Product marker -> CVE ids
pub const FINGERPRINT_INDEX: [(&str, &[&str]); 4] = [
    ("OpenSSH", &["CVE-2018-15473"]),
    ("nginx", &["CVE-2019-20372"]),
    ("Apache", &["CVE-2021-41773"]),
    ("OpenSSL", &["CVE-2022-3602"]),
];

pub struct FingerprintStage;

impl FingerprintStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FingerprintStage {
    fn default() -> Self {
        Self::new()
    }
}

/// (product, cve) pairs whose product marker appears in `text`
pub fn lookup(text: &str) -> Vec<(&'static str, &'static str)> {
    let lower = text.to_lowercase();
    FINGERPRINT_INDEX
        .iter()
        .filter(|(product, _)| lower.contains(&product.to_lowercase()))
        .flat_map(|(product, cves)| cves.iter().map(move |cve| (*product, *cve)))
        .collect()
}

#[async_trait]
impl ScanStage for FingerprintStage {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    async fn run(&self, ctx: &mut StageContext, _cancel: CancellationToken) -> Result<()> {
        let mut signals = Vec::new();

        for port in &ctx.observations.open_ports {
            let Some(banner) = &port.banner else {
                continue;
            };
            for (product, cve) in lookup(banner) {
                signals.push(
                    RawSignal::new(
                        SignalKind::KnownCve {
                            cve: cve.to_string(),
                            product: product.to_string(),
                        },
                        port_path(&port.host, port.port),
                    )
                    .with_evidence(banner.lines().next().unwrap_or_default().to_string()),
                );
            }
        }

        for http in &ctx.observations.http {
            let Some(server) = &http.server else {
                continue;
            };
            let path = Url::parse(&http.url)
                .map(|url| service_path(&url))
                .unwrap_or_else(|_| http.url.clone());
            for (product, cve) in lookup(server) {
                signals.push(
                    RawSignal::new(
                        SignalKind::KnownCve {
                            cve: cve.to_string(),
                            product: product.to_string(),
                        },
                        path.clone(),
                    )
                    .with_evidence(format!("Server: {}", server)),
                );
            }
        }

        for signal in signals {
            ctx.push_signal(signal);
        }
        Ok(())
    }
}
