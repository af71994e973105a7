// Reconnaissance Stage - TCP connect probe and banner grab
//
// Probes the mode's port list on every host of the target (CIDR ranges are
// capped at `max_cidr_hosts`). Open ports become OpenPort signals.

use crate::findings::{RawSignal, SignalKind};
use crate::scanner::config::service_name;
use crate::scanner::{OpenPort, ScanStage, ScannerConfig, StageContext};
use crate::target::TargetKind;
use crate::{Result, ScanError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest banner text kept as evidence
const MAX_BANNER_CHARS: usize = 256;

pub struct ReconnaissanceStage {
    config: ScannerConfig,
}

impl ReconnaissanceStage {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    async fn resolve(&self, host: &str) -> Result<()> {
        if host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }
        let mut addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| ScanError::transient("reconnaissance", format!("cannot resolve {}: {}", host, e)))?;
        if addrs.next().is_none() {
            return Err(ScanError::transient(
                "reconnaissance",
                format!("{} has no addresses", host),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ScanStage for ReconnaissanceStage {
    fn name(&self) -> &'static str {
        "reconnaissance"
    }

    fn weight(&self) -> u32 {
        4
    }

    async fn run(&self, ctx: &mut StageContext, cancel: CancellationToken) -> Result<()> {
        let hosts = ctx.target.hosts(self.config.max_cidr_hosts);
        if ctx.target.kind() == TargetKind::Url {
            self.resolve(&ctx.target.host()).await?;
        }

        let mut ports = self.config.ports_for(ctx.mode);
        if let Some(port) = ctx.target.explicit_port() {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }

        let probes: Vec<(String, u16)> = hosts
            .iter()
            .flat_map(|host| ports.iter().map(move |port| (host.clone(), *port)))
            .collect();
        let total = probes.len().max(1);

        let connect_timeout = self.config.connect_timeout();
        let banner_bytes = self.config.banner_bytes;
        let mut results = stream::iter(probes)
            .map(|(host, port)| probe_port(host, port, connect_timeout, banner_bytes))
            .buffer_unordered(self.config.port_concurrency.max(1));

        let mut open = Vec::new();
        let mut done = 0usize;
        while let Some(result) = results.next().await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            done += 1;
            ctx.report_fraction(done as f64 / total as f64);
            if let Some(port) = result {
                open.push(port);
            }
        }

        open.sort_by(|a, b| a.host.cmp(&b.host).then(a.port.cmp(&b.port)));
        debug!(
            "{}: {} open port(s) across {} host(s)",
            ctx.scan_id,
            open.len(),
            hosts.len()
        );

        for port in &open {
            let mut signal = RawSignal::new(
                SignalKind::OpenPort {
                    port: port.port,
                    service: port.service.clone(),
                },
                port_path(&port.host, port.port),
            );
            if let Some(banner) = &port.banner {
                signal = signal.with_evidence(banner.clone());
            }
            ctx.push_signal(signal);
        }
        ctx.observations.open_ports = open;

        Ok(())
    }
}

/// Location string for a TCP service
pub fn port_path(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}/tcp", host, port)
    } else {
        format!("{}:{}/tcp", host, port)
    }
}

async fn probe_port(
    host: String,
    port: u16,
    connect_timeout: Duration,
    banner_bytes: usize,
) -> Option<OpenPort> {
    let stream = timeout(connect_timeout, TcpStream::connect((host.as_str(), port)))
        .await
        .ok()?
        .ok()?;

    let banner = grab_banner(stream, banner_bytes, connect_timeout).await;

    Some(OpenPort {
        service: service_name(port).to_string(),
        host,
        port,
        banner,
    })
}

/// Send a CRLF and read whatever the service answers with
async fn grab_banner(mut stream: TcpStream, max_bytes: usize, wait: Duration) -> Option<String> {
    let _ = stream.write_all(b"\r\n").await;

    let mut buf = vec![0u8; max_bytes.max(1)];
    let n = timeout(wait, stream.read(&mut buf)).await.ok()?.ok()?;
    if n == 0 {
        return None;
    }

    let text: String = String::from_utf8_lossy(&buf[..n])
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.chars().take(MAX_BANNER_CHARS).collect())
    }
}
