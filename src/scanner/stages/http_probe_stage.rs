// HTTP Probe Stage - security headers, cookies, certificate expiry
//
// Runs against every host with an open web port (or the URL's explicit
// port). Records the server header, HSTS, CSP, Set-Cookie flags and the
// peer certificate's notAfter date. In full mode it also sends two benign
// input probes: a script marker to detect unencoded reflection and a lone
// quote to detect database errors.

use crate::findings::{RawSignal, SignalKind};
use crate::jobs::ScanMode;
use crate::scanner::{CookieObservation, HttpObservation, ScanStage, ScannerConfig, StageContext};
use crate::{Result, ScanError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, CONTENT_SECURITY_POLICY, SERVER, SET_COOKIE, STRICT_TRANSPORT_SECURITY};
use reqwest::{Client, Url};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use x509_parser::prelude::*;

/// Error strings databases leak when a quote breaks a query
const SQL_ERROR_SIGNATURES: [&str; 8] = [
    "you have an error in your sql syntax",
    "unclosed quotation mark",
    "quoted string not properly terminated",
    "sqlite3::",
    "sqlite_error",
    "pg_query()",
    "syntax error at or near",
    "ora-01756",
];

const REFLECTION_PARAM: &str = "vsq";
const QUOTE_PARAM: &str = "id";

pub struct HttpProbeStage {
    config: ScannerConfig,
}

impl HttpProbeStage {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.config.http_timeout())
            .danger_accept_invalid_certs(true)
            .tls_info(true)
            .user_agent(&self.config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ScanError::Other(format!("Failed to build HTTP client: {}", e)))
    }

    /// Base URLs worth probing, in a stable order
    fn base_urls(&self, ctx: &StageContext) -> Vec<String> {
        let mut urls = BTreeSet::new();

        if ctx.target.explicit_port().is_some() {
            urls.insert(ctx.target.base_url());
        }

        let mut hosts: Vec<&str> = ctx
            .observations
            .open_ports
            .iter()
            .map(|p| p.host.as_str())
            .collect();
        hosts.dedup();

        for host in hosts {
            let open = |port: u16| {
                ctx.observations
                    .open_ports
                    .iter()
                    .any(|p| p.host == host && p.port == port)
            };
            let authority = if host.contains(':') {
                format!("[{}]", host)
            } else {
                host.to_string()
            };

            if open(443) {
                urls.insert(format!("https://{}", authority));
            } else if open(80) {
                urls.insert(format!("http://{}", authority));
            }
        }

        urls.into_iter().collect()
    }

    async fn probe(&self, client: &Client, base: &str, ctx: &mut StageContext) -> Result<()> {
        let response = match client.get(base).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(ScanError::transient(
                    "http_probe",
                    format!("{} timed out: {}", base, e),
                ));
            }
            Err(e) => {
                warn!("{}: HTTP probe of {} failed: {}", ctx.scan_id, base, e);
                return Ok(());
            }
        };

        let path = service_path(response.url());
        let is_https = response.url().scheme() == "https";
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let cert_days_left = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .and_then(days_until_expiry);
        let body = response.text().await.unwrap_or_default();

        let observation = HttpObservation {
            url: base.to_string(),
            status: Some(status),
            title: extract_title(&body),
            server: header_str(&headers, SERVER.as_str()),
            hsts: headers.contains_key(STRICT_TRANSPORT_SECURITY),
            csp: header_str(&headers, CONTENT_SECURITY_POLICY.as_str()),
            cookies: parse_cookies(&headers),
            cert_days_left,
        };
        debug!(
            "{}: {} answered {} (server: {:?})",
            ctx.scan_id, base, status, observation.server
        );

        for signal in header_signals(&observation, &path, is_https) {
            ctx.push_signal(signal);
        }
        ctx.observations.http.push(observation);

        if ctx.mode == ScanMode::Full && self.config.input_probes {
            self.input_probes(client, base, &path, ctx).await;
        }

        Ok(())
    }

    async fn input_probes(&self, client: &Client, base: &str, path: &str, ctx: &mut StageContext) {
        let marker = format!("<script>vs{}</script>", &ctx.scan_id.as_str()[2..10]);

        if let Ok(response) = client.get(base).query(&[(REFLECTION_PARAM, marker.as_str())]).send().await {
            let body = response.text().await.unwrap_or_default();
            if body.contains(&marker) {
                ctx.push_signal(
                    RawSignal::new(
                        SignalKind::ReflectedScript {
                            parameter: REFLECTION_PARAM.to_string(),
                        },
                        path,
                    )
                    .with_evidence(marker.clone()),
                );
            }
        }

        if let Ok(response) = client.get(base).query(&[(QUOTE_PARAM, "1'")]).send().await {
            let body = response.text().await.unwrap_or_default().to_lowercase();
            if let Some(signature) = SQL_ERROR_SIGNATURES.iter().find(|s| body.contains(*s)) {
                ctx.push_signal(
                    RawSignal::new(
                        SignalKind::SqlMetacharAccepted {
                            parameter: QUOTE_PARAM.to_string(),
                        },
                        path,
                    )
                    .with_evidence(signature.to_string()),
                );
            }
        }
    }
}

#[async_trait]
impl ScanStage for HttpProbeStage {
    fn name(&self) -> &'static str {
        "http_probe"
    }

    fn weight(&self) -> u32 {
        3
    }

    async fn run(&self, ctx: &mut StageContext, cancel: CancellationToken) -> Result<()> {
        let urls = self.base_urls(ctx);
        if urls.is_empty() {
            debug!("{}: no web ports open, skipping HTTP probe", ctx.scan_id);
            return Ok(());
        }

        let client = self.client()?;
        let total = urls.len();
        for (i, base) in urls.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.probe(&client, base, ctx).await?;
            ctx.report_fraction((i + 1) as f64 / total as f64);
        }
        Ok(())
    }
}

/// Finding location for an HTTP response: scheme, host, port and path, so
/// services on different hosts or ports never share a dedup key
pub fn service_path(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Signals derived from one HTTP response
fn header_signals(observation: &HttpObservation, path: &str, is_https: bool) -> Vec<RawSignal> {
    let mut signals = Vec::new();

    if is_https && !observation.hsts {
        signals.push(RawSignal::new(SignalKind::MissingHsts, path));
    }
    if observation.csp.is_none() {
        signals.push(RawSignal::new(SignalKind::MissingCsp, path));
    }

    if let Some(server) = &observation.server {
        if server.chars().any(|c| c.is_ascii_digit()) {
            signals.push(
                RawSignal::new(
                    SignalKind::ServerVersion {
                        banner: server.clone(),
                    },
                    path,
                )
                .with_evidence(format!("Server: {}", server)),
            );
        }
    }

    for cookie in &observation.cookies {
        let mut missing = Vec::new();
        if !cookie.secure {
            missing.push("Secure".to_string());
        }
        if !cookie.http_only {
            missing.push("HttpOnly".to_string());
        }
        if !missing.is_empty() {
            signals.push(RawSignal::new(
                SignalKind::InsecureCookie {
                    cookie: cookie.name.clone(),
                    missing,
                },
                path,
            ));
        }
    }

    match observation.cert_days_left {
        Some(days) if days < 0 => signals.push(RawSignal::new(
            SignalKind::CertificateExpired { days_overdue: -days },
            path,
        )),
        Some(days) => signals.push(RawSignal::new(
            SignalKind::CertificateExpiring { days_left: days },
            path,
        )),
        None => {}
    }

    signals
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_cookies(headers: &HeaderMap) -> Vec<CookieObservation> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect()
}

fn parse_set_cookie(raw: &str) -> Option<CookieObservation> {
    let mut parts = raw.split(';');
    let name = parts.next()?.split('=').next()?.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = CookieObservation {
        name: name.to_string(),
        secure: false,
        http_only: false,
    };
    for attr in parts {
        let attr = attr.trim().to_ascii_lowercase();
        let key = attr.split('=').next().unwrap_or_default();
        match key {
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }
    Some(cookie)
}

/// Whole days until the DER certificate expires; negative once expired
fn days_until_expiry(der: &[u8]) -> Option<i64> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let not_after = cert.validity().not_after.timestamp();
    let seconds = not_after - Utc::now().timestamp();
    Some(seconds.div_euclid(86_400))
}

fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title>")?;
    let title = body
        .get(start..end)?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::ScanId;
    use crate::target::validate_target;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(target: &str, mode: ScanMode) -> StageContext {
        StageContext::new(ScanId::generate(), validate_target(target).unwrap(), mode)
    }

    fn kinds(ctx: &StageContext) -> Vec<&SignalKind> {
        ctx.signals.iter().map(|s| &s.kind).collect()
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie = parse_set_cookie("sessionid=abc; Path=/; HttpOnly").unwrap();
        assert_eq!(cookie.name, "sessionid");
        assert!(cookie.http_only);
        assert!(!cookie.secure);

        let cookie = parse_set_cookie("csrftoken=x; secure; HTTPONLY; SameSite=Lax").unwrap();
        assert!(cookie.secure && cookie.http_only);

        assert!(parse_set_cookie("=oops").is_none());
    }

    #[test]
    fn test_service_path() {
        let url = Url::parse("https://Example.com/login").unwrap();
        assert_eq!(service_path(&url), "https://example.com:443/login");
        let url = Url::parse("http://10.0.0.1:8080").unwrap();
        assert_eq!(service_path(&url), "http://10.0.0.1:8080/");
        let url = Url::parse("http://[::1]:3000/").unwrap();
        assert_eq!(service_path(&url), "http://[::1]:3000/");
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><TITLE id=t>\n  Admin   Login </TITLE></html>").as_deref(),
            Some("Admin Login")
        );
        assert!(extract_title("<html></html>").is_none());
    }

    #[test]
    fn test_header_signals_for_https() {
        let observation = HttpObservation {
            url: "https://example.com".to_string(),
            status: Some(200),
            server: Some("nginx/1.14.0".to_string()),
            hsts: false,
            csp: None,
            cert_days_left: Some(12),
            ..Default::default()
        };
        let signals = header_signals(&observation, "/", true);
        let kinds: Vec<&SignalKind> = signals.iter().map(|s| &s.kind).collect();
        assert!(kinds.contains(&&SignalKind::MissingHsts));
        assert!(kinds.contains(&&SignalKind::MissingCsp));
        assert!(kinds.contains(&&SignalKind::CertificateExpiring { days_left: 12 }));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, SignalKind::ServerVersion { .. })));
    }

    #[test]
    fn test_hsts_not_expected_over_http() {
        let observation = HttpObservation {
            csp: Some("default-src 'self'".to_string()),
            ..Default::default()
        };
        assert!(header_signals(&observation, "/", false).is_empty());
    }

    #[tokio::test]
    async fn test_probe_reads_headers_and_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Server", "Apache/2.4.49")
                    .insert_header("Set-Cookie", "sessionid=abc; Path=/")
                    .set_body_string("<html><title>Home</title></html>"),
            )
            .mount(&server)
            .await;

        let mut ctx = context(&server.uri(), ScanMode::Quick);
        HttpProbeStage::new(ScannerConfig::default())
            .run(&mut ctx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.observations.http.len(), 1);
        let observation = &ctx.observations.http[0];
        assert_eq!(observation.status, Some(200));
        assert_eq!(observation.title.as_deref(), Some("Home"));
        assert_eq!(observation.server.as_deref(), Some("Apache/2.4.49"));

        let kinds = kinds(&ctx);
        assert!(kinds.contains(&&SignalKind::MissingCsp));
        assert!(!kinds.contains(&&SignalKind::MissingHsts));
        assert!(kinds.iter().any(|k| matches!(
            k,
            SignalKind::InsecureCookie { cookie, missing } if cookie == "sessionid" && missing.len() == 2
        )));
    }

    #[tokio::test]
    async fn test_services_on_different_ports_keep_separate_findings() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        for server in [&first, &second] {
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
                .mount(server)
                .await;
        }

        let stage = HttpProbeStage::new(ScannerConfig::default());
        let client = stage.client().unwrap();
        let mut ctx = context(&first.uri(), ScanMode::Quick);
        stage.probe(&client, &first.uri(), &mut ctx).await.unwrap();
        stage.probe(&client, &second.uri(), &mut ctx).await.unwrap();
        assert_eq!(ctx.observations.http.len(), 2);

        let findings = ctx.into_findings();
        let mut csp_paths: Vec<&str> = findings
            .iter()
            .filter(|f| f.name == "Missing Content-Security-Policy header")
            .map(|f| f.path.as_str())
            .collect();
        csp_paths.sort();
        let mut expected = vec![format!("{}/", first.uri()), format!("{}/", second.uri())];
        expected.sort();
        assert_eq!(csp_paths, expected);
    }

    #[tokio::test]
    async fn test_full_mode_detects_reflection_and_sql_errors() {
        let server = MockServer::start().await;
        let mut ctx = context(&server.uri(), ScanMode::Full);
        let marker = format!("<script>vs{}</script>", &ctx.scan_id.as_str()[2..10]);

        Mock::given(method("GET"))
            .and(query_param(REFLECTION_PARAM, marker.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("You searched for {}", marker)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param(QUOTE_PARAM, "1'"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("You have an error in your SQL syntax near ''' at line 1"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        HttpProbeStage::new(ScannerConfig::default())
            .run(&mut ctx, CancellationToken::new())
            .await
            .unwrap();

        let kinds = kinds(&ctx);
        assert!(kinds.contains(&&SignalKind::ReflectedScript {
            parameter: REFLECTION_PARAM.to_string()
        }));
        assert!(kinds.contains(&&SignalKind::SqlMetacharAccepted {
            parameter: QUOTE_PARAM.to_string()
        }));
    }

    #[tokio::test]
    async fn test_quick_mode_sends_no_input_probes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let mut ctx = context(&server.uri(), ScanMode::Quick);
        HttpProbeStage::new(ScannerConfig::default())
            .run(&mut ctx, CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_open_web_port_skips_probe() {
        let mut ctx = context("example.com", ScanMode::Quick);
        HttpProbeStage::new(ScannerConfig::default())
            .run(&mut ctx, CancellationToken::new())
            .await
            .unwrap();
        assert!(ctx.observations.http.is_empty());
        assert!(ctx.signals.is_empty());
    }
}
