// Finding Classifier - maps raw signals to canonical, deduplicated findings

use super::{Finding, FindingStatus, RawSignal, Severity, SignalKind};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Certificates expiring within this many days are reported
pub const CERT_EXPIRY_WARNING_DAYS: i64 = 30;

/// Cleartext or legacy remote administration services
pub const ADMIN_SERVICE_PORTS: [u16; 5] = [21, 23, 445, 3389, 5900];

/// Datastores that should never face the network
pub const DATASTORE_PORTS: [u16; 3] = [3306, 9200, 27017];

const OWASP_SQLI: &str = "https://owasp.org/www-community/attacks/SQL_Injection";
const OWASP_XSS: &str = "https://owasp.org/www-community/attacks/xss/";
const OWASP_HSTS: &str = "https://cheatsheetseries.owasp.org/cheatsheets/HTTP_Strict_Transport_Security_Cheat_Sheet.html";
const MDN_CSP: &str = "https://developer.mozilla.org/en-US/docs/Web/HTTP/CSP";
const MDN_COOKIES: &str = "https://developer.mozilla.org/en-US/docs/Web/HTTP/Cookies#restrict_access_to_cookies";
const MOZ_TLS: &str = "https://wiki.mozilla.org/Security/Server_Side_TLS";
const CIS_PORTS: &str = "https://www.cisecurity.org/controls/network-infrastructure-management";

/// Classification rule resolved for one signal
struct Rule {
    id: String,
    severity: Severity,
    name: String,
    description: String,
    impact: String,
    remediation: String,
    references: Vec<String>,
}

/// Deterministic finding id: `f_` + 16 hex chars of SHA-256(scanId, rule, path)
pub fn finding_id(scan_id: &str, rule_id: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scan_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(rule_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("f_{}", &digest[..16])
}

/// Classify raw signals into findings for one scan.
///
/// Findings are deduplicated on (rule id, path) and sorted by severity
/// (critical first), then name, then path. The result depends only on the
/// set of signals, not on their order.
pub fn classify(scan_id: &str, signals: &[RawSignal]) -> Vec<Finding> {
    let mut unique: BTreeMap<(String, String), Finding> = BTreeMap::new();

    for signal in signals {
        let Some(rule) = rule_for(&signal.kind) else {
            continue;
        };

        let finding = Finding {
            id: finding_id(scan_id, &rule.id, &signal.path),
            severity: rule.severity,
            name: rule.name,
            path: signal.path.clone(),
            description: rule.description,
            impact: rule.impact,
            remediation: rule.remediation,
            references: rule.references,
            status: FindingStatus::New,
            evidence: signal.evidence.clone(),
        };

        let key = (rule.id, signal.path.clone());
        match unique.get(&key) {
            Some(existing) if tiebreak(existing) <= tiebreak(&finding) => {}
            _ => {
                unique.insert(key, finding);
            }
        }
    }

    let mut findings: Vec<Finding> = unique.into_values().collect();
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.id.cmp(&b.id))
    });
    findings
}

fn tiebreak(finding: &Finding) -> (&str, &str, Option<&str>) {
    (&finding.name, &finding.description, finding.evidence.as_deref())
}

fn rule_for(kind: &SignalKind) -> Option<Rule> {
    let rule = match kind {
        SignalKind::SqlMetacharAccepted { parameter } => Rule {
            id: "sql-injection".to_string(),
            severity: Severity::Critical,
            name: "SQL injection".to_string(),
            description: format!(
                "Parameter '{}' passes SQL metacharacters to the database unescaped.",
                parameter
            ),
            impact: "An attacker may read or modify database contents.".to_string(),
            remediation: "Use parameterized queries and validate input server-side.".to_string(),
            references: vec![OWASP_SQLI.to_string()],
        },
        SignalKind::ReflectedScript { parameter } => Rule {
            id: "reflected-xss".to_string(),
            severity: Severity::High,
            name: "Reflected cross-site scripting".to_string(),
            description: format!(
                "Script markup submitted in parameter '{}' is reflected without encoding.",
                parameter
            ),
            impact: "Attacker-controlled script can run in a victim's browser session.".to_string(),
            remediation: "Encode output by context and add a restrictive Content-Security-Policy."
                .to_string(),
            references: vec![OWASP_XSS.to_string()],
        },
        SignalKind::CertificateExpired { days_overdue } => Rule {
            id: "tls-cert-expired".to_string(),
            severity: Severity::High,
            name: "TLS certificate expired".to_string(),
            description: format!("The server certificate expired {} day(s) ago.", days_overdue),
            impact: "Clients cannot authenticate the server; users learn to ignore warnings."
                .to_string(),
            remediation: "Renew the certificate and automate renewal.".to_string(),
            references: vec![MOZ_TLS.to_string()],
        },
        SignalKind::CertificateExpiring { days_left } => {
            if *days_left >= CERT_EXPIRY_WARNING_DAYS {
                return None;
            }
            Rule {
                id: "tls-cert-expiring".to_string(),
                severity: Severity::Medium,
                name: "TLS certificate expiring soon".to_string(),
                description: format!("The server certificate expires in {} day(s).", days_left),
                impact: "The service will become unreachable for strict clients once it expires."
                    .to_string(),
                remediation: "Renew the certificate before it expires.".to_string(),
                references: vec![MOZ_TLS.to_string()],
            }
        }
        SignalKind::OpenPort { port, service } => {
            if ADMIN_SERVICE_PORTS.contains(port) {
                Rule {
                    id: "admin-service-exposed".to_string(),
                    severity: Severity::High,
                    name: format!("Remote administration service exposed ({})", service),
                    description: format!(
                        "Port {} ({}) accepts connections from the scanner.",
                        port, service
                    ),
                    impact: "Cleartext or legacy admin protocols invite credential theft and brute force."
                        .to_string(),
                    remediation: "Restrict the service to a management network or VPN, or disable it."
                        .to_string(),
                    references: vec![CIS_PORTS.to_string()],
                }
            } else if DATASTORE_PORTS.contains(port) {
                Rule {
                    id: "datastore-exposed".to_string(),
                    severity: Severity::High,
                    name: format!("Datastore exposed ({})", service),
                    description: format!(
                        "Port {} ({}) accepts connections from the scanner.",
                        port, service
                    ),
                    impact: "Direct datastore access can lead to data theft or destruction."
                        .to_string(),
                    remediation: "Bind the datastore to private interfaces and require authentication."
                        .to_string(),
                    references: vec![CIS_PORTS.to_string()],
                }
            } else {
                Rule {
                    id: "open-port".to_string(),
                    severity: Severity::Info,
                    name: format!("Open port {}/{}", port, service),
                    description: format!("Port {} ({}) is open.", port, service),
                    impact: "Every exposed service widens the attack surface.".to_string(),
                    remediation: "Confirm the service is meant to be public.".to_string(),
                    references: vec![],
                }
            }
        }
        SignalKind::InsecureCookie { cookie, missing } => Rule {
            id: format!("insecure-cookie:{}", cookie),
            severity: Severity::Medium,
            name: "Cookie without security flags".to_string(),
            description: format!("Cookie '{}' is set without {}.", cookie, missing.join(" and ")),
            impact: "Session tokens may leak over cleartext or to injected scripts.".to_string(),
            remediation: "Set the Secure and HttpOnly attributes on session cookies.".to_string(),
            references: vec![MDN_COOKIES.to_string()],
        },
        SignalKind::MissingHsts => Rule {
            id: "missing-hsts".to_string(),
            severity: Severity::Low,
            name: "Missing Strict-Transport-Security header".to_string(),
            description: "The response does not set Strict-Transport-Security.".to_string(),
            impact: "Clients can be downgraded to cleartext HTTP.".to_string(),
            remediation: "Send Strict-Transport-Security with a max-age of at least one year."
                .to_string(),
            references: vec![OWASP_HSTS.to_string()],
        },
        SignalKind::MissingCsp => Rule {
            id: "missing-csp".to_string(),
            severity: Severity::Low,
            name: "Missing Content-Security-Policy header".to_string(),
            description: "The response does not set Content-Security-Policy.".to_string(),
            impact: "Injected scripts are not constrained by the browser.".to_string(),
            remediation: "Define a Content-Security-Policy that limits script sources.".to_string(),
            references: vec![MDN_CSP.to_string()],
        },
        SignalKind::KnownCve { cve, product } => Rule {
            id: format!("cve:{}", cve),
            severity: Severity::Low,
            name: format!("Possible exposure: {}", cve),
            description: format!(
                "Service fingerprint ({}) suggests potential relevance of {}. Manual verification required.",
                product, cve
            ),
            impact: "May indicate outdated or vulnerable software version.".to_string(),
            remediation: "Verify software version; if affected, update to a patched release."
                .to_string(),
            references: vec![format!(
                "https://cve.mitre.org/cgi-bin/cvename.cgi?name={}",
                cve
            )],
        },
        SignalKind::ServerVersion { banner } => Rule {
            id: "server-version-disclosed".to_string(),
            severity: Severity::Info,
            name: "Server version disclosed".to_string(),
            description: format!("The service announces itself as '{}'.", banner),
            impact: "Version details help attackers pick matching exploits.".to_string(),
            remediation: "Suppress version information in banners and headers.".to_string(),
            references: vec![],
        },
    };
    Some(rule)
}
