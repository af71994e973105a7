// Raw Signals - what scan stages observe before classification

use serde::{Deserialize, Serialize};

/// Kind of issue a stage observed, with the parameters the classifier needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    /// Input containing SQL metacharacters produced a database error
    SqlMetacharAccepted { parameter: String },
    /// Script markup submitted in a parameter came back unescaped
    ReflectedScript { parameter: String },
    /// Peer certificate is past its notAfter date
    CertificateExpired { days_overdue: i64 },
    /// Peer certificate expires soon
    CertificateExpiring { days_left: i64 },
    /// A TCP port accepted a connection
    OpenPort { port: u16, service: String },
    /// A cookie was set without Secure and/or HttpOnly
    InsecureCookie { cookie: String, missing: Vec<String> },
    MissingHsts,
    MissingCsp,
    /// Banner or server header matched the fingerprint index
    KnownCve { cve: String, product: String },
    /// Server header or banner reveals a product version
    ServerVersion { banner: String },
}

/// A signal together with where it was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignal {
    pub kind: SignalKind,
    /// Location on the target, e.g. `/login` or `10.0.0.1:23/tcp`
    pub path: String,
    pub evidence: Option<String>,
}

impl RawSignal {
    pub fn new(kind: SignalKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}
