// Target Validation
//
// Accepts a URL, a bare hostname, an IPv4/IPv6 address or a CIDR range and
// returns its canonical form. Bare hostnames get an https:// scheme.

use crate::{Result, ScanError};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use url::{Host, Url};

/// Longest target string accepted
pub const MAX_TARGET_LEN: usize = 255;

/// What kind of target was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Url,
    Ip,
    Cidr,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Url => "url",
            TargetKind::Ip => "ip",
            TargetKind::Cidr => "cidr",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "url" => Ok(TargetKind::Url),
            "ip" => Ok(TargetKind::Ip),
            "cidr" => Ok(TargetKind::Cidr),
            other => Err(ScanError::Other(format!("unknown target kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Parsed {
    Url(Url),
    Ip(IpAddr),
    Cidr(IpNetwork),
}

/// A validated scan target in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    parsed: Parsed,
}

impl ScanTarget {
    /// Target kind
    pub fn kind(&self) -> TargetKind {
        match self.parsed {
            Parsed::Url(_) => TargetKind::Url,
            Parsed::Ip(_) => TargetKind::Ip,
            Parsed::Cidr(_) => TargetKind::Cidr,
        }
    }

    /// Canonical string form
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Host to connect to (no brackets around IPv6 literals)
    pub fn host(&self) -> String {
        match &self.parsed {
            Parsed::Url(url) => match url.host() {
                Some(Host::Domain(domain)) => domain.to_string(),
                Some(Host::Ipv4(ip)) => ip.to_string(),
                Some(Host::Ipv6(ip)) => ip.to_string(),
                None => String::new(),
            },
            Parsed::Ip(ip) => ip.to_string(),
            Parsed::Cidr(net) => net.network().to_string(),
        }
    }

    /// Port given explicitly in a URL target
    pub fn explicit_port(&self) -> Option<u16> {
        match &self.parsed {
            Parsed::Url(url) => url.port(),
            _ => None,
        }
    }

    /// Scheme + authority of the target, used as the first HTTP probe
    pub fn base_url(&self) -> String {
        match &self.parsed {
            Parsed::Url(url) => {
                let mut base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
                if let Some(port) = url.port() {
                    base.push_str(&format!(":{}", port));
                }
                base
            }
            Parsed::Ip(IpAddr::V6(ip)) => format!("https://[{}]", ip),
            Parsed::Ip(ip) => format!("https://{}", ip),
            Parsed::Cidr(net) => format!("https://{}", net.network()),
        }
    }

    /// Hosts covered by the target, at most `limit` of them for CIDR ranges.
    /// IPv4 ranges wider than /31 skip their network and broadcast addresses.
    pub fn hosts(&self, limit: usize) -> Vec<String> {
        match &self.parsed {
            Parsed::Cidr(net) => {
                let edges = match net {
                    IpNetwork::V4(v4) if v4.prefix() < 31 => {
                        Some((IpAddr::V4(v4.network()), IpAddr::V4(v4.broadcast())))
                    }
                    _ => None,
                };
                net.iter()
                    .filter(|ip| edges.map_or(true, |(network, broadcast)| *ip != network && *ip != broadcast))
                    .take(limit.max(1))
                    .map(|ip| ip.to_string())
                    .collect()
            }
            _ => vec![self.host()],
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parsed {
            Parsed::Url(url) => f.write_str(url.as_str()),
            Parsed::Ip(ip) => write!(f, "{}", ip),
            Parsed::Cidr(net) => write!(f, "{}/{}", net.network(), net.prefix()),
        }
    }
}

impl FromStr for ScanTarget {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        validate_target(s)
    }
}

/// Validate a raw target string and return its canonical form
pub fn validate_target(raw: &str) -> Result<ScanTarget> {
    let target = raw.trim();

    if target.is_empty() {
        return Err(ScanError::invalid_target(raw, "target is empty"));
    }
    if target.len() > MAX_TARGET_LEN {
        return Err(ScanError::invalid_target(
            truncate(target),
            format!("target longer than {} characters", MAX_TARGET_LEN),
        ));
    }
    if target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ScanError::invalid_target(target, "target contains whitespace"));
    }

    if let Some((scheme, _)) = target.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ScanError::invalid_target(
                target,
                format!("unsupported scheme '{}'", scheme),
            ));
        }
        let authority = &target[scheme.len() + 3..];
        return parse_url(target, target, authority, true);
    }

    if target.contains('/') {
        if let Ok(net) = target.parse::<IpNetwork>() {
            let canonical = IpNetwork::new(net.network(), net.prefix())
                .map_err(|e| ScanError::invalid_target(target, e.to_string()))?;
            return Ok(ScanTarget {
                parsed: Parsed::Cidr(canonical),
            });
        }

        let (addr, suffix) = target.split_once('/').unwrap_or((target, ""));
        if addr.parse::<IpAddr>().is_ok() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return Err(ScanError::invalid_target(target, "invalid CIDR prefix length"));
        }
    }

    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ScanTarget {
            parsed: Parsed::Ip(ip),
        });
    }

    parse_url(target, &format!("https://{}", target), target, false)
}

fn parse_url(
    original: &str,
    candidate: &str,
    authority: &str,
    allow_single_label: bool,
) -> Result<ScanTarget> {
    let host = raw_host(authority);
    if host.is_empty() {
        return Err(ScanError::invalid_target(original, "missing host"));
    }
    if looks_like_ipv4(host) && host.parse::<Ipv4Addr>().is_err() {
        return Err(ScanError::invalid_target(original, "malformed IPv4 address"));
    }

    let url = Url::parse(candidate).map_err(|e| ScanError::invalid_target(original, e.to_string()))?;

    match url.host() {
        Some(Host::Domain(domain)) => validate_domain(original, domain, allow_single_label)?,
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {}
        None => return Err(ScanError::invalid_target(original, "missing host")),
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(ScanError::invalid_target(original, "credentials are not allowed in targets"));
    }

    Ok(ScanTarget {
        parsed: Parsed::Url(url),
    })
}

/// Host portion of `host[:port][/path...]`, as typed
fn raw_host(authority: &str) -> &str {
    let end = authority.find(['/', '?', '#']).unwrap_or(authority.len());
    let authority = &authority[..end];
    let authority = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);

    if authority.starts_with('[') {
        return authority
            .find(']')
            .map(|i| &authority[..=i])
            .unwrap_or(authority);
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

fn looks_like_ipv4(host: &str) -> bool {
    !host.is_empty() && host.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn validate_domain(original: &str, domain: &str, allow_single_label: bool) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    let labels: Vec<&str> = domain.split('.').collect();

    if labels.len() < 2 && !allow_single_label {
        return Err(ScanError::invalid_target(
            original,
            "hostname must be fully qualified (e.g. example.com)",
        ));
    }

    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return Err(ScanError::invalid_target(original, "invalid hostname label length"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ScanError::invalid_target(
                original,
                "hostname labels cannot start or end with '-'",
            ));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ScanError::invalid_target(original, "hostname contains invalid characters"));
        }
    }

    Ok(())
}

fn truncate(target: &str) -> String {
    target.chars().take(32).collect::<String>() + "..."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_defaults_to_https() {
        let target = validate_target("example.com").unwrap();
        assert_eq!(target.kind(), TargetKind::Url);
        assert_eq!(target.canonical(), "https://example.com/");
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.base_url(), "https://example.com");
    }

    #[test]
    fn test_explicit_scheme_is_kept() {
        let target = validate_target("  http://Example.COM:8080/login  ").unwrap();
        assert_eq!(target.canonical(), "http://example.com:8080/login");
        assert_eq!(target.explicit_port(), Some(8080));
        assert_eq!(target.base_url(), "http://example.com:8080");
    }

    #[test]
    fn test_ip_addresses() {
        let v4 = validate_target("192.168.1.10").unwrap();
        assert_eq!(v4.kind(), TargetKind::Ip);
        assert_eq!(v4.canonical(), "192.168.1.10");

        let v6 = validate_target("2001:0db8:0000:0000:0000:0000:0000:0001").unwrap();
        assert_eq!(v6.kind(), TargetKind::Ip);
        assert_eq!(v6.canonical(), "2001:db8::1");
        assert_eq!(v6.base_url(), "https://[2001:db8::1]");
    }

    #[test]
    fn test_cidr_is_normalised_to_network() {
        let target = validate_target("10.0.0.7/24").unwrap();
        assert_eq!(target.kind(), TargetKind::Cidr);
        assert_eq!(target.canonical(), "10.0.0.0/24");
        assert_eq!(target.hosts(3), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_cidr_hosts_skip_network_and_broadcast() {
        let hosts = validate_target("192.168.5.0/30").unwrap().hosts(16);
        assert_eq!(hosts, vec!["192.168.5.1", "192.168.5.2"]);

        let all = validate_target("10.0.0.0/24").unwrap().hosts(1000);
        assert_eq!(all.len(), 254);
        assert!(!all.contains(&"10.0.0.255".to_string()));

        // Point-to-point and single-host ranges keep every address
        assert_eq!(validate_target("10.0.0.4/31").unwrap().hosts(16), vec!["10.0.0.4", "10.0.0.5"]);
        assert_eq!(validate_target("10.0.0.9/32").unwrap().hosts(16), vec!["10.0.0.9"]);
    }

    #[test]
    fn test_canonical_form_is_stable() {
        for raw in ["example.com", "https://a.example.org/x", "10.1.2.3", "10.0.0.0/8", "::1"] {
            let first = validate_target(raw).unwrap();
            let second = validate_target(&first.canonical()).unwrap();
            assert_eq!(first, second, "canonical form of {} not stable", raw);
        }
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert!(validate_target("").is_err());
        assert!(validate_target("   \t ").is_err());
        assert!(validate_target("exa mple.com").is_err());
    }

    #[test]
    fn test_rejects_malformed_hosts() {
        for raw in [
            "localhost",
            "-bad.example.com",
            "bad-.example.com",
            "exa_mple.com",
            "999.1.1.1",
            "1.2.3",
            "10.0.0.0/33",
            "ftp://example.com",
            "https://",
            "https://user:pw@example.com",
        ] {
            let err = validate_target(raw).unwrap_err();
            assert!(
                matches!(err, ScanError::InvalidTarget { .. }),
                "expected InvalidTarget for {}",
                raw
            );
        }
    }

    #[test]
    fn test_single_label_allowed_with_scheme() {
        let target = validate_target("http://localhost:3000").unwrap();
        assert_eq!(target.host(), "localhost");
    }

    #[test]
    fn test_rejects_overlong_target() {
        let raw = format!("{}.com", "a".repeat(MAX_TARGET_LEN));
        assert!(validate_target(&raw).is_err());
    }
}
