//! Process-wide blacklist of hosts that have proven unreachable.
//!
//! Mirrors wget's behaviour around `ConnectTimeoutError`: once a host fails
//! to establish a TCP connection, or a Cloudflare origin-down status is
//! observed, every later retrieval against that host is rejected immediately
//! instead of paying the connect-timeout cost again. Entries are never
//! evicted; the list only grows for the life of the process.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{Context, Result};

/// `(scheme, host, port)` triple used to key the blacklist, matching the host
/// granularity wget uses: blocking `https://a.example.com` does not block
/// `http://a.example.com` on a different port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HostKey {
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .with_context(|| format!("invalid URL for host blacklist: {url}"))?;
        let scheme = parsed.scheme().to_string();
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("URL missing host: {url}"))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("URL missing port and unknown default: {url}"))?;
        Ok(Self { scheme, host, port })
    }
}

/// Cloudflare "origin is unreachable" statuses. A retrieval that hits one of
/// these is treated the same as a connect timeout: the host is condemned.
pub const CLOUDFLARE_ORIGIN_DOWN: [u32; 5] = [521, 522, 523, 525, 526];

/// Shared, thread-safe blacklist. One instance lives for the process and is
/// consulted before every retrieval attempt.
#[derive(Default)]
pub struct UnreachableHosts {
    hosts: RwLock<HashSet<HostKey>>,
}

impl UnreachableHosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condemn a host so that future `is_blacklisted` checks reject it.
    pub fn condemn(&self, key: HostKey) {
        let mut hosts = self.hosts.write().unwrap();
        if hosts.insert(key.clone()) {
            tracing::warn!(host = %key.host, port = key.port, "condemning unreachable host");
        }
    }

    pub fn is_blacklisted(&self, key: &HostKey) -> bool {
        self.hosts.read().unwrap().contains(key)
    }

    pub fn condemn_url(&self, url: &str) -> Result<()> {
        self.condemn(HostKey::from_url(url)?);
        Ok(())
    }

    pub fn is_url_blacklisted(&self, url: &str) -> Result<bool> {
        Ok(self.is_blacklisted(&HostKey::from_url(url)?))
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_from_url_parses_scheme_host_port() {
        let key = HostKey::from_url("https://example.com:8443/path").unwrap();
        assert_eq!(key.scheme, "https");
        assert_eq!(key.host, "example.com");
        assert_eq!(key.port, 8443);
    }

    #[test]
    fn host_key_uses_default_port_when_missing() {
        let key = HostKey::from_url("http://example.com/path").unwrap();
        assert_eq!(key.port, 80);
    }

    #[test]
    fn condemned_host_stays_blacklisted() {
        let hosts = UnreachableHosts::new();
        assert!(!hosts.is_url_blacklisted("https://cdn.example.com/a.jpg").unwrap());
        hosts.condemn_url("https://cdn.example.com/a.jpg").unwrap();
        assert!(hosts.is_url_blacklisted("https://cdn.example.com/b.jpg").unwrap());
        // different port is a different host
        assert!(!hosts.is_url_blacklisted("https://cdn.example.com:8443/a.jpg").unwrap());
    }

    #[test]
    fn cloudflare_statuses_are_origin_down() {
        for code in CLOUDFLARE_ORIGIN_DOWN {
            assert!((521..=526).contains(&code) && code != 524);
        }
    }
}
