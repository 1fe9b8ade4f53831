use crate::UrlError;
use serde::Deserialize;
use url::{Host, Url};

/// How a canonical URI is mapped onto its politeness key
///
/// Every policy is a pure function of the canonical URL, so a key derived
/// again after recovery always matches the key recorded before the crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueKeyPolicy {
    /// The lowercase host
    Host,
    /// The host, plus `:port` when the port is not the scheme default
    HostPort,
    /// The last two labels of a domain name; IP literals are kept whole
    Domain,
}

impl QueueKeyPolicy {
    /// Derives the politeness key for a canonical URL
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use sumi_frontier::url::QueueKeyPolicy;
    ///
    /// let url = Url::parse("http://blog.example.com:8080/post").unwrap();
    /// assert_eq!(QueueKeyPolicy::Host.key_for(&url).unwrap(), "blog.example.com");
    /// assert_eq!(QueueKeyPolicy::HostPort.key_for(&url).unwrap(), "blog.example.com:8080");
    /// assert_eq!(QueueKeyPolicy::Domain.key_for(&url).unwrap(), "example.com");
    /// ```
    pub fn key_for(&self, url: &Url) -> Result<String, UrlError> {
        let host = url.host().ok_or(UrlError::MissingHost)?;
        let host_str = match &host {
            Host::Domain(name) => name.to_ascii_lowercase(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => format!("[{}]", addr),
        };

        let key = match self {
            Self::Host => host_str,
            Self::HostPort => match url.port() {
                Some(port) => format!("{}:{}", host_str, port),
                None => host_str,
            },
            Self::Domain => match host {
                Host::Domain(_) => registrable_suffix(&host_str).to_string(),
                _ => host_str,
            },
        };

        Ok(key)
    }
}

/// Last two labels of a domain name
fn registrable_suffix(domain: &str) -> &str {
    let trimmed = domain.trim_end_matches('.');
    match trimmed.rmatch_indices('.').nth(1) {
        Some((idx, _)) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(policy: QueueKeyPolicy, raw: &str) -> String {
        policy.key_for(&Url::parse(raw).unwrap()).unwrap()
    }

    #[test]
    fn test_host_policy_ignores_port() {
        assert_eq!(key(QueueKeyPolicy::Host, "http://example.com:8080/"), "example.com");
        assert_eq!(key(QueueKeyPolicy::Host, "https://EXAMPLE.com/"), "example.com");
    }

    #[test]
    fn test_host_port_policy() {
        assert_eq!(key(QueueKeyPolicy::HostPort, "http://example.com/"), "example.com");
        // Default ports never appear in the key
        assert_eq!(key(QueueKeyPolicy::HostPort, "https://example.com:443/"), "example.com");
        assert_eq!(
            key(QueueKeyPolicy::HostPort, "http://example.com:8080/a"),
            "example.com:8080"
        );
    }

    #[test]
    fn test_domain_policy() {
        assert_eq!(key(QueueKeyPolicy::Domain, "http://a.b.example.com/"), "example.com");
        assert_eq!(key(QueueKeyPolicy::Domain, "http://example.com/"), "example.com");
        assert_eq!(key(QueueKeyPolicy::Domain, "http://localhost/"), "localhost");
    }

    #[test]
    fn test_ip_literals_kept_whole() {
        assert_eq!(key(QueueKeyPolicy::Domain, "http://10.0.0.1/"), "10.0.0.1");
        assert_eq!(key(QueueKeyPolicy::HostPort, "http://[::1]:8080/"), "[::1]:8080");
        assert_eq!(key(QueueKeyPolicy::Host, "http://[::1]/"), "[::1]");
    }

    #[test]
    fn test_same_canonical_uri_same_key() {
        let a = key(QueueKeyPolicy::HostPort, "http://example.com/a");
        let b = key(QueueKeyPolicy::HostPort, "http://example.com/b?x=1");
        assert_eq!(a, b);
    }
}
