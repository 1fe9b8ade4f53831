/// Checks if a host matches an override pattern
///
/// Two pattern forms are accepted:
/// 1. Exact: "example.com" matches only "example.com"
/// 2. Wildcard: "*.example.com" matches the bare domain and every
///    subdomain at any depth
///
/// Comparison ignores ASCII case, so a pattern written in lowercase still
/// matches a key derived from a host that was not lowercased.
///
/// # Examples
///
/// ```
/// use sumi_frontier::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    let Some(base) = pattern.strip_prefix("*.") else {
        return host.eq_ignore_ascii_case(pattern);
    };

    if host.eq_ignore_ascii_case(base) {
        return true;
    }

    // Subdomain: "<label>." immediately followed by the base
    host.len() > base.len() + 1
        && host.is_char_boundary(host.len() - base.len())
        && host[host.len() - base.len()..].eq_ignore_ascii_case(base)
        && host.as_bytes()[host.len() - base.len() - 1] == b'.'
}
