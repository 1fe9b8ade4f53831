use crate::UrlError;
use serde::Deserialize;
use url::Url;

/// Query parameters that only carry analytics state
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Query parameters that carry a server-side session identifier
const SESSION_PARAMS: &[&str] = &["jsessionid", "phpsessid", "cfid", "cftoken"];

/// A single canonicalization rule
///
/// Every rule is a pure string-to-string transform. Rules run in the order
/// they are declared in the configuration; a rule that cannot make sense of
/// its input returns it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonRule {
    /// Lowercases the scheme and the host
    LowercaseSchemeHost,
    /// Removes `user:password@` from the authority
    StripUserinfo,
    /// Removes a leading `www.` (or `www2.`, `www13.`, ...) host label
    StripWww,
    /// Removes `:80` from http and `:443` from https authorities
    StripDefaultPort,
    /// Removes everything from the first `#`
    StripFragment,
    /// Resolves `.` and `..` segments and collapses repeated slashes
    NormalizePath,
    /// Removes session-id query parameters and `;jsessionid=` path parameters
    StripSessionIds,
    /// Removes analytics query parameters (`utm_*`, `fbclid`, ...)
    StripTrackingParams,
    /// Drops an empty query and stray `&` separators
    FixQuery,
    /// Sorts query parameters by name
    SortQuery,
    /// Rewrites `http://` to `https://`
    ForceHttps,
}

impl CanonRule {
    /// The default rule list, in application order, with its enabled flags
    pub fn defaults() -> &'static [(CanonRule, bool)] {
        &[
            (CanonRule::LowercaseSchemeHost, true),
            (CanonRule::StripUserinfo, true),
            (CanonRule::StripWww, false),
            (CanonRule::StripDefaultPort, true),
            (CanonRule::StripFragment, true),
            (CanonRule::NormalizePath, true),
            (CanonRule::StripSessionIds, true),
            (CanonRule::StripTrackingParams, true),
            (CanonRule::FixQuery, true),
            (CanonRule::SortQuery, false),
            (CanonRule::ForceHttps, false),
        ]
    }

    /// Configuration name of this rule
    pub fn name(&self) -> &'static str {
        match self {
            Self::LowercaseSchemeHost => "lowercase-scheme-host",
            Self::StripUserinfo => "strip-userinfo",
            Self::StripWww => "strip-www",
            Self::StripDefaultPort => "strip-default-port",
            Self::StripFragment => "strip-fragment",
            Self::NormalizePath => "normalize-path",
            Self::StripSessionIds => "strip-session-ids",
            Self::StripTrackingParams => "strip-tracking-params",
            Self::FixQuery => "fix-query",
            Self::SortQuery => "sort-query",
            Self::ForceHttps => "force-https",
        }
    }

    /// Applies this rule to a URI string
    pub fn apply(&self, uri: &str) -> String {
        match self {
            Self::LowercaseSchemeHost => map_authority(uri, |scheme, authority| {
                let (userinfo, hostport) = split_userinfo(authority);
                (
                    scheme.to_ascii_lowercase(),
                    format!("{}{}", userinfo, hostport.to_ascii_lowercase()),
                )
            }),
            Self::StripUserinfo => map_authority(uri, |scheme, authority| {
                (scheme.to_string(), split_userinfo(authority).1.to_string())
            }),
            Self::StripWww => map_authority(uri, |scheme, authority| {
                let (userinfo, hostport) = split_userinfo(authority);
                (
                    scheme.to_string(),
                    format!("{}{}", userinfo, strip_www_label(hostport)),
                )
            }),
            Self::StripDefaultPort => map_authority(uri, |scheme, authority| {
                let default = match scheme.to_ascii_lowercase().as_str() {
                    "http" => ":80",
                    "https" => ":443",
                    _ => return (scheme.to_string(), authority.to_string()),
                };
                let stripped = authority.strip_suffix(default).unwrap_or(authority);
                (scheme.to_string(), stripped.to_string())
            }),
            Self::StripFragment => match uri.find('#') {
                Some(idx) => uri[..idx].to_string(),
                None => uri.to_string(),
            },
            Self::NormalizePath => map_path(uri, normalize_path),
            Self::StripSessionIds => {
                let without_path_param = map_path(uri, strip_jsessionid_path_param);
                map_query(&without_path_param, |pairs| {
                    pairs.retain(|pair| !is_session_param(pair));
                })
            }
            Self::StripTrackingParams => map_query(uri, |pairs| {
                pairs.retain(|pair| !is_tracking_param(param_name(pair)));
            }),
            Self::FixQuery => map_query(uri, |pairs| {
                pairs.retain(|pair| !pair.is_empty());
            }),
            Self::SortQuery => map_query(uri, |pairs| {
                pairs.sort_by(|a, b| param_name(a).cmp(param_name(b)));
            }),
            Self::ForceHttps => match uri.get(..7) {
                Some(prefix) if prefix.eq_ignore_ascii_case("http://") => {
                    format!("https://{}", &uri[7..])
                }
                _ => uri.to_string(),
            },
        }
    }
}

/// Canonicalizes a URI by applying the rules in order
///
/// The input must be an absolute http(s) URI with a host. After the rules
/// run, the result is parsed once more so the canonical form is always a
/// well-formed URL.
///
/// # Examples
///
/// ```
/// use sumi_frontier::url::{canonicalize, CanonRule};
///
/// let rules = [CanonRule::LowercaseSchemeHost, CanonRule::StripDefaultPort, CanonRule::StripFragment];
/// let url = canonicalize("HTTP://Example.COM:80/a/b#top", &rules).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b");
/// ```
pub fn canonicalize(raw: &str, rules: &[CanonRule]) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    check_http_url(trimmed)?;

    let transformed = rules
        .iter()
        .fold(trimmed.to_string(), |uri, rule| rule.apply(&uri));

    check_http_url(&transformed)
}

fn check_http_url(uri: &str) -> Result<Url, UrlError> {
    let url = Url::parse(uri).map_err(|e| UrlError::Parse(format!("{}: {}", uri, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlError::MissingHost),
    }
}

/// Splits `scheme://authority/rest` and rebuilds it with a new scheme and authority
fn map_authority<F>(uri: &str, f: F) -> String
where
    F: FnOnce(&str, &str) -> (String, String),
{
    let Some(sep) = uri.find("://") else {
        return uri.to_string();
    };
    let scheme = &uri[..sep];
    let after = &uri[sep + 3..];
    let end = after.find(['/', '?', '#']).unwrap_or(after.len());
    let (authority, rest) = after.split_at(end);

    let (scheme, authority) = f(scheme, authority);
    format!("{}://{}{}", scheme, authority, rest)
}

/// Splits an authority into (`userinfo@`, `host[:port]`)
fn split_userinfo(authority: &str) -> (&str, &str) {
    match authority.rfind('@') {
        Some(idx) => authority.split_at(idx + 1),
        None => ("", authority),
    }
}

fn strip_www_label(hostport: &str) -> &str {
    let Some(dot) = hostport.find('.') else {
        return hostport;
    };
    let label = &hostport[..dot];
    let rest = &hostport[dot + 1..];

    // The host is not IDNA-mapped yet, so the label may hold multibyte chars
    let is_www = match (label.get(..3), label.get(3..)) {
        (Some(prefix), Some(digits)) => {
            prefix.eq_ignore_ascii_case("www") && digits.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    };

    // Never reduce a host to a bare suffix like "com"
    if is_www && rest.contains('.') {
        rest
    } else {
        hostport
    }
}

/// Byte range of the path component: after the authority, before `?` or `#`
fn path_range(uri: &str) -> Option<(usize, usize)> {
    let sep = uri.find("://")?;
    let after_scheme = sep + 3;
    let start = uri[after_scheme..]
        .find(['/', '?', '#'])
        .map(|i| after_scheme + i)
        .unwrap_or(uri.len());
    let end = uri[start..]
        .find(['?', '#'])
        .map(|i| start + i)
        .unwrap_or(uri.len());
    Some((start, end))
}

fn map_path<F>(uri: &str, f: F) -> String
where
    F: FnOnce(&str) -> String,
{
    match path_range(uri) {
        Some((start, end)) => format!("{}{}{}", &uri[..start], f(&uri[start..end]), &uri[end..]),
        None => uri.to_string(),
    }
}

/// Rebuilds the query of a URI after editing its `&`-separated pairs
fn map_query<F>(uri: &str, f: F) -> String
where
    F: FnOnce(&mut Vec<&str>),
{
    let (before_fragment, fragment) = match uri.find('#') {
        Some(idx) => uri.split_at(idx),
        None => (uri, ""),
    };
    let Some(q) = before_fragment.find('?') else {
        return uri.to_string();
    };
    let base = &before_fragment[..q];
    let query = &before_fragment[q + 1..];

    let mut pairs: Vec<&str> = query.split('&').collect();
    f(&mut pairs);
    // Separators left empty by earlier edits never carry meaning
    pairs.retain(|pair| !pair.is_empty());

    if pairs.is_empty() {
        format!("{}{}", base, fragment)
    } else {
        format!("{}?{}{}", base, pairs.join("&"), fragment)
    }
}

fn param_name(pair: &str) -> &str {
    pair.split_once('=').map(|(name, _)| name).unwrap_or(pair)
}

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

fn is_session_param(pair: &str) -> bool {
    let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
    let lower = name.to_ascii_lowercase();

    if SESSION_PARAMS.contains(&lower.as_str()) || lower.starts_with("aspsessionid") {
        return true;
    }

    lower == "sid" && value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Removes a `;jsessionid=...` matrix parameter from a path
fn strip_jsessionid_path_param(path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    match lower.find(";jsessionid=") {
        Some(start) => {
            let end = path[start + 1..]
                .find(';')
                .map(|i| start + 1 + i)
                .unwrap_or(path.len());
            format!("{}{}", &path[..start], &path[end..])
        }
        None => path.to_string(),
    }
}

/// Resolves dot segments and collapses empty segments
///
/// A trailing slash is kept when the input had one, or when the final
/// segment was `.` or `..`.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = path.ends_with('/');

    for segment in path.split('/') {
        match segment {
            "" => {}
            "." => trailing_slash = true,
            ".." => {
                segments.pop();
                trailing_slash = true;
            }
            other => {
                segments.push(other);
                trailing_slash = path.ends_with('/');
            }
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if trailing_slash {
        result.push('/');
    }
    result
}
