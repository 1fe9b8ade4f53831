use serde::{Deserialize, Serialize};
use std::fmt;

/// How a URI was reached from the URI that linked to it
///
/// Each hop is recorded as one character in a record's hops path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hop {
    /// An ordinary hyperlink (`L`)
    Navlink,
    /// An embedded resource such as an image or script (`E`)
    Embed,
    /// A URI guessed from script text or similar (`X`)
    Speculative,
    /// A redirect target (`R`)
    Redirect,
    /// A resource that must be fetched first, such as DNS or robots.txt (`P`)
    Prerequisite,
    /// A URI inferred from another, such as a site's favicon (`I`)
    Inferred,
}

impl Hop {
    /// The character this hop contributes to a hops path
    pub fn code(&self) -> char {
        match self {
            Self::Navlink => 'L',
            Self::Embed => 'E',
            Self::Speculative => 'X',
            Self::Redirect => 'R',
            Self::Prerequisite => 'P',
            Self::Inferred => 'I',
        }
    }

    /// Parses a hop from its path character
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'L' => Some(Self::Navlink),
            'E' => Some(Self::Embed),
            'X' => Some(Self::Speculative),
            'R' => Some(Self::Redirect),
            'P' => Some(Self::Prerequisite),
            'I' => Some(Self::Inferred),
            _ => None,
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Scheduling directive attached to a record by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Directive {
    /// Queue the URI unless it has been seen before
    #[default]
    Normal,
    /// Queue the URI even if it has been seen before
    ForceFetch,
    /// Record the URI as seen without queueing it
    MarkSeen,
}

/// One candidate or in-flight fetch target
///
/// Callers fill in `uri`, `hops`, `via` and `is_seed`. The frontier fills in
/// `canonical` and `key` when the record is accepted, and updates `attempts`
/// and `last_status` as fetches complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriRecord {
    /// The URI as it was discovered
    pub uri: String,

    /// Canonical form used for fingerprinting
    #[serde(default)]
    pub canonical: String,

    /// Politeness key the record is queued under
    #[serde(default)]
    pub key: String,

    /// Hop codes from the seed to this URI
    #[serde(default)]
    pub hops: String,

    /// The URI this one was discovered from
    #[serde(default)]
    pub via: Option<String>,

    #[serde(default)]
    pub is_seed: bool,

    /// Completed fetch attempts
    #[serde(default)]
    pub attempts: u32,

    /// Status code of the most recent attempt, if one was received
    #[serde(default)]
    pub last_status: Option<u16>,

    #[serde(default)]
    pub directive: Directive,
}

impl UriRecord {
    /// Creates a seed record
    pub fn seed(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            canonical: String::new(),
            key: String::new(),
            hops: String::new(),
            via: None,
            is_seed: true,
            attempts: 0,
            last_status: None,
            directive: Directive::Normal,
        }
    }

    /// Creates a record for a URI discovered from `parent`
    ///
    /// The hops path extends the parent's path by one hop.
    pub fn outlink(parent: &UriRecord, uri: impl Into<String>, hop: Hop) -> Self {
        let mut hops = String::with_capacity(parent.hops.len() + 1);
        hops.push_str(&parent.hops);
        hops.push(hop.code());

        Self {
            uri: uri.into(),
            canonical: String::new(),
            key: String::new(),
            hops,
            via: Some(parent.uri.clone()),
            is_seed: false,
            attempts: 0,
            last_status: None,
            directive: Directive::Normal,
        }
    }

    /// Creates a record from the parts a link collaborator supplies
    pub fn discovered(
        uri: impl Into<String>,
        hops: impl Into<String>,
        via: Option<String>,
        is_seed: bool,
    ) -> Self {
        Self {
            hops: hops.into(),
            via,
            is_seed,
            ..Self::seed(uri)
        }
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = directive;
        self
    }

    /// The most recent hop, if this is not a seed
    pub fn last_hop(&self) -> Option<Hop> {
        self.hops.chars().last().and_then(Hop::from_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_codes_round_trip() {
        for hop in [
            Hop::Navlink,
            Hop::Embed,
            Hop::Speculative,
            Hop::Redirect,
            Hop::Prerequisite,
            Hop::Inferred,
        ] {
            assert_eq!(Hop::from_code(hop.code()), Some(hop));
        }
        assert_eq!(Hop::from_code('Z'), None);
    }

    #[test]
    fn test_outlink_extends_hops() {
        let seed = UriRecord::seed("http://example.com/");
        let page = UriRecord::outlink(&seed, "http://example.com/a", Hop::Navlink);
        let image = UriRecord::outlink(&page, "http://example.com/a.png", Hop::Embed);

        assert_eq!(seed.hops, "");
        assert!(seed.is_seed);
        assert_eq!(image.hops, "LE");
        assert_eq!(image.via.as_deref(), Some("http://example.com/a"));
        assert!(!image.is_seed);
        assert_eq!(image.last_hop(), Some(Hop::Embed));
        assert_eq!(seed.last_hop(), None);
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let record: UriRecord = serde_json::from_str(r#"{"uri":"http://a.com/"}"#).unwrap();
        assert_eq!(record.uri, "http://a.com/");
        assert_eq!(record.directive, Directive::Normal);
        assert_eq!(record.attempts, 0);
    }

    #[test]
    fn test_directive_serialized_kebab_case() {
        let record = UriRecord::seed("http://a.com/").with_directive(Directive::ForceFetch);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"force-fetch\""));
    }
}
