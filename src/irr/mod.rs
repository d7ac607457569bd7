//! Routing registry vocabulary
//!
//! Object typing and attribute patterns follow RFC 2622 (RPSL) and
//! RFC 4012 (RPSLng):
//!
//! - `AS-FOO`, `AS2515:AS-FOO` are as-sets
//! - `RS-FOO`, `AS2515:RS-FOO` are route-sets
//! - `AS2515` is an aut-num
//!
//! The static registry directory lives in [`directory`].

pub mod directory;

use crate::error::ConfigError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::LazyLock;

pub use directory::{DialectKind, Directory, Endpoint, DEFAULT_PORT};

static AS_SET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^AS-[\w-]+$|:AS-[\w-]+$").expect("Invalid as-set regex"));

static ROUTE_SET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^RS-[\w-]+$|:RS-[\w-]+$").expect("Invalid route-set regex"));

static AUT_NUM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^AS\d+$|:AS\d+$").expect("Invalid aut-num regex"));

/// `members:` / `mp-members:` attribute lines
pub static MEMBERS_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:mp-)?members:[ \t]*(.*?)\r?$").expect("Invalid members regex"));

static ROUTE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^route:[ \t]*(\S+)[ \t]*\r?$").expect("Invalid route regex"));

static ROUTE6_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^route6:[ \t]*(\S+)[ \t]*\r?$").expect("Invalid route6 regex"));

/// Registry object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    AsSet,
    RouteSet,
    AutNum,
}

impl ObjectType {
    /// Classify an object name, `None` if it is none of the known types
    pub fn of(object: &str) -> Option<Self> {
        if AS_SET_REGEX.is_match(object) {
            Some(ObjectType::AsSet)
        } else if ROUTE_SET_REGEX.is_match(object) {
            Some(ObjectType::RouteSet)
        } else if AUT_NUM_REGEX.is_match(object) {
            Some(ObjectType::AutNum)
        } else {
            None
        }
    }

    /// RPSL class name, as used by `-T`
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::AsSet => "as-set",
            ObjectType::RouteSet => "route-set",
            ObjectType::AutNum => "aut-num",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IP protocol of a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ipv4,
    Ipv6,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Ipv4, Protocol::Ipv6];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ipv4 => "ipv4",
            Protocol::Ipv6 => "ipv6",
        }
    }

    /// Pattern matching the route attribute for this protocol
    fn route_tag(&self) -> &'static Regex {
        match self {
            Protocol::Ipv4 => &ROUTE_TAG,
            Protocol::Ipv6 => &ROUTE6_TAG,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Protocol::Ipv4),
            "ipv6" => Ok(Protocol::Ipv6),
            _ => Err(ConfigError::InvalidFilter {
                value: s.to_string(),
            }),
        }
    }
}

/// Validated, non-empty, duplicate-free protocol filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSet(Vec<Protocol>);

impl ProtocolSet {
    /// Both protocols, IPv4 first
    pub fn all() -> Self {
        Self(Protocol::ALL.to_vec())
    }

    /// Validate raw protocol names
    ///
    /// Every value must be `ipv4` or `ipv6` (case-insensitive); all invalid
    /// values are reported together. An empty list is rejected.
    pub fn parse<I, S>(values: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut protocols = Vec::new();
        let mut invalid = Vec::new();

        for value in values {
            match value.as_ref().parse::<Protocol>() {
                Ok(p) if !protocols.contains(&p) => protocols.push(p),
                Ok(_) => {}
                Err(_) => invalid.push(value.as_ref().to_string()),
            }
        }

        if !invalid.is_empty() {
            return Err(ConfigError::InvalidFilter {
                value: invalid.join(", "),
            });
        }

        Self::from_protocols(protocols)
    }

    /// Build from already-typed protocols
    pub fn from_protocols(protocols: Vec<Protocol>) -> Result<Self, ConfigError> {
        let mut unique: Vec<Protocol> = Vec::with_capacity(protocols.len());
        for p in protocols {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        if unique.is_empty() {
            return Err(ConfigError::EmptyProtocolFilter);
        }
        Ok(Self(unique))
    }

    pub fn contains(&self, protocol: Protocol) -> bool {
        self.0.contains(&protocol)
    }

    pub fn iter(&self) -> impl Iterator<Item = Protocol> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ProtocolSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Prefixes split by IP version, in order of first appearance
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassifiedPrefixes {
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    /// Tokens that are not a prefix of either version
    pub rejected: Vec<String>,
}

impl ClassifiedPrefixes {
    pub fn get(&self, protocol: Protocol) -> &[String] {
        match protocol {
            Protocol::Ipv4 => &self.ipv4,
            Protocol::Ipv6 => &self.ipv6,
        }
    }
}

/// Determine the IP version of a prefix token
///
/// Only the address part is inspected, so `192.0.2.0/24` and the range
/// operator form `192.0.2.0/24^+` are both IPv4. The token itself is kept
/// verbatim by callers.
pub fn prefix_protocol(prefix: &str) -> Option<Protocol> {
    let addr = prefix.split(['/', '^']).next().unwrap_or(prefix).trim();

    if addr.parse::<Ipv4Addr>().is_ok() {
        Some(Protocol::Ipv4)
    } else if addr.parse::<Ipv6Addr>().is_ok() {
        Some(Protocol::Ipv6)
    } else {
        None
    }
}

/// Split prefix tokens by IP version
pub fn classify_by_protocol<I, S>(prefixes: I) -> ClassifiedPrefixes
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut classified = ClassifiedPrefixes::default();

    for prefix in prefixes {
        let prefix = prefix.as_ref();
        let bucket = match prefix_protocol(prefix) {
            Some(Protocol::Ipv4) => &mut classified.ipv4,
            Some(Protocol::Ipv6) => &mut classified.ipv6,
            None => &mut classified.rejected,
        };
        if !bucket.iter().any(|p| p == prefix) {
            bucket.push(prefix.to_string());
        }
    }

    classified
}

/// Collect `route:` or `route6:` values from a key-value response,
/// de-duplicated in order of first appearance
pub fn parse_route_tags(response: &str, protocol: Protocol) -> Vec<String> {
    let mut prefixes: Vec<String> = Vec::new();
    for caps in protocol.route_tag().captures_iter(response) {
        let prefix = &caps[1];
        if !prefixes.iter().any(|p| p == prefix) {
            prefixes.push(prefix.to_string());
        }
    }
    prefixes
}

/// Check whether a token looks like an autonomous-system identifier
///
/// This is a case-insensitive `AS` prefix match, so as-set names match too.
pub fn looks_like_as(token: &str) -> bool {
    token
        .get(..2)
        .is_some_and(|head| head.eq_ignore_ascii_case("AS"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type() {
        assert_eq!(ObjectType::of("AS-JPNIC"), Some(ObjectType::AsSet));
        assert_eq!(ObjectType::of("as-jpnic"), Some(ObjectType::AsSet));
        assert_eq!(ObjectType::of("AS2515:AS-CUSTOMERS"), Some(ObjectType::AsSet));
        assert_eq!(ObjectType::of("RS-RC-26462"), Some(ObjectType::RouteSet));
        assert_eq!(ObjectType::of("AS2515:RS-EXPORT"), Some(ObjectType::RouteSet));
        assert_eq!(ObjectType::of("AS2515"), Some(ObjectType::AutNum));
        assert_eq!(ObjectType::of("as2515"), Some(ObjectType::AutNum));
        assert_eq!(ObjectType::of("INVALID"), None);
        assert_eq!(ObjectType::of(""), None);
        assert_eq!(ObjectType::of("192.0.2.0/24"), None);
    }

    #[test]
    fn test_protocol_set_parse() {
        let set = ProtocolSet::parse(["ipv6", "IPv4", "ipv6"]).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Protocol::Ipv6, Protocol::Ipv4]);

        let err = ProtocolSet::parse(["ipv4", "invalid"]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidFilter {
                value: "invalid".into()
            }
        );

        assert_eq!(
            ProtocolSet::parse(Vec::<String>::new()).unwrap_err(),
            ConfigError::EmptyProtocolFilter
        );
    }

    #[test]
    fn test_classify_by_protocol() {
        let classified = classify_by_protocol([
            "192.0.2.0/24",
            "2001:db8::/32",
            "192.0.2.0/24",
            "198.51.100.0/24^+",
            "RS-OTHER",
        ]);
        assert_eq!(classified.ipv4, vec!["192.0.2.0/24", "198.51.100.0/24^+"]);
        assert_eq!(classified.ipv6, vec!["2001:db8::/32"]);
        assert_eq!(classified.rejected, vec!["RS-OTHER"]);
    }

    #[test]
    fn test_parse_route_tags() {
        let response = "route:          202.12.30.0/24\n\
                        origin:         AS2515\n\n\
                        route6:         2001:dc2::/32\n\
                        origin:         AS2515\n\n\
                        route:          202.12.30.0/24\n\
                        route:  192.41.192.0/24\n";

        assert_eq!(
            parse_route_tags(response, Protocol::Ipv4),
            vec!["202.12.30.0/24", "192.41.192.0/24"]
        );
        assert_eq!(parse_route_tags(response, Protocol::Ipv6), vec!["2001:dc2::/32"]);
    }

    #[test]
    fn test_looks_like_as() {
        assert!(looks_like_as("AS2515"));
        assert!(looks_like_as("as-jpnic"));
        assert!(!looks_like_as("A7"));
        assert!(!looks_like_as("192.0.2.0/24"));
        assert!(!looks_like_as(""));
    }
}
