//! Static registry directory
//!
//! Maps short registry names (`JPIRR`, `RADB`, ...) to the server FQDN and
//! the dialect it speaks. See <http://www.irr.net/docs/list.html>.

use crate::error::ResolverError;
use std::fmt;
use std::str::FromStr;

/// Standard whois port
pub const DEFAULT_PORT: u16 = 43;

/// Wire dialect spoken by a registry server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    /// IRRd-style `!` commands
    Irrd,
    /// RIPE whoisd-style flag commands
    Whoisd,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Irrd => "irrd",
            DialectKind::Whoisd => "whoisd",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "irrd" | "irr" | "registry" => Ok(DialectKind::Irrd),
            "whoisd" | "whois" => Ok(DialectKind::Whoisd),
            other => Err(format!("unknown dialect '{}' (expected irrd or whoisd)", other)),
        }
    }
}

/// A resolved registry server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Server FQDN or address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Dialect spoken by the server
    pub dialect: DialectKind,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, dialect: DialectKind) -> Self {
        Self {
            host: host.into(),
            port,
            dialect,
        }
    }

    /// Format as `host:port` for display
    pub fn to_display_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

const LIST: &[(&str, &str, DialectKind)] = &[
    ("AFRINIC", "whois.afrinic.net", DialectKind::Whoisd),
    ("ALTDB", "whois.altdb.net", DialectKind::Irrd),
    ("AOLTW", "whois.aoltw.net", DialectKind::Irrd),
    ("APNIC", "whois.apnic.net", DialectKind::Whoisd),
    ("ARIN", "rr.arin.net", DialectKind::Whoisd),
    ("BELL", "whois.in.bell.ca", DialectKind::Irrd),
    ("BBOI", "irr.bboi.net", DialectKind::Irrd),
    ("CANARIE", "whois.canarie.ca", DialectKind::Whoisd),
    ("EASYNET", "whois.noc.easynet.net", DialectKind::Whoisd),
    ("EPOCH", "whois.epoch.net", DialectKind::Irrd),
    ("GT", "rr.gt.ca", DialectKind::Irrd),
    ("HOST", "rr.host.net", DialectKind::Irrd),
    ("JPIRR", "jpirr.nic.ad.jp", DialectKind::Irrd),
    ("LEVEL3", "rr.level3.net", DialectKind::Whoisd),
    ("NESTEGG", "whois.nestegg.net", DialectKind::Irrd),
    ("NTTCOM", "rr.ntt.net", DialectKind::Irrd),
    ("OPENFACE", "whois.openface.ca", DialectKind::Irrd),
    ("OTTIX", "whois.ottix.net", DialectKind::Irrd),
    ("PANIX", "rrdb.access.net", DialectKind::Irrd),
    ("RADB", "whois.radb.net", DialectKind::Irrd),
    ("REACH", "rr.net.reach.com", DialectKind::Irrd),
    ("RGNET", "whois.rg.net", DialectKind::Irrd),
    ("RIPE", "whois.ripe.net", DialectKind::Whoisd),
    ("RISQ", "rr.risq.net", DialectKind::Irrd),
    ("ROGERS", "whois.rogerstelecom.net", DialectKind::Irrd),
    ("SAVVIS", "rr.savvis.net", DialectKind::Whoisd),
    ("TC", "whois.bgp.net.br", DialectKind::Irrd),
];

/// Lookup of registry names and FQDNs
#[derive(Debug, Default, Clone, Copy)]
pub struct Directory;

impl Directory {
    /// FQDN for a registry mnemonic (case-insensitive)
    pub fn host(&self, name: &str) -> Option<&'static str> {
        let name = name.trim().to_ascii_uppercase();
        LIST.iter().find(|(irr, _, _)| *irr == name).map(|(_, fqdn, _)| *fqdn)
    }

    /// Check whether a name is a known registry mnemonic
    pub fn is_irr(&self, name: &str) -> bool {
        self.host(name).is_some()
    }

    /// Dialect for a mnemonic or an FQDN
    pub fn dialect(&self, name: &str) -> Option<DialectKind> {
        let name = name.trim();
        let upper = name.to_ascii_uppercase();
        let lower = name.to_ascii_lowercase();

        LIST.iter()
            .find(|(irr, fqdn, _)| *irr == upper || *fqdn == lower)
            .map(|(_, _, dialect)| *dialect)
    }

    /// Resolve a registry name or address into an endpoint
    ///
    /// Unknown names are taken literally as the host; the lookup then fails
    /// only if no dialect is known for that host.
    pub fn resolve(&self, name: &str, port: u16) -> Result<Endpoint, ResolverError> {
        let host = self.host(name).map(str::to_string).unwrap_or_else(|| name.trim().to_string());

        let dialect = self.dialect(name).or_else(|| self.dialect(&host)).ok_or_else(|| {
            ResolverError::UnknownServer {
                name: name.to_string(),
            }
        })?;

        Ok(Endpoint::new(host, port, dialect))
    }
}
