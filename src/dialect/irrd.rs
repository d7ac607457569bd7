//! IRRd dialect
//!
//! Command reference: <http://www.irrd.net/irrd-user.pdf>
//!
//! ```text
//! !!              keep the connection open
//! !s<src,...>     restrict answers to the given sources (!s-* for all)
//! !i<set>,1       expand a set recursively
//! -K -r -i origin <aut-num>
//! ```
//!
//! `!` commands answer with an optional `A<len>` header, `len` bytes of
//! payload and a status line: `C` (success), `D` (key not found), `E`
//! (multiple copies) or `F <message>`. RIPE-style queries such as the
//! origin lookup carry no status line and end with a blank line pair.
//! A single blank line only separates objects within such a response.

use super::{check_response, expand_aut_num, fetch_shared, Dialect, Expansion, Request, RouteRecord};
use crate::error::{QueryError, QueryResult};
use crate::irr::{classify_by_protocol, looks_like_as, DialectKind, ObjectType};
use crate::session::Session;
use crate::walker::cache::ResponseCache;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const PERSIST_COMMAND: &str = "!!";

static LENGTH_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^A(\d+)\r?\n").expect("Invalid length header regex"));

/// IRRd session state
#[derive(Debug, Default)]
pub struct IrrdDialect {
    /// Source filter last set on the current connection
    active_sources: Option<Vec<String>>,

    cache_hits: u64,
}

impl IrrdDialect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source_command(sources: &[String]) -> String {
        if sources.is_empty() {
            "!s-*".to_string()
        } else {
            format!("!s{}", sources.join(","))
        }
    }

    /// Restrict the connection to the node's sources
    ///
    /// Skipped when the connection already has the same filter.
    fn set_source(&mut self, session: &mut Session, sources: &[String]) -> QueryResult<()> {
        if self.active_sources.as_deref() == Some(sources) {
            return Ok(());
        }

        let command = Self::set_source_command(sources);
        let response = session.execute(&command, |buf, _| self.is_complete(buf))?;
        if let Some(message) = self.error_message(&response) {
            return Err(QueryError::SourceFilterFailed {
                command,
                server: session.server().to_string(),
                message,
            });
        }

        self.active_sources = Some(sources.to_vec());
        Ok(())
    }

    /// Fetch a `!i` expansion and require a success status
    fn fetch_membership(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
        object_type: ObjectType,
    ) -> QueryResult<Arc<str>> {
        let command = self.membership_command(request.object, object_type, &request.filter.sources);
        let response = self.fetch(session, cache, request, &command)?;
        check_response(&*self, session, &command, &response)?;

        if !status_line(&response).is_some_and(|line| line.starts_with('C')) {
            return Err(QueryError::MalformedResponse {
                server: session.server().to_string(),
                reason: format!("'{}' returned no status line", command),
            });
        }

        Ok(response)
    }

    fn expand_as_set(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
    ) -> QueryResult<Expansion> {
        let response = self.fetch_membership(session, cache, request, ObjectType::AsSet)?;

        Ok(Expansion {
            members: self.parse_members(&response, ObjectType::AsSet),
            routes: Vec::new(),
        })
    }

    fn expand_route_set(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
    ) -> QueryResult<Expansion> {
        let response = self.fetch_membership(session, cache, request, ObjectType::RouteSet)?;
        let classified = classify_by_protocol(self.parse_members(&response, ObjectType::RouteSet));

        let mut expansion = Expansion::default();
        for protocol in request.filter.protocols.iter() {
            expansion.routes.push(RouteRecord {
                origin: None,
                protocol,
                prefixes: classified.get(protocol).to_vec(),
            });
        }

        for token in &classified.rejected {
            if ObjectType::of(token) == Some(ObjectType::RouteSet) {
                expansion.push_member(token);
            } else {
                debug!(object = %request.object, member = %token, "Dropping unrecognized route-set member");
            }
        }

        Ok(expansion)
    }
}

impl Dialect for IrrdDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Irrd
    }

    fn on_connect(&mut self, session: &mut Session) -> QueryResult<()> {
        self.active_sources = None;
        session.send(PERSIST_COMMAND)
    }

    fn is_complete(&self, response: &str) -> bool {
        if let Some(caps) = LENGTH_HEADER.captures(response) {
            let header = caps.get(0).map_or(0, |m| m.end());
            let announced: usize = caps[1].parse().unwrap_or(0);
            return match response.as_bytes().get(header + announced..) {
                Some(rest) => ends_with_status_line(&String::from_utf8_lossy(rest)),
                None => false,
            };
        }

        ends_with_status_line(response) || response == "\n\n" || response.ends_with("\n\n\n")
    }

    fn error_message(&self, response: &str) -> Option<String> {
        let line = status_line(response)?;
        match line {
            "D" => Some("key not found".to_string()),
            "E" => Some("multiple copies of the key".to_string()),
            _ if line.starts_with('F') => {
                let message = line[1..].trim();
                Some(if message.is_empty() {
                    "unrecognized command".to_string()
                } else {
                    message.to_string()
                })
            }
            _ => None,
        }
    }

    fn membership_command(&self, object: &str, _object_type: ObjectType, _sources: &[String]) -> String {
        format!("!i{},1", object)
    }

    fn origin_command(&self, autnum: &str, _sources: &[String]) -> String {
        format!("-K -r -i origin {}", autnum)
    }

    /// AS-like tokens for an as-set; everything else for a route-set,
    /// including hierarchical route-set names such as `AS2515:RS-EXPORT`
    fn parse_members(&self, response: &str, object_type: ObjectType) -> Vec<String> {
        let mut members: Vec<String> = Vec::new();

        for token in payload_tokens(response) {
            let keep = match object_type {
                ObjectType::AsSet => looks_like_as(token),
                _ => !looks_like_as(token) || ObjectType::of(token) == Some(ObjectType::RouteSet),
            };
            if keep && !members.iter().any(|m| m == token) {
                members.push(token.to_string());
            }
        }

        members
    }

    fn fetch(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
        command: &str,
    ) -> QueryResult<Arc<str>> {
        let (response, hit) = fetch_shared(&*self, session, cache, request, command)?;
        if hit {
            self.cache_hits += 1;
        }
        Ok(response)
    }

    fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    fn process(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
    ) -> QueryResult<Expansion> {
        self.set_source(session, &request.filter.sources)?;

        match request.object_type {
            Some(ObjectType::AsSet) => self.expand_as_set(session, cache, request),
            Some(ObjectType::RouteSet) => self.expand_route_set(session, cache, request),
            Some(ObjectType::AutNum) => expand_aut_num(self, session, cache, request),
            None => Ok(Expansion::default()),
        }
    }
}

/// Last non-blank line, when it is a `!` command status line
fn status_line(response: &str) -> Option<&str> {
    let line = response.lines().rev().find(|l| !l.trim().is_empty())?.trim_end();
    match line.chars().next() {
        Some('C') | Some('F') => Some(line),
        Some('D') | Some('E') if line.len() == 1 => Some(line),
        _ => None,
    }
}

fn ends_with_status_line(text: &str) -> bool {
    let Some(body) = text.strip_suffix('\n') else {
        return false;
    };
    let last = body.rsplit('\n').next().unwrap_or(body).trim_end_matches('\r');
    match last.chars().next() {
        Some('C') | Some('F') => true,
        Some('D') | Some('E') => last.len() == 1,
        _ => false,
    }
}

/// Whitespace-separated payload tokens, without the length header and status line
fn payload_tokens(response: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = response.lines().collect();

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.last().is_some_and(|l| l.starts_with('C')) {
        lines.pop();
    }
    if lines
        .first()
        .is_some_and(|l| l.len() > 1 && l.starts_with('A') && l[1..].trim_end().bytes().all(|b| b.is_ascii_digit()))
    {
        lines.remove(0);
    }

    lines.iter().flat_map(|l| l.split_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        let irrd = IrrdDialect::new();
        assert_eq!(IrrdDialect::set_source_command(&[]), "!s-*");
        assert_eq!(
            IrrdDialect::set_source_command(&["JPIRR".into(), "RADB".into()]),
            "!sJPIRR,RADB"
        );
        assert_eq!(irrd.membership_command("AS-JPNIC", ObjectType::AsSet, &[]), "!iAS-JPNIC,1");
        assert_eq!(irrd.origin_command("AS2515", &[]), "-K -r -i origin AS2515");
    }

    #[test]
    fn test_framing_with_length_header() {
        let irrd = IrrdDialect::new();
        assert!(!irrd.is_complete("A7\n"));
        assert!(!irrd.is_complete("A7\nAS2515\n"));
        assert!(irrd.is_complete("A7\nAS2515\nC\n"));

        // payload lines that look like status lines do not end the frame early
        assert!(!irrd.is_complete("A13\nC\nAS2515\n"));
        assert!(irrd.is_complete("A13\nC\nAS2515 AS1\nC\n"));
    }

    #[test]
    fn test_framing_without_length_header() {
        let irrd = IrrdDialect::new();
        assert!(irrd.is_complete("C\n"));
        assert!(irrd.is_complete("D\n"));
        assert!(irrd.is_complete("F Unrecognized command\n"));
        assert!(irrd.is_complete("route: 202.12.30.0/24\norigin: AS2515\n\n\n"));
        assert!(irrd.is_complete("\n\n"));
        assert!(!irrd.is_complete("route: 202.12.30.0/24\n"));
        assert!(!irrd.is_complete("C"));
    }

    #[test]
    fn test_object_separator_is_not_a_terminator() {
        let irrd = IrrdDialect::new();
        let first = "route:  202.12.30.0/24\norigin: AS2515\n\n";
        assert!(!irrd.is_complete(first));

        let whole = format!("{}route:  192.41.192.0/24\norigin: AS2515\n\n\n", first);
        assert!(irrd.is_complete(&whole));
        assert_eq!(
            irrd.parse_origin(&whole, crate::irr::Protocol::Ipv4),
            vec!["202.12.30.0/24", "192.41.192.0/24"]
        );
    }

    #[test]
    fn test_error_message() {
        let irrd = IrrdDialect::new();
        assert_eq!(irrd.error_message("D\n").as_deref(), Some("key not found"));
        assert_eq!(irrd.error_message("E\n").as_deref(), Some("multiple copies of the key"));
        assert_eq!(
            irrd.error_message("F Invalid source\n").as_deref(),
            Some("Invalid source")
        );
        assert_eq!(irrd.error_message("A7\nAS2515\nC\n"), None);
        assert_eq!(irrd.error_message("route: 192.0.2.0/24\ndescr: Example\n\n"), None);
    }

    #[test]
    fn test_parse_as_set_members() {
        let irrd = IrrdDialect::new();
        let response = "A27\nAS2515 AS7500 as2497 AS2515\nC\n";
        assert_eq!(
            irrd.parse_members(response, ObjectType::AsSet),
            vec!["AS2515", "AS7500", "as2497"]
        );
    }

    #[test]
    fn test_parse_route_set_members() {
        let irrd = IrrdDialect::new();
        let response = "A42\n192.0.2.0/24 2001:db8::/32 AS2515 RS-OTHER\nC\n";
        assert_eq!(
            irrd.parse_members(response, ObjectType::RouteSet),
            vec!["192.0.2.0/24", "2001:db8::/32", "RS-OTHER"]
        );
    }

    #[test]
    fn test_parse_hierarchical_route_set_members() {
        let irrd = IrrdDialect::new();
        let response = "A49\n192.0.2.0/24 AS2515:RS-EXPORT AS2515 AS-FOO:RS-X\nC\n";
        assert_eq!(
            irrd.parse_members(response, ObjectType::RouteSet),
            vec!["192.0.2.0/24", "AS2515:RS-EXPORT", "AS-FOO:RS-X"]
        );
    }

    #[test]
    fn test_parse_origin() {
        let irrd = IrrdDialect::new();
        let response = "route:  202.12.30.0/24\norigin: AS2515\n\nroute6: 2001:dc2::/32\norigin: AS2515\n\n\n";
        assert_eq!(
            irrd.parse_origin(response, crate::irr::Protocol::Ipv4),
            vec!["202.12.30.0/24"]
        );
        assert_eq!(
            irrd.parse_origin(response, crate::irr::Protocol::Ipv6),
            vec!["2001:dc2::/32"]
        );
    }
}
