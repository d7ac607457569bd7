//! Whoisd dialect (RIPE-style servers: APNIC, RIPE, AFRINIC, ...)
//!
//! Every query is one self-contained flag command. `-k` keeps the
//! connection open between queries and a response ends with two blank
//! lines. Errors are reported as `%ERROR:<code>: <message>` lines.

use super::{check_response, expand_aut_num, fetch_shared, Dialect, Expansion, Request, RouteRecord};
use crate::error::QueryResult;
use crate::irr::{classify_by_protocol, prefix_protocol, DialectKind, ObjectType, MEMBERS_TAG};
use crate::session::Session;
use crate::walker::cache::ResponseCache;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, trace};

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^%ERROR:(.*?)\r?$").expect("Invalid error line regex"));

/// Two blank lines after the last object
const TERMINATOR: &str = "\n\n\n";

static MEMBER_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+").expect("Invalid member separator regex"));

/// Whoisd worker state
#[derive(Debug, Default)]
pub struct WhoisdDialect {
    /// Raw responses by object name, valid for `memo_sources` only
    memo: HashMap<String, Arc<str>>,
    memo_sources: String,
    cache_hits: u64,
}

impl WhoisdDialect {
    pub fn new() -> Self {
        Self::default()
    }

    /// `-s` with the given sources, or `-a` for all of them
    pub fn source_option(sources: &[String]) -> String {
        if sources.is_empty() {
            "-a".to_string()
        } else {
            format!("-s {}", sources.join(","))
        }
    }

    fn expand_set(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
        object_type: ObjectType,
    ) -> QueryResult<Expansion> {
        let command = self.membership_command(request.object, object_type, &request.filter.sources);
        let response = self.fetch(session, cache, request, &command)?;
        check_response(&*self, session, &command, &response)?;

        let mut expansion = Expansion::default();
        let mut literals = Vec::new();

        for member in self.parse_members(&response, object_type) {
            if ObjectType::of(&member).is_some() {
                expansion.push_member(&member);
            } else if prefix_protocol(&member).is_some() {
                literals.push(member);
            } else {
                debug!(object = %request.object, member = %member, "Dropping unrecognized set member");
            }
        }

        if !literals.is_empty() {
            let classified = classify_by_protocol(&literals);
            for protocol in request.filter.protocols.iter() {
                expansion.routes.push(RouteRecord {
                    origin: None,
                    protocol,
                    prefixes: classified.get(protocol).to_vec(),
                });
            }
        }

        Ok(expansion)
    }
}

impl Dialect for WhoisdDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Whoisd
    }

    fn is_complete(&self, response: &str) -> bool {
        response.contains(TERMINATOR)
    }

    /// Only the bytes after `scanned`, plus enough overlap for a split terminator
    fn is_complete_after(&self, response: &str, scanned: usize) -> bool {
        let mut start = scanned.saturating_sub(TERMINATOR.len() - 1).min(response.len());
        while !response.is_char_boundary(start) {
            start -= 1;
        }
        self.is_complete(&response[start..])
    }

    fn error_message(&self, response: &str) -> Option<String> {
        ERROR_LINE
            .captures(response)
            .map(|caps| caps[1].trim().to_string())
    }

    fn membership_command(&self, object: &str, object_type: ObjectType, sources: &[String]) -> String {
        format!("-k -r {} -T {} {}", Self::source_option(sources), object_type, object)
    }

    fn origin_command(&self, autnum: &str, sources: &[String]) -> String {
        format!("-k -r {} -K -i origin {}", Self::source_option(sources), autnum)
    }

    fn parse_members(&self, response: &str, _object_type: ObjectType) -> Vec<String> {
        let mut members: Vec<String> = Vec::new();

        for caps in MEMBERS_TAG.captures_iter(response) {
            let value = caps[1].split('#').next().unwrap_or("");
            for member in MEMBER_SEPARATOR.split(value).filter(|m| !m.is_empty()) {
                if !members.iter().any(|m| m == member) {
                    members.push(member.to_string());
                }
            }
        }

        members
    }

    /// Per-worker memo in front of the shared cache
    fn fetch(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
        command: &str,
    ) -> QueryResult<Arc<str>> {
        let sources = request.filter.normalized_sources();
        if sources != self.memo_sources {
            self.memo.clear();
            self.memo_sources = sources;
        }

        if let Some(response) = self.memo.get(request.object) {
            trace!(object = %request.object, "Memo hit");
            self.cache_hits += 1;
            return Ok(Arc::clone(response));
        }

        let (response, hit) = fetch_shared(&*self, session, cache, request, command)?;
        if hit {
            self.cache_hits += 1;
        }
        self.memo.insert(request.object.to_string(), Arc::clone(&response));
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
        match request.object_type {
            Some(object_type @ (ObjectType::AsSet | ObjectType::RouteSet)) => {
                self.expand_set(session, cache, request, object_type)
            }
            Some(ObjectType::AutNum) => expand_aut_num(self, session, cache, request),
            None => Ok(Expansion::default()),
        }
    }
}
