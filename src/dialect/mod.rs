//! Registry wire dialects
//!
//! Registry servers speak one of two incompatible text dialects for the
//! same operations:
//!
//! - [`irrd`]: IRRd `!` commands over a persistent session
//!   (`!!`, `!s<sources>`, `!i<set>,1`)
//! - [`whoisd`]: RIPE-style flag commands
//!   (`-k -r -s <sources> -T <type> <object>`)
//!
//! A [`Dialect`] is stateless apart from per-session bookkeeping. It builds
//! commands, frames and checks responses, and turns one node's object into
//! an [`Expansion`]. The worker applies the expansion to the query tree.

pub mod irrd;
pub mod whoisd;

use crate::error::{QueryError, QueryResult};
use crate::irr::{parse_route_tags, DialectKind, ObjectType, Protocol};
use crate::query::QueryFilter;
use crate::session::Session;
use crate::walker::cache::{CacheKey, ResponseCache};
use std::sync::Arc;

pub use irrd::IrrdDialect;
pub use whoisd::WhoisdDialect;

/// What a dialect needs to know about the node being processed
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub object: &'a str,
    pub object_type: Option<ObjectType>,
    pub filter: &'a QueryFilter,
}

impl<'a> Request<'a> {
    pub fn new(object: &'a str, filter: &'a QueryFilter) -> Self {
        Self {
            object,
            object_type: ObjectType::of(object),
            filter,
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.object, self.filter.normalized_sources())
    }
}

/// Prefixes found for one origin and protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub origin: Option<String>,
    pub protocol: Protocol,
    pub prefixes: Vec<String>,
}

/// Result of processing one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Objects to fork as children, in order of discovery
    pub members: Vec<String>,

    /// Prefixes to record on the root
    pub routes: Vec<RouteRecord>,
}

impl Expansion {
    fn push_member(&mut self, member: &str) {
        if !self.members.iter().any(|m| m == member) {
            self.members.push(member.to_string());
        }
    }
}

/// Command construction, framing and parsing for one wire dialect
pub trait Dialect: Send {
    fn kind(&self) -> DialectKind;

    /// Called once on every newly opened connection
    fn on_connect(&mut self, _session: &mut Session) -> QueryResult<()> {
        Ok(())
    }

    /// Check whether the buffered response is complete
    fn is_complete(&self, response: &str) -> bool;

    /// Same check for a buffer whose first `scanned` bytes were already
    /// seen by an earlier call that returned false
    fn is_complete_after(&self, response: &str, _scanned: usize) -> bool {
        self.is_complete(response)
    }

    /// Error message carried by a response, if it is an error
    fn error_message(&self, response: &str) -> Option<String>;

    /// Command expanding an as-set or route-set
    fn membership_command(&self, object: &str, object_type: ObjectType, sources: &[String]) -> String;

    /// Command listing the routes originated by an aut-num
    fn origin_command(&self, autnum: &str, sources: &[String]) -> String;

    /// Member names listed in a membership response
    fn parse_members(&self, response: &str, object_type: ObjectType) -> Vec<String>;

    /// Prefixes listed in an origin response
    fn parse_origin(&self, response: &str, protocol: Protocol) -> Vec<String> {
        parse_route_tags(response, protocol)
    }

    /// Execute a command through the server's shared response cache
    fn fetch(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
        command: &str,
    ) -> QueryResult<Arc<str>>;

    /// Responses this dialect was served without a round trip
    fn cache_hits(&self) -> u64;

    /// Expand one node
    fn process(
        &mut self,
        session: &mut Session,
        cache: &ResponseCache,
        request: &Request<'_>,
    ) -> QueryResult<Expansion>;
}

/// Create the dialect for a server
pub fn for_kind(kind: DialectKind) -> Box<dyn Dialect> {
    match kind {
        DialectKind::Irrd => Box::new(IrrdDialect::new()),
        DialectKind::Whoisd => Box::new(WhoisdDialect::new()),
    }
}

/// Cached command execution shared by both dialects
///
/// Returns the response and whether it came from the cache.
pub(crate) fn fetch_shared<D: Dialect + ?Sized>(
    dialect: &D,
    session: &mut Session,
    cache: &ResponseCache,
    request: &Request<'_>,
    command: &str,
) -> QueryResult<(Arc<str>, bool)> {
    cache.get_or_try_insert_with(request.cache_key(), || {
        session
            .execute(command, |buf, scanned| dialect.is_complete_after(buf, scanned))
            .map(Arc::from)
    })
}

/// Turn an error response into `ExpansionFailed`
pub(crate) fn check_response<D: Dialect + ?Sized>(
    dialect: &D,
    session: &Session,
    command: &str,
    response: &str,
) -> QueryResult<()> {
    match dialect.error_message(response) {
        Some(message) => Err(QueryError::ExpansionFailed {
            command: command.to_string(),
            server: session.server().to_string(),
            message,
        }),
        None => Ok(()),
    }
}

/// Resolve an aut-num into its routes, one record per filtered protocol
pub(crate) fn expand_aut_num<D: Dialect + ?Sized>(
    dialect: &mut D,
    session: &mut Session,
    cache: &ResponseCache,
    request: &Request<'_>,
) -> QueryResult<Expansion> {
    let command = dialect.origin_command(request.object, &request.filter.sources);
    let response = dialect.fetch(session, cache, request, &command)?;
    check_response(&*dialect, session, &command, &response)?;

    let routes = request
        .filter
        .protocols
        .iter()
        .map(|protocol| RouteRecord {
            origin: Some(request.object.to_string()),
            protocol,
            prefixes: dialect.parse_origin(&response, protocol),
        })
        .collect();

    Ok(Expansion {
        members: Vec::new(),
        routes,
    })
}
