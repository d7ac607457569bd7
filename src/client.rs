//! Multi-server client
//!
//! A [`Client`] collects queries for any number of registry servers and runs
//! them together. Each server gets its own [`ServerPool`]; all pools are
//! started before any is joined, so servers are queried in parallel.
//!
//! # Example
//!
//! ```no_run
//! use irr_walker::client::{Client, ClientOptions, QueryOptions};
//!
//! let mut client = Client::new(ClientOptions::default().worker_count(2));
//! client.query("jpirr", ["AS-JPNIC"], &QueryOptions::new().source("JPIRR").protocol("ipv4"))?;
//! client.query("radb", ["AS-GOOGLE"], &QueryOptions::new())?;
//!
//! let resolution = client.perform()?;
//! for (object, table) in &resolution {
//!     println!("{}: {} protocol(s)", object, table.len());
//! }
//! # Ok::<(), irr_walker::ResolverError>(())
//! ```

use crate::error::Result;
use crate::irr::{Directory, Endpoint, ProtocolSet, DEFAULT_PORT};
use crate::query::{NodeId, QueryFilter};
use crate::session::DEFAULT_TIMEOUT;
use crate::walker::{Resolution, ServerPool};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Settings shared by every server a client talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Workers per server
    pub worker_count: usize,

    /// Connect, read and write timeout
    pub timeout: Duration,

    /// TCP port for servers resolved through the directory
    pub port: u16,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            timeout: DEFAULT_TIMEOUT,
            port: DEFAULT_PORT,
        }
    }
}

impl ClientOptions {
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Filters for one `query` call
///
/// No sources means any source. No protocols means both; an explicitly
/// empty protocol list is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub sources: Vec<String>,
    pub protocols: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an authoritative source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Add a protocol to resolve (`ipv4` or `ipv6`)
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.get_or_insert_with(Vec::new).push(protocol.into());
        self
    }

    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols
            .get_or_insert_with(Vec::new)
            .extend(protocols.into_iter().map(Into::into));
        self
    }

    fn filter(&self) -> Result<QueryFilter> {
        let protocols = match &self.protocols {
            Some(values) => ProtocolSet::parse(values)?,
            None => ProtocolSet::all(),
        };
        Ok(QueryFilter::new(&self.sources, protocols))
    }
}

/// Front end holding one pool per server
pub struct Client {
    options: ClientOptions,
    pools: IndexMap<Endpoint, ServerPool>,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            pools: IndexMap::new(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Queue objects for a server given by mnemonic, host name or address
    ///
    /// Fails before anything is queued if the server's dialect is unknown or
    /// the protocol filter is invalid.
    pub fn query<I, S>(&mut self, server: &str, objects: I, options: &QueryOptions) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoint = Directory.resolve(server, self.options.port)?;
        self.query_endpoint(endpoint, objects, options)
    }

    /// Queue objects for an explicit endpoint, bypassing the directory
    pub fn query_endpoint<I, S>(&mut self, endpoint: Endpoint, objects: I, options: &QueryOptions) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = Arc::new(options.filter()?);

        let pool = self.pools.entry(endpoint.clone()).or_insert_with(|| {
            debug!(server = %endpoint.to_display_string(), dialect = %endpoint.dialect, "New server pool");
            ServerPool::new(endpoint, self.options.worker_count, self.options.timeout)
        });

        for object in objects {
            pool.submit_filter(Some(object.as_ref()), Arc::clone(&filter));
        }

        Ok(())
    }

    /// Number of servers with queued queries
    pub fn server_count(&self) -> usize {
        self.pools.len()
    }

    /// Run every pool to completion
    ///
    /// All pools are started before any is joined. Pools that fail to run
    /// are logged and skipped; the first such error is returned if no pool
    /// finished.
    pub fn run(self) -> Result<Vec<(ServerPool, Vec<NodeId>)>> {
        let mut pools: Vec<ServerPool> = self.pools.into_values().collect();
        let mut first_error = None;

        let mut started = Vec::with_capacity(pools.len());
        for pool in &mut pools {
            match pool.spawn_workers() {
                Ok(()) => started.push(true),
                Err(e) => {
                    warn!(server = %pool.endpoint().to_display_string(), error = %e, "Pool failed to start");
                    first_error.get_or_insert(e);
                    started.push(false);
                }
            }
        }

        let mut finished = Vec::with_capacity(pools.len());

        for (mut pool, started) in pools.into_iter().zip(started) {
            if !started {
                continue;
            }
            match pool.join_workers() {
                Ok(roots) => finished.push((pool, roots)),
                Err(e) => {
                    warn!(server = %pool.endpoint().to_display_string(), error = %e, "Pool failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if finished.is_empty() => Err(e),
            _ => Ok(finished),
        }
    }

    /// Run every queued query and merge the results of all servers
    pub fn perform(self) -> Result<Resolution> {
        let mut resolution = Resolution::new();
        for (pool, roots) in self.run()? {
            resolution.extend(pool.decorate(&roots));
        }
        Ok(resolution)
    }
}

/// Resolve objects against one server
///
/// `protocols` of `None` resolves both protocols.
///
/// ```no_run
/// let resolution = irr_walker::resolve("jpirr", &["AS-JPNIC"], &["JPIRR"], Some(&["ipv4"][..]))?;
/// # Ok::<(), irr_walker::ResolverError>(())
/// ```
pub fn resolve<S: AsRef<str>>(
    server: &str,
    objects: &[S],
    sources: &[S],
    protocols: Option<&[S]>,
) -> Result<Resolution> {
    let options = QueryOptions {
        sources: sources.iter().map(|s| s.as_ref().to_string()).collect(),
        protocols: protocols.map(|p| p.iter().map(|s| s.as_ref().to_string()).collect()),
    };

    let mut client = Client::new(ClientOptions::default());
    client.query(server, objects, &options)?;
    client.perform()
}
