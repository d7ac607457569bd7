//! Pool manager - one per registry server
//!
//! The pool is responsible for:
//! - Validating submissions and creating their root nodes
//! - Owning the server's query tree, work queue and response cache
//! - Starting the workers and collecting their finished roots
//! - Turning finished roots into the caller-facing [`Resolution`]

use crate::error::{ConfigError, Result, WorkerError};
use crate::irr::{Endpoint, ProtocolSet};
use crate::query::{NodeId, QueryFilter, QueryTree, RouteTable};
use crate::walker::cache::ResponseCache;
use crate::walker::queue::WorkQueue;
use crate::walker::worker::{aggregate_stats, Worker};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Resolved prefixes per submitted object
pub type Resolution = IndexMap<String, RouteTable>;

/// State shared by every worker of one server
#[derive(Debug)]
pub struct PoolContext {
    pub endpoint: Endpoint,
    pub timeout: Duration,
    pub tree: Mutex<QueryTree>,
    pub queue: WorkQueue,
    pub cache: ResponseCache,
}

/// Summary of a finished pool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Nodes processed across all workers
    pub processed: u64,

    /// Nodes that failed
    pub failed: u64,

    /// Children forked
    pub forked: u64,

    /// Responses served from the cache
    pub cache_hits: u64,

    /// Responses fetched from the server
    pub cache_misses: u64,

    /// Time taken for the run
    pub duration: Duration,
}

/// Runs the queries submitted for one server
pub struct ServerPool {
    context: Arc<PoolContext>,
    worker_count: usize,
    workers: Vec<Worker>,
    start_time: Option<Instant>,
    summary: PoolSummary,
}

impl ServerPool {
    /// Create a pool for a server; `worker_count` is clamped to at least one
    pub fn new(endpoint: Endpoint, worker_count: usize, timeout: Duration) -> Self {
        let worker_count = worker_count.max(1);

        Self {
            context: Arc::new(PoolContext {
                endpoint,
                timeout,
                tree: Mutex::new(QueryTree::new()),
                queue: WorkQueue::new(worker_count),
                cache: ResponseCache::new(),
            }),
            worker_count,
            workers: Vec::new(),
            start_time: None,
            summary: PoolSummary::default(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.context.endpoint
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Summary of the last run
    pub fn summary(&self) -> &PoolSummary {
        &self.summary
    }

    /// Validate the filters, create a root node for `object` and enqueue it
    ///
    /// `protocols` of `None` means both protocols. Nothing is created if
    /// validation fails.
    pub fn submit<S: AsRef<str>>(
        &self,
        object: Option<&str>,
        sources: &[S],
        protocols: Option<&[S]>,
    ) -> std::result::Result<NodeId, ConfigError> {
        let protocols = match protocols {
            Some(values) => ProtocolSet::parse(values)?,
            None => ProtocolSet::all(),
        };
        let filter = QueryFilter::new(sources, protocols);
        Ok(self.submit_filter(object, Arc::new(filter)))
    }

    /// Enqueue a root node with an already validated filter
    pub fn submit_filter(&self, object: Option<&str>, filter: Arc<QueryFilter>) -> NodeId {
        let id = self
            .context
            .tree
            .lock()
            .add_root(object.map(str::to_string), filter);
        self.context.queue.push(id);

        debug!(server = %self.context.endpoint.host, object = ?object, node = %id, "Submitted");
        id
    }

    /// Spawn the worker threads
    ///
    /// If a spawn fails, the workers already running are told to stop once
    /// the queue is drained, and are joined before the error is returned.
    pub fn spawn_workers(&mut self) -> Result<()> {
        self.start_time = Some(Instant::now());

        info!(
            server = %self.context.endpoint.to_display_string(),
            dialect = %self.context.endpoint.dialect,
            workers = self.worker_count,
            "Starting pool"
        );

        for id in 0..self.worker_count {
            match Worker::spawn(id, Arc::clone(&self.context)) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => {
                    self.context.queue.shutdown();
                    let _ = self.join_workers();
                    return Err(e.into());
                }
            }
        }

        debug!(count = self.workers.len(), "Workers spawned");
        Ok(())
    }

    /// Join all worker threads and collect their finished roots
    pub fn join_workers(&mut self) -> Result<Vec<NodeId>> {
        let mut finished = Vec::new();
        let mut first_error: Option<WorkerError> = None;

        for worker in &mut self.workers {
            match worker.join() {
                Ok(roots) => finished.extend(roots),
                Err(e) => {
                    warn!(worker = worker.id(), error = %e, "Worker failed to join cleanly");
                    first_error.get_or_insert(e);
                }
            }
        }

        let (processed, failed, forked, worker_cache_hits) = aggregate_stats(&self.workers);
        self.workers.clear();

        let cache = self.context.cache.stats();
        self.summary = PoolSummary {
            processed,
            failed,
            forked,
            cache_hits: cache.hit_count(),
            cache_misses: cache.miss_count(),
            duration: self.start_time.map(|t| t.elapsed()).unwrap_or_default(),
        };

        info!(
            server = %self.context.endpoint.to_display_string(),
            processed = processed,
            failed = failed,
            forked = forked,
            cache_hits = self.summary.cache_hits,
            worker_cache_hits = worker_cache_hits,
            duration_ms = self.summary.duration.as_millis() as u64,
            "Pool finished"
        );

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(finished),
        }
    }

    /// Start the workers, wait for all of them and return the finished roots
    pub fn run(&mut self) -> Result<Vec<NodeId>> {
        self.spawn_workers()?;
        self.join_workers()
    }

    /// Build the caller-facing mapping from finished roots
    ///
    /// Failed roots are omitted entirely. Within a root, protocols with no
    /// recorded origin are dropped.
    pub fn decorate(&self, roots: &[NodeId]) -> Resolution {
        let mut roots = roots.to_vec();
        roots.sort_unstable();
        roots.dedup();

        let tree = self.context.tree.lock();
        let mut resolution = Resolution::new();

        for id in roots {
            let Some(node) = tree.get(id) else { continue };
            if !node.is_root() || !node.succeeded() {
                continue;
            }
            let Some(object) = node.object() else { continue };

            let table: RouteTable = node
                .result()
                .iter()
                .filter(|(_, by_origin)| !by_origin.is_empty())
                .map(|(protocol, by_origin)| (*protocol, by_origin.clone()))
                .collect();

            resolution.insert(object.to_string(), table);
        }

        resolution
    }

    /// Run the pool to completion and decorate its results
    pub fn perform(mut self) -> Result<Resolution> {
        let roots = self.run()?;
        Ok(self.decorate(&roots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Expansion;
    use crate::irr::{DialectKind, Protocol};
    use crate::walker::worker::apply_expansion;

    fn pool() -> ServerPool {
        ServerPool::new(
            Endpoint::new("127.0.0.1", 43, DialectKind::Irrd),
            2,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_submit_validates_protocols() {
        let pool = pool();
        let err = pool
            .submit(Some("AS-JPNIC"), &["JPIRR"], Some(&["ipv4", "ipv5"][..]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidFilter {
                value: "ipv5".into()
            }
        );
        assert!(pool.context.queue.is_empty());
        assert!(pool.context.tree.lock().is_empty());

        let err = pool.submit::<&str>(Some("AS-JPNIC"), &[], Some(&[][..])).unwrap_err();
        assert_eq!(err, ConfigError::EmptyProtocolFilter);
    }

    #[test]
    fn test_submit_enqueues_root() {
        let pool = pool();
        let id = pool.submit::<&str>(Some("AS-JPNIC"), &[], None).unwrap();

        assert_eq!(pool.context.queue.len(), 1);
        let tree = pool.context.tree.lock();
        assert!(tree[id].is_root());
        assert_eq!(tree[id].filter().protocols, ProtocolSet::all());
    }

    #[test]
    fn test_decorate_skips_failed_roots() {
        let pool = pool();
        let ok = pool.submit(Some("AS-JPNIC"), &["JPIRR"], Some(&["ipv4"][..])).unwrap();
        let failed = pool.submit::<&str>(Some("AS-FAIL"), &[], None).unwrap();
        let invalid = pool.submit::<&str>(Some("INVALID"), &[], None).unwrap();

        {
            let mut tree = pool.context.tree.lock();
            apply_expansion(
                &mut tree,
                ok,
                Expansion {
                    members: vec!["AS2515".into()],
                    routes: Vec::new(),
                },
            );
            tree[failed].mark_failed();
            apply_expansion(&mut tree, invalid, Expansion::default());
        }

        let resolution = pool.decorate(&[invalid, ok, failed, ok]);
        let objects: Vec<_> = resolution.keys().cloned().collect();
        assert_eq!(objects, vec!["AS-JPNIC", "INVALID"]);

        let jpnic = &resolution["AS-JPNIC"];
        assert_eq!(jpnic.len(), 1);
        assert!(!jpnic.contains_key(&Protocol::Ipv6));
        assert!(jpnic[&Protocol::Ipv4].contains_key(&Some("AS2515".to_string())));
        assert!(resolution["INVALID"].is_empty());
    }
}
