//! Worker thread logic for parallel set expansion
//!
//! Each worker:
//! - Has its own registry session (a connection serves one command at a time)
//! - Pops query nodes from the server's shared queue
//! - Expands the node through the server's dialect
//! - Forks discovered members under the node and records prefixes on its root
//! - Pushes the new children back onto the queue
//!
//! A node that fails contributes nothing: its expansion is only applied to
//! the tree once processing has fully succeeded.

use crate::dialect::{self, Dialect, Expansion, Request};
use crate::error::{QueryError, QueryOutcome, QueryResult, WorkerError};
use crate::irr::ObjectType;
use crate::query::{NodeId, QueryTree};
use crate::session::{Session, SessionBuilder};
use crate::walker::cache::ResponseCache;
use crate::walker::coordinator::PoolContext;
use crate::walker::queue::QueueItem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Nodes processed
    pub processed: AtomicU64,

    /// Nodes that failed
    pub failed: AtomicU64,

    /// Children forked
    pub forked: AtomicU64,

    /// Responses served from the memo or the shared cache
    pub cache_hits: AtomicU64,
}

impl WorkerStats {
    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_forked(&self, count: u64) {
        self.forked.fetch_add(count, Ordering::Relaxed);
    }

    fn set_cache_hits(&self, hits: u64) {
        self.cache_hits.store(hits, Ordering::Relaxed);
    }
}

/// A worker thread that processes query nodes
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle; the thread returns the root nodes it finished
    handle: Option<JoinHandle<Vec<NodeId>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, context: Arc<PoolContext>) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("walker-{}", id))
            .spawn(move || worker_loop(id, context, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish and collect its finished roots
    ///
    /// Statistics stay readable afterwards.
    pub fn join(&mut self) -> Result<Vec<NodeId>, WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|panic| WorkerError::Panicked {
                id: self.id,
                message: panic_message(panic.as_ref()),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Main worker loop
fn worker_loop(id: usize, context: Arc<PoolContext>, stats: Arc<WorkerStats>) -> Vec<NodeId> {
    info!(worker = id, server = %context.endpoint.to_display_string(), "Worker starting");

    let mut session = SessionBuilder::new(context.endpoint.clone())
        .timeout(context.timeout)
        .build();
    let mut dialect = dialect::for_kind(context.endpoint.dialect);
    let mut done = Vec::new();

    loop {
        let node = match context.queue.pop() {
            QueueItem::Query(node) => node,
            QueueItem::Exhausted => {
                debug!(worker = id, "Queue exhausted, releasing siblings");
                break;
            }
            QueueItem::Shutdown => break,
        };

        let outcome = process_node(id, node, &context, &mut session, dialect.as_mut(), &stats);
        stats.set_cache_hits(dialect.cache_hits());

        match &outcome {
            QueryOutcome::Success { object, children } => {
                trace!(worker = id, object = %object, children = children, "Node expanded");
            }
            QueryOutcome::Failed { .. } => {}
        }

        if context.tree.lock()[node].is_root() {
            done.push(node);
        }
    }

    session.close();

    info!(
        worker = id,
        processed = stats.processed.load(Ordering::Relaxed),
        failed = stats.failed.load(Ordering::Relaxed),
        cache_hits = stats.cache_hits.load(Ordering::Relaxed),
        "Worker shutting down"
    );

    done
}

/// Process a single node
fn process_node(
    worker_id: usize,
    node: NodeId,
    context: &PoolContext,
    session: &mut Session,
    dialect: &mut dyn Dialect,
    stats: &WorkerStats,
) -> QueryOutcome {
    let (object, filter, root_object) = {
        let tree = context.tree.lock();
        let query = &tree[node];
        (
            query.object().map(str::to_string),
            Arc::clone(query.filter()),
            tree[query.root()].object().unwrap_or_default().to_string(),
        )
    };

    stats.record_processed();

    let result = match object.as_deref() {
        Some(object) => expand(session, dialect, &context.cache, &Request::new(object, &filter)),
        None => Err(QueryError::MissingObject),
    };
    let object = object.unwrap_or_default();

    match result {
        Ok(expansion) => {
            let children = apply_expansion(&mut context.tree.lock(), node, expansion);
            stats.record_forked(children.len() as u64);
            for &child in &children {
                context.queue.push(child);
            }

            QueryOutcome::Success {
                object,
                children: children.len(),
            }
        }
        Err(error) => {
            if error.is_connection_error() {
                session.close();
            }
            context.tree.lock()[node].mark_failed();
            stats.record_failure();

            warn!(
                worker = worker_id,
                object = %object,
                root = %root_object,
                error = %error,
                "Query failed"
            );

            QueryOutcome::Failed { object, error }
        }
    }
}

/// Connect if needed and run the dialect over one request
fn expand(
    session: &mut Session,
    dialect: &mut dyn Dialect,
    cache: &ResponseCache,
    request: &Request<'_>,
) -> QueryResult<Expansion> {
    if !session.is_established() {
        session.connect()?;
        dialect.on_connect(session)?;
    }

    dialect.process(session, cache, request)
}

/// Mark a node succeeded and apply what it discovered
///
/// Members are forked under the node (cycles are refused by the tree);
/// forked aut-nums and all prefixes are recorded on the node's root.
/// Returns the new children.
pub(crate) fn apply_expansion(tree: &mut QueryTree, node: NodeId, expansion: Expansion) -> Vec<NodeId> {
    tree[node].mark_succeeded();
    let root = tree.root_of(node);
    let mut children = Vec::with_capacity(expansion.members.len());

    for member in &expansion.members {
        match tree.fork(node, member) {
            Some(child) => {
                if ObjectType::of(member) == Some(ObjectType::AutNum) {
                    tree[root].record_origins([member]);
                }
                children.push(child);
            }
            None => trace!(node = %node, member = %member, "Skipping member already on the path"),
        }
    }

    for route in expansion.routes {
        tree[root].record_prefixes(route.prefixes, route.origin.as_deref(), route.protocol);
    }

    children
}

/// Aggregate statistics from multiple workers: (processed, failed, forked, cache hits)
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64) {
    let mut processed = 0u64;
    let mut failed = 0u64;
    let mut forked = 0u64;
    let mut cache_hits = 0u64;

    for worker in workers {
        processed += worker.stats.processed.load(Ordering::Relaxed);
        failed += worker.stats.failed.load(Ordering::Relaxed);
        forked += worker.stats.forked.load(Ordering::Relaxed);
        cache_hits += worker.stats.cache_hits.load(Ordering::Relaxed);
    }

    (processed, failed, forked, cache_hits)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Worker thread panicked".into()
    }
}
