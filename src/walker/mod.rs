//! Parallel set walker
//!
//! One [`ServerPool`] per registry server. Its workers share a single
//! queue of query nodes, a response cache and the query tree; pools for
//! different servers never interact.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │       ServerPool        │
//!                     │  - QueryTree (roots)    │
//!                     │  - WorkQueue            │
//!                     │  - ResponseCache        │
//!                     └───────────┬─────────────┘
//!                                 │
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Worker 1 │             │  Worker 2 │             │  Worker N │
//! │  Session  │             │  Session  │             │  Session  │
//! │  Dialect  │             │  Dialect  │             │  Dialect  │
//! └───────────┘             └───────────┘             └───────────┘
//! ```

pub mod cache;
pub mod coordinator;
pub mod queue;
pub mod worker;

pub use cache::{CacheKey, ResponseCache};
pub use coordinator::{PoolContext, PoolSummary, Resolution, ServerPool};
pub use queue::{QueueItem, WorkQueue};
pub use worker::{Worker, WorkerStats};
