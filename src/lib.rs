//! irr-walker - IRR / Whois Prefix Resolver
//!
//! Recursively expands RPSL `as-set`, `route-set` and `aut-num` objects
//! into the IPv4 and IPv6 prefixes they cover, grouped by origin AS.
//!
//! # Features
//!
//! - **Two dialects**: IRRd servers speak the `!`-command protocol, RIPE-style
//!   whois servers take flag queries. The dialect is chosen from a directory
//!   of well-known registries.
//!
//! - **Parallel walking**: Each server gets a pool of worker threads, each
//!   with its own persistent TCP session, sharing one work queue.
//!
//! - **Cycle safe**: Set references that loop back to an ancestor are never
//!   followed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Client                               │
//! │               (one ServerPool per IRR / Whois server)           │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ServerPool                              │
//! │            ┌──────────────────────────┐                         │
//! │            │  QueryTree + WorkQueue   │                         │
//! │            │  - roots and forks       │                         │
//! │            │  - idle-count shutdown   │                         │
//! │            └────────────┬─────────────┘                         │
//! │                         │                                       │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │      │
//! │  │ Session │  │ Session │  │ Session │         │ Session │      │
//! │  │ Dialect │  │ Dialect │  │ Dialect │         │ Dialect │      │
//! │  └─────────┘  └─────────┘  └─────────┘         └─────────┘      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ TCP (port 43)
//!                               ▼
//!                    ┌──────────────────┐
//!                    │ IRRd / whoisd    │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Resolve an as-set on JPIRR
//! irr-walker -h jpirr AS-JPNIC
//!
//! # IPv4 only, restricted to two sources, four threads, JSON output
//! irr-walker -h radb -s radb -s jpirr -4 -t 4 -f json AS-JPNIC
//! ```

pub mod client;
pub mod config;
pub mod dialect;
pub mod error;
pub mod irr;
pub mod output;
pub mod query;
pub mod session;
pub mod walker;

pub use client::{resolve, Client, ClientOptions, QueryOptions};
pub use config::{CliArgs, OutputFormat, ResolveConfig};
pub use error::{ResolverError, Result};
pub use walker::Resolution;
