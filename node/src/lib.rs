//! Agora reconciler node.
//!
//! Consumes ledger events from an [`EventSource`], applies them to the
//! governance projection exactly once, and serves read-only queries over the
//! result:
//! - Per-stream ordered application with durable sync cursors
//! - Out-of-order reveal handling with backoff and redelivery
//! - Per-proposal serialisation across concurrent streams
//! - Startup integrity and tally verification

pub mod config;
pub mod error;
pub mod integrity;
pub mod ledger_event;
pub mod locks;
pub mod logging;
pub mod metrics;
pub mod ndjson;
pub mod node;
pub mod query;
pub mod reconciler;
pub mod retry;
pub mod service;
pub mod shutdown;
pub mod tracing_spans;

pub use config::NodeConfig;
pub use error::NodeError;
pub use integrity::{verify_tallies, TallyMismatch, TallyReport};
pub use ledger_event::{LedgerEvent, LedgerEventKind, ProjectionBus};
pub use locks::{LockKey, ProposalLocks};
pub use logging::{init_logging, LogFormat};
pub use metrics::ReconcilerMetrics;
pub use ndjson::NdjsonFileSource;
pub use node::GovernanceNode;
pub use query::{BallotStatus, DeliberationView, GovernanceQuery, Page, PageRequest};
pub use reconciler::{ApplyOutcome, Reconciler};
pub use retry::{Backoff, RetryPolicy};
pub use service::{EventSource, ReconcilerService};
pub use shutdown::ShutdownController;
