//! Pre-built [`tracing::Span`] constructors for common reconciler operations.
//!
//! Consistent span names and field sets make traces easy to filter and
//! correlate across streams.

use tracing::{info_span, Span};

use agora_types::{ProposalId, StreamName};

/// Span covering the application of one ledger event.
pub fn apply_span(stream: &StreamName, sequence: u64, kind: &str) -> Span {
    info_span!("apply", stream = %stream, sequence = sequence, kind = %kind)
}

/// Span covering one stream worker's lifetime.
pub fn stream_worker_span(stream: &StreamName) -> Span {
    info_span!("stream_worker", stream = %stream)
}

/// Span covering one subscription to the ledger event source.
pub fn subscription_span(attempt: u64) -> Span {
    info_span!("subscription", attempt = attempt)
}

/// Span covering the startup tally verification of one proposal.
pub fn verify_tally_span(proposal: ProposalId) -> Span {
    info_span!("verify_tally", proposal = %proposal)
}
