use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("governance error: {0}")]
    Governance(#[from] agora_governance::GovernanceError),

    #[error("store error: {0}")]
    Store(#[from] agora_store::StoreError),

    #[error("lmdb error: {0}")]
    Lmdb(#[from] agora_store_lmdb::LmdbError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("invalid ledger event: {0}")]
    InvalidEvent(String),

    #[error("event source error: {0}")]
    Source(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("tally mismatch on proposal {0}")]
    TallyMismatch(agora_types::ProposalId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl NodeError {
    /// Errors that stop the reconciler instead of being retried.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Source(_) | Self::InvalidEvent(_))
    }
}
