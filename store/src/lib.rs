//! Abstract storage traits for the Agora governance service.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.
//!
//! Reads go through the per-concern traits. Writes are never issued one at a
//! time: governance logic plans a [`WriteBatch`] and the backend applies it
//! atomically through [`BatchStore::commit_batch`].

pub mod ballot;
pub mod batch;
pub mod cursor;
pub mod delegation;
pub mod deliberation;
pub mod error;
pub mod proposal;

pub use ballot::BallotStore;
pub use batch::{BatchStore, StoreOp, WriteBatch};
pub use cursor::CursorStore;
pub use delegation::DelegationStore;
pub use deliberation::DeliberationStore;
pub use error::StoreError;
pub use proposal::ProposalStore;

/// Everything the reconciler and query layer need from one backend.
pub trait GovernanceStore:
    ProposalStore + BallotStore + DelegationStore + DeliberationStore + CursorStore + BatchStore
{
}

impl<T> GovernanceStore for T where
    T: ProposalStore + BallotStore + DelegationStore + DeliberationStore + CursorStore + BatchStore
{
}
