//! Governance core for Agora.
//!
//! Commit-reveal ballots with delegated voting power, plus the deliberation
//! lifecycle that precedes a ballot.
//!
//! Every write path here is a pure planner: it reads the current state
//! through the `agora-store` traits, validates the action, and returns a
//! [`Transition`] (a [`agora_store::WriteBatch`] plus the resulting
//! [`GovernanceEffect`]s). Nothing is written until the caller commits the
//! batch, which is what lets the reconciler fold the cursor advance into the
//! same transaction.

pub mod ballot;
pub mod delegation;
pub mod effects;
pub mod error;
pub mod params;
pub mod phase;
pub mod tally;

pub use ballot::{BallotMachine, NewProposal};
pub use delegation::DelegationResolver;
pub use effects::{GovernanceEffect, Transition};
pub use error::{ErrorClass, GovernanceError};
pub use params::GovernanceParams;
pub use phase::PhaseController;
pub use tally::{recount, tally, OptionTally, Recount, TallySnapshot};
