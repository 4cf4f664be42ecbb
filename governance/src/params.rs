//! Governance parameters.
//!
//! Loaded from the `[governance]` table of the node config. Every field has a
//! serde default so a partial table is valid.

use agora_types::VoterAddress;
use serde::{Deserialize, Serialize};

/// Minimum discussion period before a deliberation may advance to voting.
pub const DEFAULT_MIN_DISCUSSION_SECS: u64 = 3 * 24 * 60 * 60;

/// Upper bound on delegation chain walks.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParams {
    #[serde(default = "default_min_discussion_secs")]
    pub min_discussion_secs: u64,

    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Administrators allowed to cancel ballots and close deliberations.
    /// Empty means the ledger already enforced the role.
    #[serde(default)]
    pub admins: Vec<VoterAddress>,

    /// When false, only `eligible_voters` may commit.
    #[serde(default = "default_true")]
    pub open_voting: bool,

    #[serde(default)]
    pub eligible_voters: Vec<VoterAddress>,

    /// When false, only `members` and admins may draft deliberations.
    #[serde(default = "default_true")]
    pub open_submission: bool,

    #[serde(default)]
    pub members: Vec<VoterAddress>,
}

fn default_min_discussion_secs() -> u64 {
    DEFAULT_MIN_DISCUSSION_SECS
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}

fn default_true() -> bool {
    true
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            min_discussion_secs: DEFAULT_MIN_DISCUSSION_SECS,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            admins: Vec::new(),
            open_voting: true,
            eligible_voters: Vec::new(),
            open_submission: true,
            members: Vec::new(),
        }
    }
}

impl GovernanceParams {
    pub fn is_listed_admin(&self, actor: &VoterAddress) -> bool {
        self.admins.contains(actor)
    }

    /// Whether `actor` may perform an administrative action.
    pub fn may_administer(&self, actor: &VoterAddress) -> bool {
        self.admins.is_empty() || self.is_listed_admin(actor)
    }

    pub fn may_vote(&self, voter: &VoterAddress) -> bool {
        self.open_voting || self.eligible_voters.contains(voter)
    }

    pub fn may_submit(&self, proposer: &VoterAddress) -> bool {
        self.open_submission || self.members.contains(proposer) || self.is_listed_admin(proposer)
    }
}
