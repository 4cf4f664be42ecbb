//! Tally engine: pure functions over stored options and reveals.

use agora_types::{BallotPhase, Proposal, ProposalId, ProposalOption, VoteReveal};
use serde::Serialize;

/// One option's share of the vote.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionTally {
    pub index: u32,
    pub label: String,
    pub votes: u64,
    /// `votes / total * 100`, rounded to one decimal. `0.0` when nobody voted.
    pub percentage: f64,
}

impl OptionTally {
    /// The percentage with exactly one decimal place, e.g. `"66.7"`.
    pub fn percentage_display(&self) -> String {
        format!("{:.1}", self.percentage)
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (votes as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Tally the cached option counts.
pub fn tally(options: &[ProposalOption]) -> Vec<OptionTally> {
    let total: u64 = options.iter().map(|o| o.votes).sum();
    options
        .iter()
        .map(|o| OptionTally {
            index: o.index,
            label: o.label.clone(),
            votes: o.votes,
            percentage: percentage(o.votes, total),
        })
        .collect()
}

/// Vote counts recomputed from reveal records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recount {
    pub per_option: Vec<u64>,
    pub total: u64,
    /// Reveals naming an option outside `0..option_count`.
    pub stray: usize,
}

/// Recompute counts from scratch, weighting each reveal by its recorded power.
pub fn recount(option_count: u32, reveals: &[VoteReveal]) -> Recount {
    let mut per_option = vec![0u64; option_count as usize];
    let mut total = 0u64;
    let mut stray = 0usize;
    for reveal in reveals {
        match per_option.get_mut(reveal.option as usize) {
            Some(count) => {
                *count += reveal.power;
                total += reveal.power;
            }
            None => stray += 1,
        }
    }
    Recount {
        per_option,
        total,
        stray,
    }
}

/// Point-in-time view of a ballot's result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TallySnapshot {
    pub proposal_id: ProposalId,
    pub phase: BallotPhase,
    pub total_votes: u64,
    pub options: Vec<OptionTally>,
    /// True once the ballot has been formally tallied.
    pub finalized: bool,
}

impl TallySnapshot {
    /// Uses the stored phase. Pass `proposal.phase_at(height)` to
    /// [`TallySnapshot::with_phase`] for the lazily evaluated one.
    pub fn new(proposal: &Proposal, options: &[ProposalOption]) -> Self {
        Self {
            proposal_id: proposal.id,
            phase: proposal.phase,
            total_votes: proposal.total_votes,
            options: tally(options),
            finalized: proposal.phase == BallotPhase::Tallied,
        }
    }

    pub fn with_phase(mut self, phase: BallotPhase) -> Self {
        self.phase = phase;
        self
    }

    /// The option(s) with the most votes. Empty when nobody voted.
    pub fn leaders(&self) -> Vec<u32> {
        let max = self.options.iter().map(|o| o.votes).max().unwrap_or(0);
        if max == 0 {
            return Vec::new();
        }
        self.options
            .iter()
            .filter(|o| o.votes == max)
            .map(|o| o.index)
            .collect()
    }
}
