//! Startup verification that cached tallies match the reveal records.

use agora_governance::recount;
use agora_store::GovernanceStore;
use agora_types::ProposalId;

use crate::tracing_spans::verify_tally_span;
use crate::NodeError;

/// One disagreement between cached and recomputed counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallyMismatch {
    pub proposal_id: ProposalId,
    /// `None` for the proposal's total.
    pub option: Option<u32>,
    pub cached: u64,
    pub recomputed: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TallyReport {
    pub proposals_checked: usize,
    pub reveals_checked: usize,
    pub mismatches: Vec<TallyMismatch>,
    /// Proposals with reveals naming options they do not have.
    pub stray_reveals: Vec<ProposalId>,
}

impl TallyReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.stray_reveals.is_empty()
    }

    /// Turn an inconsistent report into an error naming the first bad proposal.
    pub fn into_result(self) -> Result<Self, NodeError> {
        if let Some(first) = self.mismatches.first() {
            return Err(NodeError::TallyMismatch(first.proposal_id));
        }
        if let Some(first) = self.stray_reveals.first() {
            return Err(NodeError::TallyMismatch(*first));
        }
        Ok(self)
    }
}

/// Recount every proposal from its reveals and compare with the cached
/// option counts and total.
pub fn verify_tallies<S: GovernanceStore + ?Sized>(store: &S) -> Result<TallyReport, NodeError> {
    let mut report = TallyReport::default();

    for id in store.list_proposals()? {
        let _span = verify_tally_span(id).entered();
        let Some(proposal) = store.get_proposal(id)? else {
            return Err(NodeError::Fatal(format!("proposal {id} listed but not stored")));
        };
        let options = store.get_options(id)?;
        let reveals = store.list_reveals(id)?;
        let recounted = recount(proposal.option_count, &reveals);

        report.proposals_checked += 1;
        report.reveals_checked += reveals.len();

        if recounted.stray > 0 {
            report.stray_reveals.push(id);
        }
        for (index, recomputed) in recounted.per_option.iter().enumerate() {
            let cached = options
                .iter()
                .find(|o| o.index as usize == index)
                .map(|o| o.votes)
                .unwrap_or(0);
            if cached != *recomputed {
                report.mismatches.push(TallyMismatch {
                    proposal_id: id,
                    option: Some(index as u32),
                    cached,
                    recomputed: *recomputed,
                });
            }
        }
        if proposal.total_votes != recounted.total {
            report.mismatches.push(TallyMismatch {
                proposal_id: id,
                option: None,
                cached: proposal.total_votes,
                recomputed: recounted.total,
            });
        }
    }

    if report.is_consistent() {
        tracing::info!(
            proposals = report.proposals_checked,
            reveals = report.reveals_checked,
            "tallies verified"
        );
    } else {
        tracing::error!(
            mismatches = report.mismatches.len(),
            stray = report.stray_reveals.len(),
            "cached tallies disagree with reveal records"
        );
    }
    Ok(report)
}
