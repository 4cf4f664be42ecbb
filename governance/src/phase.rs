//! Deliberation lifecycle: `Draft → Discussion → Voting → Closed`.
//!
//! A deliberation is the discussion that precedes a ballot. It carries its
//! own content id and a list of amendments; once it reaches `Voting`, a
//! ballot may be created that links back to it. Discussion windows are
//! measured in seconds of ledger time, not blocks.

use agora_store::{DeliberationStore, StoreOp, WriteBatch};
use agora_types::{
    Amendment, ContentId, Deliberation, DeliberationPhase, ProposalId, Timestamp, VoterAddress,
};

use crate::effects::{GovernanceEffect, Transition};
use crate::error::GovernanceError;
use crate::params::GovernanceParams;

pub struct PhaseController<'a, S: ?Sized> {
    store: &'a S,
    params: &'a GovernanceParams,
}

impl<'a, S: DeliberationStore + ?Sized> PhaseController<'a, S> {
    pub fn new(store: &'a S, params: &'a GovernanceParams) -> Self {
        Self { store, params }
    }

    fn load(&self, id: ProposalId) -> Result<Deliberation, GovernanceError> {
        self.store
            .get_deliberation(id)?
            .ok_or(GovernanceError::DeliberationNotFound(id))
    }

    fn expect_phase(
        deliberation: &Deliberation,
        expected: DeliberationPhase,
    ) -> Result<(), GovernanceError> {
        if deliberation.phase != expected {
            return Err(GovernanceError::WrongDeliberationPhase {
                id: deliberation.id,
                expected,
                actual: deliberation.phase,
            });
        }
        Ok(())
    }

    fn check_discussion_secs(&self, secs: u64) -> Result<(), GovernanceError> {
        if secs < self.params.min_discussion_secs {
            return Err(GovernanceError::DiscussionTooShort {
                secs,
                min: self.params.min_discussion_secs,
            });
        }
        Ok(())
    }

    /// Validate a new record and build it in `Draft`.
    fn new_record(
        &self,
        id: ProposalId,
        title: String,
        content: String,
        proposer: &VoterAddress,
        now: Timestamp,
    ) -> Result<Deliberation, GovernanceError> {
        if id.is_global_scope() {
            return Err(GovernanceError::ReservedProposalId);
        }
        if title.trim().is_empty() {
            return Err(GovernanceError::EmptyTitle);
        }
        let content = ContentId::new(content).map_err(|_| GovernanceError::EmptyContent)?;
        if !self.params.may_submit(proposer) {
            return Err(GovernanceError::NotMember(*proposer));
        }
        if self.store.get_deliberation(id)?.is_some() {
            return Err(GovernanceError::DeliberationExists(id));
        }
        Ok(Deliberation {
            id,
            title,
            content,
            proposer: *proposer,
            phase: DeliberationPhase::Draft,
            created_at: now,
            discussion_ends_at: None,
            amendment_count: 0,
        })
    }

    pub fn draft(
        &self,
        id: ProposalId,
        title: String,
        content: String,
        proposer: &VoterAddress,
        now: Timestamp,
    ) -> Result<Transition, GovernanceError> {
        let record = self.new_record(id, title, content, proposer, now)?;
        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::InsertDeliberation(record)]),
            vec![GovernanceEffect::DeliberationDrafted { id }],
        ))
    }

    pub fn open_discussion(
        &self,
        id: ProposalId,
        actor: &VoterAddress,
        discussion_secs: u64,
        now: Timestamp,
    ) -> Result<Transition, GovernanceError> {
        let mut record = self.load(id)?;
        if record.proposer != *actor {
            return Err(GovernanceError::NotProposer(*actor));
        }
        Self::expect_phase(&record, DeliberationPhase::Draft)?;
        self.check_discussion_secs(discussion_secs)?;

        let ends_at = now.plus_secs(discussion_secs);
        record.phase = DeliberationPhase::Discussion;
        record.discussion_ends_at = Some(ends_at);
        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::UpdateDeliberation(record)]),
            vec![GovernanceEffect::DiscussionOpened { id, ends_at }],
        ))
    }

    /// Draft and open discussion in one step.
    pub fn submit(
        &self,
        id: ProposalId,
        title: String,
        content: String,
        proposer: &VoterAddress,
        discussion_secs: u64,
        now: Timestamp,
    ) -> Result<Transition, GovernanceError> {
        let mut record = self.new_record(id, title, content, proposer, now)?;
        self.check_discussion_secs(discussion_secs)?;

        let ends_at = now.plus_secs(discussion_secs);
        record.phase = DeliberationPhase::Discussion;
        record.discussion_ends_at = Some(ends_at);
        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::InsertDeliberation(record)]),
            vec![
                GovernanceEffect::DeliberationDrafted { id },
                GovernanceEffect::DiscussionOpened { id, ends_at },
            ],
        ))
    }

    pub fn amend(
        &self,
        id: ProposalId,
        author: &VoterAddress,
        content: String,
        now: Timestamp,
    ) -> Result<Transition, GovernanceError> {
        let mut record = self.load(id)?;
        Self::expect_phase(&record, DeliberationPhase::Discussion)?;
        let content = ContentId::new(content).map_err(|_| GovernanceError::EmptyContent)?;
        if !self.params.may_submit(author) {
            return Err(GovernanceError::NotMember(*author));
        }

        let index = record.amendment_count;
        record.amendment_count += 1;
        Ok(Transition::new(
            WriteBatch::from(vec![
                StoreOp::InsertAmendment(Amendment {
                    deliberation_id: id,
                    index,
                    author: *author,
                    content,
                    added_at: now,
                }),
                StoreOp::UpdateDeliberation(record),
            ]),
            vec![GovernanceEffect::AmendmentAdded { id, index }],
        ))
    }

    pub fn advance_to_voting(
        &self,
        id: ProposalId,
        now: Timestamp,
    ) -> Result<Transition, GovernanceError> {
        let mut record = self.load(id)?;
        Self::expect_phase(&record, DeliberationPhase::Discussion)?;
        match record.discussion_ends_at {
            Some(ends_at) if now >= ends_at => {}
            _ => return Err(GovernanceError::DiscussionNotEnded(id)),
        }

        record.phase = DeliberationPhase::Voting;
        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::UpdateDeliberation(record)]),
            vec![GovernanceEffect::AdvancedToVoting { id }],
        ))
    }

    /// Close from any phase. Only the proposer or an administrator may close.
    pub fn close(
        &self,
        id: ProposalId,
        actor: &VoterAddress,
        now: Timestamp,
    ) -> Result<Transition, GovernanceError> {
        let mut record = self.load(id)?;
        if record.proposer != *actor && !self.params.may_administer(actor) {
            return Err(GovernanceError::NotAuthorizedToClose(*actor));
        }
        if record.phase == DeliberationPhase::Closed {
            return Err(GovernanceError::AlreadyClosed(id));
        }
        tracing::debug!(deliberation = %id, actor = %actor, at = %now, from = %record.phase, "closing");

        record.phase = DeliberationPhase::Closed;
        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::UpdateDeliberation(record)]),
            vec![GovernanceEffect::DeliberationClosed { id }],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_nullables::{NullClock, NullGovernanceStore};
    use agora_store::BatchStore;

    use crate::error::ErrorClass;

    const THREE_DAYS: u64 = 259_200;

    fn addr(n: u8) -> VoterAddress {
        VoterAddress::new([n; 20])
    }

    fn id(n: u64) -> ProposalId {
        ProposalId::new(n)
    }

    fn apply(store: &NullGovernanceStore, result: Result<Transition, GovernanceError>) {
        store.commit_batch(result.unwrap().batch).unwrap();
    }

    #[test]
    fn happy_path() {
        let store = NullGovernanceStore::new();
        let params = GovernanceParams::default();
        let clock = NullClock::new(0, 1_000);
        let pc = PhaseController::new(&store, &params);

        apply(&store, pc.draft(id(1), "Charter".into(), "QmCharter".into(), &addr(1), clock.now()));
        apply(&store, pc.open_discussion(id(1), &addr(1), THREE_DAYS, clock.now()));
        apply(&store, pc.amend(id(1), &addr(2), "QmFix".into(), clock.now()));
        apply(&store, pc.amend(id(1), &addr(3), "QmFix2".into(), clock.now()));

        clock.advance_secs(THREE_DAYS);
        apply(&store, pc.advance_to_voting(id(1), clock.now()));

        let record = store.get_deliberation(id(1)).unwrap().unwrap();
        assert_eq!(record.phase, DeliberationPhase::Voting);
        assert_eq!(record.amendment_count, 2);
        let amendments = store.get_amendments(id(1)).unwrap();
        assert_eq!(amendments[1].index, 1);
        assert_eq!(amendments[1].author, addr(3));

        apply(&store, pc.close(id(1), &addr(1), clock.now()));
        assert!(matches!(
            pc.close(id(1), &addr(1), clock.now()),
            Err(GovernanceError::AlreadyClosed(_))
        ));
    }

    #[test]
    fn discussion_minimum_enforced() {
        let store = NullGovernanceStore::new();
        let params = GovernanceParams::default();
        let pc = PhaseController::new(&store, &params);
        let now = Timestamp::new(0);
        apply(&store, pc.draft(id(1), "T".into(), "Qm".into(), &addr(1), now));

        let err = pc.open_discussion(id(1), &addr(1), THREE_DAYS - 1, now).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(matches!(
            pc.open_discussion(id(1), &addr(2), THREE_DAYS, now),
            Err(GovernanceError::NotProposer(_))
        ));
    }

    #[test]
    fn cannot_advance_early() {
        let store = NullGovernanceStore::new();
        let params = GovernanceParams::default();
        let pc = PhaseController::new(&store, &params);
        let start = Timestamp::new(10);
        apply(&store, pc.submit(id(1), "T".into(), "Qm".into(), &addr(1), THREE_DAYS, start));

        let err = pc
            .advance_to_voting(id(1), start.plus_secs(THREE_DAYS - 1))
            .unwrap_err();
        assert!(matches!(err, GovernanceError::DiscussionNotEnded(_)));
        assert_eq!(err.class(), ErrorClass::PhaseViolation);
        assert!(pc.advance_to_voting(id(1), start.plus_secs(THREE_DAYS)).is_ok());
    }

    #[test]
    fn amendments_only_during_discussion() {
        let store = NullGovernanceStore::new();
        let params = GovernanceParams::default();
        let pc = PhaseController::new(&store, &params);
        let now = Timestamp::new(0);
        apply(&store, pc.draft(id(1), "T".into(), "Qm".into(), &addr(1), now));
        assert!(matches!(
            pc.amend(id(1), &addr(1), "QmA".into(), now),
            Err(GovernanceError::WrongDeliberationPhase {
                expected: DeliberationPhase::Discussion,
                actual: DeliberationPhase::Draft,
                ..
            })
        ));
    }

    #[test]
    fn draft_validation() {
        let store = NullGovernanceStore::new();
        let params = GovernanceParams {
            open_submission: false,
            members: vec![addr(1)],
            ..Default::default()
        };
        let pc = PhaseController::new(&store, &params);
        let now = Timestamp::new(0);
        assert!(matches!(
            pc.draft(id(1), "".into(), "Qm".into(), &addr(1), now),
            Err(GovernanceError::EmptyTitle)
        ));
        assert!(matches!(
            pc.draft(id(1), "T".into(), "".into(), &addr(1), now),
            Err(GovernanceError::EmptyContent)
        ));
        assert!(matches!(
            pc.draft(id(1), "T".into(), "Qm".into(), &addr(2), now),
            Err(GovernanceError::NotMember(_))
        ));
        apply(&store, pc.draft(id(1), "T".into(), "Qm".into(), &addr(1), now));
        assert!(matches!(
            pc.draft(id(1), "T".into(), "Qm".into(), &addr(1), now),
            Err(GovernanceError::DeliberationExists(_))
        ));
    }

    #[test]
    fn close_authorization() {
        let store = NullGovernanceStore::new();
        let params = GovernanceParams {
            admins: vec![addr(9)],
            ..Default::default()
        };
        let pc = PhaseController::new(&store, &params);
        let now = Timestamp::new(0);
        apply(&store, pc.draft(id(1), "T".into(), "Qm".into(), &addr(1), now));
        assert!(matches!(
            pc.close(id(1), &addr(2), now),
            Err(GovernanceError::NotAuthorizedToClose(_))
        ));
        assert!(pc.close(id(1), &addr(9), now).is_ok());
    }
}
