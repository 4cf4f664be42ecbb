//! Applies ledger events to the governance projection.
//!
//! Every event is applied at most once. A stream's cursor advances in the
//! same atomic batch as the event's writes, so a crash between the two is
//! impossible and redelivered events are skipped. Rejected events advance
//! the cursor alone; an event that arrives before its predecessor commits
//! nothing and is retried by the caller.

use std::sync::Arc;
use std::time::Instant;

use agora_governance::{
    BallotMachine, ErrorClass, GovernanceError, GovernanceParams,
    NewProposal, PhaseController, Transition,
};
use agora_store::{GovernanceStore, StoreOp, WriteBatch};
use agora_types::SyncCursor;

use crate::ledger_event::{LedgerEvent, LedgerEventKind, ProjectionBus};
use crate::metrics::ReconcilerMetrics;
use crate::tracing_spans::apply_span;
use crate::NodeError;

/// Result of applying one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Writes and cursor committed; `effects` were published.
    Applied { effects: usize },
    /// Already covered by the stream cursor.
    Skipped,
    /// Invalid for the current state; only the cursor advanced.
    Rejected { class: ErrorClass, reason: String },
    /// The commitment, proposal or deliberation the event refers to has not
    /// been applied yet. Nothing committed.
    OutOfOrder,
}

impl ApplyOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Skipped => "skipped",
            Self::Rejected { .. } => "rejected",
            Self::OutOfOrder => "out_of_order",
        }
    }
}

pub struct Reconciler<S> {
    store: Arc<S>,
    params: GovernanceParams,
    bus: ProjectionBus,
    metrics: Option<Arc<ReconcilerMetrics>>,
}

impl<S: GovernanceStore> Reconciler<S> {
    pub fn new(store: Arc<S>, params: GovernanceParams) -> Self {
        Self {
            store,
            params,
            bus: ProjectionBus::new(),
            metrics: None,
        }
    }

    pub fn with_bus(mut self, bus: ProjectionBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ReconcilerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn params(&self) -> &GovernanceParams {
        &self.params
    }

    /// Apply `event` exactly once.
    ///
    /// Errors are fatal: the store failed and nothing about this event was
    /// persisted.
    pub fn apply(&self, event: &LedgerEvent) -> Result<ApplyOutcome, NodeError> {
        let _span = apply_span(&event.stream, event.sequence, event.kind.name()).entered();
        let started = Instant::now();
        let outcome = self.apply_inner(event)?;

        if let Some(metrics) = &self.metrics {
            metrics
                .apply_latency_ms
                .observe(started.elapsed().as_secs_f64() * 1000.0);
            match &outcome {
                ApplyOutcome::Applied { .. } => metrics.events_applied.inc(),
                ApplyOutcome::Skipped => metrics.events_skipped.inc(),
                ApplyOutcome::Rejected { class, .. } => {
                    metrics.events_rejected.with_label_values(&[class.name()]).inc()
                }
                ApplyOutcome::OutOfOrder => {}
            }
            if matches!(outcome, ApplyOutcome::Applied { .. } | ApplyOutcome::Rejected { .. }) {
                metrics.observe_cursor(&Self::cursor_of(event));
            }
        }
        Ok(outcome)
    }

    fn apply_inner(&self, event: &LedgerEvent) -> Result<ApplyOutcome, NodeError> {
        if let Some(cursor) = self.store.get_cursor(&event.stream)? {
            if cursor.covers(event.sequence) {
                tracing::debug!(cursor = cursor.sequence, "event already applied");
                return Ok(ApplyOutcome::Skipped);
            }
        }

        match self.plan(event) {
            Ok(Transition { mut batch, effects }) => {
                batch.push(StoreOp::AdvanceCursor(Self::cursor_of(event)));
                match self.store.commit_batch(batch) {
                    Ok(()) => {
                        for effect in &effects {
                            self.bus.emit(event, effect);
                        }
                        tracing::info!(
                            proposal = %event.proposal_id,
                            actor = %event.actor,
                            effects = effects.len(),
                            "event applied"
                        );
                        Ok(ApplyOutcome::Applied {
                            effects: effects.len(),
                        })
                    }
                    Err(e) if e.is_duplicate() => {
                        tracing::warn!(error = %e, "uniqueness violation at commit, treating as duplicate");
                        self.reject(event, ErrorClass::DuplicateAction, e.to_string())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) if e.is_missing_predecessor() => {
                tracing::debug!(error = %e, "event arrived before its predecessor");
                Ok(ApplyOutcome::OutOfOrder)
            }
            Err(GovernanceError::Store(e)) => Err(e.into()),
            Err(e) => self.reject(event, e.class(), e.to_string()),
        }
    }

    fn reject(
        &self,
        event: &LedgerEvent,
        class: ErrorClass,
        reason: String,
    ) -> Result<ApplyOutcome, NodeError> {
        let mut batch = WriteBatch::new();
        batch.push(StoreOp::AdvanceCursor(Self::cursor_of(event)));
        self.store.commit_batch(batch)?;
        tracing::warn!(
            proposal = %event.proposal_id,
            actor = %event.actor,
            class = class.name(),
            reason = %reason,
            "event rejected"
        );
        Ok(ApplyOutcome::Rejected { class, reason })
    }

    fn cursor_of(event: &LedgerEvent) -> SyncCursor {
        SyncCursor {
            stream: event.stream.clone(),
            sequence: event.sequence,
        }
    }

    /// Validate `event` against current state and produce its writes.
    fn plan(&self, event: &LedgerEvent) -> Result<Transition, GovernanceError> {
        let store = self.store.as_ref();
        let id = event.proposal_id;
        let actor = &event.actor;

        match &event.kind {
            LedgerEventKind::ProposalCreated {
                title,
                content,
                option_count,
                labels,
                commit_duration,
                reveal_duration,
                deliberation,
            } => BallotMachine::new(store, &self.params).create_proposal(
                NewProposal {
                    id,
                    title: title.clone(),
                    content: content.clone(),
                    proposer: *actor,
                    option_count: *option_count,
                    labels: labels.clone(),
                    commit_duration: *commit_duration,
                    reveal_duration: *reveal_duration,
                    deliberation: *deliberation,
                },
                event.height,
            ),
            LedgerEventKind::VoteCommitted { commitment } => BallotMachine::new(store, &self.params)
                .commit_vote(id, actor, *commitment, event.height),
            LedgerEventKind::VoteRevealed { option, secret } => {
                BallotMachine::new(store, &self.params)
                    .reveal_vote(id, actor, *option, secret, event.height)
            }
            LedgerEventKind::ProposalTallied => {
                BallotMachine::new(store, &self.params).tally(id, event.height)
            }
            LedgerEventKind::ProposalCancelled => {
                BallotMachine::new(store, &self.params).cancel(id, actor, event.height)
            }
            LedgerEventKind::DelegationChanged { to } => BallotMachine::new(store, &self.params)
                .change_delegation(actor, to.as_ref(), event.scope(), event.height, event.sequence),
            LedgerEventKind::ProposalSubmitted {
                title,
                content,
                discussion_secs,
            } => PhaseController::new(store, &self.params).submit(
                id,
                title.clone(),
                content.clone(),
                actor,
                *discussion_secs,
                event.timestamp,
            ),
            LedgerEventKind::AmendmentAdded { content } => PhaseController::new(store, &self.params)
                .amend(id, actor, content.clone(), event.timestamp),
            LedgerEventKind::AdvancedToVoting => {
                PhaseController::new(store, &self.params).advance_to_voting(id, event.timestamp)
            }
            LedgerEventKind::DeliberationClosed => {
                PhaseController::new(store, &self.params).close(id, actor, event.timestamp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_crypto::commitment_hash;
    use agora_governance::GovernanceEffect;
    use agora_nullables::NullGovernanceStore;
    use agora_store::{BallotStore, CursorStore, DelegationStore, ProposalStore};
    use agora_types::{
        BlockHeight, DelegationScope, ProposalId, RevealSecret, StreamName, Timestamp,
        VoterAddress,
    };
    use std::sync::Mutex;

    fn voter(n: u8) -> VoterAddress {
        VoterAddress::new([n; 20])
    }

    fn stream(name: &str) -> StreamName {
        StreamName::new(name).unwrap()
    }

    fn event(name: &str, sequence: u64, height: u64, id: u64, actor: u8, kind: LedgerEventKind) -> LedgerEvent {
        LedgerEvent {
            stream: stream(name),
            sequence,
            height: BlockHeight::new(height),
            timestamp: Timestamp::new(1_700_000_000 + height),
            proposal_id: ProposalId::new(id),
            actor: voter(actor),
            kind,
        }
    }

    fn create(sequence: u64) -> LedgerEvent {
        event(
            "proposals",
            sequence,
            100,
            1,
            1,
            LedgerEventKind::ProposalCreated {
                title: "Fund the bridge".into(),
                content: "bafy-bridge".into(),
                option_count: 2,
                labels: vec![],
                commit_duration: 10,
                reveal_duration: 10,
                deliberation: None,
            },
        )
    }

    fn commit(sequence: u64, height: u64, actor: u8, option: u32, salt: u8) -> LedgerEvent {
        let hash = commitment_hash(ProposalId::new(1), option, &RevealSecret::new([salt; 32]));
        event("votes", sequence, height, 1, actor, LedgerEventKind::VoteCommitted { commitment: hash })
    }

    fn reveal(sequence: u64, height: u64, actor: u8, option: u32, salt: u8) -> LedgerEvent {
        event(
            "reveals",
            sequence,
            height,
            1,
            actor,
            LedgerEventKind::VoteRevealed {
                option,
                secret: RevealSecret::new([salt; 32]),
            },
        )
    }

    fn reconciler() -> Reconciler<NullGovernanceStore> {
        Reconciler::new(Arc::new(NullGovernanceStore::new()), GovernanceParams::default())
    }

    fn cursor(r: &Reconciler<NullGovernanceStore>, name: &str) -> Option<u64> {
        r.store().get_cursor(&stream(name)).unwrap().map(|c| c.sequence)
    }

    #[test]
    fn commit_and_reveal_update_tally_and_cursors() {
        let r = reconciler();
        assert_eq!(r.apply(&create(1)).unwrap(), ApplyOutcome::Applied { effects: 1 });
        assert!(matches!(r.apply(&commit(1, 105, 2, 1, 7)).unwrap(), ApplyOutcome::Applied { .. }));
        assert!(matches!(r.apply(&reveal(1, 112, 2, 1, 7)).unwrap(), ApplyOutcome::Applied { .. }));

        let options = r.store().get_options(ProposalId::new(1)).unwrap();
        assert_eq!(options[1].votes, 1);
        assert_eq!(cursor(&r, "proposals"), Some(1));
        assert_eq!(cursor(&r, "votes"), Some(1));
        assert_eq!(cursor(&r, "reveals"), Some(1));
    }

    #[test]
    fn redelivered_event_is_skipped() {
        let r = reconciler();
        r.apply(&create(1)).unwrap();
        r.apply(&commit(5, 105, 2, 0, 1)).unwrap();
        let commits_before = r.store().commit_count();

        assert_eq!(r.apply(&commit(5, 105, 2, 0, 1)).unwrap(), ApplyOutcome::Skipped);
        assert_eq!(r.apply(&commit(3, 105, 3, 0, 1)).unwrap(), ApplyOutcome::Skipped);
        assert_eq!(r.store().commit_count(), commits_before);
        assert!(r
            .store()
            .get_commitment(ProposalId::new(1), &voter(3))
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejected_event_advances_cursor_only() {
        let r = reconciler();
        r.apply(&create(1)).unwrap();
        r.apply(&commit(1, 105, 2, 0, 1)).unwrap();

        let outcome = r.apply(&commit(2, 106, 2, 1, 2)).unwrap();
        assert!(matches!(
            outcome,
            ApplyOutcome::Rejected {
                class: ErrorClass::DuplicateAction,
                ..
            }
        ));
        assert_eq!(cursor(&r, "votes"), Some(2));
        let stored = r.store().get_commitment(ProposalId::new(1), &voter(2)).unwrap().unwrap();
        assert_eq!(
            stored.commitment,
            commitment_hash(ProposalId::new(1), 0, &RevealSecret::new([1; 32]))
        );
    }

    #[test]
    fn commit_after_deadline_is_a_phase_violation() {
        let r = reconciler();
        r.apply(&create(1)).unwrap();
        let outcome = r.apply(&commit(1, 111, 2, 0, 1)).unwrap();
        assert!(matches!(
            outcome,
            ApplyOutcome::Rejected {
                class: ErrorClass::PhaseViolation,
                ..
            }
        ));
    }

    #[test]
    fn reveal_before_commitment_commits_nothing() {
        let r = reconciler();
        r.apply(&create(1)).unwrap();

        assert_eq!(r.apply(&reveal(1, 112, 2, 1, 7)).unwrap(), ApplyOutcome::OutOfOrder);
        assert_eq!(cursor(&r, "reveals"), None);

        r.apply(&commit(1, 105, 2, 1, 7)).unwrap();
        assert!(matches!(r.apply(&reveal(1, 112, 2, 1, 7)).unwrap(), ApplyOutcome::Applied { .. }));
        assert_eq!(cursor(&r, "reveals"), Some(1));
    }

    #[test]
    fn commit_before_proposal_waits_for_it() {
        let r = reconciler();

        assert_eq!(r.apply(&commit(1, 105, 2, 0, 3)).unwrap(), ApplyOutcome::OutOfOrder);
        assert_eq!(cursor(&r, "votes"), None);
        assert_eq!(
            r.apply(&event("reveals", 1, 121, 1, 1, LedgerEventKind::ProposalTallied)).unwrap(),
            ApplyOutcome::OutOfOrder
        );

        assert_eq!(r.apply(&create(1)).unwrap(), ApplyOutcome::Applied { effects: 1 });
        assert!(matches!(r.apply(&commit(1, 105, 2, 0, 3)).unwrap(), ApplyOutcome::Applied { .. }));
        assert_eq!(cursor(&r, "votes"), Some(1));
        assert!(r
            .store()
            .get_commitment(ProposalId::new(1), &voter(2))
            .unwrap()
            .is_some());
    }

    #[test]
    fn amendment_before_submission_waits_for_it() {
        let r = reconciler();
        let min = r.params().min_discussion_secs;
        let amend = event(
            "amendments",
            1,
            51,
            9,
            4,
            LedgerEventKind::AmendmentAdded {
                content: "bafy-amend".into(),
            },
        );
        assert_eq!(r.apply(&amend).unwrap(), ApplyOutcome::OutOfOrder);
        assert_eq!(cursor(&r, "amendments"), None);

        let submit = event(
            "deliberations",
            1,
            50,
            9,
            4,
            LedgerEventKind::ProposalSubmitted {
                title: "Treasury policy".into(),
                content: "bafy-policy".into(),
                discussion_secs: min,
            },
        );
        assert!(matches!(r.apply(&submit).unwrap(), ApplyOutcome::Applied { .. }));
        assert!(matches!(r.apply(&amend).unwrap(), ApplyOutcome::Applied { .. }));
        assert_eq!(cursor(&r, "amendments"), Some(1));
    }

    fn delegation(sequence: u64, height: u64, from: u8, to: Option<u8>) -> LedgerEvent {
        event(
            "delegations",
            sequence,
            height,
            0,
            from,
            LedgerEventKind::DelegationChanged { to: to.map(voter) },
        )
    }

    fn apply_each(r: &Reconciler<NullGovernanceStore>, events: &[LedgerEvent]) {
        for e in events {
            assert!(matches!(r.apply(e).unwrap(), ApplyOutcome::Applied { .. }), "{:?}", e.kind);
        }
    }

    #[test]
    fn lagging_delegation_stream_reaches_same_tally() {
        let delegate = delegation(1, 101, 3, Some(2));
        let vote = [commit(1, 105, 2, 1, 7), reveal(1, 112, 2, 1, 7)];

        let in_order = reconciler();
        apply_each(&in_order, &[create(1), delegate.clone(), vote[0].clone(), vote[1].clone()]);

        let lagging = reconciler();
        apply_each(&lagging, &[create(1), vote[0].clone(), vote[1].clone()]);
        assert_eq!(
            lagging.store().get_proposal(ProposalId::new(1)).unwrap().unwrap().total_votes,
            1
        );
        assert_eq!(lagging.apply(&delegate).unwrap(), ApplyOutcome::Applied { effects: 2 });

        for r in [&in_order, &lagging] {
            let id = ProposalId::new(1);
            assert_eq!(r.store().get_proposal(id).unwrap().unwrap().total_votes, 2);
            assert_eq!(r.store().get_options(id).unwrap()[1].votes, 2);
            assert_eq!(r.store().get_reveal(id, &voter(2)).unwrap().unwrap().power, 2);
        }
    }

    #[test]
    fn lagging_replacement_moves_power_between_delegates() {
        let delegations = [delegation(1, 101, 3, Some(2)), delegation(2, 108, 3, Some(4))];
        let votes = [
            commit(1, 105, 2, 0, 7),
            commit(2, 106, 4, 1, 8),
            reveal(1, 112, 2, 0, 7),
            reveal(2, 113, 4, 1, 8),
        ];

        let in_order = reconciler();
        apply_each(&in_order, &[create(1)]);
        apply_each(&in_order, &delegations);
        apply_each(&in_order, &votes);

        let lagging = reconciler();
        apply_each(&lagging, &[create(1)]);
        apply_each(&lagging, &votes);
        apply_each(&lagging, &delegations);

        let id = ProposalId::new(1);
        for r in [&in_order, &lagging] {
            assert_eq!(r.store().get_reveal(id, &voter(2)).unwrap().unwrap().power, 1);
            assert_eq!(r.store().get_reveal(id, &voter(4)).unwrap().unwrap().power, 2);
            let options = r.store().get_options(id).unwrap();
            assert_eq!((options[0].votes, options[1].votes), (1, 2));
            assert_eq!(r.store().get_proposal(id).unwrap().unwrap().total_votes, 3);
        }
    }

    #[test]
    fn delegation_to_zero_address_is_an_integrity_rejection() {
        let r = reconciler();
        let outcome = r.apply(&delegation(1, 101, 3, Some(0))).unwrap();
        assert!(matches!(
            outcome,
            ApplyOutcome::Rejected {
                class: ErrorClass::Integrity,
                ..
            }
        ));
        assert_eq!(cursor(&r, "delegations"), Some(1));
        assert!(r.store().delegation_history(&voter(3)).unwrap().is_empty());
    }

    #[test]
    fn mismatched_reveal_is_an_integrity_rejection() {
        let r = reconciler();
        r.apply(&create(1)).unwrap();
        r.apply(&commit(1, 105, 2, 1, 7)).unwrap();

        let outcome = r.apply(&reveal(1, 112, 2, 0, 7)).unwrap();
        assert!(matches!(
            outcome,
            ApplyOutcome::Rejected {
                class: ErrorClass::Integrity,
                ..
            }
        ));
        assert!(r.store().list_reveals(ProposalId::new(1)).unwrap().is_empty());
    }

    #[test]
    fn delegated_power_counts_at_reveal() {
        let r = reconciler();
        r.apply(&create(1)).unwrap();
        let delegate = event(
            "delegations",
            1,
            101,
            0,
            3,
            LedgerEventKind::DelegationChanged { to: Some(voter(2)) },
        );
        assert!(matches!(r.apply(&delegate).unwrap(), ApplyOutcome::Applied { .. }));
        r.apply(&commit(1, 105, 2, 1, 7)).unwrap();
        r.apply(&reveal(1, 112, 2, 1, 7)).unwrap();

        let proposal = r.store().get_proposal(ProposalId::new(1)).unwrap().unwrap();
        assert_eq!(proposal.total_votes, 2);
    }

    #[test]
    fn revoke_event_clears_active_edge() {
        let r = reconciler();
        let scope_id = 0;
        r.apply(&event(
            "delegations",
            1,
            101,
            scope_id,
            3,
            LedgerEventKind::DelegationChanged { to: Some(voter(2)) },
        ))
        .unwrap();
        r.apply(&event(
            "delegations",
            2,
            102,
            scope_id,
            3,
            LedgerEventKind::DelegationChanged { to: None },
        ))
        .unwrap();

        assert!(r
            .store()
            .active_delegation(&voter(3), DelegationScope::Global)
            .unwrap()
            .is_none());
        assert_eq!(r.store().delegation_history(&voter(3)).unwrap().len(), 1);
    }

    #[test]
    fn effects_are_published_after_commit() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = ProjectionBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(Box::new(move |_, effect| {
            sink.lock().unwrap().push(effect.name());
        }));
        let r = reconciler().with_bus(bus);

        r.apply(&create(1)).unwrap();
        r.apply(&commit(1, 105, 2, 1, 7)).unwrap();
        r.apply(&commit(2, 105, 2, 1, 7)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["proposal_created", "vote_committed"]);
    }

    #[test]
    fn store_failure_is_fatal_and_persists_nothing() {
        let seen = Arc::new(Mutex::new(Vec::<GovernanceEffect>::new()));
        let mut bus = ProjectionBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(Box::new(move |_, effect| {
            sink.lock().unwrap().push(effect.clone());
        }));
        let r = reconciler().with_bus(bus);
        r.store().fail_commits_with(Some("disk full"));

        let result = r.apply(&create(1));
        assert!(matches!(result, Err(NodeError::Store(_))));
        assert_eq!(cursor(&r, "proposals"), None);
        assert!(r.store().get_proposal(ProposalId::new(1)).unwrap().is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn metrics_track_outcomes() {
        let metrics = Arc::new(ReconcilerMetrics::new().unwrap());
        let r = reconciler().with_metrics(Arc::clone(&metrics));

        r.apply(&create(1)).unwrap();
        r.apply(&create(1)).unwrap();
        r.apply(&create(2)).unwrap();

        assert_eq!(metrics.events_applied.get(), 1);
        assert_eq!(metrics.events_skipped.get(), 1);
        assert_eq!(
            metrics
                .events_rejected
                .with_label_values(&["duplicate_action"])
                .get(),
            1
        );
        assert_eq!(metrics.cursor.with_label_values(&["proposals"]).get(), 2);
    }

    #[test]
    fn deliberation_flow_through_events() {
        let r = reconciler();
        let min = r.params().min_discussion_secs;
        let submit = LedgerEvent {
            timestamp: Timestamp::new(1_000),
            ..event(
                "deliberations",
                1,
                50,
                9,
                4,
                LedgerEventKind::ProposalSubmitted {
                    title: "Treasury policy".into(),
                    content: "bafy-policy".into(),
                    discussion_secs: min,
                },
            )
        };
        assert!(matches!(r.apply(&submit).unwrap(), ApplyOutcome::Applied { .. }));

        let early = LedgerEvent {
            timestamp: Timestamp::new(1_000 + min - 1),
            ..event("deliberations", 2, 51, 9, 4, LedgerEventKind::AdvancedToVoting)
        };
        assert!(matches!(
            r.apply(&early).unwrap(),
            ApplyOutcome::Rejected {
                class: ErrorClass::PhaseViolation,
                ..
            }
        ));

        let on_time = LedgerEvent {
            timestamp: Timestamp::new(1_000 + min),
            ..event("deliberations", 3, 52, 9, 4, LedgerEventKind::AdvancedToVoting)
        };
        assert!(matches!(r.apply(&on_time).unwrap(), ApplyOutcome::Applied { .. }));
    }
}
