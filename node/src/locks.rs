use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};

use agora_types::ProposalId;

use crate::ledger_event::{LedgerEvent, LedgerEventKind};
use crate::NodeError;

/// What an event application must hold exclusively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockKey {
    Ballot(ProposalId),
    Deliberation(ProposalId),
    /// The delegation graph is shared by every scope; cycle checks read it
    /// across scopes. Held exclusively against every ballot key, since a
    /// change may move power into reveals on any proposal.
    Delegations,
}

impl LockKey {
    pub fn for_event(event: &LedgerEvent) -> Self {
        match event.kind {
            LedgerEventKind::ProposalCreated { .. }
            | LedgerEventKind::VoteCommitted { .. }
            | LedgerEventKind::VoteRevealed { .. }
            | LedgerEventKind::ProposalTallied
            | LedgerEventKind::ProposalCancelled => Self::Ballot(event.proposal_id),
            LedgerEventKind::DelegationChanged { .. } => Self::Delegations,
            LedgerEventKind::ProposalSubmitted { .. }
            | LedgerEventKind::AmendmentAdded { .. }
            | LedgerEventKind::AdvancedToVoting
            | LedgerEventKind::DeliberationClosed => Self::Deliberation(event.proposal_id),
        }
    }
}

/// Per-proposal lock table for parallel event application.
/// Events on different proposals can be applied concurrently.
/// Events on the same proposal are serialized.
///
/// An entry lives only while some run holds or waits for its key, so the
/// table stays as small as the set of keys in flight.
pub struct ProposalLocks {
    locks: Arc<Mutex<HashMap<LockKey, Arc<Mutex<()>>>>>,
    /// Read by ballot runs, written by delegation runs.
    graph: RwLock<()>,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl ProposalLocks {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            graph: RwLock::new(()),
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    async fn lock_for(&self, key: LockKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run blocking `f` while holding `key` exclusively.
    pub async fn run<F, R>(&self, key: LockKey, f: F) -> Result<R, NodeError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| NodeError::Fatal(format!("apply semaphore closed: {e}")))?;
        let (_shared, _exclusive) = match key {
            LockKey::Ballot(_) => (Some(self.graph.read().await), None),
            LockKey::Delegations => (None, Some(self.graph.write().await)),
            LockKey::Deliberation(_) => (None, None),
        };
        let lock = self.lock_for(key).await;
        let joined = {
            let _guard = lock.lock().await;
            tokio::task::spawn_blocking(f).await
        };
        drop(lock);
        self.release(key).await;

        joined.map_err(|e| NodeError::Fatal(format!("apply task failed: {e}")))
    }

    /// Remove the entry for `key` if the table holds the only reference.
    /// References are only cloned under the table lock, so no run can be
    /// waiting on an entry removed here.
    async fn release(&self, key: LockKey) {
        let mut locks = self.locks.lock().await;
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of keys with a lock entry.
    pub async fn active_keys(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Drop lock entries nobody is holding. Runs release their own entry;
    /// this catches the ones left by runs that were cancelled mid-way.
    pub async fn cleanup(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    fn ballot(n: u64) -> LockKey {
        LockKey::Ballot(ProposalId::new(n))
    }

    #[tokio::test]
    async fn basic_run_returns_value() {
        let locks = ProposalLocks::new(4);
        let result = locks.run(ballot(1), || 42).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn different_proposals_run_in_parallel() {
        let locks = Arc::new(ProposalLocks::new(4));

        let start = Instant::now();
        let mut handles = Vec::new();

        for i in 0..4u64 {
            let l = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                l.run(ballot(i + 1), move || {
                    std::thread::sleep(Duration::from_millis(50));
                    i
                })
                .await
                .unwrap()
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(200),
            "Expected parallel execution, took {elapsed:?}"
        );
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn same_proposal_is_serialized() {
        let locks = Arc::new(ProposalLocks::new(4));
        let inside = Arc::new(AtomicU64::new(0));
        let max_seen = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let l = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                l.run(ballot(7), move || {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delegation_changes_exclude_ballot_runs() {
        use std::sync::atomic::AtomicBool;

        let locks = Arc::new(ProposalLocks::new(8));
        let delegating = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();

        let delegation = {
            let l = Arc::clone(&locks);
            let flag = Arc::clone(&delegating);
            tokio::spawn(async move {
                l.run(LockKey::Delegations, move || {
                    flag.store(true, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(50));
                    flag.store(false, Ordering::SeqCst);
                })
                .await
                .unwrap()
            })
        };
        tokio::task::spawn_blocking(move || started_rx.recv().unwrap())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 1..=3u64 {
            let l = Arc::clone(&locks);
            let flag = Arc::clone(&delegating);
            let seen = Arc::clone(&overlapped);
            handles.push(tokio::spawn(async move {
                l.run(ballot(n), move || {
                    if flag.load(Ordering::SeqCst) {
                        seen.store(true, Ordering::SeqCst);
                    }
                })
                .await
                .unwrap()
            }));
        }
        // Deliberations do not touch the graph and may run alongside.
        let deliberation = locks
            .run(LockKey::Deliberation(ProposalId::new(9)), {
                let flag = Arc::clone(&delegating);
                move || flag.load(Ordering::SeqCst)
            })
            .await
            .unwrap();
        assert!(deliberation);

        delegation.await.unwrap();
        for h in handles {
            h.await.unwrap();
        }
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn semaphore_limits_concurrency() {
        let locks = Arc::new(ProposalLocks::new(2));
        let concurrent = Arc::new(AtomicU64::new(0));
        let max_seen = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for i in 0..6u64 {
            let l = Arc::clone(&locks);
            let conc = Arc::clone(&concurrent);
            let ms = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                l.run(ballot(i + 1), move || {
                    let current = conc.fetch_add(1, Ordering::SeqCst) + 1;
                    ms.fetch_max(current, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    conc.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let observed_max = max_seen.load(Ordering::SeqCst);
        assert!(observed_max <= 2, "Expected max concurrency 2, observed {observed_max}");
    }

    #[tokio::test]
    async fn finished_runs_leave_no_entries() {
        let locks = ProposalLocks::new(4);
        for n in 1..=100 {
            locks.run(ballot(n), || ()).await.unwrap();
        }
        locks.run(LockKey::Delegations, || ()).await.unwrap();
        assert_eq!(locks.active_keys().await, 0);
    }

    #[tokio::test]
    async fn entry_survives_while_a_run_waits_on_it() {
        let locks = Arc::new(ProposalLocks::new(4));
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let l = Arc::clone(&locks);
            tokio::spawn(async move {
                l.run(ballot(3), move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .await
                .unwrap()
            })
        };
        tokio::task::spawn_blocking(move || started_rx.recv().unwrap())
            .await
            .unwrap();
        assert_eq!(locks.active_keys().await, 1);

        let waiter = {
            let l = Arc::clone(&locks);
            tokio::spawn(async move { l.run(ballot(3), || 7).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(locks.active_keys().await, 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(waiter.await.unwrap(), 7);
        assert_eq!(locks.active_keys().await, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_idle_locks() {
        let locks = ProposalLocks::new(4);
        // An entry left behind by a run that never finished.
        drop(locks.lock_for(ballot(1)).await);
        assert_eq!(locks.active_keys().await, 1);

        locks.cleanup().await;
        assert_eq!(locks.active_keys().await, 0);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        assert_eq!(ProposalLocks::new(0).max_concurrent(), 1);
    }
}
