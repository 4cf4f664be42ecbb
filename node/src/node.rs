//! Wires the LMDB projection, startup checks, reconciler service and query
//! API together.

use std::sync::Arc;

use agora_store::CursorStore;
use agora_store_lmdb::{check_data_dir, check_integrity, LmdbGovernanceStore};

use crate::config::NodeConfig;
use crate::integrity::verify_tallies;
use crate::ledger_event::ProjectionBus;
use crate::metrics::ReconcilerMetrics;
use crate::query::GovernanceQuery;
use crate::reconciler::Reconciler;
use crate::service::{EventSource, ReconcilerService};
use crate::shutdown::ShutdownController;
use crate::NodeError;

pub struct GovernanceNode {
    config: NodeConfig,
    store: Arc<LmdbGovernanceStore>,
    metrics: Option<Arc<ReconcilerMetrics>>,
}

impl GovernanceNode {
    /// Open the data directory and verify it before any event is applied.
    ///
    /// Fails on an unrecognised data directory, a missing database, or a
    /// cached tally that disagrees with its reveal records.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        check_data_dir(&config.data_dir).map_err(NodeError::Config)?;
        let store = LmdbGovernanceStore::open(&config.data_dir, config.max_dbs, config.map_size)?;

        let report = check_integrity(store.environment().env())?;
        if !report.is_healthy() {
            return Err(NodeError::Fatal(format!(
                "integrity check failed: {}",
                report.errors.join("; ")
            )));
        }
        tracing::info!(
            databases = report.databases_checked,
            entries = report.total_entries,
            path = %config.data_dir.display(),
            "store opened"
        );

        verify_tallies(&store)?.into_result()?;

        let metrics = if config.enable_metrics {
            let metrics = Arc::new(ReconcilerMetrics::new()?);
            for cursor in store.list_cursors()? {
                metrics.observe_cursor(&cursor);
            }
            Some(metrics)
        } else {
            None
        };

        Ok(Self {
            config,
            store: Arc::new(store),
            metrics,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LmdbGovernanceStore> {
        &self.store
    }

    pub fn metrics(&self) -> Option<&Arc<ReconcilerMetrics>> {
        self.metrics.as_ref()
    }

    pub fn query(&self) -> GovernanceQuery<LmdbGovernanceStore> {
        GovernanceQuery::new(Arc::clone(&self.store), self.config.governance.clone())
    }

    /// A reconciler service publishing applied effects on `bus`.
    pub fn service(&self, bus: ProjectionBus) -> ReconcilerService<LmdbGovernanceStore> {
        let mut reconciler =
            Reconciler::new(Arc::clone(&self.store), self.config.governance.clone()).with_bus(bus);
        if let Some(metrics) = &self.metrics {
            reconciler = reconciler.with_metrics(Arc::clone(metrics));
        }

        let mut service = ReconcilerService::new(reconciler, self.config.max_concurrent)
            .with_retry(self.config.retry.clone())
            .with_resubscribe(self.config.resubscribe.clone());
        if let Some(metrics) = &self.metrics {
            service = service.with_metrics(Arc::clone(metrics));
        }
        service
    }

    pub async fn run<E>(
        &self,
        source: &E,
        bus: ProjectionBus,
        shutdown: &ShutdownController,
    ) -> Result<(), NodeError>
    where
        E: EventSource + ?Sized,
    {
        self.service(bus).run(source, shutdown).await
    }
}
