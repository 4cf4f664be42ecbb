//! LMDB environment setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::meta;
use crate::LmdbError;

/// Names of every database the governance store creates.
pub const DATABASE_NAMES: &[&str] = &[
    "proposals",
    "options",
    "commitments",
    "reveals",
    "edges",
    "active_edges",
    "edges_to",
    "deliberations",
    "amendments",
    "cursors",
    "meta",
];

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    path: PathBuf,
    pub(crate) proposals_db: Database<Bytes, Bytes>,
    pub(crate) options_db: Database<Bytes, Bytes>,
    pub(crate) commitments_db: Database<Bytes, Bytes>,
    pub(crate) reveals_db: Database<Bytes, Bytes>,
    pub(crate) edges_db: Database<Bytes, Bytes>,
    pub(crate) active_edges_db: Database<Bytes, Bytes>,
    pub(crate) edges_to_db: Database<Bytes, Bytes>,
    pub(crate) deliberations_db: Database<Bytes, Bytes>,
    pub(crate) amendments_db: Database<Bytes, Bytes>,
    pub(crate) cursors_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    ///
    /// Creates the directory if needed, creates every database, and stamps
    /// the schema version on first open.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create {}: {}", path.display(), e)))?;

        // SAFETY: the environment is opened once per process for this path and
        // never concurrently with a different set of flags.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let mut create = |name: &str| env.create_database::<Bytes, Bytes>(&mut wtxn, Some(name));
        let proposals_db = create("proposals")?;
        let options_db = create("options")?;
        let commitments_db = create("commitments")?;
        let reveals_db = create("reveals")?;
        let edges_db = create("edges")?;
        let active_edges_db = create("active_edges")?;
        let edges_to_db = create("edges_to")?;
        let deliberations_db = create("deliberations")?;
        let amendments_db = create("amendments")?;
        let cursors_db = create("cursors")?;
        let meta_db = create("meta")?;
        meta::ensure_schema_version(&meta_db, &mut wtxn)?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, max_dbs, "LMDB environment opened");

        Ok(Self {
            env: Arc::new(env),
            path: path.to_path_buf(),
            proposals_db,
            options_db,
            commitments_db,
            reveals_db,
            edges_db,
            active_edges_db,
            edges_to_db,
            deliberations_db,
            amendments_db,
            cursors_db,
            meta_db,
        })
    }

    /// The underlying heed environment.
    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The LMDB-backed governance store.
///
/// Cheap to clone; clones share the same environment. Every read opens its
/// own read transaction, so queries never block the writer.
#[derive(Clone)]
pub struct LmdbGovernanceStore {
    pub(crate) inner: Arc<LmdbEnvironment>,
}

impl LmdbGovernanceStore {
    pub fn new(env: LmdbEnvironment) -> Self {
        Self {
            inner: Arc::new(env),
        }
    }

    /// Convenience: open the environment and wrap it.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        Ok(Self::new(LmdbEnvironment::open(path, max_dbs, map_size)?))
    }

    pub fn environment(&self) -> &LmdbEnvironment {
        &self.inner
    }
}
