//! LMDB storage backend for the Agora governance service.
//!
//! Implements all storage traits from `agora-store` using the `heed` LMDB
//! bindings. Each logical table maps to one LMDB database within a single
//! environment; a [`agora_store::WriteBatch`] is applied inside one LMDB
//! write transaction.

pub mod ballot;
pub mod cursor;
pub mod delegation;
pub mod deliberation;
pub mod environment;
pub mod error;
pub mod integrity;
pub mod keys;
pub mod meta;
pub mod proposal;
pub mod write_batch;

pub use environment::{LmdbEnvironment, LmdbGovernanceStore};
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
