//! Deliberation (pre-ballot proposal lifecycle) storage trait.

use crate::StoreError;
use agora_types::{Amendment, Deliberation, ProposalId};

pub trait DeliberationStore {
    fn get_deliberation(&self, id: ProposalId) -> Result<Option<Deliberation>, StoreError>;

    /// Amendments of a deliberation, ordered by index.
    fn get_amendments(&self, id: ProposalId) -> Result<Vec<Amendment>, StoreError>;
}
