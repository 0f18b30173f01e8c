//! Durable state store consumed by the consensus core.
//!
//! Every method must have made its effect durable before it returns: the node
//! answers RPCs only after the corresponding write completed.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::raft::{LogEntry, NodeId};

/// Everything a node must recover after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub log: Vec<LogEntry>,
}

pub trait Storage: Send + Sync {
    /// Load term, vote and log as last persisted.
    fn load_state(&mut self) -> Result<PersistentState, StorageError>;

    /// Persist the current term and the vote cast in it.
    fn persist_state(&mut self, term: u64, voted_for: Option<NodeId>) -> Result<(), StorageError>;

    /// Append entries directly after the last stored index.
    fn append_log(&mut self, entries: &[LogEntry]) -> Result<(), StorageError>;

    /// Remove the entry at `index` and every entry after it.
    fn truncate_log_from(&mut self, index: u64) -> Result<(), StorageError>;
}

/// Reject appends that would leave a gap or rewrite an index.
pub(crate) fn check_contiguous(last_index: u64, entries: &[LogEntry]) -> Result<(), StorageError> {
    for (offset, entry) in entries.iter().enumerate() {
        let expected = last_index + 1 + offset as u64;
        if entry.index != expected {
            return Err(StorageError::Corrupt(format!(
                "append of index {} but next index is {}",
                entry.index, expected
            )));
        }
    }
    Ok(())
}
