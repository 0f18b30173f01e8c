use std::sync::{Arc, Mutex, MutexGuard};

use super::{check_contiguous, PersistentState, Storage};
use crate::error::StorageError;
use crate::raft::{LogEntry, NodeId};

/// In-memory storage.
///
/// Clones share the same underlying state, so a test can hand one clone to a
/// node, drop the node to simulate a crash, and restart a new node from
/// another clone with everything that was "persisted" intact.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: PersistentState,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of what is currently persisted.
    pub fn snapshot(&self) -> PersistentState {
        self.lock().state.clone()
    }

    /// Make every subsequent write fail, simulating an unhealthy disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        let inner = self.lock();
        if inner.fail_writes {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(inner)
    }
}

impl Storage for MemoryStorage {
    fn load_state(&mut self) -> Result<PersistentState, StorageError> {
        Ok(self.snapshot())
    }

    fn persist_state(&mut self, term: u64, voted_for: Option<NodeId>) -> Result<(), StorageError> {
        let mut inner = self.writable()?;
        inner.state.current_term = term;
        inner.state.voted_for = voted_for;
        Ok(())
    }

    fn append_log(&mut self, entries: &[LogEntry]) -> Result<(), StorageError> {
        let mut inner = self.writable()?;
        let last_index = inner.state.log.last().map(|e| e.index).unwrap_or(0);
        check_contiguous(last_index, entries)?;
        inner.state.log.extend_from_slice(entries);
        Ok(())
    }

    fn truncate_log_from(&mut self, index: u64) -> Result<(), StorageError> {
        let mut inner = self.writable()?;
        inner.state.log.retain(|e| e.index < index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::Command;

    fn entry(term: u64, index: u64) -> LogEntry {
        LogEntry {
            term,
            index,
            command: Command::Client(vec![index as u8]),
        }
    }

    #[test]
    fn clones_share_persisted_state() {
        let storage = MemoryStorage::new();
        let mut writer = storage.clone();
        writer.persist_state(3, Some(2)).unwrap();
        writer.append_log(&[entry(1, 1), entry(3, 2)]).unwrap();

        let mut reader = storage.clone();
        let loaded = reader.load_state().unwrap();
        assert_eq!(loaded.current_term, 3);
        assert_eq!(loaded.voted_for, Some(2));
        assert_eq!(loaded.log.len(), 2);
    }

    #[test]
    fn truncate_removes_suffix() {
        let mut storage = MemoryStorage::new();
        storage
            .append_log(&[entry(1, 1), entry(1, 2), entry(1, 3)])
            .unwrap();
        storage.truncate_log_from(2).unwrap();
        assert_eq!(storage.snapshot().log, vec![entry(1, 1)]);

        storage.append_log(&[entry(2, 2)]).unwrap();
        assert_eq!(storage.snapshot().log.last().unwrap().term, 2);
    }

    #[test]
    fn rejects_non_contiguous_append() {
        let mut storage = MemoryStorage::new();
        storage.append_log(&[entry(1, 1)]).unwrap();
        assert!(matches!(
            storage.append_log(&[entry(1, 3)]),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn failed_writes_leave_state_untouched() {
        let mut storage = MemoryStorage::new();
        storage.persist_state(1, None).unwrap();
        storage.set_fail_writes(true);

        assert!(storage.persist_state(2, Some(1)).is_err());
        assert!(storage.append_log(&[entry(1, 1)]).is_err());
        assert_eq!(storage.snapshot().current_term, 1);

        storage.set_fail_writes(false);
        storage.persist_state(2, Some(1)).unwrap();
        assert_eq!(storage.snapshot().current_term, 2);
    }
}
