//! Application state machine fed by the apply loop.

use std::sync::{Arc, Mutex, MutexGuard};

/// Consumer of committed commands.
///
/// `apply` is invoked strictly in log order. After a restart the apply loop
/// starts over from the beginning of the log, so implementations either
/// tolerate re-delivery or report what they already hold via `applied_index`.
pub trait StateMachine: Send + 'static {
    /// Apply the command committed at `index` and return its result.
    fn apply(&mut self, index: u64, command: &[u8]) -> Vec<u8>;

    /// Highest index already reflected in this state machine; entries at or
    /// below it are skipped.
    fn applied_index(&self) -> u64 {
        0
    }
}

/// State machine that records every applied command.
///
/// Clones share the record, so tests keep one clone to inspect while the node
/// owns the other. Re-delivered indexes are ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateMachine {
    inner: Arc<Mutex<Applied>>,
}

#[derive(Debug, Default)]
struct Applied {
    entries: Vec<(u64, Vec<u8>)>,
    last_index: u64,
}

impl MemoryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(index, command)` applied so far, in order.
    pub fn applied(&self) -> Vec<(u64, Vec<u8>)> {
        self.lock().entries.clone()
    }

    /// Only the commands, in order.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.lock()
            .entries
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Applied> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateMachine for MemoryStateMachine {
    fn apply(&mut self, index: u64, command: &[u8]) -> Vec<u8> {
        let mut applied = self.lock();
        if index > applied.last_index {
            applied.entries.push((index, command.to_vec()));
            applied.last_index = index;
        }
        command.to_vec()
    }

    fn applied_index(&self) -> u64 {
        self.lock().last_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_and_ignores_redelivery() {
        let mut sm = MemoryStateMachine::new();
        let observer = sm.clone();

        assert_eq!(sm.apply(1, b"A"), b"A".to_vec());
        sm.apply(2, b"B");
        sm.apply(2, b"B");
        sm.apply(1, b"A");

        assert_eq!(observer.applied_index(), 2);
        assert_eq!(observer.commands(), vec![b"A".to_vec(), b"B".to_vec()]);
    }
}
