use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::StorageError;
use crate::storage::PersistentState;

/// Identity of a cluster member
pub type NodeId = u64;

/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// Payload of a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Opaque client command, delivered to the state machine once committed
    Client(Vec<u8>),
    /// No-op command (appended by a new leader so earlier terms can commit)
    Noop,
}

/// A single entry in the Raft log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub command: Command,
}

/// Leader-side replication progress for one peer.
#[derive(Debug, Clone)]
pub struct PeerProgress {
    /// Index of the next entry to send
    pub next_index: u64,
    /// Highest index known to be replicated on the peer
    pub match_index: u64,
    /// An AppendEntries to this peer is awaiting its reply
    pub in_flight: bool,
    /// Last time the peer answered in the leader's term
    pub last_ack: Instant,
}

/// Per-node Raft state.
///
/// # Raft Safety Invariants
///
/// ## Election Safety
/// At most one leader can be elected in a given term. Enforced by:
/// - Each node votes for at most one candidate per term (`voted_for`), and the
///   vote is persisted before the reply leaves the node
/// - A candidate must collect votes from a strict majority of the cluster
///
/// ## Leader Append-Only
/// A leader never overwrites or deletes entries in its log. Enforced by:
/// - Leaders only append via `new_entry()` + `append_entries()`
/// - Truncation only happens in the AppendEntries receiver on a term conflict
///
/// ## Log Matching
/// If two logs contain an entry with the same index and term, then the logs
/// are identical in all entries up through that index. Enforced by:
/// - The `(prev_log_index, prev_log_term)` consistency check
/// - Conflicting suffixes are truncated before new entries are appended
///
/// ## Leader Completeness
/// A committed entry is present in the log of every later leader. Enforced by:
/// - Vote restriction: candidates must have up-to-date logs (`is_log_up_to_date`)
/// - Leaders only advance `commit_index` onto entries from their current term
///
/// ## State Machine Safety
/// No two nodes apply different commands at the same index. Enforced by:
/// - Entries are only applied after being committed (`last_applied <= commit_index`)
/// - Committed entries are never overwritten (Leader Completeness)
#[derive(Debug)]
pub struct RaftState {
    // Persistent state
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub log: Vec<LogEntry>,

    // Volatile state on all servers
    pub commit_index: u64,
    pub last_applied: u64,

    // Volatile state on leaders (discarded on every role change)
    pub progress: HashMap<NodeId, PeerProgress>,

    pub role: RaftRole,

    // Known leader (if any)
    pub leader_id: Option<NodeId>,

    // Votes received in the current election (for candidates)
    pub votes_received: HashSet<NodeId>,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            commit_index: 0,
            last_applied: 0,
            progress: HashMap::new(),
            role: RaftRole::Follower,
            leader_id: None,
            votes_received: HashSet::new(),
        }
    }

    /// Rebuild state from what the store recovered after a restart.
    pub fn from_persisted(persisted: PersistentState) -> Result<Self, StorageError> {
        let mut prev_term = 0;
        for (pos, entry) in persisted.log.iter().enumerate() {
            let expected = pos as u64 + 1;
            if entry.index != expected {
                return Err(StorageError::Corrupt(format!(
                    "log entry at position {} has index {}, expected {}",
                    pos, entry.index, expected
                )));
            }
            if entry.term < prev_term || entry.term > persisted.current_term {
                return Err(StorageError::Corrupt(format!(
                    "log entry {} has term {} out of order (previous {}, current {})",
                    entry.index, entry.term, prev_term, persisted.current_term
                )));
            }
            prev_term = entry.term;
        }

        Ok(Self {
            current_term: persisted.current_term,
            voted_for: persisted.voted_for,
            log: persisted.log,
            ..Self::new()
        })
    }

    /// Get the last log index
    pub fn last_log_index(&self) -> u64 {
        self.log.last().map(|e| e.index).unwrap_or(0)
    }

    /// Get the last log term
    pub fn last_log_term(&self) -> u64 {
        self.log.last().map(|e| e.term).unwrap_or(0)
    }

    /// Term of the entry at `index`; index 0 is the empty prefix with term 0.
    pub fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.get_entry(index).map(|e| e.term)
    }

    /// Get log entry at index (1-indexed)
    pub fn get_entry(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.log.get((index - 1) as usize)
    }

    /// Get up to `max` entries starting from index (inclusive)
    pub fn entries_from(&self, start_index: u64, max: usize) -> Vec<LogEntry> {
        let start = start_index.max(1);
        let start = (start - 1) as usize;
        if start >= self.log.len() {
            return Vec::new();
        }
        let end = self.log.len().min(start.saturating_add(max));
        self.log[start..end].to_vec()
    }

    /// Build the entry that would be appended next in the current term.
    pub fn new_entry(&self, command: Command) -> LogEntry {
        LogEntry {
            term: self.current_term,
            index: self.last_log_index() + 1,
            command,
        }
    }

    /// Append entries that directly follow the current last index.
    pub fn append_entries(&mut self, entries: Vec<LogEntry>) {
        debug_assert!(entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.index == self.last_log_index() + 1 + i as u64));
        self.log.extend(entries);
    }

    /// Remove the entry at `index` and everything after it.
    pub fn truncate_from(&mut self, index: u64) {
        let keep = index.saturating_sub(1) as usize;
        if keep < self.log.len() {
            self.log.truncate(keep);
        }
    }

    /// Check if candidate's log is at least as up-to-date as ours
    pub fn is_log_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let our_last_term = self.last_log_term();
        let our_last_index = self.last_log_index();

        last_log_term > our_last_term
            || (last_log_term == our_last_term && last_log_index >= our_last_index)
    }

    /// First index of the run of `term` that ends at `index`.
    pub fn first_index_of_term(&self, term: u64, index: u64) -> u64 {
        let mut first = index;
        while first > 1 && self.term_at(first - 1) == Some(term) {
            first -= 1;
        }
        first
    }

    /// Last index in our log holding an entry of `term`.
    pub fn last_index_of_term(&self, term: u64) -> Option<u64> {
        self.log
            .iter()
            .rev()
            .find(|e| e.term == term)
            .map(|e| e.index)
    }

    /// Transition to follower state.
    ///
    /// The vote is only cleared when `term` moves forward; stepping down within
    /// the same term keeps it so a node can never vote twice in one term.
    pub fn become_follower(&mut self, term: u64, leader_id: Option<NodeId>) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
        }
        self.role = RaftRole::Follower;
        self.leader_id = leader_id;
        self.votes_received.clear();
        self.progress.clear();
    }

    /// Transition to candidate state
    pub fn become_candidate(&mut self, my_id: NodeId) {
        self.role = RaftRole::Candidate;
        self.current_term += 1;
        self.voted_for = Some(my_id);
        self.votes_received.clear();
        self.votes_received.insert(my_id);
        self.leader_id = None;
        self.progress.clear();
    }

    /// Transition to leader state
    pub fn become_leader(&mut self, my_id: NodeId, peer_ids: &[NodeId], now: Instant) {
        self.role = RaftRole::Leader;
        self.leader_id = Some(my_id);
        self.votes_received.clear();

        let last_log_index = self.last_log_index();
        self.progress.clear();
        for &peer_id in peer_ids {
            self.progress.insert(
                peer_id,
                PeerProgress {
                    next_index: last_log_index + 1,
                    match_index: 0,
                    in_flight: false,
                    last_ack: now,
                },
            );
        }
    }

    /// Count a granted vote; returns the number of distinct votes held.
    pub fn record_vote(&mut self, voter: NodeId) -> usize {
        self.votes_received.insert(voter);
        self.votes_received.len()
    }

    /// Highest index stored on at least `quorum` nodes, the leader included.
    pub fn quorum_match_index(&self, quorum: usize) -> u64 {
        let mut matched: Vec<u64> = self.progress.values().map(|p| p.match_index).collect();
        matched.push(self.last_log_index());
        matched.sort_unstable_by(|a, b| b.cmp(a));
        matched
            .get(quorum.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }

    /// Leader-side commit advancement. Only entries of the current term are
    /// committed by counting replicas; earlier ones commit with them.
    pub fn advance_commit_index(&mut self, quorum: usize) -> bool {
        if self.role != RaftRole::Leader {
            return false;
        }
        let candidate = self.quorum_match_index(quorum);
        if candidate > self.commit_index && self.term_at(candidate) == Some(self.current_term) {
            self.commit_index = candidate;
            return true;
        }
        false
    }

    /// Follower-side commit advancement from a leader's `leader_commit`.
    pub fn follow_leader_commit(&mut self, leader_commit: u64, last_new_index: u64) -> bool {
        let target = leader_commit.min(last_new_index);
        if target > self.commit_index {
            self.commit_index = target;
            return true;
        }
        false
    }

    /// Whether the leader heard from enough peers within `window`.
    pub fn has_quorum_contact(&self, now: Instant, window: Duration, quorum: usize) -> bool {
        let recent = self
            .progress
            .values()
            .filter(|p| now.saturating_duration_since(p.last_ack) <= window)
            .count();
        recent + 1 >= quorum
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}
