use std::collections::HashSet;
use std::time::Duration;

use crate::error::{RaftError, Result};
use crate::raft::NodeId;

/// Static configuration of one cluster member.
///
/// The member list is fixed for the lifetime of the node: `peers` holds every
/// other member, and the quorum is computed over `peers + self`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub peers: Vec<NodeId>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Upper bound on a single outbound RPC. A lost AppendEntries leaves its
    /// follower silent for up to this plus one heartbeat interval, so the sum
    /// must stay below the minimum election timeout.
    pub rpc_timeout_ms: u64,
    /// Largest batch of entries sent in one AppendEntries
    pub max_entries_per_append: usize,
    /// Leader steps down when a majority has been silent for a full election timeout
    pub check_quorum: bool,
    /// Seed for the election timer; random when unset
    pub election_seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            peers: Vec::new(),
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            rpc_timeout_ms: 50,
            max_entries_per_append: 64,
            check_quorum: true,
            election_seed: None,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, node_id: NodeId) -> Self {
        self.peers.push(node_id);
        self
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = NodeId>) -> Self {
        self.peers.extend(peers);
        self
    }

    /// Number of members, this node included.
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Votes or replicas needed for a decision: `⌊N/2⌋ + 1`.
    pub fn quorum(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.election_timeout_min_ms == 0 {
            return Err(RaftError::Config(
                "election timeout must be positive".to_string(),
            ));
        }
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err(RaftError::Config(format!(
                "election timeout min {}ms exceeds max {}ms",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }
        if self.heartbeat_interval_ms == 0
            || self.heartbeat_interval_ms >= self.election_timeout_min_ms
        {
            return Err(RaftError::Config(format!(
                "heartbeat interval {}ms must be positive and below the minimum \
                 election timeout {}ms",
                self.heartbeat_interval_ms, self.election_timeout_min_ms
            )));
        }
        if self.rpc_timeout_ms == 0
            || self.rpc_timeout_ms.saturating_add(self.heartbeat_interval_ms)
                >= self.election_timeout_min_ms
        {
            return Err(RaftError::Config(format!(
                "rpc timeout {}ms plus heartbeat interval {}ms must stay below the minimum \
                 election timeout {}ms",
                self.rpc_timeout_ms, self.heartbeat_interval_ms, self.election_timeout_min_ms
            )));
        }
        if self.max_entries_per_append == 0 {
            return Err(RaftError::Config(
                "max entries per append must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for &peer in &self.peers {
            if peer == self.node_id {
                return Err(RaftError::Config(format!(
                    "node {} lists itself as a peer",
                    self.node_id
                )));
            }
            if !seen.insert(peer) {
                return Err(RaftError::Config(format!("duplicate peer {}", peer)));
            }
        }
        Ok(())
    }
}
