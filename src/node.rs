use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::raft::{RaftMessage, RaftNode};
use crate::state_machine::StateMachine;
use crate::storage::Storage;
use crate::transport::Transport;

/// Main node that wires the consensus core to its collaborators.
pub struct Node {
    pub config: NodeConfig,
    pub raft_node: Arc<RaftNode>,
    raft_rx: mpsc::Receiver<RaftMessage>,
    state_machine: Box<dyn StateMachine>,
}

impl Node {
    /// Build a node, recovering its persistent state from `storage`.
    pub fn new(
        config: NodeConfig,
        storage: Box<dyn Storage>,
        transport: Arc<dyn Transport>,
        state_machine: Box<dyn StateMachine>,
    ) -> Result<Self> {
        let (raft_node, raft_rx) = RaftNode::new(config.clone(), storage, transport)?;
        Ok(Self {
            config,
            raft_node: Arc::new(raft_node),
            raft_rx,
            state_machine,
        })
    }

    /// Spawn the node's subsystems:
    /// 1. The Raft event loop (elections, heartbeats, replication)
    /// 2. The apply loop (delivers committed entries to the state machine)
    ///
    /// Both stop when `shutdown` is cancelled or the returned handle is dropped.
    pub fn spawn(self, shutdown: CancellationToken) -> NodeHandle {
        let node_id = self.config.node_id;

        let raft_node = self.raft_node.clone();
        let raft_shutdown = shutdown.clone();
        let raft_rx = self.raft_rx;
        let raft_task = tokio::spawn(async move {
            raft_node.run(raft_rx, raft_shutdown).await;
        });

        let apply_node = self.raft_node.clone();
        let apply_shutdown = shutdown.clone();
        let state_machine = self.state_machine;
        let apply_task = tokio::spawn(async move {
            apply_node.run_apply_loop(state_machine, apply_shutdown).await;
        });

        tracing::info!(node_id, peers = ?self.config.peers, "Node started");

        NodeHandle {
            raft_node: self.raft_node,
            shutdown,
            tasks: vec![raft_task, apply_task],
        }
    }
}

/// Handle to a running node. Dropping it aborts the node's tasks, which is
/// how tests simulate a crash.
pub struct NodeHandle {
    pub raft_node: Arc<RaftNode>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn id(&self) -> crate::raft::NodeId {
        self.raft_node.id
    }

    /// Ask both loops to stop and wait for them.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
