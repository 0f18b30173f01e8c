use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;

use super::Transport;
use crate::error::TransportError;
use crate::raft::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::raft::{NodeId, RaftNode};

/// In-process network connecting `RaftNode`s that live in the same process.
///
/// Links can be cut per direction to build partitions, and every message can
/// be dropped with a configurable probability or delayed by a random amount.
#[derive(Default)]
pub struct LocalNetwork {
    inner: RwLock<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    nodes: HashMap<NodeId, Weak<RaftNode>>,
    blocked: HashSet<(NodeId, NodeId)>,
    drop_probability: f64,
    max_delay: Duration,
}

impl NetworkInner {
    fn link_up(&self, from: NodeId, to: NodeId) -> bool {
        !self.blocked.contains(&(from, to))
    }
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport used by node `from` to reach the others.
    pub fn transport(self: &Arc<Self>, from: NodeId) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            from,
            network: Arc::clone(self),
        })
    }

    /// Make a node reachable. Replaces any earlier registration for its id.
    pub async fn register(&self, node: &Arc<RaftNode>) {
        self.inner
            .write()
            .await
            .nodes
            .insert(node.id, Arc::downgrade(node));
    }

    /// Remove a node (simulates a crashed process).
    pub async fn unregister(&self, node_id: NodeId) {
        self.inner.write().await.nodes.remove(&node_id);
    }

    /// Cut both directions of the link between `a` and `b`.
    pub async fn disconnect(&self, a: NodeId, b: NodeId) {
        let mut inner = self.inner.write().await;
        inner.blocked.insert((a, b));
        inner.blocked.insert((b, a));
    }

    /// Restore both directions of the link between `a` and `b`.
    pub async fn reconnect(&self, a: NodeId, b: NodeId) {
        let mut inner = self.inner.write().await;
        inner.blocked.remove(&(a, b));
        inner.blocked.remove(&(b, a));
    }

    /// No node in `group_a` can talk to any node in `group_b`.
    pub async fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]) {
        for &a in group_a {
            for &b in group_b {
                self.disconnect(a, b).await;
            }
        }
    }

    /// Cut `node_id` off from every other registered node.
    pub async fn isolate(&self, node_id: NodeId) {
        let others: Vec<NodeId> = self
            .inner
            .read()
            .await
            .nodes
            .keys()
            .copied()
            .filter(|&id| id != node_id)
            .collect();
        self.partition(&[node_id], &others).await;
    }

    /// Restore every link.
    pub async fn heal(&self) {
        self.inner.write().await.blocked.clear();
    }

    /// Drop each message with probability `p` (clamped to `[0, 1]`).
    pub async fn set_drop_probability(&self, p: f64) {
        self.inner.write().await.drop_probability = p.clamp(0.0, 1.0);
    }

    /// Delay each message by a random duration up to `max_delay`.
    pub async fn set_max_delay(&self, max_delay: Duration) {
        self.inner.write().await.max_delay = max_delay;
    }

    /// Route a request from `from` to `to`, applying link state, loss and delay.
    async fn deliver(&self, from: NodeId, to: NodeId) -> Result<Arc<RaftNode>, TransportError> {
        let (node, delay) = {
            let inner = self.inner.read().await;
            if !inner.link_up(from, to) {
                return Err(TransportError::Unreachable(to));
            }

            let mut rng = rand::thread_rng();
            if inner.drop_probability > 0.0 && rng.gen_bool(inner.drop_probability) {
                return Err(TransportError::Dropped(to));
            }
            let delay = if inner.max_delay.is_zero() {
                Duration::ZERO
            } else {
                let max_us = inner.max_delay.as_micros() as u64;
                Duration::from_micros(rng.gen_range(0..=max_us))
            };

            let node = inner
                .nodes
                .get(&to)
                .and_then(Weak::upgrade)
                .ok_or(TransportError::Unreachable(to))?;
            (node, delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(node)
    }

    /// The reply travels back over the reverse link, which may have been cut
    /// while the request was being handled.
    async fn deliver_reply(&self, from: NodeId, to: NodeId) -> Result<(), TransportError> {
        if self.inner.read().await.link_up(from, to) {
            Ok(())
        } else {
            Err(TransportError::Unreachable(from))
        }
    }
}

/// A node's handle onto a `LocalNetwork`.
pub struct LocalTransport {
    from: NodeId,
    network: Arc<LocalNetwork>,
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request_vote(
        &self,
        target: NodeId,
        args: RequestVoteArgs,
    ) -> Result<RequestVoteReply, TransportError> {
        let node = self.network.deliver(self.from, target).await?;
        let reply = node
            .handle_request_vote(args)
            .await
            .map_err(|_| TransportError::Unreachable(target))?;
        self.network.deliver_reply(target, self.from).await?;
        Ok(reply)
    }

    async fn append_entries(
        &self,
        target: NodeId,
        args: AppendEntriesArgs,
    ) -> Result<AppendEntriesReply, TransportError> {
        let node = self.network.deliver(self.from, target).await?;
        let reply = node
            .handle_append_entries(args)
            .await
            .map_err(|_| TransportError::Unreachable(target))?;
        self.network.deliver_reply(target, self.from).await?;
        Ok(reply)
    }
}
