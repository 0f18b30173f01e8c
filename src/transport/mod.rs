//! Point-to-point RPC delivery between cluster members.
//!
//! Implementations may drop, delay, duplicate or reorder messages but never
//! corrupt a delivered one. Callers bound every call with their own timeout.

mod local;

pub use local::{LocalNetwork, LocalTransport};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::raft::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::raft::NodeId;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request_vote(
        &self,
        target: NodeId,
        args: RequestVoteArgs,
    ) -> Result<RequestVoteReply, TransportError>;

    async fn append_entries(
        &self,
        target: NodeId,
        args: AppendEntriesArgs,
    ) -> Result<AppendEntriesReply, TransportError>;
}
