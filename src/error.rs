use thiserror::Error;

use crate::raft::NodeId;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Not the leader, current leader is node {0:?}")]
    NotLeader(Option<NodeId>),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Node {0} has stopped")]
    Stopped(NodeId),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Proposal at index {0} was dropped before it committed")]
    ProposalDropped(u64),
}

/// Failures of the durable state store. Any of these is fatal to the node.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt storage: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Node {0} is unreachable")]
    Unreachable(NodeId),

    #[error("Request to node {0} timed out")]
    Timeout(NodeId),

    #[error("Message to node {0} was dropped")]
    Dropped(NodeId),
}

pub type Result<T> = std::result::Result<T, RaftError>;
