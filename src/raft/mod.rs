pub mod node;
pub mod rpc;
pub mod state;
pub mod timer;

pub use node::{RaftMessage, RaftNode, RaftStatus};
pub use state::{Command, LogEntry, NodeId, PeerProgress, RaftRole, RaftState};
pub use timer::ElectionTimer;
