pub mod config;
pub mod error;
pub mod node;
pub mod raft;
pub mod shutdown;
pub mod state_machine;
pub mod storage;
pub mod transport;

pub use config::NodeConfig;
pub use error::{RaftError, Result};
pub use node::{Node, NodeHandle};
pub use raft::{Command, LogEntry, NodeId, RaftNode, RaftRole, RaftStatus};
pub use state_machine::{MemoryStateMachine, StateMachine};
pub use storage::{FileStorage, MemoryStorage, PersistentState, Storage};
pub use transport::{LocalNetwork, Transport};
