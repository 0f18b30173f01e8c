use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use raft_lite::raft::Command;
use raft_lite::shutdown::install_shutdown_handler;
use raft_lite::{
    FileStorage, LocalNetwork, MemoryStateMachine, MemoryStorage, Node, NodeConfig, NodeHandle,
    NodeId, RaftError, RaftStatus, Storage,
};

#[derive(Parser, Debug)]
#[command(name = "raft-lite")]
#[command(version)]
#[command(about = "A replicated-log consensus core with an in-process cluster runner")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run an in-process cluster, replicate commands through it and report
    Cluster(ClusterArgs),

    /// Print the persisted state of one node's data directory
    Inspect(InspectArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClusterArgs {
    /// Number of nodes in the cluster
    #[arg(long, default_value = "3")]
    nodes: u64,

    /// Directory for durable node state (one subdirectory per node).
    /// State is kept in memory when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Commands to replicate, comma-separated
    #[arg(long, value_delimiter = ',')]
    commands: Vec<String>,

    #[arg(long, default_value = "150")]
    election_timeout_min_ms: u64,

    #[arg(long, default_value = "300")]
    election_timeout_max_ms: u64,

    #[arg(long, default_value = "50")]
    heartbeat_interval_ms: u64,

    /// Keep the cluster running until SIGINT/SIGTERM
    #[arg(long)]
    hold: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// A node's data directory
    #[arg(long)]
    data_dir: PathBuf,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct NodeOutput {
    #[serde(flatten)]
    status: RaftStatus,
    applied: Vec<String>,
}

#[derive(Serialize)]
struct ClusterOutput {
    leader_id: Option<NodeId>,
    nodes: Vec<NodeOutput>,
}

#[derive(Serialize)]
struct EntryOutput {
    index: u64,
    term: u64,
    command: String,
}

#[derive(Serialize)]
struct InspectOutput {
    current_term: u64,
    voted_for: Option<NodeId>,
    entries: Vec<EntryOutput>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn describe(command: &Command) -> String {
    match command {
        Command::Client(data) => String::from_utf8_lossy(data).into_owned(),
        Command::Noop => "<noop>".to_string(),
    }
}

fn node_config(args: &ClusterArgs, node_id: NodeId, ids: &[NodeId]) -> NodeConfig {
    // Room left in the election timeout after one heartbeat
    let spare_ms = args
        .election_timeout_min_ms
        .saturating_sub(args.heartbeat_interval_ms);
    NodeConfig {
        node_id,
        peers: ids.iter().copied().filter(|&id| id != node_id).collect(),
        election_timeout_min_ms: args.election_timeout_min_ms,
        election_timeout_max_ms: args.election_timeout_max_ms,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        rpc_timeout_ms: (spare_ms / 2).max(1),
        ..Default::default()
    }
}

async fn find_leader(handles: &[NodeHandle], wait: Duration) -> Option<NodeId> {
    let start = tokio::time::Instant::now();
    while start.elapsed() < wait {
        for handle in handles {
            if handle.raft_node.is_leader().await {
                return Some(handle.id());
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    None
}

/// Submit through the leader, following redirects to a new one.
async fn submit(handles: &[NodeHandle], command: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut target = find_leader(handles, Duration::from_secs(5)).await;

    for _ in 0..10 {
        let Some(node) = target.and_then(|id| handles.iter().find(|h| h.id() == id)) else {
            target = find_leader(handles, Duration::from_secs(5)).await;
            continue;
        };

        match node
            .raft_node
            .propose_and_wait(command.as_bytes().to_vec(), Duration::from_secs(2))
            .await
        {
            Ok(_) => {
                tracing::info!(command, node_id = node.id(), "Command applied");
                return Ok(());
            }
            Err(RaftError::NotLeader(hint)) => {
                tracing::info!(command, leader_hint = ?hint, "Redirected to leader");
                target = match hint {
                    Some(id) => Some(id),
                    None => find_leader(handles, Duration::from_secs(5)).await,
                };
            }
            Err(RaftError::ProposalDropped(_)) | Err(RaftError::Timeout(_)) => {
                target = find_leader(handles, Duration::from_secs(5)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(format!("command {:?} was not applied", command).into())
}

/// Wait until every node has applied the leader's commit index.
async fn wait_for_convergence(handles: &[NodeHandle], wait: Duration) {
    let start = tokio::time::Instant::now();
    while start.elapsed() < wait {
        let mut commit = 0;
        for handle in handles {
            commit = commit.max(handle.raft_node.status().await.commit_index);
        }
        let mut converged = true;
        for handle in handles {
            if handle.raft_node.status().await.last_applied < commit {
                converged = false;
            }
        }
        if converged {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn print_cluster(output: &ClusterOutput) {
    println!(
        "{:<6} {:<10} {:<6} {:<8} {:<8} {:<8} {:<8}",
        "NODE", "ROLE", "TERM", "LEADER", "COMMIT", "APPLIED", "LOG"
    );
    for node in &output.nodes {
        let s = &node.status;
        println!(
            "{:<6} {:<10} {:<6} {:<8} {:<8} {:<8} {:<8}",
            s.node_id,
            s.role.to_string(),
            s.current_term,
            s.leader_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            s.commit_index,
            s.last_applied,
            s.last_log_index
        );
    }
    println!();
    for node in &output.nodes {
        println!("node {} applied: [{}]", node.status.node_id, node.applied.join(", "));
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run_cluster(args: ClusterArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.nodes == 0 {
        return Err("a cluster needs at least one node".into());
    }

    let shutdown = if args.hold {
        install_shutdown_handler()?
    } else {
        CancellationToken::new()
    };

    let network = LocalNetwork::new();
    let ids: Vec<NodeId> = (1..=args.nodes).collect();
    let mut handles = Vec::new();
    let mut machines = Vec::new();

    for &node_id in &ids {
        let storage: Box<dyn Storage> = match &args.data_dir {
            Some(dir) => Box::new(FileStorage::open(dir.join(format!("node-{}", node_id)))?),
            None => Box::new(MemoryStorage::new()),
        };
        let state_machine = MemoryStateMachine::new();

        let node = Node::new(
            node_config(&args, node_id, &ids),
            storage,
            network.transport(node_id),
            Box::new(state_machine.clone()),
        )?;
        network.register(&node.raft_node).await;
        handles.push(node.spawn(shutdown.child_token()));
        machines.push(state_machine);
    }

    let leader = find_leader(&handles, Duration::from_secs(5))
        .await
        .ok_or("no leader elected")?;
    tracing::info!(leader_id = leader, "Cluster has a leader");

    for command in &args.commands {
        submit(&handles, command).await?;
    }
    wait_for_convergence(&handles, Duration::from_secs(2)).await;

    let mut nodes = Vec::new();
    for (handle, machine) in handles.iter().zip(&machines) {
        nodes.push(NodeOutput {
            status: handle.raft_node.status().await,
            applied: machine
                .commands()
                .iter()
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect(),
        });
    }
    let output = ClusterOutput {
        leader_id: find_leader(&handles, Duration::from_millis(500)).await,
        nodes,
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => print_cluster(&output),
    }

    if args.hold {
        shutdown.cancelled().await;
    }
    for handle in handles {
        handle.shutdown().await;
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut storage = FileStorage::open(&args.data_dir)?;
    let state = storage.load_state()?;

    let output = InspectOutput {
        current_term: state.current_term,
        voted_for: state.voted_for,
        entries: state
            .log
            .iter()
            .map(|e| EntryOutput {
                index: e.index,
                term: e.term,
                command: describe(&e.command),
            })
            .collect(),
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => {
            println!("term: {}", output.current_term);
            println!(
                "voted for: {}",
                output
                    .voted_for
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("{:<8} {:<6} COMMAND", "INDEX", "TERM");
            for entry in &output.entries {
                println!("{:<8} {:<6} {}", entry.index, entry.term, entry.command);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Cluster(args) => run_cluster(args).await,
        Commands::Inspect(args) => run_inspect(args),
    }
}
