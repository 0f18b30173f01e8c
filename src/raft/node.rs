use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{sleep_until, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{RaftError, Result, StorageError, TransportError};
use crate::raft::rpc::{
    self, AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply,
};
use crate::raft::state::{Command, LogEntry, NodeId, PeerProgress, RaftRole, RaftState};
use crate::raft::timer::ElectionTimer;
use crate::state_machine::StateMachine;
use crate::storage::Storage;
use crate::transport::Transport;

/// Message types for the Raft node event loop
#[derive(Debug)]
pub enum RaftMessage {
    /// Request to append a client command to the log (leader only)
    Propose {
        command: Vec<u8>,
        response_tx: oneshot::Sender<Result<u64>>,
        applied_tx: Option<oneshot::Sender<Result<Vec<u8>>>>,
    },
    /// Outcome of a RequestVote sent in `term`
    VoteResult {
        peer_id: NodeId,
        term: u64,
        result: std::result::Result<RequestVoteReply, TransportError>,
    },
    /// Outcome of an AppendEntries sent in `term`
    AppendResult {
        peer_id: NodeId,
        term: u64,
        prev_log_index: u64,
        entries_len: u64,
        result: std::result::Result<AppendEntriesReply, TransportError>,
    },
    /// Start an election now instead of waiting for the timer
    TriggerElection,
}

/// A proposal whose caller waits for the state machine's result.
struct PendingProposal {
    term: u64,
    applied_tx: oneshot::Sender<Result<Vec<u8>>>,
}

/// Everything mutated by the protocol, guarded by a single lock.
struct Core {
    state: RaftState,
    storage: Box<dyn Storage>,
    timer: ElectionTimer,
    election_deadline: Instant,
    pending: BTreeMap<u64, PendingProposal>,
    stopped: bool,
}

impl Core {
    fn reset_election_timer(&mut self) {
        self.election_deadline = Instant::now() + self.timer.next_timeout();
    }

    fn fail_pending(&mut self, make_err: impl Fn() -> RaftError) {
        for (_, pending) in std::mem::take(&mut self.pending) {
            let _ = pending.applied_tx.send(Err(make_err()));
        }
    }
}

/// Point-in-time view of a node.
#[derive(Debug, Clone, Serialize)]
pub struct RaftStatus {
    pub node_id: NodeId,
    pub role: RaftRole,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub commit_index: u64,
    pub last_applied: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
    pub stopped: bool,
}

/// The main Raft node that coordinates consensus.
///
/// All protocol state lives behind one lock; inbound RPCs, the event loop and
/// the apply loop each take it for the duration of a single decision. Outbound
/// RPCs run in spawned tasks and report back through the message channel, so
/// a slow peer never holds up the rest of the cluster.
pub struct RaftNode {
    pub id: NodeId,
    config: NodeConfig,
    quorum: usize,
    core: RwLock<Core>,
    transport: Arc<dyn Transport>,
    message_tx: mpsc::Sender<RaftMessage>,
    commit_tx: watch::Sender<u64>,
    applied_tx: watch::Sender<u64>,
}

impl RaftNode {
    /// Create a node, recovering term, vote and log from `storage`.
    pub fn new(
        config: NodeConfig,
        mut storage: Box<dyn Storage>,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, mpsc::Receiver<RaftMessage>)> {
        config.validate()?;

        let persisted = storage.load_state()?;
        let state = RaftState::from_persisted(persisted)?;
        tracing::info!(
            node_id = config.node_id,
            term = state.current_term,
            voted_for = ?state.voted_for,
            last_log_index = state.last_log_index(),
            "Recovered persistent state"
        );

        let mut timer = match config.election_seed {
            Some(seed) => ElectionTimer::with_seed(
                config.election_timeout_min_ms,
                config.election_timeout_max_ms,
                seed,
            ),
            None => ElectionTimer::new(
                config.election_timeout_min_ms,
                config.election_timeout_max_ms,
            ),
        };
        let election_deadline = Instant::now() + timer.next_timeout();

        let (message_tx, message_rx) = mpsc::channel(1024);
        let (commit_tx, _) = watch::channel(0);
        let (applied_tx, _) = watch::channel(0);

        let node = Self {
            id: config.node_id,
            quorum: config.quorum(),
            config,
            core: RwLock::new(Core {
                state,
                storage,
                timer,
                election_deadline,
                pending: BTreeMap::new(),
                stopped: false,
            }),
            transport,
            message_tx,
            commit_tx,
            applied_tx,
        };

        Ok((node, message_rx))
    }

    /// Get the message sender for external communication
    pub fn message_sender(&self) -> mpsc::Sender<RaftMessage> {
        self.message_tx.clone()
    }

    /// Watch the commit index.
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.commit_tx.subscribe()
    }

    /// Watch the last applied index.
    pub fn subscribe_applied(&self) -> watch::Receiver<u64> {
        self.applied_tx.subscribe()
    }

    /// Run the Raft node main loop until `shutdown` fires or storage fails.
    pub async fn run(
        &self,
        mut message_rx: mpsc::Receiver<RaftMessage>,
        shutdown: CancellationToken,
    ) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let (role, deadline, stopped) = {
                let core = self.core.read().await;
                (core.state.role, core.election_deadline, core.stopped)
            };
            if stopped {
                tracing::error!(node_id = self.id, "Node stopped after a storage failure");
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(node_id = self.id, "Raft loop shutting down");
                    break;
                }

                Some(msg) = message_rx.recv() => {
                    self.handle_message(msg).await;
                }

                // Election timeout (for followers and candidates)
                _ = sleep_until(deadline), if role != RaftRole::Leader => {
                    self.on_election_timeout().await;
                }

                // Heartbeat interval (for leaders)
                _ = heartbeat.tick(), if role == RaftRole::Leader => {
                    self.on_heartbeat().await;
                }
            }
        }

        let id = self.id;
        self.core.write().await.fail_pending(|| RaftError::Stopped(id));
    }

    async fn handle_message(&self, msg: RaftMessage) {
        match msg {
            RaftMessage::Propose {
                command,
                response_tx,
                applied_tx,
            } => {
                let result = self.handle_propose(command, applied_tx).await;
                let _ = response_tx.send(result);
            }
            RaftMessage::VoteResult {
                peer_id,
                term,
                result,
            } => self.handle_vote_result(peer_id, term, result).await,
            RaftMessage::AppendResult {
                peer_id,
                term,
                prev_log_index,
                entries_len,
                result,
            } => {
                self.handle_append_result(peer_id, term, prev_log_index, entries_len, result)
                    .await
            }
            RaftMessage::TriggerElection => {
                let mut core = self.core.write().await;
                if !core.stopped && core.state.role != RaftRole::Leader {
                    self.start_election(&mut core);
                }
            }
        }
    }

    /// Stop participating: nothing unpersisted may leave this node, and it no
    /// longer claims leadership or a known leader.
    fn halt(&self, core: &mut Core, err: &StorageError) {
        tracing::error!(
            node_id = self.id,
            error = %err,
            "Persistence failed, node stops participating"
        );
        core.stopped = true;
        let term = core.state.current_term;
        core.state.become_follower(term, None);
        core.fail_pending(|| RaftError::NotLeader(None));
    }

    /// Adopt a newer term seen in a reply and fall back to follower.
    fn step_down(&self, core: &mut Core, term: u64) {
        let was_leader = core.state.role == RaftRole::Leader;
        core.state.become_follower(term, None);
        if let Err(e) = core
            .storage
            .persist_state(core.state.current_term, core.state.voted_for)
        {
            self.halt(core, &e);
            return;
        }
        if was_leader {
            tracing::info!(node_id = self.id, term, "Stepped down, higher term observed");
        }
        core.fail_pending(|| RaftError::NotLeader(None));
        core.reset_election_timer();
    }

    async fn on_election_timeout(&self) {
        let mut core = self.core.write().await;
        if core.stopped || core.state.role == RaftRole::Leader {
            return;
        }
        // The deadline may have been pushed back while we slept
        if Instant::now() < core.election_deadline {
            return;
        }
        tracing::info!(
            node_id = self.id,
            term = core.state.current_term,
            "Election timeout, starting election"
        );
        self.start_election(&mut core);
    }

    /// Start a new election
    fn start_election(&self, core: &mut Core) {
        core.state.become_candidate(self.id);
        if let Err(e) = core.storage.persist_state(core.state.current_term, Some(self.id)) {
            self.halt(core, &e);
            return;
        }
        core.reset_election_timer();

        let term = core.state.current_term;
        tracing::info!(node_id = self.id, term, "Starting election");

        if core.state.votes_received.len() >= self.quorum {
            self.become_leader(core);
            return;
        }

        let req = RequestVoteArgs {
            term,
            candidate_id: self.id,
            last_log_index: core.state.last_log_index(),
            last_log_term: core.state.last_log_term(),
        };

        for &peer_id in &self.config.peers {
            let transport = self.transport.clone();
            let message_tx = self.message_tx.clone();
            let rpc_timeout = self.config.rpc_timeout();
            let req = req.clone();

            tokio::spawn(async move {
                let result = timeout(rpc_timeout, transport.request_vote(peer_id, req))
                    .await
                    .unwrap_or(Err(TransportError::Timeout(peer_id)));
                let _ = message_tx
                    .send(RaftMessage::VoteResult {
                        peer_id,
                        term,
                        result,
                    })
                    .await;
            });
        }
    }

    async fn handle_vote_result(
        &self,
        peer_id: NodeId,
        term: u64,
        result: std::result::Result<RequestVoteReply, TransportError>,
    ) {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::trace!(node_id = self.id, peer_id, error = %e, "Vote request failed");
                return;
            }
        };

        let mut core = self.core.write().await;
        if core.stopped {
            return;
        }
        if reply.term > core.state.current_term {
            self.step_down(&mut core, reply.term);
            return;
        }
        if core.state.role != RaftRole::Candidate || core.state.current_term != term {
            tracing::trace!(node_id = self.id, peer_id, term, "Discarding stale vote reply");
            return;
        }

        if reply.vote_granted {
            let votes = core.state.record_vote(peer_id);
            tracing::debug!(node_id = self.id, peer_id, votes, "Received vote");
            if votes >= self.quorum {
                self.become_leader(&mut core);
            }
        }
    }

    fn become_leader(&self, core: &mut Core) {
        core.state
            .become_leader(self.id, &self.config.peers, Instant::now());
        tracing::info!(
            node_id = self.id,
            term = core.state.current_term,
            votes = core.state.votes_received.len(),
            "Became leader"
        );

        // Commit a no-op of our own term so earlier entries can commit with it
        let noop = core.state.new_entry(Command::Noop);
        if let Err(e) = core.storage.append_log(std::slice::from_ref(&noop)) {
            self.halt(core, &e);
            return;
        }
        core.state.append_entries(vec![noop]);

        self.advance_commit(core);
        self.replicate_all(core);
    }

    async fn on_heartbeat(&self) {
        let mut core = self.core.write().await;
        if core.stopped || core.state.role != RaftRole::Leader {
            return;
        }

        if self.config.check_quorum {
            let window = Duration::from_millis(self.config.election_timeout_max_ms);
            if !core
                .state
                .has_quorum_contact(Instant::now(), window, self.quorum)
            {
                tracing::warn!(
                    node_id = self.id,
                    term = core.state.current_term,
                    "Lost contact with a majority, stepping down"
                );
                let term = core.state.current_term;
                core.state.become_follower(term, None);
                core.fail_pending(|| RaftError::NotLeader(None));
                core.reset_election_timer();
                return;
            }
        }

        self.replicate_all(&mut core);
    }

    fn replicate_all(&self, core: &mut Core) {
        for &peer_id in &self.config.peers {
            self.replicate_to(core, peer_id);
        }
    }

    /// Send the next AppendEntries to `peer_id` unless one is already in flight.
    fn replicate_to(&self, core: &mut Core, peer_id: NodeId) {
        let state = &mut core.state;
        if state.role != RaftRole::Leader {
            return;
        }
        let next_index = match state.progress.get(&peer_id) {
            Some(p) if !p.in_flight => p.next_index,
            _ => return,
        };
        let next_index = next_index.clamp(1, state.last_log_index() + 1);
        let prev_log_index = next_index - 1;
        let prev_log_term = state.term_at(prev_log_index).unwrap_or(0);
        let entries = state.entries_from(next_index, self.config.max_entries_per_append);
        let entries_len = entries.len() as u64;
        let term = state.current_term;

        let req = AppendEntriesArgs {
            term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: state.commit_index,
        };

        if let Some(progress) = state.progress.get_mut(&peer_id) {
            progress.next_index = next_index;
            progress.in_flight = true;
        }

        let transport = self.transport.clone();
        let message_tx = self.message_tx.clone();
        let rpc_timeout = self.config.rpc_timeout();

        tokio::spawn(async move {
            let result = timeout(rpc_timeout, transport.append_entries(peer_id, req))
                .await
                .unwrap_or(Err(TransportError::Timeout(peer_id)));
            let _ = message_tx
                .send(RaftMessage::AppendResult {
                    peer_id,
                    term,
                    prev_log_index,
                    entries_len,
                    result,
                })
                .await;
        });
    }

    async fn handle_append_result(
        &self,
        peer_id: NodeId,
        term: u64,
        prev_log_index: u64,
        entries_len: u64,
        result: std::result::Result<AppendEntriesReply, TransportError>,
    ) {
        let mut core = self.core.write().await;
        if core.stopped {
            return;
        }

        let current = core.state.role == RaftRole::Leader && core.state.current_term == term;
        if current {
            if let Some(progress) = core.state.progress.get_mut(&peer_id) {
                progress.in_flight = false;
            }
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::trace!(node_id = self.id, peer_id, error = %e, "AppendEntries failed");
                // The peer has already gone a full RPC timeout without hearing
                // from us; resend now rather than on the next heartbeat
                if current && matches!(e, TransportError::Timeout(_)) {
                    self.replicate_to(&mut core, peer_id);
                }
                return;
            }
        };

        if reply.term > core.state.current_term {
            self.step_down(&mut core, reply.term);
            return;
        }
        if !current {
            return;
        }

        if reply.success {
            let matched = prev_log_index + entries_len;
            let last_log_index = core.state.last_log_index();
            let behind = match core.state.progress.get_mut(&peer_id) {
                Some(progress) => {
                    progress.last_ack = Instant::now();
                    progress.match_index = progress.match_index.max(matched);
                    progress.next_index = progress.next_index.max(progress.match_index + 1);
                    progress.next_index <= last_log_index
                }
                None => return,
            };

            self.advance_commit(&mut core);
            if behind {
                self.replicate_to(&mut core, peer_id);
            }
        } else {
            // Jump past the whole conflicting term when we hold entries of it
            let hinted = reply
                .conflict_term
                .and_then(|t| core.state.last_index_of_term(t))
                .map(|i| i + 1)
                .unwrap_or(reply.conflict_index);

            let Some(progress) = core.state.progress.get_mut(&peer_id) else {
                return;
            };
            progress.last_ack = Instant::now();
            // Only the reply to a request built from the current next_index moves it
            if progress.next_index != prev_log_index + 1 {
                return;
            }
            progress.next_index = hinted.clamp(1, prev_log_index.max(1));
            tracing::debug!(
                node_id = self.id,
                peer_id,
                next_index = progress.next_index,
                "Log inconsistency, backing off"
            );

            self.replicate_to(&mut core, peer_id);
        }
    }

    fn advance_commit(&self, core: &mut Core) {
        if core.state.advance_commit_index(self.quorum) {
            tracing::debug!(
                node_id = self.id,
                commit_index = core.state.commit_index,
                "Updated commit index"
            );
            self.commit_tx.send_replace(core.state.commit_index);
        }
    }

    /// Handle a request to append a command (leader only)
    async fn handle_propose(
        &self,
        command: Vec<u8>,
        applied_tx: Option<oneshot::Sender<Result<Vec<u8>>>>,
    ) -> Result<u64> {
        let mut core = self.core.write().await;
        if core.stopped {
            return Err(RaftError::NotLeader(None));
        }
        if core.state.role != RaftRole::Leader {
            return Err(RaftError::NotLeader(core.state.leader_id));
        }

        let entry = core.state.new_entry(Command::Client(command));
        if let Err(e) = core.storage.append_log(std::slice::from_ref(&entry)) {
            self.halt(&mut core, &e);
            return Err(RaftError::NotLeader(None));
        }
        let (index, term) = (entry.index, entry.term);
        core.state.append_entries(vec![entry]);
        tracing::debug!(node_id = self.id, index, term, "Appended command to log");

        if let Some(applied_tx) = applied_tx {
            core.pending
                .insert(index, PendingProposal { term, applied_tx });
        }

        self.advance_commit(&mut core);
        self.replicate_all(&mut core);
        Ok(index)
    }

    /// Propose a command. Returns the log index it was accepted at, or
    /// `NotLeader` with the last known leader.
    pub async fn propose(&self, command: Vec<u8>) -> Result<u64> {
        let (response_tx, response_rx) = oneshot::channel();
        let sent = self
            .message_tx
            .send(RaftMessage::Propose {
                command,
                response_tx,
                applied_tx: None,
            })
            .await;
        if sent.is_err() {
            return Err(self.closed_error().await);
        }
        match response_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.closed_error().await),
        }
    }

    /// Propose a command and wait until it has been applied on this node,
    /// returning the state machine's result.
    pub async fn propose_and_wait(&self, command: Vec<u8>, wait: Duration) -> Result<Vec<u8>> {
        let (response_tx, response_rx) = oneshot::channel();
        let (applied_tx, applied_rx) = oneshot::channel();
        let sent = self
            .message_tx
            .send(RaftMessage::Propose {
                command,
                response_tx,
                applied_tx: Some(applied_tx),
            })
            .await;
        if sent.is_err() {
            return Err(self.closed_error().await);
        }
        let index = match response_rx.await {
            Ok(result) => result?,
            Err(_) => return Err(self.closed_error().await),
        };

        match timeout(wait, applied_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RaftError::ProposalDropped(index)),
            Err(_) => Err(RaftError::Timeout(format!(
                "proposal at index {} not applied within {:?}",
                index, wait
            ))),
        }
    }

    /// Error for a proposal the event loop can no longer take. A node halted
    /// by a storage failure redirects like any other non-leader.
    async fn closed_error(&self) -> RaftError {
        if self.core.read().await.stopped {
            RaftError::NotLeader(None)
        } else {
            RaftError::Stopped(self.id)
        }
    }

    /// Handle incoming RequestVote RPC
    pub async fn handle_request_vote(&self, req: RequestVoteArgs) -> Result<RequestVoteReply> {
        let mut core = self.core.write().await;
        if core.stopped {
            return Err(RaftError::Stopped(self.id));
        }
        let was_leader = core.state.role == RaftRole::Leader;

        let Core { state, storage, .. } = &mut *core;
        let reply = match rpc::handle_request_vote(state, storage.as_mut(), &req, self.id) {
            Ok(reply) => reply,
            Err(e) => {
                self.halt(&mut core, &e);
                return Err(e.into());
            }
        };

        // Granting a vote resets our election timeout
        if reply.vote_granted {
            core.reset_election_timer();
        }
        if was_leader && core.state.role != RaftRole::Leader {
            tracing::info!(
                node_id = self.id,
                term = core.state.current_term,
                "Stepped down, higher term observed"
            );
            core.fail_pending(|| RaftError::NotLeader(None));
            core.reset_election_timer();
        }

        Ok(reply)
    }

    /// Handle incoming AppendEntries RPC
    pub async fn handle_append_entries(
        &self,
        req: AppendEntriesArgs,
    ) -> Result<AppendEntriesReply> {
        let mut core = self.core.write().await;
        if core.stopped {
            return Err(RaftError::Stopped(self.id));
        }
        let was_leader = core.state.role == RaftRole::Leader;
        let commit_before = core.state.commit_index;

        let Core { state, storage, .. } = &mut *core;
        let reply = match rpc::handle_append_entries(state, storage.as_mut(), &req, self.id) {
            Ok(reply) => reply,
            Err(e) => {
                self.halt(&mut core, &e);
                return Err(e.into());
            }
        };

        // Contact from the current leader resets our election timeout
        if req.term == core.state.current_term {
            core.reset_election_timer();
        }
        if was_leader && core.state.role != RaftRole::Leader {
            let leader = core.state.leader_id;
            core.fail_pending(|| RaftError::NotLeader(leader));
        }
        if core.state.commit_index > commit_before {
            self.commit_tx.send_replace(core.state.commit_index);
        }

        Ok(reply)
    }

    /// Apply committed entries to `state_machine` in log order until
    /// `shutdown` fires. Resolves proposals waiting on those entries.
    pub async fn run_apply_loop(
        &self,
        mut state_machine: Box<dyn StateMachine>,
        shutdown: CancellationToken,
    ) {
        let mut commit_rx = self.subscribe_commits();

        loop {
            let batch = self.get_committed_entries().await;

            if batch.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = commit_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            let mut results = Vec::with_capacity(batch.len());
            for entry in &batch {
                let result = match &entry.command {
                    Command::Client(data) if entry.index > state_machine.applied_index() => {
                        Some(state_machine.apply(entry.index, data))
                    }
                    _ => None,
                };
                results.push((entry.index, entry.term, result));
            }

            let last = batch.last().map(|e| e.index).unwrap_or(0);
            {
                let mut core = self.core.write().await;
                core.state.last_applied = core.state.last_applied.max(last);
                for (index, term, result) in results {
                    if let Some(pending) = core.pending.remove(&index) {
                        let outcome = if pending.term == term {
                            Ok(result.unwrap_or_default())
                        } else {
                            Err(RaftError::ProposalDropped(index))
                        };
                        let _ = pending.applied_tx.send(outcome);
                    }
                }
            }
            self.applied_tx.send_replace(last);
            tracing::debug!(node_id = self.id, last_applied = last, "Applied committed entries");
        }
    }

    /// Entries committed but not yet applied
    async fn get_committed_entries(&self) -> Vec<LogEntry> {
        let core = self.core.read().await;
        let state = &core.state;
        (state.last_applied + 1..=state.commit_index)
            .filter_map(|index| state.get_entry(index).cloned())
            .collect()
    }

    /// Check if this node is the leader
    pub async fn is_leader(&self) -> bool {
        self.core.read().await.state.role == RaftRole::Leader
    }

    /// Get the current leader ID
    pub async fn get_leader_id(&self) -> Option<NodeId> {
        let core = self.core.read().await;
        if core.state.role == RaftRole::Leader {
            Some(self.id)
        } else {
            core.state.leader_id
        }
    }

    pub async fn status(&self) -> RaftStatus {
        let core = self.core.read().await;
        let state = &core.state;
        RaftStatus {
            node_id: self.id,
            role: state.role,
            current_term: state.current_term,
            voted_for: state.voted_for,
            leader_id: if state.role == RaftRole::Leader {
                Some(self.id)
            } else {
                state.leader_id
            },
            commit_index: state.commit_index,
            last_applied: state.last_applied,
            last_log_index: state.last_log_index(),
            last_log_term: state.last_log_term(),
            stopped: core.stopped,
        }
    }

    /// Replication progress per peer. Empty unless this node is leader.
    pub async fn peer_progress(&self) -> BTreeMap<NodeId, PeerProgress> {
        let core = self.core.read().await;
        core.state
            .progress
            .iter()
            .map(|(&id, progress)| (id, progress.clone()))
            .collect()
    }

    /// Copy of the whole log.
    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.core.read().await.state.log.clone()
    }
}
