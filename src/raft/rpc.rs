use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::raft::state::{LogEntry, NodeId, RaftRole, RaftState};
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteArgs {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteReply {
    pub term: u64,
    pub vote_granted: bool,
}

/// Replicates log entries; doubles as the heartbeat when `entries` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesArgs {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    pub term: u64,
    pub success: bool,
    /// On success, the last index now known to match the leader
    pub match_index: u64,
    /// On a consistency failure, the term of the receiver's entry at `prev_log_index`
    pub conflict_term: Option<u64>,
    /// On a consistency failure, where the leader should retry from
    pub conflict_index: u64,
}

impl AppendEntriesReply {
    fn rejected(term: u64) -> Self {
        Self {
            term,
            success: false,
            match_index: 0,
            conflict_term: None,
            conflict_index: 0,
        }
    }
}

/// Persist term and vote if either changed since `before`.
fn persist_if_changed(
    state: &RaftState,
    storage: &mut dyn Storage,
    before: (u64, Option<NodeId>),
) -> Result<(), StorageError> {
    if (state.current_term, state.voted_for) != before {
        storage.persist_state(state.current_term, state.voted_for)?;
    }
    Ok(())
}

/// Handle RequestVote RPC.
///
/// The reply is only returned once any change to term or vote is durable.
pub fn handle_request_vote(
    state: &mut RaftState,
    storage: &mut dyn Storage,
    req: &RequestVoteArgs,
    my_id: NodeId,
) -> Result<RequestVoteReply, StorageError> {
    let before = (state.current_term, state.voted_for);

    // A request of at least our term ends our own candidacy
    if req.term > state.current_term
        || (req.term == state.current_term && state.role == RaftRole::Candidate)
    {
        state.become_follower(req.term, None);
    }

    let vote_granted = if req.term < state.current_term {
        false
    } else if state.voted_for.is_some() && state.voted_for != Some(req.candidate_id) {
        // Already voted for someone else in this term
        false
    } else if !state.is_log_up_to_date(req.last_log_index, req.last_log_term) {
        false
    } else {
        state.voted_for = Some(req.candidate_id);
        true
    };

    persist_if_changed(state, storage, before)?;

    tracing::debug!(
        node_id = my_id,
        candidate = req.candidate_id,
        term = req.term,
        granted = vote_granted,
        "RequestVote response"
    );

    Ok(RequestVoteReply {
        term: state.current_term,
        vote_granted,
    })
}

/// Handle AppendEntries RPC.
///
/// Log changes and term/vote changes are persisted before the reply is
/// returned. Matching entries are never rewritten, so a delayed or duplicated
/// request cannot remove entries a newer request already added.
pub fn handle_append_entries(
    state: &mut RaftState,
    storage: &mut dyn Storage,
    req: &AppendEntriesArgs,
    my_id: NodeId,
) -> Result<AppendEntriesReply, StorageError> {
    let before = (state.current_term, state.voted_for);

    if req.term < state.current_term {
        return Ok(AppendEntriesReply::rejected(state.current_term));
    }

    // Valid leader for this term: adopt the term and follow it
    state.become_follower(req.term, Some(req.leader_id));
    persist_if_changed(state, storage, before)?;

    // Consistency check on the entry preceding the batch
    match state.term_at(req.prev_log_index) {
        None => {
            return Ok(AppendEntriesReply {
                conflict_index: state.last_log_index() + 1,
                ..AppendEntriesReply::rejected(state.current_term)
            });
        }
        Some(term) if term != req.prev_log_term => {
            return Ok(AppendEntriesReply {
                conflict_term: Some(term),
                conflict_index: state.first_index_of_term(term, req.prev_log_index),
                ..AppendEntriesReply::rejected(state.current_term)
            });
        }
        Some(_) => {}
    }

    // Skip entries we already hold; truncate at the first term conflict
    let mut new_from = req.entries.len();
    for (offset, entry) in req.entries.iter().enumerate() {
        match state.term_at(entry.index) {
            Some(term) if term == entry.term => continue,
            Some(_) => {
                if entry.index <= state.commit_index {
                    tracing::error!(
                        node_id = my_id,
                        index = entry.index,
                        commit_index = state.commit_index,
                        "Leader sent an entry conflicting with a committed one"
                    );
                }
                storage.truncate_log_from(entry.index)?;
                state.truncate_from(entry.index);
                new_from = offset;
                break;
            }
            None => {
                new_from = offset;
                break;
            }
        }
    }

    if new_from < req.entries.len() {
        let new_entries = req.entries[new_from..].to_vec();
        storage.append_log(&new_entries)?;
        state.append_entries(new_entries);

        tracing::debug!(
            node_id = my_id,
            entries_appended = req.entries.len() - new_from,
            new_last_index = state.last_log_index(),
            "Appended entries"
        );
    }

    let last_new_index = req.prev_log_index + req.entries.len() as u64;
    state.follow_leader_commit(req.leader_commit, last_new_index);

    Ok(AppendEntriesReply {
        term: state.current_term,
        success: true,
        match_index: last_new_index,
        conflict_term: None,
        conflict_index: 0,
    })
}
