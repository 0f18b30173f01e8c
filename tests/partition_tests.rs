//! Network partition tests for Raft cluster behavior.
//!
//! These tests verify correct behavior when the network is partitioned:
//! majority elects leader, minority cannot, logs converge after healing.


use std::time::Duration;

use raft_lite::raft::RaftRole;
use test_harness::TestCluster;

/// Split a 5-node cluster so that `leader_id` ends up in the majority.
fn split_with_leader_in_majority(leader_id: u64) -> (Vec<u64>, Vec<u64>) {
    let mut majority = vec![leader_id];
    let mut minority = Vec::new();
    for id in 1..=5u64 {
        if id == leader_id {
            continue;
        }
        if majority.len() < 3 {
            majority.push(id);
        } else {
            minority.push(id);
        }
    }
    (majority, minority)
}

/// Test 1: Majority partition elects a leader
#[tokio::test]
async fn test_majority_partition_elects_leader() {
    let mut cluster = TestCluster::new(5).await;

    cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");

    let majority = vec![1, 2, 3];
    let minority = vec![4, 5];
    cluster.create_partition(&majority, &minority).await;

    let leader = cluster
        .wait_for_leader_in_group(&majority, Duration::from_secs(5))
        .await
        .expect("Majority partition should elect a leader");
    assert!(majority.contains(&leader));

    cluster
        .propose_to_node(leader, "majority-write", Duration::from_secs(2))
        .await
        .expect("Majority leader should commit");

    cluster.shutdown().await;
}

/// Test 2: Minority partition cannot elect a leader
#[tokio::test]
async fn test_minority_partition_cannot_elect_leader() {
    let mut cluster = TestCluster::new(5).await;

    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");

    let (majority, minority) = split_with_leader_in_majority(leader_id);
    cluster.create_partition(&majority, &minority).await;

    // Minority nodes time out and campaign, but never reach 3 votes
    tokio::time::sleep(Duration::from_millis(800)).await;
    let minority_leader = cluster
        .wait_for_leader_in_group(&minority, Duration::from_millis(500))
        .await;
    assert!(
        minority_leader.is_none(),
        "Minority partition should not be able to elect a leader"
    );

    for &id in &minority {
        let role = cluster.get_node(id).unwrap().role().await;
        assert_ne!(role, RaftRole::Leader);
    }

    cluster.shutdown().await;
}

/// Test 3: An isolated leader steps down and the rest elect a new one
#[tokio::test]
async fn test_leader_isolated_new_election() {
    let mut cluster = TestCluster::new(3).await;

    let old_leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");
    let old_term = cluster.get_node(old_leader).unwrap().current_term().await;

    cluster.isolate_node(old_leader).await;

    let new_leader = cluster
        .wait_for_new_leader(old_leader, Duration::from_secs(5))
        .await
        .expect("Remaining nodes should elect a new leader");
    assert_ne!(new_leader, old_leader);
    assert!(cluster.get_node(new_leader).unwrap().current_term().await > old_term);

    // Without contact from a majority the old leader gives up leadership
    test_harness::assert_eventually(
        || async { !cluster.get_node(old_leader).unwrap().is_leader().await },
        Duration::from_secs(2),
        "Isolated leader should step down",
    )
    .await;

    cluster.shutdown().await;
}

/// Test 4: Entries written on the majority side reach the minority after healing
#[tokio::test]
async fn test_partition_healing_logs_converge() {
    let mut cluster = TestCluster::new(5).await;

    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");

    cluster
        .propose("before", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(
        cluster
            .wait_for_applied_on_all(1, Duration::from_secs(3))
            .await
    );

    let (majority, minority) = split_with_leader_in_majority(leader_id);
    cluster.create_partition(&majority, &minority).await;

    for i in 0..5 {
        cluster
            .propose(&format!("during-{}", i), Duration::from_secs(5))
            .await
            .expect("Majority should keep committing");
    }
    assert!(
        cluster
            .wait_for_applied_on_nodes(&majority, 6, Duration::from_secs(3))
            .await
    );
    for &id in &minority {
        assert_eq!(
            cluster.get_node(id).unwrap().applied(),
            vec!["before"],
            "Minority must not see entries it could not receive"
        );
    }

    cluster.heal_partition().await;

    assert!(
        cluster
            .wait_for_applied_on_all(6, Duration::from_secs(5))
            .await,
        "Minority should catch up after healing"
    );
    assert!(cluster.wait_for_convergence(Duration::from_secs(3)).await);
    assert!(cluster.verify_log_consistency().await);
    assert!(cluster.verify_applied_consistency());

    cluster.shutdown().await;
}

/// Test 5: Uncommitted entries from a deposed leader are overwritten
#[tokio::test]
async fn test_uncommitted_entries_overwritten_after_heal() {
    let mut cluster = TestCluster::new(5).await;

    let old_leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");

    // Old leader plus one follower on the minority side
    let ally = (1..=5u64).find(|&id| id != old_leader).unwrap();
    let minority = vec![old_leader, ally];
    let majority: Vec<u64> = (1..=5u64).filter(|id| !minority.contains(id)).collect();
    cluster.create_partition(&minority, &majority).await;

    // Accepted into the old leader's log, never committed
    let stale = cluster.get_node(old_leader).unwrap().raft_node.clone();
    let _ = stale.propose(b"lost-1".to_vec()).await;
    let _ = stale.propose(b"lost-2".to_vec()).await;

    let new_leader = cluster
        .wait_for_leader_in_group(&majority, Duration::from_secs(5))
        .await
        .expect("Majority should elect a leader");
    cluster
        .propose_to_node(new_leader, "kept", Duration::from_secs(2))
        .await
        .expect("Majority leader should commit");

    cluster.heal_partition().await;

    assert!(
        cluster
            .wait_for_applied_on_all(1, Duration::from_secs(5))
            .await
    );
    assert!(cluster.wait_for_convergence(Duration::from_secs(5)).await);
    for node in cluster.nodes.values() {
        assert_eq!(node.applied(), vec!["kept"]);
        let log = node.raft_node.log_entries().await;
        assert!(log.iter().all(|e| match &e.command {
            raft_lite::Command::Client(data) => !data.starts_with(b"lost"),
            raft_lite::Command::Noop => true,
        }));
    }

    cluster.shutdown().await;
}

/// Test 6: Split brain prevention, at most one leader per term
#[tokio::test]
async fn test_split_brain_prevention() {
    let mut cluster = TestCluster::new(5).await;

    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");

    let (majority, minority) = split_with_leader_in_majority(leader_id);
    cluster.create_partition(&majority, &minority).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let mut leaders_by_term = std::collections::HashMap::new();
    for node in cluster.nodes.values() {
        let status = node.raft_node.status().await;
        if status.role == RaftRole::Leader {
            let previous = leaders_by_term.insert(status.current_term, node.node_id);
            assert!(
                previous.is_none(),
                "Two leaders in term {}",
                status.current_term
            );
        }
    }

    cluster.heal_partition().await;
    test_harness::assert_eventually(
        || async { cluster.count_leaders().await == 1 },
        Duration::from_secs(3),
        "Exactly one leader after healing",
    )
    .await;

    cluster.shutdown().await;
}

/// Test 7: An isolated follower rejoins and catches up
#[tokio::test]
async fn test_isolated_node_rejoins_cluster() {
    let mut cluster = TestCluster::new(3).await;

    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");
    let follower = cluster
        .active_node_ids()
        .into_iter()
        .find(|&id| id != leader_id)
        .unwrap();

    cluster.isolate_node(follower).await;
    for i in 0..3 {
        cluster
            .propose(&format!("while-away-{}", i), Duration::from_secs(5))
            .await
            .expect("Two of three nodes still commit");
    }

    // The isolated follower campaigns on its own and inflates its term
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(cluster.get_node(follower).unwrap().applied().is_empty());

    cluster.heal_node(follower).await;

    assert!(
        cluster
            .wait_for_applied_on_all(3, Duration::from_secs(5))
            .await,
        "Rejoined follower should catch up"
    );
    test_harness::assert_eventually(
        || async { cluster.count_leaders().await == 1 },
        Duration::from_secs(3),
        "Exactly one leader after rejoin",
    )
    .await;
    // Its stale log cannot have won an election
    let leader = cluster.get_leader_id().await.unwrap();
    assert_ne!(leader, follower);

    cluster.shutdown().await;
}
