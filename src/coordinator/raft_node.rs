//! Leadership state
//!
//! Leader election itself belongs to the consensus engine. Everything else
//! in the coordinator only reads the outcome through [`RaftEngine`] and
//! reacts to transitions through [`RaftStateListener`]. `RaftNode` is the
//! in-process holder of that outcome: the consensus layer (or a test)
//! drives it with `become_leader` / `step_down`.

use parking_lot::Mutex;
use std::sync::Arc;

/// Callback fired after every leadership change.
pub trait RaftStateListener: Send + Sync {
    fn on_raft_leader_changed(&self);
}

/// Read side of the consensus engine.
pub trait RaftEngine: Send + Sync {
    fn is_leader(&self) -> bool;

    /// gRPC address advertised by the current leader, if one is known.
    fn leader_grpc_address(&self) -> Option<String>;

    fn add_state_listener(&self, listener: Arc<dyn RaftStateListener>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// Identity of the current leader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderInfo {
    pub node_id: String,
    pub grpc_address: String,
}

struct RaftState {
    role: RaftRole,
    term: u64,
    leader: Option<LeaderInfo>,
}

pub struct RaftNode {
    node_id: String,
    grpc_address: String,
    state: Mutex<RaftState>,
    listeners: Mutex<Vec<Arc<dyn RaftStateListener>>>,
}

impl RaftNode {
    pub fn new(node_id: impl Into<String>, grpc_address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            grpc_address: grpc_address.into(),
            state: Mutex::new(RaftState {
                role: RaftRole::Follower,
                term: 0,
                leader: None,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn get_role(&self) -> RaftRole {
        self.state.lock().role
    }

    pub fn get_term(&self) -> u64 {
        self.state.lock().term
    }

    pub fn get_leader(&self) -> Option<LeaderInfo> {
        self.state.lock().leader.clone()
    }

    /// This node won an election in `term`.
    pub fn become_leader(&self, term: u64) {
        {
            let mut state = self.state.lock();
            state.role = RaftRole::Leader;
            state.term = state.term.max(term);
            state.leader = Some(LeaderInfo {
                node_id: self.node_id.clone(),
                grpc_address: self.grpc_address.clone(),
            });
        }
        tracing::info!("Node {} became leader", self.node_id);
        self.fire_leader_changed();
    }

    /// Follow `leader` (or nobody yet) from `term` on.
    pub fn step_down(&self, term: u64, leader: Option<LeaderInfo>) {
        {
            let mut state = self.state.lock();
            state.role = RaftRole::Follower;
            state.term = state.term.max(term);
            state.leader = leader.clone();
        }
        tracing::info!(
            "Node {} is follower, leader: {}",
            self.node_id,
            leader
                .as_ref()
                .map_or("unknown", |l| l.grpc_address.as_str())
        );
        self.fire_leader_changed();
    }

    /// An election is under way; no leader is known.
    pub fn start_election(&self) -> u64 {
        let term = {
            let mut state = self.state.lock();
            state.term += 1;
            state.role = RaftRole::Candidate;
            state.leader = None;
            state.term
        };
        self.fire_leader_changed();
        term
    }

    fn fire_leader_changed(&self) {
        // Listeners may call back into this node, so run them unlocked.
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_raft_leader_changed();
        }
    }
}

impl RaftEngine for RaftNode {
    fn is_leader(&self) -> bool {
        matches!(self.state.lock().role, RaftRole::Leader)
    }

    fn leader_grpc_address(&self) -> Option<String> {
        self.state
            .lock()
            .leader
            .as_ref()
            .map(|l| l.grpc_address.clone())
    }

    fn add_state_listener(&self, listener: Arc<dyn RaftStateListener>) {
        self.listeners.lock().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl RaftStateListener for Counter {
        fn on_raft_leader_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_transitions() {
        let node = RaftNode::new("pd-1", "http://127.0.0.1:8686");
        assert_eq!(node.get_role(), RaftRole::Follower);
        assert!(node.leader_grpc_address().is_none());

        node.become_leader(1);
        assert!(node.is_leader());
        assert_eq!(node.leader_grpc_address().as_deref(), Some("http://127.0.0.1:8686"));

        node.step_down(
            2,
            Some(LeaderInfo {
                node_id: "pd-2".into(),
                grpc_address: "http://127.0.0.1:8687".into(),
            }),
        );
        assert!(!node.is_leader());
        assert_eq!(node.get_term(), 2);
        assert_eq!(node.get_leader().unwrap().node_id, "pd-2");

        assert_eq!(node.start_election(), 3);
        assert_eq!(node.get_role(), RaftRole::Candidate);
        assert!(node.get_leader().is_none());
    }

    #[test]
    fn test_listeners_fire_on_every_change() {
        let node = RaftNode::new("pd-1", "http://127.0.0.1:8686");
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        node.add_state_listener(counter.clone());

        node.become_leader(1);
        node.step_down(2, None);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(RaftRole::Leader.to_string(), "leader");
        assert_eq!(RaftRole::Follower.to_string(), "follower");
    }
}
