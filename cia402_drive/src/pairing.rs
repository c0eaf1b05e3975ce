//! Leader/follower detection from shared receive-PDO COB-IDs.
//!
//! Two drives that receive the same PDO are mechanically coupled: the
//! lower node id leads, the higher one follows. The registry is filled
//! while nodes are configured and is shared by every axis of one master
//! (`Arc<parking_lot::Mutex<PairingRegistry>>`).
//!
//! ```text
//! observe(0x201, node 3)  → Claimed
//! observe(0x201, node 4)  → Follows(3)     edge 3 → 4
//! observe(0x201, node 3)  → Unchanged      (restart, same edge)
//! observe(0x201, node 5)  → Conflict
//! ```

use cia402_common::consts::COB_ID_MASK;
use cia402_common::error::PairingError;
use cia402_common::types::NodeId;
use std::collections::HashMap;
use tracing::{debug, info};

/// Pairing role of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Standalone,
    Leader { follower: NodeId },
    Follower { leader: NodeId },
}

impl Role {
    #[inline]
    pub const fn follower(self) -> Option<NodeId> {
        match self {
            Self::Leader { follower } => Some(follower),
            _ => None,
        }
    }

    #[inline]
    pub const fn leader(self) -> Option<NodeId> {
        match self {
            Self::Follower { leader } => Some(leader),
            _ => None,
        }
    }
}

/// Result of observing a COB-ID, from the observing node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// First node seen with this COB-ID.
    Claimed,
    /// The node now follows the given leader.
    Follows(NodeId),
    /// The node now leads the given follower.
    Leads(NodeId),
    /// Nothing new was learned.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    leader: NodeId,
    follower: NodeId,
}

impl Edge {
    fn between(a: NodeId, b: NodeId) -> Self {
        Self {
            leader: a.min(b),
            follower: a.max(b),
        }
    }

    fn contains(self, node: NodeId) -> bool {
        self.leader == node || self.follower == node
    }
}

/// COB-ID claims and the resolved leader/follower edges.
#[derive(Debug, Default)]
pub struct PairingRegistry {
    claims: HashMap<u32, NodeId>,
    edges: HashMap<u32, Edge>,
    leader_to_follower: HashMap<NodeId, NodeId>,
    follower_to_leader: HashMap<NodeId, NodeId>,
}

impl PairingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` receives the PDO with `cob_id`.
    ///
    /// # Errors
    ///
    /// - `PairingError::Conflict` when the COB-ID already links two other nodes.
    /// - `PairingError::AlreadyPaired` when the new edge would give a node a
    ///   second role or a second partner.
    pub fn observe(&mut self, cob_id: u32, node: NodeId) -> Result<PairingOutcome, PairingError> {
        let cob_id = cob_id & COB_ID_MASK;

        if let Some(edge) = self.edges.get(&cob_id).copied() {
            if edge.contains(node) {
                return Ok(PairingOutcome::Unchanged);
            }
            return Err(PairingError::Conflict {
                cob_id,
                node,
                leader: edge.leader,
                follower: edge.follower,
            });
        }

        match self.claims.get(&cob_id).copied() {
            None => {
                debug!("COB-ID 0x{:08x} claimed by node {}", cob_id, node);
                self.claims.insert(cob_id, node);
                Ok(PairingOutcome::Claimed)
            }
            Some(claimant) if claimant == node => Ok(PairingOutcome::Unchanged),
            Some(claimant) => self.link(cob_id, node, claimant),
        }
    }

    /// Link `node` and `other` through `cob_id`; the lower id leads.
    ///
    /// The outcome is reported from `node`'s point of view.
    pub fn link(
        &mut self,
        cob_id: u32,
        node: NodeId,
        other: NodeId,
    ) -> Result<PairingOutcome, PairingError> {
        let cob_id = cob_id & COB_ID_MASK;
        let edge = Edge::between(node, other);

        if self.leader_to_follower.get(&edge.leader) == Some(&edge.follower) {
            self.edges.insert(cob_id, edge);
            return Ok(PairingOutcome::Unchanged);
        }

        self.check_free(edge.leader, edge.follower)?;
        self.check_free(edge.follower, edge.leader)?;

        info!(
            "Node {} leads node {} (COB-ID 0x{:08x})",
            edge.leader, edge.follower, cob_id
        );
        self.edges.insert(cob_id, edge);
        self.leader_to_follower.insert(edge.leader, edge.follower);
        self.follower_to_leader.insert(edge.follower, edge.leader);

        Ok(if node == edge.follower {
            PairingOutcome::Follows(edge.leader)
        } else {
            PairingOutcome::Leads(edge.follower)
        })
    }

    fn check_free(&self, node: NodeId, requested: NodeId) -> Result<(), PairingError> {
        let partner = self
            .leader_to_follower
            .get(&node)
            .or_else(|| self.follower_to_leader.get(&node));
        match partner {
            Some(&partner) => Err(PairingError::AlreadyPaired {
                node,
                partner,
                requested,
            }),
            None => Ok(()),
        }
    }

    pub fn role_of(&self, node: NodeId) -> Role {
        if let Some(&follower) = self.leader_to_follower.get(&node) {
            Role::Leader { follower }
        } else if let Some(&leader) = self.follower_to_leader.get(&node) {
            Role::Follower { leader }
        } else {
            Role::Standalone
        }
    }

    #[inline]
    pub fn leader_of(&self, follower: NodeId) -> Option<NodeId> {
        self.follower_to_leader.get(&follower).copied()
    }

    #[inline]
    pub fn follower_of(&self, leader: NodeId) -> Option<NodeId> {
        self.leader_to_follower.get(&leader).copied()
    }

    pub fn first_claimant(&self, cob_id: u32) -> Option<NodeId> {
        self.claims.get(&(cob_id & COB_ID_MASK)).copied()
    }

    /// All resolved `(leader, follower)` pairs, ordered by leader.
    pub fn pairs(&self) -> Vec<(NodeId, NodeId)> {
        let mut pairs: Vec<_> = self
            .leader_to_follower
            .iter()
            .map(|(&l, &f)| (l, f))
            .collect();
        pairs.sort();
        pairs
    }

    /// Forget everything; used when the whole network is reconfigured.
    pub fn clear(&mut self) {
        self.claims.clear();
        self.edges.clear();
        self.leader_to_follower.clear();
        self.follower_to_leader.clear();
    }
}
