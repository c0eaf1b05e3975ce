//! Integration test: leader/follower detection across several nodes.

use cia402_common::error::PairingError;
use cia402_common::types::NodeId;
use cia402_drive::pairing::{PairingOutcome, PairingRegistry, Role};

// ── Helpers ─────────────────────────────────────────────────────────

fn n(raw: u8) -> NodeId {
    NodeId::new(raw).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn two_coupled_pairs_on_one_bus() {
    let mut registry = PairingRegistry::new();

    assert_eq!(registry.observe(0x201, n(2)).unwrap(), PairingOutcome::Claimed);
    assert_eq!(registry.observe(0x301, n(5)).unwrap(), PairingOutcome::Claimed);
    assert_eq!(registry.observe(0x201, n(3)).unwrap(), PairingOutcome::Follows(n(2)));
    assert_eq!(registry.observe(0x301, n(6)).unwrap(), PairingOutcome::Follows(n(5)));

    assert_eq!(registry.pairs(), vec![(n(2), n(3)), (n(5), n(6))]);
    assert_eq!(registry.role_of(n(2)), Role::Leader { follower: n(3) });
    assert_eq!(registry.role_of(n(6)), Role::Follower { leader: n(5) });
    assert_eq!(registry.role_of(n(7)), Role::Standalone);
}

#[test]
fn reconfiguration_is_idempotent_and_third_node_conflicts() {
    let mut registry = PairingRegistry::new();
    registry.observe(0x201, n(2)).unwrap();
    registry.observe(0x201, n(3)).unwrap();

    // A node reset reconfigures both nodes again.
    assert_eq!(registry.observe(0x201, n(2)).unwrap(), PairingOutcome::Unchanged);
    assert_eq!(registry.observe(0x201, n(3)).unwrap(), PairingOutcome::Unchanged);

    assert!(matches!(
        registry.observe(0x201, n(4)),
        Err(PairingError::Conflict { .. })
    ));
    assert_eq!(registry.pairs(), vec![(n(2), n(3))]);
}
