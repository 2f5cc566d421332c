//! Integration tests for the transaction status machine (§4.8) as seen from
//! outside the crate, through the same `TxStatus` type every handler returns
//! over the wire.

use stackswap_backend::database::TxStatus;

#[test]
fn happy_path_offramp_transitions_are_allowed() {
    assert!(TxStatus::Pending.can_transition_to(&TxStatus::Processing));
    assert!(TxStatus::Processing.can_transition_to(&TxStatus::Settling));
    assert!(TxStatus::Settling.can_transition_to(&TxStatus::Confirmed));
}

#[test]
fn failure_is_reachable_from_every_non_terminal_state() {
    assert!(TxStatus::Pending.can_transition_to(&TxStatus::Failed));
    assert!(TxStatus::Processing.can_transition_to(&TxStatus::Failed));
    assert!(TxStatus::Settling.can_transition_to(&TxStatus::Failed));
}

#[test]
fn terminal_states_have_no_outgoing_edges() {
    for next in [TxStatus::Pending, TxStatus::Processing, TxStatus::Settling, TxStatus::Confirmed, TxStatus::Failed] {
        assert!(!TxStatus::Confirmed.can_transition_to(&next));
        assert!(!TxStatus::Failed.can_transition_to(&next));
    }
}

#[test]
fn skipping_a_stage_is_rejected() {
    assert!(!TxStatus::Pending.can_transition_to(&TxStatus::Settling));
    assert!(!TxStatus::Pending.can_transition_to(&TxStatus::Confirmed));
    assert!(!TxStatus::Processing.can_transition_to(&TxStatus::Confirmed));
}

#[test]
fn chain_tx_id_is_required_from_processing_onward() {
    assert!(!TxStatus::Pending.requires_chain_tx_id());
    for status in [TxStatus::Processing, TxStatus::Settling, TxStatus::Confirmed] {
        assert!(status.requires_chain_tx_id());
    }
    assert!(!TxStatus::Failed.requires_chain_tx_id());
}

#[test]
fn payout_tx_id_is_required_only_once_settling() {
    assert!(!TxStatus::Pending.requires_payout_tx_id());
    assert!(!TxStatus::Processing.requires_payout_tx_id());
    assert!(TxStatus::Settling.requires_payout_tx_id());
    assert!(TxStatus::Confirmed.requires_payout_tx_id());
}
