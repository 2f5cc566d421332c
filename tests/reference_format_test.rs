//! Integration tests for the reference/cache-key conventions every HTTP
//! handler in `api/` relies on.
//!
//! These check the formats directly, the way a client integrating against
//! the HTTP API would have to rely on them, rather than through the private
//! handler functions themselves.

use stackswap_backend::database::{generate_reference, Direction, Token, TxStatus};

#[test]
fn offramp_reference_has_four_underscore_parts() {
    let reference = generate_reference(Direction::Offramp);
    let parts: Vec<&str> = reference.split('_').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "SSWAP");
    assert_eq!(parts[1], "OFFRAMP");
    assert_eq!(parts[3].len(), 8);
}

#[test]
fn onramp_reference_has_four_underscore_parts() {
    let reference = generate_reference(Direction::Onramp);
    let parts: Vec<&str> = reference.split('_').collect();
    assert_eq!(parts[1], "ONRAMP");
}

#[test]
fn two_references_in_a_row_are_distinct() {
    let a = generate_reference(Direction::Offramp);
    let b = generate_reference(Direction::Offramp);
    assert_ne!(a, b);
}

#[test]
fn token_wire_values_round_trip() {
    for token in [Token::Stx, Token::Usdc] {
        let wire = serde_json::to_string(&token).unwrap();
        let parsed: Token = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, token);
    }
    assert_eq!(serde_json::to_string(&Token::Stx).unwrap(), "\"STX\"");
    assert_eq!(serde_json::to_string(&Token::Usdc).unwrap(), "\"USDC\"");
}

#[test]
fn status_wire_values_are_snake_case() {
    assert_eq!(serde_json::to_string(&TxStatus::Pending).unwrap(), "\"pending\"");
    assert_eq!(serde_json::to_string(&TxStatus::Processing).unwrap(), "\"processing\"");
    assert_eq!(serde_json::to_string(&TxStatus::Settling).unwrap(), "\"settling\"");
    assert_eq!(serde_json::to_string(&TxStatus::Confirmed).unwrap(), "\"confirmed\"");
    assert_eq!(serde_json::to_string(&TxStatus::Failed).unwrap(), "\"failed\"");
}
