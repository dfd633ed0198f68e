use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        EngineError::invalid_state("x")
            .to_string()
            .contains("invalid state:")
    );
    assert!(
        EngineError::exhausted("x")
            .to_string()
            .contains("resource exhausted:")
    );
    assert!(
        EngineError::context_invalidated("x")
            .to_string()
            .contains("context invalidated:")
    );
    assert!(
        EngineError::dimension("x")
            .to_string()
            .contains("dimension error:")
    );
    assert!(
        EngineError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn protocol_errors_carry_their_code() {
    let err = EngineError::from(ProtocolError::HandleCollision("img1".to_string()));
    assert_eq!(err.code(), error_code::HANDLE_COLLISION);
    assert!(err.to_string().contains("'img1' already exists"));

    let err = EngineError::from(ProtocolError::UnknownOpcode("Bogus".to_string()));
    assert_eq!(err.code(), error_code::UNKNOWN_OPCODE);
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = EngineError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.code(), error_code::INTERNAL_ERROR);
}
