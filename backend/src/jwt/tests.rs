use super::*;

const SECRET: &str = "test-session-secret";
const WORLD_ADDRESS: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";

#[test]
fn test_validate_token_without_registered_claims() {
    let token = issue_session_token(SECRET, &SessionClaims::for_address(WORLD_ADDRESS)).unwrap();

    let claims = SessionVerifier::new(SECRET).validate(&token).unwrap();
    assert_eq!(claims.address, WORLD_ADDRESS);
    assert_eq!(claims.exp, None);
}

#[test]
fn test_validate_keeps_profile_claims() {
    let claims = SessionClaims {
        address: WORLD_ADDRESS.to_string(),
        username: Some("alice".to_string()),
        profile_picture_url: None,
        exp: None,
    };
    let token = issue_session_token(SECRET, &claims).unwrap();

    assert_eq!(SessionVerifier::new(SECRET).validate(&token).unwrap(), claims);
}

#[test]
fn test_reject_wrong_secret() {
    let token = issue_session_token("other-secret", &SessionClaims::for_address(WORLD_ADDRESS))
        .unwrap();

    assert!(matches!(
        SessionVerifier::new(SECRET).validate(&token),
        Err(JwtError::ValidationError)
    ));
}

#[test]
fn test_reject_expired_token() {
    let mut claims = SessionClaims::for_address(WORLD_ADDRESS);
    claims.exp = Some(1_000_000);
    let token = issue_session_token(SECRET, &claims).unwrap();

    assert!(SessionVerifier::new(SECRET).validate(&token).is_err());
}

#[test]
fn test_reject_empty_address() {
    let token = issue_session_token(SECRET, &SessionClaims::for_address("")).unwrap();

    assert!(SessionVerifier::new(SECRET).validate(&token).is_err());
}

#[test]
fn test_reject_garbage() {
    let verifier = SessionVerifier::new(SECRET);
    assert!(verifier.validate("").is_err());
    assert!(verifier.validate("not.a.jwt").is_err());
}
