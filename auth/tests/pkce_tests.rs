use hearth_auth::pkce::{CHALLENGE_METHOD, PkceVerifier, challenge};
use openidconnect::{PkceCodeChallenge, PkceCodeVerifier};

#[test]
fn test_rfc7636_appendix_b_vector() {
    assert_eq!(
        challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
        "E9Melhoa2OwvFrEMTJguCgoEmvnkSVvNLaRBbcyMhHM"
    );
}

#[test]
fn test_challenge_is_deterministic() {
    let verifier = PkceVerifier::generate();
    assert_eq!(verifier.challenge(), verifier.challenge());
    assert_eq!(verifier.challenge(), challenge(verifier.secret()));
}

#[test]
fn test_challenge_matches_openidconnect() {
    let verifier = PkceVerifier::generate();
    let reference = PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
        verifier.secret().to_string(),
    ));
    assert_eq!(reference.method().as_str(), CHALLENGE_METHOD);
    assert_eq!(reference.as_str(), verifier.challenge());
}

#[test]
fn test_generated_verifiers_are_distinct() {
    let a = PkceVerifier::generate();
    let b = PkceVerifier::generate();
    assert_ne!(a.secret(), b.secret());
    assert_ne!(a.challenge(), b.challenge());
}

#[test]
fn test_verifier_uses_unreserved_characters() {
    let verifier = PkceVerifier::generate();
    assert!(
        verifier
            .secret()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-._~".contains(c))
    );
    assert!((43..=128).contains(&verifier.secret().len()));
}
