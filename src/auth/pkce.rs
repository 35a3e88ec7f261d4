//! PKCE verifier/challenge generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// A verifier and the challenge derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

/// Source of PKCE pairs for the device flow.
pub trait Challenger: Send + Sync {
    /// Produce a fresh pair. Called once per device flow.
    fn generate(&self) -> PkcePair;
}

/// `S256` challenger: 64 random bytes as verifier, challenge is the
/// unpadded base64url SHA-256 of the verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct S256Challenger;

impl Challenger for S256Challenger {
    fn generate(&self) -> PkcePair {
        let verifier = generate_code_verifier();
        let challenge = compute_code_challenge(&verifier);
        PkcePair {
            verifier,
            challenge,
            method: "S256",
        }
    }
}

/// Fixed pair, for tests and for replaying a known flow.
#[derive(Debug, Clone)]
pub struct StaticChallenger {
    pair: PkcePair,
}

impl StaticChallenger {
    pub fn new(verifier: impl Into<String>, challenge: impl Into<String>) -> Self {
        Self {
            pair: PkcePair {
                verifier: verifier.into(),
                challenge: challenge.into(),
                method: "S256",
            },
        }
    }
}

impl Challenger for StaticChallenger {
    fn generate(&self) -> PkcePair {
        self.pair.clone()
    }
}

fn generate_code_verifier() -> String {
    let mut buf = [0u8; 64];
    for chunk in buf.chunks_mut(16) {
        let id = uuid::Uuid::new_v4();
        chunk.copy_from_slice(id.as_bytes());
    }
    URL_SAFE_NO_PAD.encode(buf)
}

pub fn compute_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_unpadded_base64url_sha256_of_verifier() {
        for _ in 0..32 {
            let pair = S256Challenger.generate();
            let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pair.verifier.as_bytes()));
            assert_eq!(pair.challenge, expected);
            assert!(!pair.challenge.contains('='));
            assert!(!pair.verifier.contains('='));
            assert_eq!(pair.method, "S256");
        }
    }

    #[test]
    fn verifier_length_is_within_rfc_bounds() {
        let pair = S256Challenger.generate();
        // 64 bytes encode to 86 characters; RFC 7636 allows 43..=128.
        assert_eq!(pair.verifier.len(), 86);
    }

    #[test]
    fn each_flow_gets_a_fresh_verifier() {
        let a = S256Challenger.generate();
        let b = S256Challenger.generate();
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn known_vector_matches_rfc_7636_appendix_b() {
        assert_eq!(
            compute_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGjSstw-cM"
        );
    }
}
