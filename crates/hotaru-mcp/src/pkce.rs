//! PKCE (RFC 7636) code generation for the OAuth 2.1 authorization code flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct PkceCodes {
	pub verifier: String,
	pub challenge: String,
}

impl PkceCodes {
	pub fn generate() -> Self {
		let mut bytes = [0u8; 64];
		rand::rng().fill_bytes(&mut bytes);

		let verifier = URL_SAFE_NO_PAD.encode(bytes);
		let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

		Self { verifier, challenge }
	}
}

/// A random `state` value binding an authorization request to its callback.
pub fn generate_state() -> String {
	let mut bytes = [0u8; 32];
	rand::rng().fill_bytes(&mut bytes);
	URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pkce_codes_are_valid_length() {
		let codes = PkceCodes::generate();
		assert!(codes.verifier.len() >= 43 && codes.verifier.len() <= 128);
		assert_eq!(codes.challenge.len(), 43);
	}

	#[test]
	fn challenge_matches_verifier_hash() {
		let codes = PkceCodes::generate();
		let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(codes.verifier.as_bytes()));
		assert_eq!(codes.challenge, expected);
	}

	#[test]
	fn pkce_codes_and_state_are_unique() {
		let a = PkceCodes::generate();
		let b = PkceCodes::generate();
		assert_ne!(a.verifier, b.verifier);
		assert_ne!(generate_state(), generate_state());
	}
}
