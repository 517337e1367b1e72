//! Token generation, hashing and single-use action tokens

mod action_tokens;

use sha2::{Digest, Sha256};

pub use action_tokens::{
    issue_action_token, issue_action_token_at, verify_action_token, verify_action_token_at, ActionKind,
    IssuedActionToken, ACTION_TOKEN_TTL_MS,
};

const TOKEN_BYTES: usize = 32;

/// Random 64-character hex token
pub fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a token, hex encoded. Only this form is ever stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
