use sha2::{Digest, Sha256};

const STRETCHING_ROUNDS: usize = 10;

/// Hex encoded SHA-256 of `password`, stretched by re-hashing the digest.
pub fn hash_password(password: &str) -> String {
    let mut digest = Sha256::digest(password.as_bytes());
    for _ in 1..STRETCHING_ROUNDS {
        digest = Sha256::digest(digest);
    }
    hex::encode(digest)
}
