use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// obs-websocket v5 authentication string.
///
/// `secret = base64(sha256(password + salt))`, then `token = base64(sha256(secret + challenge))`.
/// Concatenation is over the UTF-8 bytes with no separator.
pub fn compute_auth_token(password: &str, challenge: &str, salt: &str) -> String {
    let secret = STANDARD.encode(sha256_concat(password, salt));
    STANDARD.encode(sha256_concat(&secret, challenge))
}

fn sha256_concat(left: &str, right: &str) -> impl AsRef<[u8]> {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize()
}
