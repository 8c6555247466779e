//! Login digest computation for the salted challenge-response handshake.
//!
//! The backup server hands out a `salt` and a random nonce (`rnd`) and checks
//! the digest independently, so both functions here must stay byte-for-byte
//! compatible with its computation. All output is lowercase hex.

use sha2::Sha256;

/// Length in bytes of the PBKDF2 derived key.
const PBKDF2_KEY_LEN: usize = 32;

/// Digest for servers that do not request iterated hashing.
///
/// `MD5(nonce || hex(MD5(salt || secret)))`.
pub fn compute_legacy_response(salt: &str, secret: &str, nonce: &str) -> String {
    let inner = hex::encode(salted_secret(salt, secret));
    md5_hex(&[nonce.as_bytes(), inner.as_bytes()])
}

/// Digest for servers that advertise `pbkdf2_rounds`.
///
/// The binary `MD5(salt || secret)` is the PBKDF2-HMAC-SHA256 password, `salt`
/// is the PBKDF2 salt. The hex-encoded 32-byte key is then hashed with the
/// nonce like the legacy variant.
pub fn compute_iterated_response(salt: &str, secret: &str, nonce: &str, rounds: u32) -> String {
    let password = salted_secret(salt, secret);
    let mut key = [0u8; PBKDF2_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(&password, salt.as_bytes(), rounds, &mut key);
    let inner = hex::encode(key);
    md5_hex(&[nonce.as_bytes(), inner.as_bytes()])
}

/// Binary `MD5(salt || secret)`.
fn salted_secret(salt: &str, secret: &str) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    ctx.consume(salt.as_bytes());
    ctx.consume(secret.as_bytes());
    ctx.compute().0
}

fn md5_hex(parts: &[&[u8]]) -> String {
    let mut ctx = md5::Context::new();
    for part in parts {
        ctx.consume(*part);
    }
    hex::encode(ctx.compute().0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_known_vector() {
        assert_eq!(
            compute_legacy_response("abc123", "admin", "xyz789"),
            "1a74d094f9d397081db6104326745b85"
        );
    }

    #[test]
    fn test_salted_secret_matches_plain_md5() {
        assert_eq!(
            hex::encode(salted_secret("abc123", "admin")),
            "abfd94b664e5d264b108586574c7869d"
        );
    }

    #[test]
    fn test_iterated_known_vectors() {
        assert_eq!(
            compute_iterated_response("abc123", "admin", "xyz789", 1),
            "ec94317715fd0af2c661a32bad81b5a4"
        );
        assert_eq!(
            compute_iterated_response("abc123", "admin", "xyz789", 10000),
            "95da44c57ed2290494da8624c89ff885"
        );
    }

    #[test]
    fn test_deterministic() {
        let a = compute_iterated_response("s", "secret", "n", 1000);
        let b = compute_iterated_response("s", "secret", "n", 1000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, compute_legacy_response("s", "secret", "n"));
    }

    #[test]
    fn test_nonce_changes_digest() {
        assert_ne!(
            compute_legacy_response("abc123", "admin", "xyz789"),
            compute_legacy_response("abc123", "admin", "xyz790")
        );
    }
}
