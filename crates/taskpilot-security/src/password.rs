use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use taskpilot_common::{Error, Result};

const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Hash a password with PBKDF2-HMAC-SHA256 and a fresh random salt.
///
/// The output encodes everything needed for verification:
/// `pbkdf2$<iterations>$<salt-b64>$<hash-b64>`.
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".to_string()));
    }

    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| Error::Auth("failed to generate salt".to_string()))?;

    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).expect("iterations > 0");
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "pbkdf2${PBKDF2_ITERATIONS}${}${}",
        BASE64.encode(salt),
        BASE64.encode(hash)
    ))
}

/// Verify a password against a stored hash string. Returns `Ok(false)` for a
/// wrong password; `Err` only for a hash that cannot be parsed.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let mut parts = stored.split('$');
    let (scheme, iterations, salt_b64, hash_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(i), Some(salt), Some(hash)) if parts.next().is_none() => {
                (s, i, salt, hash)
            }
            _ => return Err(Error::Auth("malformed password hash".to_string())),
        };

    if scheme != "pbkdf2" {
        return Err(Error::Auth(format!("unknown hash scheme '{scheme}'")));
    }

    let iterations: u32 = iterations
        .parse()
        .map_err(|_| Error::Auth("malformed iteration count".to_string()))?;
    let iterations =
        NonZeroU32::new(iterations).ok_or_else(|| Error::Auth("zero iterations".to_string()))?;

    let salt = BASE64
        .decode(salt_b64)
        .map_err(|_| Error::Auth("malformed salt encoding".to_string()))?;
    let expected = BASE64
        .decode(hash_b64)
        .map_err(|_| Error::Auth("malformed hash encoding".to_string()))?;

    // ring's verify is constant-time over the derived output.
    Ok(pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &expected,
    )
    .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() {
        let stored = hash_password("hunter2!").expect("hashing should succeed");
        assert!(stored.starts_with("pbkdf2$"));

        assert!(verify_password("hunter2!", &stored).unwrap());
        assert!(!verify_password("hunter3!", &stored).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("repeated").unwrap();
        let b = hash_password("repeated").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("repeated", &a).unwrap());
        assert!(verify_password("repeated", &b).unwrap());
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(hash_password("").is_err());
    }

    #[test]
    fn malformed_stored_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("x", "not-a-hash").is_err());
        assert!(verify_password("x", "bcrypt$1$AA$BB").is_err());
        assert!(verify_password("x", "pbkdf2$zero$AA$BB").is_err());
    }
}
