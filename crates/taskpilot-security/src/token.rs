use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use base64::Engine;
use chrono::Utc;
use ring::hmac;
use serde::{Deserialize, Serialize};
use taskpilot_common::{Error, Result, UserId};

/// Signed claims carried inside a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id the token authenticates.
    pub sub: String,
    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,
}

/// Issues and verifies HMAC-SHA256 signed bearer tokens.
///
/// Wire format is `<claims-b64url>.<signature-b64url>`; the claims payload is
/// plain JSON, the signature covers the encoded payload bytes.
pub struct TokenSigner {
    key: hmac::Key,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_secs: i64) -> Result<Self> {
        if secret.len() < 16 {
            return Err(Error::Config(
                "token secret must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            ttl_secs,
        })
    }

    /// Issue a token for `user_id` expiring `ttl_secs` from now.
    pub fn issue(&self, user_id: &UserId) -> Result<String> {
        let claims = TokenClaims {
            sub: user_id.as_str().to_string(),
            exp: Utc::now().timestamp() + self.ttl_secs,
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| Error::Auth(format!("failed to encode claims: {e}")))?;
        let payload_b64 = BASE64URL.encode(payload);
        let signature = hmac::sign(&self.key, payload_b64.as_bytes());

        Ok(format!("{payload_b64}.{}", BASE64URL.encode(signature)))
    }

    /// Verify a token's signature and expiry, returning the subject user id.
    pub fn verify(&self, token: &str) -> Result<UserId> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| Error::Auth("malformed token".to_string()))?;

        let signature = BASE64URL
            .decode(signature_b64)
            .map_err(|_| Error::Auth("malformed token signature".to_string()))?;

        hmac::verify(&self.key, payload_b64.as_bytes(), &signature)
            .map_err(|_| Error::Auth("invalid token signature".to_string()))?;

        let payload = BASE64URL
            .decode(payload_b64)
            .map_err(|_| Error::Auth("malformed token payload".to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| Error::Auth("malformed token claims".to_string()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(Error::Auth("token expired".to_string()));
        }

        Ok(UserId::from(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(ttl_secs: i64) -> TokenSigner {
        TokenSigner::new("a-sufficiently-long-test-secret", ttl_secs)
            .expect("signer should construct")
    }

    #[test]
    fn issue_then_verify_returns_subject() {
        let signer = signer(3600);
        let user_id = UserId::new();

        let token = signer.issue(&user_id).expect("issue should succeed");
        let verified = signer.verify(&token).expect("verify should succeed");
        assert_eq!(verified, user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = signer(-1);
        let token = signer.issue(&UserId::new()).unwrap();

        let err = signer.verify(&token).expect_err("expired token must fail");
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let signer = signer(3600);
        let token = signer.issue(&UserId::new()).unwrap();

        let (payload, signature) = token.split_once('.').unwrap();
        let mut forged_payload = payload.to_string();
        forged_payload.push('A');
        let forged = format!("{forged_payload}.{signature}");

        assert!(signer.verify(&forged).is_err());
        assert!(signer.verify("not-a-token").is_err());
        assert!(signer.verify("").is_err());
    }

    #[test]
    fn tokens_do_not_verify_across_secrets() {
        let a = signer(3600);
        let b = TokenSigner::new("another-long-enough-secret!!", 3600).unwrap();

        let token = a.issue(&UserId::new()).unwrap();
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn short_secret_is_rejected_at_construction() {
        assert!(TokenSigner::new("short", 3600).is_err());
    }
}
