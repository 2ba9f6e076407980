use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::models::normalize_email;

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_COOKIE: &str = "admin_session";

/// Stateless unsubscribe links: `base64url(email) "." base64url(hmac(secret, email))`.
#[derive(Clone)]
pub struct UnsubscribeTokens {
    secret: String,
}

impl UnsubscribeTokens {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, email: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(email.as_bytes());
        Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// `None` only for a blank email.
    pub fn generate(&self, email: &str) -> Option<String> {
        let email = normalize_email(email)?;
        let signature = self.signature(&email)?;
        Some(format!("{}.{}", URL_SAFE_NO_PAD.encode(email.as_bytes()), signature))
    }

    /// The normalised email a token was issued for, or `None` when it is malformed or forged.
    pub fn verify(&self, token: &str) -> Option<String> {
        let (encoded_email, signature) = token.trim().split_once('.')?;
        if encoded_email.is_empty() || signature.is_empty() {
            return None;
        }

        let decoded = URL_SAFE_NO_PAD.decode(encoded_email).ok()?;
        let raw = std::str::from_utf8(&decoded).ok()?;
        // Issued tokens always carry the normalised form.
        let email = normalize_email(raw).filter(|email| email == raw)?;
        let expected = self.signature(&email)?;

        bool::from(expected.as_bytes().ct_eq(signature.as_bytes())).then_some(email)
    }
}

/// Compare a presented admin token against the configured one.
///
/// Both sides are hashed first so the comparison is constant-time regardless of length.
/// An empty configured token never matches.
pub fn verify_admin_token(configured: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided.filter(|p| !p.is_empty()) else {
        return false;
    };
    if configured.is_empty() {
        return false;
    }

    let expected = Sha256::digest(configured.as_bytes());
    let presented = Sha256::digest(provided.as_bytes());
    bool::from(expected.as_slice().ct_eq(presented.as_slice()))
}
