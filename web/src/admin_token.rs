//! Admin session tokens.
//!
//! The dashboard obtains a token during the platform OAuth flow (outside
//! this service's scope) and presents it on every admin call in the
//! `X-Session-Token` header. The token binds a shop domain to an
//! HMAC-SHA256 tag under the platform API secret:
//! `{shop_domain}.{hex tag}`. Verification is constant-time; the contract
//! here is deliberately minimal.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use splitpay_core::Result;
use splitpay_core::error::SplitPayError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the admin token.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Sign a shop domain into an admin token.
///
/// # Errors
///
/// Returns [`SplitPayError::Internal`] only if the MAC cannot be keyed,
/// which cannot happen with a non-empty secret.
pub fn issue(shop_domain: &str, secret: &str) -> Result<String> {
    Ok(format!("{shop_domain}.{}", tag(shop_domain, secret)?))
}

/// Verify a token and return the shop domain it grants access to.
///
/// # Errors
///
/// Returns [`SplitPayError::InvalidSignature`] on malformed or forged
/// tokens.
pub fn verify(token: &str, secret: &str) -> Result<String> {
    let Some((shop_domain, provided)) = token.rsplit_once('.') else {
        return Err(SplitPayError::InvalidSignature);
    };
    let expected = tag(shop_domain, secret)?;
    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(shop_domain.to_string())
    } else {
        Err(SplitPayError::InvalidSignature)
    }
}

fn tag(shop_domain: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SplitPayError::Internal("failed to key admin token MAC".into()))?;
    mac.update(shop_domain.as_bytes());
    let bytes = mac.finalize().into_bytes();
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let token = issue("demo.myshopify.com", "secret").unwrap();
        assert_eq!(verify(&token, "secret").unwrap(), "demo.myshopify.com");
    }

    #[test]
    fn test_forged_tag_rejected() {
        let token = issue("demo.myshopify.com", "secret").unwrap();
        assert!(verify(&token, "other-secret").is_err());
        assert!(verify("demo.myshopify.com.deadbeef", "secret").is_err());
        assert!(verify("no-dot-here", "secret").is_err());
    }

    #[test]
    fn test_token_binds_shop() {
        // A token for one shop must not grant another.
        let token = issue("a.myshopify.com", "secret").unwrap();
        let forged = token.replace("a.myshopify.com", "b.myshopify.com");
        assert!(verify(&forged, "secret").is_err());
    }
}
