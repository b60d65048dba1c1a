//! Platform webhook HMAC and decimal-amount parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use splitpay_core::Result;
use splitpay_core::error::SplitPayError;

type HmacSha256 = Hmac<Sha256>;

/// Verify a platform delivery: base64(HMAC-SHA256(secret, raw_body)) must
/// equal the `X-Shopify-Hmac-Sha256` header, compared in constant time.
///
/// # Errors
///
/// Returns [`SplitPayError::InvalidSignature`] on any mismatch.
pub fn verify_platform_hmac(raw_body: &[u8], hmac_header: &str, secret: &str) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SplitPayError::InvalidSignature)?;
    mac.update(raw_body);
    let expected = BASE64.encode(mac.finalize().into_bytes());

    if constant_time_eq(expected.as_bytes(), hmac_header.trim().as_bytes()) {
        Ok(())
    } else {
        Err(SplitPayError::InvalidSignature)
    }
}

/// Parse a platform decimal money string (`"150.00"`) into cents.
///
/// The platform reports totals as decimal strings; floats would lose cents,
/// so this parses digits directly. At most two fraction digits are
/// accepted; a shorter fraction is right-padded (`"1.5"` → 150).
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] on malformed or negative input.
pub fn parse_decimal_cents(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    let malformed = || SplitPayError::Validation(format!("malformed money amount '{raw}'"));

    let (whole, fraction) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };

    if whole.is_empty() || whole.starts_with('-') || fraction.len() > 2 {
        return Err(malformed());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let whole: i64 = whole.parse().map_err(|_| malformed())?;
    let fraction_cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| malformed())? * 10,
        _ => fraction.parse().map_err(|_| malformed())?,
    };

    whole
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(fraction_cents))
        .ok_or_else(malformed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn test_hmac_round_trip() {
        let secret = "shpss_secret";
        let body = br#"{"id": 1}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let header = BASE64.encode(mac.finalize().into_bytes());

        assert!(verify_platform_hmac(body, &header, secret).is_ok());
        assert!(verify_platform_hmac(body, &header, "wrong").is_err());
        assert!(verify_platform_hmac(b"other body", &header, secret).is_err());
        assert!(verify_platform_hmac(body, "not-base64!", secret).is_err());
    }

    #[test]
    fn test_decimal_cents() {
        assert_eq!(parse_decimal_cents("150.00").unwrap(), 15000);
        assert_eq!(parse_decimal_cents("0.05").unwrap(), 5);
        assert_eq!(parse_decimal_cents("1.5").unwrap(), 150);
        assert_eq!(parse_decimal_cents("7").unwrap(), 700);
        assert_eq!(parse_decimal_cents(" 12.34 ").unwrap(), 1234);
    }

    #[test]
    fn test_decimal_cents_rejects_garbage() {
        assert!(parse_decimal_cents("").is_err());
        assert!(parse_decimal_cents("-1.00").is_err());
        assert!(parse_decimal_cents("1.234").is_err());
        assert!(parse_decimal_cents("12,34").is_err());
        assert!(parse_decimal_cents("abc").is_err());
        assert!(parse_decimal_cents(".50").is_err());
    }
}
