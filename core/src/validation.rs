//! Structural validation of request inputs.
//!
//! Pure functions, no I/O. These reject malformed identifiers and amounts
//! before any store or provider call happens; operational failures are a
//! different error kind entirely.

use crate::error::{Result, SplitPayError};

/// Platform shop-domain suffix all merchant domains must carry.
const SHOP_DOMAIN_SUFFIX: &str = ".myshopify.com";

/// Maximum number of cards a checkout can ever split across.
pub const MAX_SPLIT_CARDS: usize = 5;

/// Minimum number of cards for a split checkout.
pub const MIN_SPLIT_CARDS: usize = 2;

/// Validate a merchant shop domain (`{label}.myshopify.com`).
///
/// The label may contain ASCII letters, digits and hyphens only.
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the domain is malformed.
pub fn validate_shop_domain(shop_domain: &str) -> Result<()> {
    let Some(label) = shop_domain.strip_suffix(SHOP_DOMAIN_SUFFIX) else {
        return Err(SplitPayError::Validation(format!(
            "shop domain must end with {SHOP_DOMAIN_SUFFIX}"
        )));
    };

    if label.is_empty() {
        return Err(SplitPayError::Validation(
            "shop domain label cannot be empty".into(),
        ));
    }

    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(SplitPayError::Validation(
            "shop domain label contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a platform checkout token: 32–64 ASCII alphanumerics.
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the token is malformed.
pub fn validate_checkout_token(token: &str) -> Result<()> {
    if !(32..=64).contains(&token.len()) {
        return Err(SplitPayError::Validation(format!(
            "checkout token length {} outside 32..=64",
            token.len()
        )));
    }

    if !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SplitPayError::Validation(
            "checkout token contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a single cent amount against a minimum and optional maximum.
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the amount is non-positive,
/// below `min_cents`, or above `max_cents`.
pub fn validate_amount(amount_cents: i64, min_cents: i64, max_cents: Option<i64>) -> Result<()> {
    if amount_cents <= 0 {
        return Err(SplitPayError::Validation(
            "amount must be positive".into(),
        ));
    }

    if amount_cents < min_cents {
        return Err(SplitPayError::Validation(format!(
            "amount {amount_cents} is below the minimum {min_cents}"
        )));
    }

    if let Some(max) = max_cents {
        if amount_cents > max {
            return Err(SplitPayError::Validation(format!(
                "amount {amount_cents} exceeds the maximum {max}"
            )));
        }
    }

    Ok(())
}

/// Validate a full split: 2–5 amounts, each individually valid, summing
/// exactly to `total_cents`.
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] on count, per-amount or sum
/// violations.
pub fn validate_payment_amounts(
    total_cents: i64,
    amounts: &[i64],
    min_cents: i64,
) -> Result<()> {
    if !(MIN_SPLIT_CARDS..=MAX_SPLIT_CARDS).contains(&amounts.len()) {
        return Err(SplitPayError::Validation(format!(
            "split must use {MIN_SPLIT_CARDS} to {MAX_SPLIT_CARDS} cards, got {}",
            amounts.len()
        )));
    }

    for amount in amounts {
        validate_amount(*amount, min_cents, None)?;
    }

    let sum = crate::money::sum_amounts(amounts)
        .ok_or_else(|| SplitPayError::Validation("amount sum overflows".into()))?;
    if sum != total_cents {
        return Err(SplitPayError::Validation(format!(
            "amounts sum to {sum}, expected {total_cents}"
        )));
    }

    Ok(())
}

/// Validate an email address structurally.
///
/// Exactly one `@`, non-empty local and domain parts, a dotted domain with
/// no empty labels, and no control or injection characters. Not full RFC
/// 5322: this guards stored metadata, it does not deliver mail.
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the address is malformed.
pub fn validate_email(email: &str) -> Result<()> {
    if email.len() < 3 || email.len() > 255 {
        return Err(SplitPayError::Validation(
            "email length outside 3..=255".into(),
        ));
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SplitPayError::Validation(
            "email must contain exactly one '@'".into(),
        ));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(SplitPayError::Validation(
            "email local and domain parts cannot be empty".into(),
        ));
    }

    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(SplitPayError::Validation(
            "email domain must be dotted with no empty labels".into(),
        ));
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');
    if !local.chars().all(valid_local) || !domain.chars().all(valid_domain) {
        return Err(SplitPayError::Validation(
            "email contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a client IP (IPv4 or IPv6) structurally.
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the string parses as neither.
pub fn validate_client_ip(ip: &str) -> Result<()> {
    ip.parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| SplitPayError::Validation(format!("'{ip}' is not a valid IP address")))
}

/// Validate a provider payment-intent ID (`pi_` prefix).
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the ID is malformed.
pub fn validate_intent_id(intent_id: &str) -> Result<()> {
    validate_provider_id(intent_id, "pi_")
}

/// Validate a provider payment-method ID (`pm_` prefix).
///
/// # Errors
///
/// Returns [`SplitPayError::Validation`] if the ID is malformed.
pub fn validate_method_id(method_id: &str) -> Result<()> {
    validate_provider_id(method_id, "pm_")
}

fn validate_provider_id(id: &str, prefix: &str) -> Result<()> {
    let Some(body) = id.strip_prefix(prefix) else {
        return Err(SplitPayError::Validation(format!(
            "provider id must start with '{prefix}'"
        )));
    };

    if body.is_empty() || id.len() > 255 {
        return Err(SplitPayError::Validation(
            "provider id body is empty or too long".into(),
        ));
    }

    if !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SplitPayError::Validation(
            "provider id contains invalid characters".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_shop_domains() {
        assert!(validate_shop_domain("demo-store.myshopify.com").is_ok());
        assert!(validate_shop_domain("a.myshopify.com").is_ok());
        assert!(validate_shop_domain("Store123.myshopify.com").is_ok());
    }

    #[test]
    fn test_invalid_shop_domains() {
        assert!(validate_shop_domain("demo.example.com").is_err());
        assert!(validate_shop_domain(".myshopify.com").is_err());
        assert!(validate_shop_domain("demo_store.myshopify.com").is_err());
        assert!(validate_shop_domain("demo store.myshopify.com").is_err());
        assert!(validate_shop_domain("myshopify.com").is_err());
        assert!(validate_shop_domain("").is_err());
    }

    #[test]
    fn test_checkout_token_bounds() {
        assert!(validate_checkout_token(&"a".repeat(32)).is_ok());
        assert!(validate_checkout_token(&"Z9".repeat(32)).is_ok()); // 64 chars
        assert!(validate_checkout_token(&"a".repeat(31)).is_err());
        assert!(validate_checkout_token(&"a".repeat(65)).is_err());
        assert!(validate_checkout_token(&format!("{}-", "a".repeat(31))).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount(100, 100, None).is_ok());
        assert!(validate_amount(99, 100, None).is_err());
        assert!(validate_amount(0, 0, None).is_err());
        assert!(validate_amount(-5, 0, None).is_err());
        assert!(validate_amount(500, 100, Some(400)).is_err());
        assert!(validate_amount(400, 100, Some(400)).is_ok());
    }

    #[test]
    fn test_payment_amounts_card_count() {
        assert!(validate_payment_amounts(200, &[200], 100).is_err());
        assert!(validate_payment_amounts(200, &[100, 100], 100).is_ok());
        assert!(validate_payment_amounts(600, &[100; 6], 100).is_err());
    }

    #[test]
    fn test_payment_amounts_sum_equality() {
        assert!(validate_payment_amounts(15000, &[10000, 5000], 100).is_ok());
        assert!(validate_payment_amounts(15000, &[10000, 4999], 100).is_err());
        assert!(validate_payment_amounts(15000, &[10000, 5001], 100).is_err());
    }

    #[test]
    fn test_email_structural() {
        assert!(validate_email("buyer@example.com").is_ok());
        assert!(validate_email("buyer+tag@sub.example.co.uk").is_ok());
        assert!(validate_email("nope").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b..com").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn test_client_ip() {
        assert!(validate_client_ip("192.168.1.1").is_ok());
        assert!(validate_client_ip("2001:db8::1").is_ok());
        assert!(validate_client_ip("999.1.1.1").is_err());
        assert!(validate_client_ip("not-an-ip").is_err());
    }

    #[test]
    fn test_provider_id_prefixes() {
        assert!(validate_intent_id("pi_3OqAbCdEfGh").is_ok());
        assert!(validate_intent_id("pm_3OqAbCdEfGh").is_err());
        assert!(validate_intent_id("pi_").is_err());
        assert!(validate_intent_id("pi_abc def").is_err());
        assert!(validate_method_id("pm_1NxYz").is_ok());
        assert!(validate_method_id("card_123").is_err());
    }
}
