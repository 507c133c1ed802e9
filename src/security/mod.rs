/*!
 * # Security Utilities
 *
 * Shared primitives used by every public endpoint: input sanitization,
 * numeric and identifier validation, HMAC webhook signatures with
 * constant-time comparison, and structured security-event logging.
 */
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Upper bound (exclusive) for any accepted unit price.
pub const MAX_PRICE: Decimal = dec!(1000000);
/// Largest quantity accepted for a single cart line.
pub const MAX_QUANTITY: i64 = 100;

static JS_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript:").unwrap());
static EVENT_HANDLER_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").unwrap());
static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{4}-[0-9a-f]{12}$",
    )
    .unwrap()
});

/// Strips markup and script-injection patterns from untrusted input and
/// truncates the result to `max_length` characters.
///
/// Fails safe: always returns a string, never panics, empty input yields
/// an empty string.
pub fn sanitize_string(input: &str, max_length: usize) -> String {
    let without_brackets: String = input.chars().filter(|c| *c != '<' && *c != '>').collect();
    let without_js = JS_URI.replace_all(&without_brackets, "");
    let without_handlers = EVENT_HANDLER_ATTR.replace_all(&without_js, "");
    without_handlers.trim().chars().take(max_length).collect()
}

/// A price is acceptable iff it is strictly positive and below [`MAX_PRICE`].
pub fn is_valid_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price < MAX_PRICE
}

/// A quantity is acceptable iff it is an integer in `1..=100`.
pub fn is_valid_quantity(quantity: i64) -> bool {
    quantity > 0 && quantity <= MAX_QUANTITY
}

/// RFC 4122 v1-v5 textual UUID check. The nil UUID does not match.
pub fn is_valid_uuid(value: &str) -> bool {
    UUID_PATTERN.is_match(value)
}

/// Hex-encoded SHA-256 HMAC over `payload`.
pub fn create_hmac_signature(payload: &str, secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies an inbound webhook signature against the shared secret.
pub fn verify_webhook_signature(payload: &str, signature: &str, secret: &str) -> bool {
    let expected = create_hmac_signature(payload, secret);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Classified security observations emitted by the request handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SecurityEvent {
    RateLimitExceeded,
    HighValueOrder,
    InvalidWebhookSignature,
    ForeignWebhookReference,
    MalformedWebhookPayload,
}

/// Appends a structured security event to the log stream. Observability
/// only; no functional side effects.
pub fn log_security_event(event: SecurityEvent, details: serde_json::Value) {
    warn!(
        target: "livraria::security",
        event = %event,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        details = %details,
        "security event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_strips_angle_brackets() {
        assert_eq!(
            sanitize_string("<script>alert(1)</script>Livro", 64),
            "scriptalert(1)/scriptLivro"
        );
    }

    #[test]
    fn sanitize_strips_javascript_uris_and_handlers() {
        assert_eq!(sanitize_string("javascript:alert(1)", 64), "alert(1)");
        assert_eq!(sanitize_string("JaVaScRiPt:alert(1)", 64), "alert(1)");
        assert_eq!(sanitize_string("x onerror=steal()", 64), "x steal()");
    }

    #[test]
    fn sanitize_truncates_to_max_length() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_string(&long, 64).len(), 64);
    }

    #[test]
    fn sanitize_empty_input_is_empty() {
        assert_eq!(sanitize_string("", 64), "");
        assert_eq!(sanitize_string("   ", 64), "");
    }

    #[test]
    fn price_bounds() {
        assert!(is_valid_price(dec!(0.01)));
        assert!(is_valid_price(dec!(999999.99)));
        assert!(!is_valid_price(Decimal::ZERO));
        assert!(!is_valid_price(dec!(-1)));
        assert!(!is_valid_price(dec!(1000000)));
        assert!(!is_valid_price(dec!(1000001)));
    }

    #[test]
    fn quantity_bounds() {
        assert!(is_valid_quantity(1));
        assert!(is_valid_quantity(100));
        assert!(!is_valid_quantity(0));
        assert!(!is_valid_quantity(101));
        assert!(!is_valid_quantity(-5));
    }

    #[test]
    fn uuid_pattern_accepts_v4_rejects_garbage() {
        assert!(is_valid_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_uuid("550E8400-E29B-41D4-A716-446655440000"));
        assert!(!is_valid_uuid("not-a-uuid"));
        assert!(!is_valid_uuid("550e8400e29b41d4a716446655440000"));
        // nil UUID has version nibble 0, outside v1-v5
        assert!(!is_valid_uuid("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn hmac_signature_roundtrip() {
        let payload = r#"{"reference_id":"order_1_deadbeef"}"#;
        let signature = create_hmac_signature(payload, "secret");
        assert!(verify_webhook_signature(payload, &signature, "secret"));
        assert!(!verify_webhook_signature(payload, &signature, "other"));
        assert!(!verify_webhook_signature("tampered", &signature, "secret"));
    }

    #[test]
    fn signature_comparison_rejects_unequal_lengths() {
        let signature = create_hmac_signature("payload", "secret");
        assert!(!verify_webhook_signature(
            "payload",
            &signature[..signature.len() - 2],
            "secret"
        ));
    }

    proptest! {
        #[test]
        fn sanitize_never_panics_and_bounds_length(input in ".{0,512}", max in 0usize..128) {
            let out = sanitize_string(&input, max);
            prop_assert!(out.chars().count() <= max);
            prop_assert!(!out.contains('<'));
            prop_assert!(!out.contains('>'));
        }
    }
}
