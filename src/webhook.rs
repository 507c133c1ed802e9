//! Wire formats for inbound payment-processor notifications.
//!
//! The processor has shipped more than one payload shape over its API
//! versions, so decoding is a tagged choice over the known variants rather
//! than format sniffing scattered through the handler: the current JSON
//! charge notification, the legacy form-urlencoded encoding, and a catch-all
//! for anything this service will never understand (acknowledged upstream so
//! the processor stops retrying it).

use serde::Deserialize;

#[derive(Debug, Clone)]
pub enum WebhookNotification {
    Charge(ChargeNotification),
    Legacy(LegacyNotification),
    Unrecognized,
}

/// Current JSON notification: a charge list plus an optional top-level
/// status for single-charge events.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeNotification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "referenceId", alias = "external_id")]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub charges: Vec<ChargeStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeStatus {
    #[serde(default)]
    pub status: Option<String>,
}

/// Legacy form-urlencoded notification carrying only a reference and a
/// flat status field.
#[derive(Debug, Clone)]
pub struct LegacyNotification {
    pub reference_id: String,
    pub status: Option<String>,
}

impl WebhookNotification {
    pub fn reference_id(&self) -> Option<&str> {
        match self {
            Self::Charge(charge) => charge.reference_id.as_deref(),
            Self::Legacy(legacy) => Some(legacy.reference_id.as_str()),
            Self::Unrecognized => None,
        }
    }

    /// Payment success means any charge reports a paid or authorized state.
    /// Anything else is a progress notification; the processor delivers a
    /// later one when the status changes.
    pub fn is_paid(&self) -> bool {
        match self {
            Self::Charge(charge) => {
                charge
                    .charges
                    .iter()
                    .any(|c| c.status.as_deref().map(is_paid_status).unwrap_or(false))
                    || charge.status.as_deref().map(is_paid_status).unwrap_or(false)
            }
            Self::Legacy(legacy) => legacy.status.as_deref().map(is_paid_status).unwrap_or(false),
            Self::Unrecognized => false,
        }
    }
}

fn is_paid_status(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_uppercase().as_str(),
        "PAID" | "AUTHORIZED"
    )
}

/// Decodes a raw notification body, trying the encoding suggested by the
/// content type first and falling back to the other known shape.
pub fn parse(content_type: Option<&str>, body: &[u8]) -> WebhookNotification {
    let prefers_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let decoded = if prefers_form {
        parse_form(body).or_else(|| parse_json(body))
    } else {
        parse_json(body).or_else(|| parse_form(body))
    };

    decoded.unwrap_or(WebhookNotification::Unrecognized)
}

fn parse_json(body: &[u8]) -> Option<WebhookNotification> {
    serde_json::from_slice::<ChargeNotification>(body)
        .ok()
        .map(WebhookNotification::Charge)
}

fn parse_form(body: &[u8]) -> Option<WebhookNotification> {
    let mut reference_id = None;
    let mut status = None;
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "reference_id" | "referenceId" => reference_id = Some(value.into_owned()),
            "status" | "payment_status" => status = Some(value.into_owned()),
            _ => {}
        }
    }
    reference_id.map(|reference_id| {
        WebhookNotification::Legacy(LegacyNotification {
            reference_id,
            status,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_charge_notification_decodes() {
        let body = br#"{"id":"evt_1","reference_id":"order_1_deadbeef","charges":[{"status":"PAID"}]}"#;
        let parsed = parse(Some("application/json"), body);
        assert_eq!(parsed.reference_id(), Some("order_1_deadbeef"));
        assert!(parsed.is_paid());
    }

    #[test]
    fn top_level_status_counts() {
        let body = br#"{"reference_id":"order_1_deadbeef","status":"authorized"}"#;
        let parsed = parse(Some("application/json"), body);
        assert!(parsed.is_paid());

        let body = br#"{"reference_id":"order_1_deadbeef","status":"PENDING"}"#;
        assert!(!parse(Some("application/json"), body).is_paid());
    }

    #[test]
    fn unpaid_charges_are_not_success() {
        let body = br#"{"reference_id":"order_1_deadbeef","charges":[{"status":"PENDING"},{"status":"EXPIRED"}]}"#;
        assert!(!parse(None, body).is_paid());
    }

    #[test]
    fn legacy_form_body_decodes() {
        let body = b"reference_id=order_1_deadbeef&status=PAID";
        let parsed = parse(Some("application/x-www-form-urlencoded"), body);
        assert_eq!(parsed.reference_id(), Some("order_1_deadbeef"));
        assert!(parsed.is_paid());
    }

    #[test]
    fn form_fallback_without_content_type() {
        let body = b"referenceId=order_1_deadbeef&payment_status=paid";
        let parsed = parse(None, body);
        assert_eq!(parsed.reference_id(), Some("order_1_deadbeef"));
        assert!(parsed.is_paid());
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert!(matches!(
            parse(None, b"%%%not-a-payload%%%"),
            WebhookNotification::Unrecognized
        ));
        assert!(matches!(
            parse(Some("application/json"), b"[1,2,3]"),
            WebhookNotification::Unrecognized
        ));
    }

    #[test]
    fn empty_json_object_has_no_reference() {
        let parsed = parse(Some("application/json"), b"{}");
        assert!(matches!(parsed, WebhookNotification::Charge(_)));
        assert_eq!(parsed.reference_id(), None);
        assert!(!parsed.is_paid());
    }
}
