use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::security;

/// Longest accepted product name, in characters.
pub const MAX_ITEM_NAME_LEN: usize = 64;
/// Shortest accepted product name after sanitization.
pub const MIN_ITEM_NAME_LEN: usize = 2;
/// Longest accepted checkout reference, in characters.
pub const MAX_REFERENCE_LEN: usize = 64;

static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^order_\d+_[a-f0-9]{8}$").unwrap());

/// One cart line as submitted by the storefront client. Untrusted until it
/// passes [`validate_items`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Livro A",
    "price": 29.90,
    "quantity": 2,
    "image": "https://cdn.livraria.example/livro-a.jpg",
    "handle": "livro-a"
}))]
pub struct CartItem {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

/// Validates and sanitizes a submitted cart. Any single invalid line rejects
/// the whole cart; the error names the offending item by its 1-based
/// position so the client can fix the request.
pub fn validate_items(items: &[CartItem]) -> Result<Vec<CartItem>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "cart must contain at least one item".to_string(),
        ));
    }

    let mut sanitized = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let position = index + 1;

        let name = security::sanitize_string(&item.name, MAX_ITEM_NAME_LEN);
        if name.chars().count() < MIN_ITEM_NAME_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Item {} has an invalid name",
                position
            )));
        }
        if !security::is_valid_price(item.price) {
            return Err(ServiceError::ValidationError(format!(
                "Item {} has an invalid price",
                position
            )));
        }
        if !security::is_valid_quantity(i64::from(item.quantity)) {
            return Err(ServiceError::ValidationError(format!(
                "Item {} has an invalid quantity",
                position
            )));
        }

        sanitized.push(CartItem {
            name,
            price: item.price.round_dp(2),
            quantity: item.quantity,
            image: item
                .image
                .as_deref()
                .map(|value| security::sanitize_string(value, 512))
                .filter(|value| !value.is_empty()),
            handle: item
                .handle
                .as_deref()
                .map(|value| security::sanitize_string(value, 128))
                .filter(|value| !value.is_empty()),
        });
    }

    Ok(sanitized)
}

/// Generates a globally-unique checkout reference of the form
/// `order_<unix-millis>_<8 hex chars>`. The reference is the idempotency key
/// threaded through the payment processor and both reconciliation paths.
pub fn generate_reference_id() -> String {
    let timestamp = Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen();
    format!("order_{}_{:08x}", timestamp, nonce)
}

/// Whether `value` matches the reference naming convention established by
/// the checkout session creator. Anything else did not originate here.
pub fn is_checkout_reference(value: &str) -> bool {
    REFERENCE_PATTERN.is_match(value)
}

/// URL-safe handle derived from a product name, used when the client did
/// not supply one.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}
