pub mod checkout;
pub mod common;
pub mod payment_webhooks;
pub mod purchases;
