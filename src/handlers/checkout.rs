use axum::{
    extract::{Json, State},
    http::HeaderMap,
};

use crate::errors::ServiceError;
use crate::handlers::common::{client_ip, enforce_rate_limit};
use crate::services::checkout::{CheckoutSessionResponse, CreateCheckoutSessionRequest};
use crate::AppState;

/// Create a payment-processor checkout session from the client's cart.
///
/// Anonymous callers are permitted; a bearer token, when present, ties the
/// eventual purchase history to the caller's account.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    request_body = CreateCheckoutSessionRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>, ServiceError> {
    let ip = client_ip(&headers);
    enforce_rate_limit(
        &state,
        &format!("checkout:ip:{}", ip),
        state.config.checkout_rate_limit,
        "checkout",
    )
    .await?;

    let user_id = state.auth.resolve_user(&headers);

    let response = state.checkout_service.create_session(user_id, request).await?;
    Ok(Json(response))
}
