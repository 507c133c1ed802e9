use axum::extract::{Json, Query, State};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::entities::purchase_history;
use crate::errors::ServiceError;
use crate::handlers::common::{enforce_rate_limit, PaginationParams};
use crate::models::CartItem;
use crate::{ApiResponse, AppState, PaginatedResponse};

/// Request body sent by the success-redirect page.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPurchaseRequest {
    pub reference_id: String,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPurchaseResponse {
    pub success: bool,
    pub records_count: usize,
}

/// One purchase-history row as exposed to the order-history surfaces.
#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseRecord {
    pub order_id: String,
    pub product_handle: String,
    pub product_title: String,
    pub product_image: Option<String>,
    pub product_price: Decimal,
    pub quantity: i32,
    pub purchased_at: DateTime<Utc>,
}

impl From<purchase_history::Model> for PurchaseRecord {
    fn from(model: purchase_history::Model) -> Self {
        Self {
            order_id: model.order_id,
            product_handle: model.product_handle,
            product_title: model.product_title,
            product_image: model.product_image,
            product_price: model.product_price,
            quantity: model.quantity,
            purchased_at: model.purchased_at,
        }
    }
}

/// Record purchase history from the success-redirect page.
///
/// This is the fallback (and, for some checkouts, the primary) path for
/// converting a completed payment into history records. Requires an
/// authenticated caller; the idempotency check makes repeat submissions
/// safe.
#[utoipa::path(
    post,
    path = "/api/v1/purchases/record",
    request_body = RecordPurchaseRequest,
    responses(
        (status = 200, description = "Purchase recorded", body = RecordPurchaseResponse),
        (status = 400, description = "Malformed request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Purchases"
)]
pub async fn record_purchase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<RecordPurchaseRequest>,
) -> Result<Json<RecordPurchaseResponse>, ServiceError> {
    enforce_rate_limit(
        &state,
        &format!("purchases:user:{}", user.user_id),
        state.config.recorder_rate_limit,
        "purchases_record",
    )
    .await?;

    let records_count = state
        .reconciliation_service
        .record_client_purchase(user.user_id, &request.reference_id, &request.items)
        .await?;

    Ok(Json(RecordPurchaseResponse {
        success: true,
        records_count,
    }))
}

/// List the caller's purchase history, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/purchases",
    params(PaginationParams),
    responses(
        (status = 200, description = "Purchase history", body = crate::ApiResponse<crate::PaginatedResponse<PurchaseRecord>>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Purchases"
)]
pub async fn list_purchases(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<PurchaseRecord>>>, ServiceError> {
    let per_page = params.per_page.max(1);
    let (records, total) = state
        .purchase_history_service
        .list_for_user(user.user_id, params.page, per_page)
        .await?;

    let response = PaginatedResponse {
        items: records.into_iter().map(PurchaseRecord::from).collect(),
        total,
        page: params.page,
        limit: per_page,
        total_pages: (total + per_page - 1) / per_page,
    };

    Ok(Json(ApiResponse::success(response)))
}
