use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers;
use crate::models::CartItem;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "livraria-api",
        description = "Checkout, payment reconciliation, and purchase history for the Livraria storefront"
    ),
    paths(
        handlers::checkout::create_checkout_session,
        handlers::payment_webhooks::payment_webhook,
        handlers::purchases::record_purchase,
        handlers::purchases::list_purchases,
    ),
    components(schemas(
        CartItem,
        ErrorResponse,
        crate::services::checkout::CreateCheckoutSessionRequest,
        crate::services::checkout::CheckoutSessionResponse,
        crate::handlers::payment_webhooks::WebhookAck,
        crate::handlers::purchases::RecordPurchaseRequest,
        crate::handlers::purchases::RecordPurchaseResponse,
        crate::handlers::purchases::PurchaseRecord,
    )),
    tags(
        (name = "Checkout", description = "Checkout session creation"),
        (name = "Payments", description = "Payment processor callbacks"),
        (name = "Purchases", description = "Purchase history recording and retrieval"),
    )
)]
pub struct ApiDoc;

/// Swagger UI router serving the generated document at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
