use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{PaymentMethod, PaymentStatus, WalletType};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::checkout::validate_checkout,
        handlers::checkout::complete_checkout,
        handlers::checkout::reconcile_card_order,
        handlers::order::get_orders,
        handlers::order::get_order,
        handlers::wallet::get_wallet,
        handlers::webhook::cashflows_webhook,
    ),
    components(
        schemas(
            CheckoutRequest,
            CheckoutResponse,
            CheckoutValidation,
            CompetitionTickets,
            InstantWinGroup,
            CartLine,
            Order,
            OrderQuery,
            WalletBalances,
            WalletType,
            PaymentMethod,
            PaymentStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Checkout and ticket allocation API"),
        (name = "order", description = "Order history API"),
        (name = "wallet", description = "Wallet balance API"),
        (name = "webhook", description = "Payment gateway callbacks"),
    ),
    info(
        title = "Prize Draw Backend API",
        version = "1.0.0",
        description = "Ticket allocation and checkout settlement REST API"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
