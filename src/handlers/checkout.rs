use crate::error::AppError;
use crate::middlewares::get_current_user_id;
use crate::models::*;
use crate::services::{CheckoutService, OrderService};
use uuid::Uuid;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/checkout/validate",
    tag = "checkout",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "购物车可用性检查结果", body = CheckoutValidation),
        (status = 401, description = "未授权")
    )
)]
pub async fn validate_checkout(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let Some(user_id) = get_current_user_id(&req) else {
        return Ok(AppError::AuthError("Missing user".into()).error_response());
    };

    match checkout_service.validate_cart(user_id).await {
        Ok(validation) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": validation
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/checkout/complete",
    tag = "checkout",
    request_body = CheckoutRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "下单成功; 卡支付时返回 redirect_url", body = CheckoutResponse),
        (status = 400, description = "购物车/支付方式/余额校验失败"),
        (status = 409, description = "票已售罄"),
        (status = 503, description = "票号分配失败, 可重试")
    )
)]
pub async fn complete_checkout(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse> {
    let Some(user_id) = get_current_user_id(&req) else {
        return Ok(AppError::AuthError("Missing user".into()).error_response());
    };

    match checkout_service
        .complete_checkout(user_id, &body.payment_method)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/checkout/orders/{order_id}/reconcile",
    tag = "checkout",
    params(
        ("order_id" = Uuid, Path, description = "卡支付订单ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "向网关查询支付状态后的订单", body = Order),
        (status = 400, description = "非卡支付订单或无支付任务"),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn reconcile_card_order(
    checkout_service: web::Data<CheckoutService>,
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let Some(user_id) = get_current_user_id(&req) else {
        return Ok(AppError::AuthError("Missing user".into()).error_response());
    };
    let order_id = path.into_inner();

    // 只能查询自己的订单
    if let Err(e) = order_service.get_user_order(user_id, order_id).await {
        return Ok(e.error_response());
    }

    match checkout_service.reconcile_card_order(order_id).await {
        Ok(order) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn checkout_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/checkout")
            .route("/validate", web::post().to(validate_checkout))
            .route("/complete", web::post().to(complete_checkout))
            .route(
                "/orders/{order_id}/reconcile",
                web::post().to(reconcile_card_order),
            ),
    );
}
