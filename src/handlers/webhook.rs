use crate::services::CheckoutService;
use actix_web::{HttpRequest, HttpResponse, Result, web};
use log::{error, info, warn};
use serde::Deserialize;
use uuid::Uuid;

/// Payment status notification posted by Cashflows.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowsNotification {
    pub status: String,
    #[serde(default)]
    pub payment_reference: Option<String>,
    /// The order id we sent as the job's reference.
    pub order_reference: String,
}

/// Cashflows webhook处理器
///
/// 校验签名后把支付结果交给结算流程; 同一通知可能重复送达
#[utoipa::path(
    post,
    path = "/webhooks/cashflows",
    tag = "webhook",
    responses(
        (status = 200, description = "已接收"),
        (status = 400, description = "无效的请求体"),
        (status = 401, description = "签名无效")
    )
)]
pub async fn cashflows_webhook(
    req: HttpRequest,
    body: web::Bytes,
    checkout_service: web::Data<CheckoutService>,
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !checkout_service
        .card_payments()
        .verify_webhook(&body, signature)
    {
        warn!("Rejected Cashflows webhook with invalid signature");
        return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid signature"
        })));
    }

    let notification: CashflowsNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            warn!("Invalid Cashflows webhook payload: {e}");
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid payload"
            })));
        }
    };

    let Ok(order_id) = notification.order_reference.parse::<Uuid>() else {
        warn!(
            "Cashflows webhook for unknown order reference '{}'",
            notification.order_reference
        );
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Unknown order reference"
        })));
    };

    info!(
        "Received Cashflows webhook: order {order_id}, status '{}', payment {:?}",
        notification.status, notification.payment_reference
    );

    match checkout_service
        .confirm_card_payment(order_id, &notification.status)
        .await
    {
        Ok(order) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "received": true,
            "payment_status": order.payment_status
        }))),
        Err(e) => {
            error!("Failed to process Cashflows webhook for order {order_id}: {e}");
            // 返回200状态码避免网关无限重试，但记录错误
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "received": true,
                "error": format!("Processing failed: {e}")
            })))
        }
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks").route("/cashflows", web::post().to(cashflows_webhook)),
    );
}
