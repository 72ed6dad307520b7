use crate::error::AppError;
use crate::middlewares::get_current_user_id;
use crate::services::WalletService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/wallet",
    tag = "wallet",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "钱包余额 (便士)", body = crate::models::WalletBalances),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_wallet(
    wallet_service: web::Data<WalletService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let Some(user_id) = get_current_user_id(&req) else {
        return Ok(AppError::AuthError("Missing user".into()).error_response());
    };

    match wallet_service.get_balances(user_id).await {
        Ok(balances) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": balances
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn wallet_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/wallet", web::get().to(get_wallet));
}
