use crate::middlewares::current_user;
use crate::models::*;
use crate::services::PointsLedger;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/points/balance",
    tag = "points",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "积分余额", body = PointsBalanceResponse),
        (status = 401, description = "未授权"),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_balance(
    ledger: web::Data<PointsLedger>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match ledger.balance(&user.user_id).await {
        Ok(balance) => Ok(HttpResponse::Ok().json(ApiResponse::success(balance))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/points/history",
    tag = "points",
    params(LimitOffsetParams),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "积分流水", body = PointsHistoryResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn get_points_history(
    ledger: web::Data<PointsLedger>,
    req: HttpRequest,
    query: web::Query<LimitOffsetParams>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match ledger.history(&user.user_id, &query).await {
        Ok(history) => Ok(HttpResponse::Ok().json(ApiResponse::success(history))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn points_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/points")
            .route("/balance", web::get().to(get_balance))
            .route("/history", web::get().to(get_points_history)),
    );
}
