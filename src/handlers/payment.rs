use crate::catalog::PointsProduct;
use crate::handlers::webhook::creem_webhook;
use crate::middlewares::current_user;
use crate::models::*;
use crate::services::PaymentService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/payments/checkout",
    tag = "payments",
    request_body = CreateCheckoutRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建 checkout 成功", body = CreateCheckoutResponse),
        (status = 400, description = "积分套餐无效"),
        (status = 401, description = "未授权"),
        (status = 500, description = "支付产品未配置")
    )
)]
pub async fn create_checkout(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    request: web::Json<CreateCheckoutRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match payment_service
        .create_checkout(&user.user_id, request.points)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/payments/products",
    tag = "payments",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "可购买的积分套餐", body = [PointsProduct])
    )
)]
pub async fn list_products(payment_service: web::Data<PaymentService>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(payment_service.products())))
}

pub fn payment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/products", web::get().to(list_products))
            .route("/checkout", web::post().to(create_checkout))
            .route("/webhook", web::post().to(creem_webhook)),
    );
}
