use crate::error::AppError;
use crate::models::WebhookAck;
use crate::services::{PaymentService, WebhookOutcome};
use actix_web::{HttpRequest, HttpResponse, Result, web};
use log::{error, info};
use serde_json::json;

const SIGNATURE_HEADERS: [&str; 3] = ["creem-signature", "x-creem-signature", "signature"];

fn signature_header(req: &HttpRequest) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|v| v.to_str().ok())
}

/// Creem webhook 处理器
///
/// 签名错误返回 401，负载无法解析返回 400；数据库等处理错误返回 500 以便 Creem 重试。
/// 其余情况（包括重复投递、元数据不完整）都应答 200。
#[utoipa::path(
    post,
    path = "/payments/webhook",
    tag = "payments",
    request_body(content = String, description = "Creem 事件原始 JSON", content_type = "application/json"),
    params(
        ("creem-signature" = Option<String>, Header, description = "HMAC-SHA256(secret, body) 十六进制")
    ),
    responses(
        (status = 200, description = "已接收", body = WebhookAck),
        (status = 400, description = "负载格式错误"),
        (status = 401, description = "签名无效"),
        (status = 500, description = "处理失败，等待重试")
    )
)]
pub async fn creem_webhook(
    req: HttpRequest,
    body: web::Bytes,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse> {
    match payment_service
        .handle_webhook(&body, signature_header(&req))
        .await
    {
        Ok(outcome) => {
            if let WebhookOutcome::Credited { user_id, points } = &outcome {
                info!("Webhook credited {points} points to user {user_id}");
            }
            Ok(HttpResponse::Ok().json(WebhookAck { received: true }))
        }
        Err(AppError::InvalidSignature) => Ok(HttpResponse::Unauthorized().json(json!({
            "error": "Invalid signature"
        }))),
        Err(AppError::MalformedPayload(msg)) => Ok(HttpResponse::BadRequest().json(json!({
            "error": format!("Invalid payload: {msg}")
        }))),
        Err(e) => {
            error!("Failed to process webhook event: {e}");
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Webhook processing failed"
            })))
        }
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/creem", web::post().to(creem_webhook)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductCatalog;
    use crate::config::CreemConfig;
    use crate::external::{MockPaymentApiClient, sign_payload};
    use crate::services::PaymentSettings;
    use crate::test_support::{seed_user, setup_db, user_points};
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;

    async fn payment_service() -> (sea_orm::DatabaseConnection, PaymentService) {
        let db = setup_db().await;
        seed_user(&db, "u1", 0).await;
        let creem = CreemConfig {
            popular_product_id: "prod_popular".into(),
            ..Default::default()
        };
        let service = PaymentService::new(
            db.clone(),
            Arc::new(MockPaymentApiClient::new()),
            Arc::new(ProductCatalog::from_config(&creem)),
            PaymentSettings {
                base_url: "http://localhost:3000".into(),
                webhook_secret: "whsec_test".into(),
                require_signature: true,
            },
        );
        (db, service)
    }

    fn event_body() -> String {
        json!({
            "id": "evt_1",
            "eventType": "checkout.completed",
            "object": {"id": "cs_1", "metadata": {"userId": "u1", "points": "300"}}
        })
        .to_string()
    }

    #[actix_web::test]
    async fn test_invalid_signature_is_rejected_with_401() {
        let (db, service) = payment_service().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(webhook_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook/creem")
            .insert_header(("creem-signature", "deadbeef"))
            .set_payload(event_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(user_points(&db, "u1").await, 0);
    }

    #[actix_web::test]
    async fn test_signed_event_is_acknowledged_and_credited() {
        let (db, service) = payment_service().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(webhook_config),
        )
        .await;

        let body = event_body();
        let sig = sign_payload(body.as_bytes(), "whsec_test").unwrap();
        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/webhook/creem")
                .insert_header(("x-creem-signature", sig.clone()))
                .set_payload(body.clone())
                .to_request();
            let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(resp["received"], true);
        }
        assert_eq!(user_points(&db, "u1").await, 300);
    }

    #[actix_web::test]
    async fn test_garbage_body_is_rejected_with_400() {
        let (_db, service) = payment_service().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(webhook_config),
        )
        .await;

        let body = "not json";
        let sig = sign_payload(body.as_bytes(), "whsec_test").unwrap();
        let req = test::TestRequest::post()
            .uri("/webhook/creem")
            .insert_header(("creem-signature", sig))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
