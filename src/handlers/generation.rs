use crate::catalog::GenerationCatalog;
use crate::error::AppError;
use crate::middlewares::current_user;
use crate::models::*;
use crate::services::GenerationService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use chrono::Utc;

#[utoipa::path(
    post,
    path = "/generate",
    tag = "generation",
    request_body = GenerateImageRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "任务已提交", body = GenerateImageResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 403, description = "积分不足"),
        (status = 500, description = "生成服务失败，积分已退回")
    )
)]
pub async fn submit_generation(
    generation_service: web::Data<GenerationService>,
    req: HttpRequest,
    request: web::Json<GenerateImageRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match generation_service
        .submit(&user.user_id, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/generate/config",
    tag = "generation",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "生成参数与轮询策略", body = GenerationCatalog)
    )
)]
pub async fn get_generation_config(
    generation_service: web::Data<GenerationService>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(generation_service.config())))
}

#[utoipa::path(
    get,
    path = "/generate/status",
    tag = "generation",
    params(TaskStatusQuery),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "任务状态", body = TaskStatusView),
        (status = 400, description = "缺少 task_id", body = TypedApiError),
        (status = 403, description = "无权访问该任务", body = TypedApiError),
        (status = 404, description = "任务不存在", body = TypedApiError)
    )
)]
pub async fn get_task_status(
    generation_service: web::Data<GenerationService>,
    req: HttpRequest,
    query: web::Query<TaskStatusQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.typed_error_response()),
    };
    let Some(task_id) = query.task_id.as_deref().filter(|id| !id.is_empty()) else {
        return Ok(AppError::ValidationError("task_id is required".into()).typed_error_response());
    };
    let Some(language) = resolve_language(query.language.as_deref()) else {
        return Ok(AppError::ValidationError("Unsupported language".into()).typed_error_response());
    };

    match generation_service
        .refresh_status(task_id, &user.user_id, language)
        .await
    {
        Ok(snapshot) => Ok(HttpResponse::Ok().json(ApiResponse::success(snapshot.to_status_view()))),
        Err(e) => Ok(e.typed_error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/generate/status/{task_id}",
    tag = "generation",
    params(
        ("task_id" = String, Path, description = "第三方任务ID"),
        TaskLanguageQuery
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "第三方格式的任务文档", body = ProviderTaskDocument),
        (status = 400, description = "不支持的语言", body = TypedApiError),
        (status = 403, description = "无权访问该任务", body = TypedApiError),
        (status = 404, description = "任务不存在", body = TypedApiError)
    )
)]
pub async fn get_task_document(
    generation_service: web::Data<GenerationService>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<TaskLanguageQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.typed_error_response()),
    };
    let Some(language) = resolve_language(query.language.as_deref()) else {
        return Ok(AppError::ValidationError("Unsupported language".into()).typed_error_response());
    };

    match generation_service
        .refresh_status(&path.into_inner(), &user.user_id, language)
        .await
    {
        Ok(snapshot) => Ok(HttpResponse::Ok().json(snapshot.to_provider_document(Utc::now()))),
        Err(e) => Ok(e.typed_error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/generate/history",
    tag = "generation",
    params(LimitOffsetParams),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "生成历史", body = GenerationHistoryResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn get_generation_history(
    generation_service: web::Data<GenerationService>,
    req: HttpRequest,
    query: web::Query<LimitOffsetParams>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match generation_service.history(&user.user_id, &query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn generation_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/generate")
            .route("", web::post().to(submit_generation))
            .route("/config", web::get().to(get_generation_config))
            .route("/status", web::get().to(get_task_status))
            .route("/status/{task_id}", web::get().to(get_task_document))
            .route("/history", web::get().to(get_generation_history)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::external::MockGenerationApiClient;
    use crate::middlewares::AuthMiddleware;
    use crate::test_support::{seed_user, setup_db};
    use crate::utils::JwtService;
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;

    fn jwt() -> JwtService {
        JwtService::new("test-secret", 3600)
    }

    async fn generation_service() -> GenerationService {
        generation_service_with(MockGenerationApiClient::new(), 0).await
    }

    async fn generation_service_with(
        mock: MockGenerationApiClient,
        points: i64,
    ) -> GenerationService {
        let db = setup_db().await;
        seed_user(&db, "u1", points).await;
        GenerationService::new(
            db,
            Arc::new(mock),
            Arc::new(GenerationCatalog::from_config(&GenerationConfig::default())),
        )
    }

    #[actix_web::test]
    async fn test_status_requires_task_id() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt()))
                .app_data(web::Data::new(generation_service().await))
                .service(web::scope("/api/v1").configure(generation_config)),
        )
        .await;

        let token = jwt().generate_access_token("u1", None).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/v1/generate/status")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], 400);
    }

    #[actix_web::test]
    async fn test_unknown_task_is_not_found_error() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt()))
                .app_data(web::Data::new(generation_service().await))
                .service(web::scope("/api/v1").configure(generation_config)),
        )
        .await;

        let token = jwt().generate_access_token("u1", None).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/v1/generate/status/task_missing?language=zh")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "not_found_error");
    }

    #[actix_web::test]
    async fn test_missing_token_is_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt()))
                .app_data(web::Data::new(generation_service().await))
                .service(web::scope("/api/v1").configure(generation_config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/generate")
            .set_json(serde_json::json!({"prompt": "a cat"}))
            .to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn test_insufficient_credits_envelope() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt()))
                .app_data(web::Data::new(generation_service().await))
                .service(web::scope("/api/v1").configure(generation_config)),
        )
        .await;

        let token = jwt().generate_access_token("u1", None).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/v1/generate")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(serde_json::json!({"prompt": "a cat", "resolution": "4K", "n": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["required"], 20);
        assert_eq!(body["data"]["current"], 0);
        assert_eq!(body["data"]["missing"], 20);
    }

    #[actix_web::test]
    async fn test_status_without_token_uses_typed_envelope() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt()))
                .app_data(web::Data::new(generation_service().await))
                .service(web::scope("/api/v1").configure(generation_config)),
        )
        .await;

        for uri in ["/api/v1/generate/status/task_1", "/api/v1/generate/status?task_id=task_1"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let err = test::try_call_service(&app, req).await.err().unwrap();
            let resp = err.error_response();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["error"]["type"], "authentication_error");
            assert_eq!(body["error"]["code"], 401);
        }
    }

    #[actix_web::test]
    async fn test_upstream_failure_reports_refund() {
        let mut mock = MockGenerationApiClient::new();
        mock.expect_submit().times(1).returning(|_| {
            Err(AppError::UpstreamError {
                status: 500,
                message: "upstream exploded".into(),
            })
        });
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt()))
                .app_data(web::Data::new(generation_service_with(mock, 100).await))
                .service(web::scope("/api/v1").configure(generation_config)),
        )
        .await;

        let token = jwt().generate_access_token("u1", None).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/v1/generate")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(serde_json::json!({"prompt": "a cat", "resolution": "2K", "n": 3}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "GENERATION_API_ERROR");
        assert_eq!(body["refunded"], true);
    }
}
