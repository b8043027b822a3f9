use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::catalog::{GenerationCatalog, PointsProduct, PollingPolicy, ResolutionPrice};
use crate::entities::{PointsAction, PointsType, TaskStatus};
use crate::external::{
    ProviderImage, ProviderTaskData, ProviderTaskError, ProviderTaskResult,
};
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
        handlers::generation::submit_generation,
        handlers::generation::get_generation_config,
        handlers::generation::get_task_status,
        handlers::generation::get_task_document,
        handlers::generation::get_generation_history,
        handlers::points::get_balance,
        handlers::points::get_points_history,
        handlers::payment::list_products,
        handlers::payment::create_checkout,
        handlers::webhook::creem_webhook,
    ),
    components(
        schemas(
            GenerateImageRequest,
            GenerateImageResponse,
            OptimizePromptInput,
            TaskStatusView,
            ProviderTaskDocument,
            ProviderTaskData,
            ProviderTaskResult,
            ProviderTaskError,
            ProviderImage,
            GenerationTaskResponse,
            GenerationHistoryResponse,
            GenerationCatalog,
            ResolutionPrice,
            PollingPolicy,
            PointsProduct,
            TaskStatus,
            PointsBalanceResponse,
            PointsHistoryItem,
            PointsHistoryResponse,
            PointsType,
            PointsAction,
            CreateCheckoutRequest,
            CreateCheckoutResponse,
            WebhookAck,
            TypedApiError,
            LimitOffsetParams,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "generation", description = "Image generation API"),
        (name = "points", description = "Points balance and ledger API"),
        (name = "payments", description = "Points purchase and Creem webhook API"),
    ),
    info(
        title = "GenPoints Backend API",
        version = "1.0.0",
        description = "Image generation paid with points, topped up through Creem checkout"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/generate"));
        assert!(paths.contains_key("/generate/status/{task_id}"));
        assert!(paths.contains_key("/payments/webhook"));
        assert!(doc.components.unwrap().security_schemes.contains_key("bearer_auth"));
    }
}
