use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use genpoints_backend::{
    AppError,
    catalog::{GenerationCatalog, ProductCatalog},
    config::Config,
    database::{create_pool, run_migrations},
    external::{ApimartClient, CreemClient},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.access_token_expires_in);

    // 静态目录：启动时构建一次
    let generation_catalog = Arc::new(GenerationCatalog::from_config(&config.generation));
    let product_catalog = Arc::new(ProductCatalog::from_config(&config.creem));
    if config.creem.popular_product_id.is_empty() {
        log::warn!("CREEM_PRODUCT_POPULAR_ID is not set, checkout will be unavailable");
    }

    // 外部服务
    let apimart = ApimartClient::new(config.generation.clone())
        .expect("Failed to build image generation client");
    let creem = CreemClient::new(config.creem.clone());

    let ledger = PointsLedger::new(pool.clone());
    let generation_service =
        GenerationService::new(pool.clone(), Arc::new(apimart), generation_catalog);
    let payment_service = PaymentService::new(
        pool.clone(),
        Arc::new(creem),
        product_catalog,
        PaymentSettings::from_config(&config),
    );

    log::info!(
        "Starting HTTP server at {}:{} ({}, webhook signature required: {})",
        config.server.host,
        config.server.port,
        config.app.environment,
        config.webhook_requires_signature()
    );

    let app_config = config.app.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors(&app_config))
            .wrap(Logger::default())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::ValidationError(format!("Invalid request body: {err}")).into()
            }))
            .app_data(web::Data::new(ledger.clone()))
            .app_data(web::Data::new(generation_service.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::generation_config)
                    .configure(handlers::points_config)
                    .configure(handlers::payment_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
