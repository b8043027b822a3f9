use crate::config::AppConfig;
use actix_cors::Cors;

/// 生产环境只允许站点自身来源；其他环境放开，方便本地联调
pub fn create_cors(app: &AppConfig) -> Cors {
    let cors = if app.is_production() {
        Cors::default().allowed_origin(app.base_url.trim_end_matches('/'))
    } else {
        Cors::default().allowed_origin_fn(|_, _req_head| true)
    };

    cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}
