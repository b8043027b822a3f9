use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub creem: CreemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// development / test / production
    pub environment: String,
    /// 站点地址，用于支付成功/取消跳转
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub model: String,
    pub default_optimize_mode: String,
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.apimart.ai".to_string(),
            api_key: String::new(),
            model: "doubao-seedance-4-5".to_string(),
            default_optimize_mode: "standard".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    /// 缺少签名时是否拒绝；未配置时生产环境默认为 true
    #[serde(default)]
    pub require_signature: Option<bool>,
    #[serde(default)]
    pub popular_product_id: String,
}

impl Default for CreemConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://test-api.creem.io".to_string(),
            api_key: String::new(),
            webhook_secret: String::new(),
            require_signature: None,
            popular_product_id: String::new(),
        }
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("failed to parse config file: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and config.toml was not found")?;

                Config {
                    app: AppConfig::default(),
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                    },
                    generation: GenerationConfig::default(),
                    creem: CreemConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("cannot read config file {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("APP_ENV") {
            config.app.environment = v;
        }
        if let Ok(v) = env::var("APP_BASE_URL") {
            config.app.base_url = v;
        }
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.jwt.access_token_expires_in = n;
        }

        // 图像生成 API
        if let Ok(v) = env::var("APIMART_API_URL") {
            config.generation.api_base_url = v;
        }
        if let Ok(v) = env::var("APIMART_API_KEY") {
            config.generation.api_key = v;
        }
        if let Ok(v) = env::var("IMAGE_MODEL") {
            config.generation.model = v;
        }
        if let Ok(v) = env::var("IMAGE_API_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            config.generation.request_timeout_secs = n;
        }

        // Creem
        if let Ok(v) = env::var("CREEM_API_URL") {
            config.creem.api_base_url = v;
        }
        if let Ok(v) = env::var("CREEM_API_KEY") {
            config.creem.api_key = v;
        }
        if let Ok(v) = env::var("CREEM_WEBHOOK_SECRET") {
            config.creem.webhook_secret = v;
        }
        if let Ok(v) = env::var("CREEM_REQUIRE_SIGNATURE")
            && let Ok(b) = v.parse()
        {
            config.creem.require_signature = Some(b);
        }
        if let Ok(v) = env::var("CREEM_PRODUCT_POPULAR_ID") {
            config.creem.popular_product_id = v;
        }

        Ok(config)
    }

    /// 生产环境默认强制校验 webhook 签名
    pub fn webhook_requires_signature(&self) -> bool {
        self.creem
            .require_signature
            .unwrap_or_else(|| self.app.is_production())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [database]
            url = "sqlite::memory:"
            max_connections = 1

            [jwt]
            secret = "secret"
            access_token_expires_in = 3600
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_optional_sections_default() {
        let config = sample();
        assert_eq!(config.generation.model, "doubao-seedance-4-5");
        assert_eq!(config.creem.api_base_url, "https://test-api.creem.io");
        assert_eq!(config.app.environment, "development");
    }

    #[test]
    fn test_signature_required_in_production_by_default() {
        let mut config = sample();
        assert!(!config.webhook_requires_signature());

        config.app.environment = "production".to_string();
        assert!(config.webhook_requires_signature());

        config.creem.require_signature = Some(false);
        assert!(!config.webhook_requires_signature());
    }
}
