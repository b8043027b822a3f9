//! 启动时构建一次的静态配置：图像生成参数表与积分套餐表。

use crate::config::{CreemConfig, GenerationConfig};
use crate::error::{AppError, AppResult};
use serde::Serialize;
use utoipa::ToSchema;

pub const SUPPORTED_SIZES: [&str; 9] = [
    "1:1", "4:3", "3:4", "16:9", "9:16", "3:2", "2:3", "21:9", "9:21",
];

/// 每张图片消耗积分
pub const RESOLUTION_PRICING: [(&str, i64); 2] = [("2K", 10), ("4K", 20)];

pub const MIN_IMAGES: u32 = 1;
pub const MAX_IMAGES: u32 = 15;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResolutionPrice {
    pub resolution: String,
    pub points_per_image: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollingPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCatalog {
    pub model: String,
    pub sizes: Vec<String>,
    pub pricing: Vec<ResolutionPrice>,
    pub min_images: u32,
    pub max_images: u32,
    pub default_size: String,
    pub default_resolution: String,
    pub default_n: u32,
    pub default_optimize_mode: String,
    pub polling: PollingPolicy,
}

impl GenerationCatalog {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            sizes: SUPPORTED_SIZES.iter().map(|s| s.to_string()).collect(),
            pricing: RESOLUTION_PRICING
                .iter()
                .map(|(resolution, points)| ResolutionPrice {
                    resolution: resolution.to_string(),
                    points_per_image: *points,
                })
                .collect(),
            min_images: MIN_IMAGES,
            max_images: MAX_IMAGES,
            default_size: "1:1".to_string(),
            default_resolution: "2K".to_string(),
            default_n: 1,
            default_optimize_mode: config.default_optimize_mode.clone(),
            polling: PollingPolicy {
                interval_ms: 3000,
                max_attempts: 100,
            },
        }
    }

    pub fn price_per_image(&self, resolution: &str) -> Option<i64> {
        self.pricing
            .iter()
            .find(|p| p.resolution == resolution)
            .map(|p| p.points_per_image)
    }

    pub fn calculate_cost(&self, resolution: &str, image_count: u32) -> AppResult<i64> {
        let price = self.price_per_image(resolution).ok_or_else(|| {
            AppError::ValidationError(format!("Unsupported resolution: {resolution}"))
        })?;
        Ok(price * i64::from(image_count))
    }

    /// 校验生成参数，不产生任何副作用
    pub fn validate(&self, prompt: &str, resolution: &str, size: &str, n: u32) -> AppResult<()> {
        if prompt.trim().is_empty() {
            return Err(AppError::ValidationError("Prompt must not be empty".into()));
        }
        if self.price_per_image(resolution).is_none() {
            return Err(AppError::ValidationError(format!(
                "Unsupported resolution: {resolution}"
            )));
        }
        if !self.sizes.iter().any(|s| s == size) {
            return Err(AppError::ValidationError(format!(
                "Unsupported aspect ratio: {size}"
            )));
        }
        if n < self.min_images || n > self.max_images {
            return Err(AppError::ValidationError(format!(
                "Image count must be between {} and {}",
                self.min_images, self.max_images
            )));
        }
        Ok(())
    }
}

/// 积分套餐，对应 Creem 上的一个产品
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointsProduct {
    pub key: String,
    pub name: String,
    pub points: i64,
    /// 美分
    pub price_cents: i64,
    pub currency: String,
    #[serde(skip_serializing)]
    pub provider_product_id: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: Vec<PointsProduct>,
}

impl ProductCatalog {
    pub fn from_config(config: &CreemConfig) -> Self {
        Self::new(vec![PointsProduct {
            key: "popular".to_string(),
            name: "Points package".to_string(),
            points: 300,
            price_cents: 1000,
            currency: "USD".to_string(),
            provider_product_id: config.popular_product_id.clone(),
            description: "300 points for $10".to_string(),
        }])
    }

    pub fn new(products: Vec<PointsProduct>) -> Self {
        Self { products }
    }

    pub fn by_points(&self, points: i64) -> Option<&PointsProduct> {
        self.products.iter().find(|p| p.points == points)
    }

    pub fn by_provider_product_id(&self, product_id: &str) -> Option<&PointsProduct> {
        if product_id.is_empty() {
            return None;
        }
        self.products
            .iter()
            .find(|p| p.provider_product_id == product_id)
    }

    pub fn all(&self) -> &[PointsProduct] {
        &self.products
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GenerationCatalog {
        GenerationCatalog::from_config(&GenerationConfig::default())
    }

    #[test]
    fn test_cost_uses_price_table() {
        let c = catalog();
        assert_eq!(c.calculate_cost("2K", 3).unwrap(), 30);
        assert_eq!(c.calculate_cost("4K", 1).unwrap(), 20);
        assert!(matches!(
            c.calculate_cost("8K", 1),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let c = catalog();
        assert!(c.validate("a cat", "2K", "16:9", 1).is_ok());
        assert!(c.validate("   ", "2K", "1:1", 1).is_err());
        assert!(c.validate("a cat", "1K", "1:1", 1).is_err());
        assert!(c.validate("a cat", "2K", "5:4", 1).is_err());
        assert!(c.validate("a cat", "2K", "1:1", 0).is_err());
        assert!(c.validate("a cat", "2K", "1:1", 16).is_err());
        assert!(c.validate("a cat", "4K", "9:21", 15).is_ok());
    }

    #[test]
    fn test_product_lookup() {
        let config = CreemConfig {
            popular_product_id: "prod_abc".into(),
            ..Default::default()
        };
        let products = ProductCatalog::from_config(&config);
        assert_eq!(products.by_points(300).unwrap().price_cents, 1000);
        assert!(products.by_points(301).is_none());
        assert_eq!(products.by_provider_product_id("prod_abc").unwrap().points, 300);
        assert!(products.by_provider_product_id("").is_none());
    }
}
