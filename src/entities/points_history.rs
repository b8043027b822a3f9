use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PointsType {
    #[sea_orm(string_value = "purchased")]
    Purchased,
    #[sea_orm(string_value = "bonus")]
    Bonus,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PointsAction {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "image_generation")]
    ImageGeneration,
    #[sea_orm(string_value = "refund_image_generation")]
    RefundImageGeneration,
}

impl std::fmt::Display for PointsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointsAction::Purchase => write!(f, "purchase"),
            PointsAction::ImageGeneration => write!(f, "image_generation"),
            PointsAction::RefundImageGeneration => write!(f, "refund_image_generation"),
        }
    }
}

/// 积分流水（只追加，不修改）
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "points_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    /// 带符号：消费为负，购买/退款为正
    pub points: i64,
    pub points_type: PointsType,
    pub action: PointsAction,
    pub description: Option<String>,
    pub metadata: Option<Json>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
