use crate::entities::{PointsAction, PointsType, points_history_entity, user_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PointsBalanceResponse {
    pub points: i64,
    pub purchased_points: i64,
}

impl From<user_entity::Model> for PointsBalanceResponse {
    fn from(m: user_entity::Model) -> Self {
        Self {
            points: m.points,
            purchased_points: m.purchased_points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointsHistoryItem {
    pub id: String,
    pub points: i64,
    pub points_type: PointsType,
    pub action: PointsAction,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<points_history_entity::Model> for PointsHistoryItem {
    fn from(m: points_history_entity::Model) -> Self {
        Self {
            id: m.id,
            points: m.points,
            points_type: m.points_type,
            action: m.action,
            description: m.description,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointsHistoryResponse {
    pub items: Vec<PointsHistoryItem>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}
