use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 生成任务状态，只能前进:
/// submitted -> pending -> processing -> completed | failed
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Submitted => 0,
            TaskStatus::Pending => 1,
            TaskStatus::Processing => 2,
            TaskStatus::Completed | TaskStatus::Failed => 3,
        }
    }

    /// Whether moving from `self` to `next` is a forward step.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Statuses a row may currently hold for an update to `self` to be legal.
    pub fn predecessors(self) -> Vec<TaskStatus> {
        [
            TaskStatus::Submitted,
            TaskStatus::Pending,
            TaskStatus::Processing,
        ]
        .into_iter()
        .filter(|s| s.can_advance_to(self))
        .collect()
    }

    /// 第三方状态映射；cancelled 视为失败
    pub fn from_provider(status: &str) -> Option<TaskStatus> {
        match status {
            "submitted" => Some(TaskStatus::Submitted),
            "pending" | "queued" => Some(TaskStatus::Pending),
            "processing" | "running" | "in_progress" => Some(TaskStatus::Processing),
            "completed" | "succeeded" | "success" => Some(TaskStatus::Completed),
            "failed" | "cancelled" | "canceled" | "error" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Submitted => write!(f, "submitted"),
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "generation_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    /// 第三方任务ID（唯一）
    #[sea_orm(unique)]
    pub task_id: String,
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub resolution: String,
    pub image_count: i32,
    pub cost_points: i64,
    pub status: TaskStatus,
    /// JSON 数组，按顺序保存图片地址
    pub image_urls: Option<Json>,
    pub error_message: Option<String>,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn image_url_list(&self) -> Vec<String> {
        self.image_urls
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|u| u.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
