use crate::entities::{TaskStatus, generation_task_entity};
use crate::external::{ProviderImage, ProviderTaskData, ProviderTaskError, ProviderTaskResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// 缓存结果中图片链接的有效期
pub const CACHED_IMAGE_TTL_DAYS: i64 = 7;
const DEFAULT_ESTIMATED_SECS: i64 = 60;

pub const SUPPORTED_LANGUAGES: [&str; 4] = ["zh", "en", "ko", "ja"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OptimizePromptInput {
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: String,
    pub size: Option<String>,
    pub resolution: Option<String>,
    pub n: Option<u32>,
    pub image_urls: Option<Vec<String>>,
    pub optimize_prompt_options: Option<OptimizePromptInput>,
    pub watermark: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct GenerateImageResponse {
    pub task_id: String,
    pub status: String,
    #[serde(rename = "costPoints")]
    pub cost_points: i64,
    #[serde(rename = "remainingPoints")]
    pub remaining_points: i64,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskStatusQuery {
    pub task_id: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskLanguageQuery {
    pub language: Option<String>,
}

/// 校验语言参数，默认 en
pub fn resolve_language(language: Option<&str>) -> Option<&str> {
    match language {
        None => Some("en"),
        Some(lang) if SUPPORTED_LANGUAGES.contains(&lang) => Some(lang),
        Some(_) => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TaskStatusView {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(rename = "imageUrls")]
    pub image_urls: Option<Vec<String>>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderTaskDocument {
    pub code: u16,
    pub data: ProviderTaskData,
}

/// 一次状态刷新的结果：本地记录 + 第三方实时数据（缓存命中时为空）
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub task: generation_task_entity::Model,
    pub live: Option<ProviderTaskData>,
}

impl TaskSnapshot {
    fn progress(&self) -> i64 {
        match self.task.status {
            TaskStatus::Completed => 100,
            _ => self.live.as_ref().and_then(|d| d.progress).unwrap_or(0),
        }
    }

    pub fn to_status_view(&self) -> TaskStatusView {
        let urls = self.task.image_url_list();
        TaskStatusView {
            task_id: self.task.task_id.clone(),
            status: self.task.status,
            image_urls: (!urls.is_empty()).then_some(urls),
            error_message: self.task.error_message.clone(),
            completed_at: self.task.completed_at,
            progress: Some(self.progress()),
        }
    }

    /// 第三方格式的任务文档
    pub fn to_provider_document(&self, now: DateTime<Utc>) -> ProviderTaskDocument {
        let task = &self.task;
        let live = self.live.as_ref();
        let created = task.created_at.timestamp();
        let completed = task
            .completed_at
            .map(|t| t.timestamp())
            .or_else(|| live.and_then(|d| d.completed));

        let mut data = ProviderTaskData {
            id: task.task_id.clone(),
            status: task.status.to_string(),
            progress: Some(self.progress()),
            result: None,
            created: Some(live.and_then(|d| d.created).unwrap_or(created)),
            completed,
            estimated_time: Some(
                live.and_then(|d| d.estimated_time)
                    .unwrap_or(DEFAULT_ESTIMATED_SECS),
            ),
            actual_time: live
                .and_then(|d| d.actual_time)
                .or_else(|| completed.map(|c| (c - created).max(0))),
            error: None,
        };

        match task.status {
            TaskStatus::Completed => {
                let live_result = live
                    .and_then(|d| d.result.clone())
                    .filter(|r| r.images.as_ref().is_some_and(|i| !i.is_empty()));
                data.result = Some(live_result.unwrap_or_else(|| {
                    let expires_at = (now + Duration::days(CACHED_IMAGE_TTL_DAYS)).timestamp();
                    ProviderTaskResult {
                        images: Some(
                            task.image_url_list()
                                .into_iter()
                                .map(|url| ProviderImage {
                                    url: vec![url],
                                    expires_at: Some(expires_at),
                                })
                                .collect(),
                        ),
                        thumbnail_url: None,
                    }
                }));
            }
            TaskStatus::Failed => {
                data.error = Some(live.and_then(|d| d.error.clone()).unwrap_or_else(|| {
                    ProviderTaskError {
                        code: Some(500),
                        message: Some(
                            task.error_message
                                .clone()
                                .unwrap_or_else(|| "Generation failed".to_string()),
                        ),
                        error_type: Some("generation_error".to_string()),
                    }
                }));
            }
            _ => {
                data.result = live.and_then(|d| d.result.clone());
            }
        }

        ProviderTaskDocument { code: 200, data }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTaskResponse {
    pub id: String,
    pub task_id: String,
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub resolution: String,
    pub image_count: i32,
    pub cost_points: i64,
    pub status: TaskStatus,
    pub image_urls: Vec<String>,
    pub error_message: Option<String>,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<generation_task_entity::Model> for GenerationTaskResponse {
    fn from(m: generation_task_entity::Model) -> Self {
        let image_urls = m.image_url_list();
        Self {
            id: m.id,
            task_id: m.task_id,
            prompt: m.prompt,
            model: m.model,
            size: m.size,
            resolution: m.resolution,
            image_count: m.image_count,
            cost_points: m.cost_points,
            status: m.status,
            image_urls,
            error_message: m.error_message,
            refunded: m.refunded,
            created_at: m.created_at,
            completed_at: m.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationHistoryResponse {
    pub tasks: Vec<GenerationTaskResponse>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}
