use crate::config::GenerationConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizePromptOptions {
    pub mode: String,
}

/// 提交给生成 API 的请求体
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub resolution: String,
    pub n: u32,
    pub optimize_prompt_options: OptimizePromptOptions,
    pub watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTask {
    pub task_id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderImage {
    pub url: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderTaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ProviderImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderTaskError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// 任务查询接口返回的 data 部分
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProviderTaskData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProviderTaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderTaskError>,
}

impl ProviderTaskData {
    /// 所有图片地址按顺序展平
    pub fn image_urls(&self) -> Vec<String> {
        self.result
            .as_ref()
            .and_then(|r| r.images.as_ref())
            .map(|images| images.iter().flat_map(|img| img.url.clone()).collect())
            .unwrap_or_default()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().and_then(|e| e.message.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    data: Option<Vec<SubmitResponseItem>>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponseItem {
    task_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    data: Option<ProviderTaskData>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// 图像生成服务的调用接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationApiClient: Send + Sync {
    /// 提交生成任务，成功时返回第三方任务ID
    async fn submit(&self, request: &GenerationRequest) -> AppResult<SubmittedTask>;

    /// 查询任务实时状态
    async fn fetch_task(&self, task_id: &str, language: &str) -> AppResult<ProviderTaskData>;
}

#[derive(Clone)]
pub struct ApimartClient {
    http: Client,
    config: GenerationConfig,
}

impl ApimartClient {
    pub fn new(config: GenerationConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent("genpoints-backend/apimart")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn base_url(&self) -> &str {
        self.config.api_base_url.trim_end_matches('/')
    }

    fn ensure_api_key(&self) -> AppResult<()> {
        if self.config.api_key.is_empty() {
            return Err(AppError::ConfigError(
                "Image generation API key is not configured".into(),
            ));
        }
        Ok(())
    }
}

async fn read_error_message(response: reqwest::Response, fallback: &str) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            if text.is_empty() {
                fallback.to_string()
            } else {
                text
            }
        })
}

#[async_trait]
impl GenerationApiClient for ApimartClient {
    async fn submit(&self, request: &GenerationRequest) -> AppResult<SubmittedTask> {
        self.ensure_api_key()?;
        let url = format!("{}/v1/images/generations", self.base_url());

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Generation API unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = read_error_message(response, "Generation API call failed").await;
            return Err(AppError::UpstreamError {
                status: status.as_u16(),
                message,
            });
        }

        let body: SubmitResponse = response.json().await?;
        let first = body
            .data
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| AppError::ExternalApiError("No task id in API response".into()))?;
        let task_id = first
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::ExternalApiError("No task id in API response".into()))?;

        Ok(SubmittedTask {
            task_id,
            status: first.status,
        })
    }

    async fn fetch_task(&self, task_id: &str, language: &str) -> AppResult<ProviderTaskData> {
        self.ensure_api_key()?;
        let url = format!("{}/v1/tasks/{}", self.base_url(), task_id);

        let response = self
            .http
            .get(&url)
            .query(&[("language", language)])
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Generation API unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = read_error_message(response, "Failed to query task status").await;
            return Err(AppError::UpstreamError {
                status: status.as_u16(),
                message,
            });
        }

        let body: TaskResponse = response.json().await?;
        body.data
            .ok_or_else(|| AppError::ExternalApiError("Task status response has no data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_image_urls_keeps_order() {
        let data: ProviderTaskData = serde_json::from_value(json!({
            "id": "task_1",
            "status": "completed",
            "progress": 100,
            "result": {
                "images": [
                    {"url": ["https://cdn/a.png", "https://cdn/b.png"], "expires_at": 1},
                    {"url": ["https://cdn/c.png"]}
                ]
            }
        }))
        .unwrap();
        assert_eq!(
            data.image_urls(),
            vec!["https://cdn/a.png", "https://cdn/b.png", "https://cdn/c.png"]
        );
    }

    #[test]
    fn test_failed_task_error_message() {
        let data: ProviderTaskData = serde_json::from_value(json!({
            "id": "task_2",
            "status": "failed",
            "error": {"code": 500, "message": "content policy", "type": "generation_error"}
        }))
        .unwrap();
        assert_eq!(data.error_message().as_deref(), Some("content policy"));
        assert!(data.image_urls().is_empty());
    }

    #[test]
    fn test_request_omits_empty_reference_images() {
        let request = GenerationRequest {
            model: "m".into(),
            prompt: "p".into(),
            size: "1:1".into(),
            resolution: "2K".into(),
            n: 1,
            optimize_prompt_options: OptimizePromptOptions {
                mode: "standard".into(),
            },
            watermark: false,
            image_urls: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("image_urls").is_none());
        assert_eq!(value["optimize_prompt_options"]["mode"], "standard");
    }
}
