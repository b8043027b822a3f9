use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

/// 任务状态接口的错误体
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TypedApiError {
    pub code: u16,
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}
