use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCheckoutRequest {
    pub points: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct CreateCheckoutResponse {
    pub url: String,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
