use crate::config::CreemConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub request_id: String,
    pub success_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub checkout_url: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// 支付服务商调用接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentApiClient: Send + Sync {
    async fn create_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession>;
}

#[derive(Clone)]
pub struct CreemClient {
    http: Client,
    config: CreemConfig,
}

impl CreemClient {
    pub fn new(config: CreemConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PaymentApiClient for CreemClient {
    async fn create_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession> {
        if self.config.api_key.is_empty() {
            return Err(AppError::ConfigError("CREEM_API_KEY is not configured".into()));
        }
        let url = format!(
            "{}/v1/checkouts",
            self.config.api_base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            let session: CheckoutSession = response.json().await.map_err(|_| {
                AppError::ExternalApiError("API response does not contain checkout_url".into())
            })?;
            Ok(session)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(AppError::ExternalApiError(format!(
                "Failed to create checkout session: {error_text}"
            )))
        }
    }
}

/// HMAC-SHA256(secret, payload) 的十六进制表示
pub fn sign_payload(payload: &[u8], secret: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalError(format!("invalid webhook secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 常量时间比较签名
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

/// Creem webhook 事件。不同版本的负载结构不同，字段按优先级依次查找。
#[derive(Debug, Clone)]
pub struct CreemEvent {
    raw: Value,
}

const METADATA_PATHS: [&[&str]; 3] = [&["object", "metadata"], &["data", "metadata"], &["metadata"]];
const CHECKOUT_ID_PATHS: [&[&str]; 3] = [&["object", "id"], &["data", "id"], &["id"]];

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// 按顺序返回第一个存在且非空的值
pub fn first_present<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| !v.is_null())
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl CreemEvent {
    pub fn parse(body: &[u8]) -> AppResult<Self> {
        let raw: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::MalformedPayload(format!("invalid JSON: {e}")))?;
        if !raw.is_object() {
            return Err(AppError::MalformedPayload("event is not a JSON object".into()));
        }
        Ok(Self { raw })
    }

    pub fn event_type(&self) -> Option<&str> {
        ["eventType", "type", "event_type"]
            .iter()
            .find_map(|key| self.raw.get(*key).and_then(Value::as_str))
    }

    pub fn event_id(&self) -> Option<String> {
        self.raw.get("id").and_then(value_as_string)
    }

    pub fn metadata(&self) -> Option<&Value> {
        first_present(&self.raw, &METADATA_PATHS).filter(|v| v.is_object())
    }

    pub fn metadata_string(&self, key: &str) -> Option<String> {
        self.metadata()
            .and_then(|m| m.get(key))
            .and_then(value_as_string)
    }

    pub fn metadata_i64(&self, key: &str) -> Option<i64> {
        self.metadata().and_then(|m| m.get(key)).and_then(value_as_i64)
    }

    pub fn checkout_id(&self) -> Option<String> {
        first_present(&self.raw, &CHECKOUT_ID_PATHS).and_then(value_as_string)
    }

    pub fn customer_id(&self) -> Option<String> {
        let customer = first_present(&self.raw, &[&["object", "customer"], &["data", "customer"]])?;
        match customer {
            Value::Object(_) => customer.get("id").and_then(value_as_string),
            other => value_as_string(other),
        }
    }

    /// 订单金额（最小货币单位）
    pub fn order_amount(&self) -> Option<i64> {
        first_present(&self.raw, &[&["object", "order", "amount"], &["data", "order", "amount"]])
            .and_then(value_as_i64)
    }

    pub fn order_currency(&self) -> Option<String> {
        first_present(
            &self.raw,
            &[&["object", "order", "currency"], &["data", "order", "currency"]],
        )
        .and_then(value_as_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_roundtrip_and_mismatch() {
        let body = br#"{"eventType":"checkout.completed"}"#;
        let sig = sign_payload(body, "whsec_test").unwrap();
        assert!(verify_signature(body, &sig, "whsec_test"));
        assert!(!verify_signature(body, &sig, "other_secret"));
        assert!(!verify_signature(b"tampered", &sig, "whsec_test"));
        assert!(!verify_signature(body, "not-hex", "whsec_test"));
    }

    #[test]
    fn test_metadata_prefers_object_then_data_then_top_level() {
        let event = CreemEvent {
            raw: json!({
                "metadata": {"userId": "top"},
                "data": {"metadata": {"userId": "data"}},
                "object": {"metadata": {"userId": "object"}}
            }),
        };
        assert_eq!(event.metadata_string("userId").as_deref(), Some("object"));

        let event = CreemEvent {
            raw: json!({
                "metadata": {"userId": "top"},
                "data": {"metadata": {"userId": "data", "points": "300"}}
            }),
        };
        assert_eq!(event.metadata_string("userId").as_deref(), Some("data"));
        assert_eq!(event.metadata_i64("points"), Some(300));

        let event = CreemEvent {
            raw: json!({"type": "payment.succeeded", "metadata": {"userId": 42, "points": 300}}),
        };
        assert_eq!(event.metadata_string("userId").as_deref(), Some("42"));
        assert_eq!(event.event_type(), Some("payment.succeeded"));
    }

    #[test]
    fn test_checkout_id_and_order_fields() {
        let event = CreemEvent::parse(
            json!({
                "id": "evt_1",
                "eventType": "checkout.completed",
                "object": {
                    "id": "ch_1",
                    "customer": {"id": "cust_1"},
                    "order": {"amount": 1000, "currency": "USD"}
                }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(event.event_id().as_deref(), Some("evt_1"));
        assert_eq!(event.checkout_id().as_deref(), Some("ch_1"));
        assert_eq!(event.customer_id().as_deref(), Some("cust_1"));
        assert_eq!(event.order_amount(), Some(1000));
        assert_eq!(event.order_currency().as_deref(), Some("USD"));

        let event = CreemEvent::parse(br#"{"id":"evt_2","event_type":"payment.failed"}"#).unwrap();
        assert_eq!(event.checkout_id().as_deref(), Some("evt_2"));
        assert!(event.metadata().is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            CreemEvent::parse(b"not json"),
            Err(AppError::MalformedPayload(_))
        ));
        assert!(matches!(
            CreemEvent::parse(b"[1,2]"),
            Err(AppError::MalformedPayload(_))
        ));
    }
}
