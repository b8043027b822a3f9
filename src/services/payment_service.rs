use crate::catalog::{PointsProduct, ProductCatalog};
use crate::config::Config;
use crate::entities::{PaymentStatus, PointsAction, payment_record_entity as records};
use crate::error::{AppError, AppResult};
use crate::external::{CheckoutRequest, CreemEvent, PaymentApiClient, verify_signature};
use crate::models::CreateCheckoutResponse;
use crate::services::{LedgerEntry, PointsLedger};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, NotSet, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub base_url: String,
    pub webhook_secret: String,
    pub require_signature: bool,
}

impl PaymentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.app.base_url.clone(),
            webhook_secret: config.creem.webhook_secret.clone(),
            require_signature: config.webhook_requires_signature(),
        }
    }
}

/// webhook 处理结果；除签名/解析错误外都应答 200
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited { user_id: String, points: i64 },
    Duplicate,
    Recorded(PaymentStatus),
    Ignored,
}

#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    api: Arc<dyn PaymentApiClient>,
    products: Arc<ProductCatalog>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        pool: DatabaseConnection,
        api: Arc<dyn PaymentApiClient>,
        products: Arc<ProductCatalog>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            pool,
            api,
            products,
            settings,
        }
    }

    pub fn products(&self) -> &[PointsProduct] {
        self.products.all()
    }

    pub async fn create_checkout(
        &self,
        user_id: &str,
        points: Option<i64>,
    ) -> AppResult<CreateCheckoutResponse> {
        let points = points
            .filter(|p| *p > 0)
            .ok_or_else(|| AppError::ValidationError("Invalid points amount".into()))?;
        let product = self
            .products
            .by_points(points)
            .ok_or_else(|| AppError::ValidationError(format!("No package offers {points} points")))?;
        if product.provider_product_id.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Payment product for package {} is not configured",
                product.key
            )));
        }

        let request_id = Uuid::new_v4().to_string();
        let base_url = self.settings.base_url.trim_end_matches('/');
        let request = CheckoutRequest {
            product_id: product.provider_product_id.clone(),
            request_id: request_id.clone(),
            success_url: format!(
                "{base_url}/profile?payment=success&session_id={{CHECKOUT_SESSION_ID}}"
            ),
            cancel_url: Some(format!("{base_url}/profile?payment=cancelled")),
            metadata: json!({
                "userId": user_id,
                "points": points,
                "productId": product.provider_product_id,
                "requestId": request_id,
            }),
        };

        let session = self.api.create_checkout(&request).await?;
        log::info!(
            "Created checkout for user {user_id}: {} points, request {request_id}",
            points
        );

        Ok(CreateCheckoutResponse {
            url: session.checkout_url,
            session_id: session.id,
        })
    }

    fn verify(&self, raw: &[u8], signature: Option<&str>) -> AppResult<()> {
        let signature = signature.map(str::trim).filter(|s| !s.is_empty());
        match signature {
            None if self.settings.require_signature => {
                log::warn!("Rejected webhook without signature");
                Err(AppError::InvalidSignature)
            }
            None => {
                log::warn!("Webhook received without signature, accepting (signature not required)");
                Ok(())
            }
            Some(_) if self.settings.webhook_secret.is_empty() => {
                log::error!("Webhook signature present but no webhook secret is configured");
                Err(AppError::InvalidSignature)
            }
            Some(sig) => {
                if verify_signature(raw, sig, &self.settings.webhook_secret) {
                    Ok(())
                } else {
                    Err(AppError::InvalidSignature)
                }
            }
        }
    }

    /// 签名 -> 解析 -> 按事件类型分发
    pub async fn handle_webhook(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        self.verify(raw, signature)?;
        let event = CreemEvent::parse(raw)?;

        let Some(event_type) = event.event_type() else {
            log::warn!("Webhook event without type, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };
        log::info!(
            "Received Creem webhook event: {event_type} ({})",
            event.event_id().unwrap_or_default()
        );

        match event_type {
            "checkout.completed" | "payment.succeeded" => self.on_payment_succeeded(&event).await,
            "payment.failed" => self.on_payment_closed(&event, PaymentStatus::Failed).await,
            "checkout.expired" | "payment.cancelled" => {
                self.on_payment_closed(&event, PaymentStatus::Cancelled)
                    .await
            }
            t if t.starts_with("subscription.") || t == "refund.created" => {
                log::info!("Webhook event {t} acknowledged without changes");
                Ok(WebhookOutcome::Ignored)
            }
            t => {
                log::warn!("Unhandled webhook event type: {t}");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn on_payment_succeeded(&self, event: &CreemEvent) -> AppResult<WebhookOutcome> {
        let Some(user_id) = event.metadata_string("userId") else {
            log::warn!("Payment event without userId in metadata, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(points) = event.metadata_i64("points").filter(|p| *p > 0) else {
            log::warn!("Payment event for user {user_id} without valid points, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };
        let product = event
            .metadata_string("productId")
            .and_then(|id| self.products.by_provider_product_id(&id))
            .filter(|p| p.points == points)
            .or_else(|| self.products.by_points(points));
        let Some(product) = product else {
            log::warn!("Payment event for user {user_id} with unknown package of {points} points");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(checkout_id) = event.checkout_id() else {
            log::warn!("Payment event for user {user_id} without checkout id, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };

        let record = record_from_event(
            event,
            &user_id,
            &checkout_id,
            PaymentStatus::Succeeded,
            points,
            event.order_amount().unwrap_or(product.price_cents),
            event
                .order_currency()
                .unwrap_or_else(|| product.currency.clone()),
        );

        let txn = self.pool.begin().await?;
        let inserted = insert_if_absent(&txn, record.clone()).await?;
        if inserted == 0 {
            // 已有失败/取消记录时升级为成功；已成功则为重复投递
            let upgrade = records::ActiveModel {
                id: NotSet,
                checkout_session_id: NotSet,
                created_at: NotSet,
                ..record
            };
            let upgraded = records::Entity::update_many()
                .set(upgrade)
                .filter(records::Column::CheckoutSessionId.eq(checkout_id.as_str()))
                .filter(records::Column::PaymentStatus.ne(PaymentStatus::Succeeded))
                .exec(&txn)
                .await?;
            if upgraded.rows_affected == 0 {
                txn.rollback().await?;
                log::info!("Duplicate webhook for checkout {checkout_id}, skipping");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let entry = LedgerEntry::new(user_id.as_str(), points, PointsAction::Purchase)
            .description(format!("Purchase of {points} points"))
            .metadata(json!({
                "checkout_id": checkout_id,
                "product_id": product.provider_product_id,
                "request_id": event.metadata_string("requestId"),
            }));
        match PointsLedger::credit_in(&txn, &entry).await {
            Ok(balance) => {
                txn.commit().await?;
                log::info!(
                    "Credited {points} points to user {user_id} for checkout {checkout_id}, balance {balance}"
                );
                Ok(WebhookOutcome::Credited { user_id, points })
            }
            Err(AppError::NotFound(_)) => {
                txn.rollback().await?;
                log::warn!("Payment event for unknown user {user_id}, ignoring");
                Ok(WebhookOutcome::Ignored)
            }
            Err(e) => Err(e),
        }
    }

    async fn on_payment_closed(
        &self,
        event: &CreemEvent,
        status: PaymentStatus,
    ) -> AppResult<WebhookOutcome> {
        let Some(checkout_id) = event.checkout_id() else {
            log::warn!("{status} payment event without checkout id, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };
        let user_id = event.metadata_string("userId").unwrap_or_default();
        let points = event.metadata_i64("points").unwrap_or(0);

        let record = record_from_event(
            event,
            &user_id,
            &checkout_id,
            status,
            points,
            event.order_amount().unwrap_or(0),
            event.order_currency().unwrap_or_else(|| "USD".to_string()),
        );

        let txn = self.pool.begin().await?;
        let inserted = insert_if_absent(&txn, record).await?;
        txn.commit().await?;

        if inserted == 0 {
            log::info!("Checkout {checkout_id} already recorded, keeping existing record");
            return Ok(WebhookOutcome::Duplicate);
        }
        log::info!("Recorded {status} payment for checkout {checkout_id}");
        Ok(WebhookOutcome::Recorded(status))
    }
}

fn record_from_event(
    event: &CreemEvent,
    user_id: &str,
    checkout_id: &str,
    status: PaymentStatus,
    points: i64,
    amount: i64,
    currency: String,
) -> records::ActiveModel {
    let now = Utc::now();
    records::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        provider_customer_id: Set(event.customer_id()),
        checkout_session_id: Set(checkout_id.to_string()),
        payment_status: Set(status),
        amount: Set(amount),
        currency: Set(currency),
        points_amount: Set(points),
        metadata: Set(event.metadata().cloned()),
        webhook_event_id: Set(event.event_id()),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// 以 checkout_session_id 唯一索引去重，返回实际插入行数
async fn insert_if_absent(txn: &DatabaseTransaction, record: records::ActiveModel) -> AppResult<u64> {
    let inserted = records::Entity::insert(record)
        .on_conflict(
            OnConflict::column(records::Column::CheckoutSessionId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{CheckoutSession, MockPaymentApiClient, sign_payload};
    use crate::test_support::{seed_user, setup_db, user_points};
    use sea_orm::PaginatorTrait;
    use serde_json::Value;

    const SECRET: &str = "whsec_test";

    fn products(provider_id: &str) -> Arc<ProductCatalog> {
        Arc::new(ProductCatalog::new(vec![PointsProduct {
            key: "popular".into(),
            name: "Points package".into(),
            points: 300,
            price_cents: 1000,
            currency: "USD".into(),
            provider_product_id: provider_id.into(),
            description: "300 points".into(),
        }]))
    }

    fn service_with(
        db: &DatabaseConnection,
        mock: MockPaymentApiClient,
        provider_id: &str,
        require_signature: bool,
    ) -> PaymentService {
        PaymentService::new(
            db.clone(),
            Arc::new(mock),
            products(provider_id),
            PaymentSettings {
                base_url: "https://app.example.com/".into(),
                webhook_secret: SECRET.into(),
                require_signature,
            },
        )
    }

    fn service(db: &DatabaseConnection) -> PaymentService {
        service_with(db, MockPaymentApiClient::new(), "prod_popular", true)
    }

    fn completed_event(checkout_id: &str, user_id: &str, points: Value) -> Vec<u8> {
        json!({
            "id": format!("evt_{checkout_id}"),
            "eventType": "checkout.completed",
            "object": {
                "id": checkout_id,
                "customer": {"id": "cust_1"},
                "order": {"amount": 1000, "currency": "USD"},
                "metadata": {"userId": user_id, "points": points, "productId": "prod_popular"}
            }
        })
        .to_string()
        .into_bytes()
    }

    fn signed(body: &[u8]) -> String {
        sign_payload(body, SECRET).unwrap()
    }

    async fn record_count(db: &DatabaseConnection) -> u64 {
        records::Entity::find().count(db).await.unwrap()
    }

    #[tokio::test]
    async fn test_checkout_builds_provider_request() {
        let db = setup_db().await;
        let mut mock = MockPaymentApiClient::new();
        mock.expect_create_checkout()
            .withf(|req| {
                req.product_id == "prod_popular"
                    && req.success_url
                        == "https://app.example.com/profile?payment=success&session_id={CHECKOUT_SESSION_ID}"
                    && req.cancel_url.as_deref()
                        == Some("https://app.example.com/profile?payment=cancelled")
                    && req.metadata["userId"] == "u1"
                    && req.metadata["points"] == 300
                    && req.metadata["requestId"] == req.request_id.as_str()
            })
            .times(1)
            .returning(|_| {
                Ok(CheckoutSession {
                    checkout_url: "https://checkout.creem.io/ch_1".into(),
                    id: Some("ch_1".into()),
                })
            });

        let res = service_with(&db, mock, "prod_popular", true)
            .create_checkout("u1", Some(300))
            .await
            .unwrap();
        assert_eq!(res.url, "https://checkout.creem.io/ch_1");
        assert_eq!(res.session_id.as_deref(), Some("ch_1"));
    }

    #[tokio::test]
    async fn test_checkout_rejects_bad_packages() {
        let db = setup_db().await;
        let svc = service(&db);
        for points in [None, Some(0), Some(-5), Some(301)] {
            assert!(matches!(
                svc.create_checkout("u1", points).await,
                Err(AppError::ValidationError(_))
            ));
        }

        let unconfigured = service_with(&db, MockPaymentApiClient::new(), "", true);
        assert!(matches!(
            unconfigured.create_checkout("u1", Some(300)).await,
            Err(AppError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_webhook_credits_once() {
        let db = setup_db().await;
        seed_user(&db, "u1", 0).await;
        let svc = service(&db);

        let body = completed_event("cs_1", "u1", json!("300"));
        let sig = signed(&body);

        let first = svc.handle_webhook(&body, Some(&sig)).await.unwrap();
        assert_eq!(
            first,
            WebhookOutcome::Credited {
                user_id: "u1".into(),
                points: 300
            }
        );
        let second = svc.handle_webhook(&body, Some(&sig)).await.unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);

        assert_eq!(user_points(&db, "u1").await, 300);
        assert_eq!(record_count(&db).await, 1);
        let record = records::Entity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(record.checkout_session_id, "cs_1");
        assert_eq!(record.payment_status, PaymentStatus::Succeeded);
        assert_eq!(record.amount, 1000);
        assert_eq!(record.provider_customer_id.as_deref(), Some("cust_1"));
        assert_eq!(record.webhook_event_id.as_deref(), Some("evt_cs_1"));
    }

    #[tokio::test]
    async fn test_invalid_signature_changes_nothing() {
        let db = setup_db().await;
        seed_user(&db, "u1", 0).await;
        let svc = service(&db);

        let body = completed_event("cs_1", "u1", json!(300));
        let forged = sign_payload(&body, "wrong_secret").unwrap();
        assert!(matches!(
            svc.handle_webhook(&body, Some(&forged)).await,
            Err(AppError::InvalidSignature)
        ));
        assert!(matches!(
            svc.handle_webhook(&body, None).await,
            Err(AppError::InvalidSignature)
        ));
        assert_eq!(user_points(&db, "u1").await, 0);
        assert_eq!(record_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_allowed_when_not_required() {
        let db = setup_db().await;
        seed_user(&db, "u1", 0).await;
        let svc = service_with(&db, MockPaymentApiClient::new(), "prod_popular", false);

        let body = completed_event("cs_1", "u1", json!(300));
        let outcome = svc.handle_webhook(&body, None).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Credited { .. }));
        assert_eq!(user_points(&db, "u1").await, 300);
    }

    #[tokio::test]
    async fn test_bad_metadata_is_acknowledged_without_mutation() {
        let db = setup_db().await;
        seed_user(&db, "u1", 0).await;
        let svc = service(&db);

        let no_user = json!({
            "eventType": "checkout.completed",
            "object": {"id": "cs_1", "metadata": {"points": 300}}
        })
        .to_string()
        .into_bytes();
        let unknown_package = completed_event("cs_2", "u1", json!(999));
        let ghost_user = completed_event("cs_3", "ghost", json!(300));

        for body in [no_user, unknown_package, ghost_user] {
            let outcome = svc.handle_webhook(&body, Some(&signed(&body))).await.unwrap();
            assert_eq!(outcome, WebhookOutcome::Ignored);
        }
        assert_eq!(user_points(&db, "u1").await, 0);
        assert_eq!(record_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_failed_record_is_upgraded_by_later_success() {
        let db = setup_db().await;
        seed_user(&db, "u1", 0).await;
        let svc = service(&db);

        let failed = json!({
            "id": "evt_f",
            "eventType": "payment.failed",
            "object": {"id": "cs_9", "metadata": {"userId": "u1", "points": 300}}
        })
        .to_string()
        .into_bytes();
        assert_eq!(
            svc.handle_webhook(&failed, Some(&signed(&failed)))
                .await
                .unwrap(),
            WebhookOutcome::Recorded(PaymentStatus::Failed)
        );
        assert_eq!(user_points(&db, "u1").await, 0);

        let success = json!({
            "id": "evt_s",
            "eventType": "checkout.completed",
            "object": {
                "id": "cs_9",
                "customer": {"id": "cust_9"},
                "order": {"amount": 1000, "currency": "EUR"},
                "metadata": {"userId": "u1", "points": 300, "productId": "prod_popular"}
            }
        })
        .to_string()
        .into_bytes();
        assert!(matches!(
            svc.handle_webhook(&success, Some(&signed(&success)))
                .await
                .unwrap(),
            WebhookOutcome::Credited { .. }
        ));
        assert_eq!(user_points(&db, "u1").await, 300);
        assert_eq!(record_count(&db).await, 1);

        // 成功之后的失败事件不覆盖
        assert_eq!(
            svc.handle_webhook(&failed, Some(&signed(&failed)))
                .await
                .unwrap(),
            WebhookOutcome::Duplicate
        );
        let record = records::Entity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(record.payment_status, PaymentStatus::Succeeded);
        assert_eq!(record.amount, 1000);
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.provider_customer_id.as_deref(), Some("cust_9"));
        assert_eq!(
            record.metadata.as_ref().and_then(|m| m.get("productId")).cloned(),
            Some(json!("prod_popular"))
        );
    }

    #[tokio::test]
    async fn test_other_events_and_garbage() {
        let db = setup_db().await;
        let svc = service(&db);

        let refund = br#"{"eventType":"refund.created","object":{"id":"r_1"}}"#;
        assert_eq!(
            svc.handle_webhook(refund, Some(&signed(refund))).await.unwrap(),
            WebhookOutcome::Ignored
        );
        let sub = br#"{"type":"subscription.active"}"#;
        assert_eq!(
            svc.handle_webhook(sub, Some(&signed(sub))).await.unwrap(),
            WebhookOutcome::Ignored
        );
        let garbage = b"{not json";
        assert!(matches!(
            svc.handle_webhook(garbage, Some(&signed(garbage))).await,
            Err(AppError::MalformedPayload(_))
        ));
        assert_eq!(record_count(&db).await, 0);
    }
}
