use crate::catalog::GenerationCatalog;
use crate::entities::{PointsAction, TaskStatus, generation_task_entity as tasks};
use crate::error::{AppError, AppResult};
use crate::external::{GenerationApiClient, GenerationRequest, OptimizePromptOptions};
use crate::models::{
    GenerateImageRequest, GenerateImageResponse, GenerationHistoryResponse, LimitOffsetParams,
    TaskSnapshot,
};
use crate::services::{LedgerEntry, PointsLedger};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct GenerationService {
    pool: DatabaseConnection,
    ledger: PointsLedger,
    api: Arc<dyn GenerationApiClient>,
    catalog: Arc<GenerationCatalog>,
}

impl GenerationService {
    pub fn new(
        pool: DatabaseConnection,
        api: Arc<dyn GenerationApiClient>,
        catalog: Arc<GenerationCatalog>,
    ) -> Self {
        Self {
            ledger: PointsLedger::new(pool.clone()),
            pool,
            api,
            catalog,
        }
    }

    pub fn config(&self) -> &GenerationCatalog {
        &self.catalog
    }

    /// 扣费 -> 提交 -> 记录任务；提交失败时退回积分
    pub async fn submit(
        &self,
        user_id: &str,
        request: GenerateImageRequest,
    ) -> AppResult<GenerateImageResponse> {
        let catalog = &self.catalog;
        let size = non_empty(request.size).unwrap_or_else(|| catalog.default_size.clone());
        let resolution =
            non_empty(request.resolution).unwrap_or_else(|| catalog.default_resolution.clone());
        let n = request.n.unwrap_or(catalog.default_n);

        catalog.validate(&request.prompt, &resolution, &size, n)?;
        let cost = catalog.calculate_cost(&resolution, n)?;

        let charge = LedgerEntry::new(user_id, cost, PointsAction::ImageGeneration)
            .description(format!("Image generation - {resolution} {size} x{n}"))
            .metadata(json!({
                "model": catalog.model,
                "resolution": resolution,
                "size": size,
                "n": n,
            }));
        let remaining = self.ledger.debit(&charge).await?;

        let mode = request
            .optimize_prompt_options
            .and_then(|o| non_empty(o.mode))
            .unwrap_or_else(|| catalog.default_optimize_mode.clone());
        let api_request = GenerationRequest {
            model: catalog.model.clone(),
            prompt: request.prompt.clone(),
            size: size.clone(),
            resolution: resolution.clone(),
            n,
            optimize_prompt_options: OptimizePromptOptions { mode },
            watermark: request.watermark.unwrap_or(false),
            image_urls: request.image_urls.filter(|urls| !urls.is_empty()),
        };

        let submitted = match self.api.submit(&api_request).await {
            Ok(submitted) => submitted,
            Err(e) => {
                let message = match &e {
                    AppError::UpstreamError { message, .. } => message.clone(),
                    AppError::ExternalApiError(message) => message.clone(),
                    other => other.to_string(),
                };
                log::error!("Image generation submit failed for user {user_id}: {e}");
                let refunded = self.refund_submission(user_id, cost, None).await;
                return Err(AppError::GenerationApiError { message, refunded });
            }
        };

        let row = tasks::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            task_id: Set(submitted.task_id.clone()),
            prompt: Set(request.prompt),
            model: Set(catalog.model.clone()),
            size: Set(size),
            resolution: Set(resolution),
            image_count: Set(n as i32),
            cost_points: Set(cost),
            status: Set(TaskStatus::Submitted),
            image_urls: Set(None),
            error_message: Set(None),
            refunded: Set(false),
            created_at: Set(Utc::now()),
            completed_at: Set(None),
        };
        if let Err(e) = tasks::Entity::insert(row)
            .exec_without_returning(&self.pool)
            .await
        {
            log::error!(
                "Failed to record generation task {}: {e}",
                submitted.task_id
            );
            let refunded = self
                .refund_submission(user_id, cost, Some(&submitted.task_id))
                .await;
            return Err(AppError::GenerationApiError {
                message: "Failed to record generation task".into(),
                refunded,
            });
        }

        log::info!(
            "User {user_id} submitted generation task {} costing {cost} points",
            submitted.task_id
        );

        Ok(GenerateImageResponse {
            task_id: submitted.task_id,
            status: submitted.status.unwrap_or_else(|| "submitted".to_string()),
            cost_points: cost,
            remaining_points: remaining,
        })
    }

    async fn refund_submission(&self, user_id: &str, cost: i64, task_id: Option<&str>) -> bool {
        let mut entry = LedgerEntry::new(user_id, cost, PointsAction::RefundImageGeneration)
            .description("Refund for failed image generation submission");
        if let Some(task_id) = task_id {
            entry = entry.metadata(json!({ "task_id": task_id }));
        }
        match self.ledger.credit(&entry).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("Refund of {cost} points for user {user_id} failed: {e}");
                false
            }
        }
    }

    async fn find_owned_task(&self, task_id: &str, user_id: &str) -> AppResult<tasks::Model> {
        let task = tasks::Entity::find()
            .filter(tasks::Column::TaskId.eq(task_id))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(task)
    }

    async fn reload(&self, task_id: &str) -> AppResult<tasks::Model> {
        tasks::Entity::find()
            .filter(tasks::Column::TaskId.eq(task_id))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".into()))
    }

    /// 同步任务状态。终态任务直接返回缓存，不再调用第三方。
    pub async fn refresh_status(
        &self,
        task_id: &str,
        user_id: &str,
        language: &str,
    ) -> AppResult<TaskSnapshot> {
        let task = self.find_owned_task(task_id, user_id).await?;

        if task.status.is_terminal() {
            if task.status == TaskStatus::Failed && !task.refunded {
                let txn = self.pool.begin().await?;
                Self::refund_failed_in(&txn, &task).await?;
                txn.commit().await?;
                let task = self.reload(task_id).await?;
                return Ok(TaskSnapshot { task, live: None });
            }
            return Ok(TaskSnapshot { task, live: None });
        }

        let live = self.api.fetch_task(task_id, language).await?;

        match TaskStatus::from_provider(&live.status) {
            Some(next) if task.status.can_advance_to(next) => {
                let now = Utc::now();
                let mut changes = tasks::ActiveModel {
                    status: Set(next),
                    ..Default::default()
                };
                match next {
                    TaskStatus::Completed => {
                        changes.image_urls = Set(Some(json!(live.image_urls())));
                        changes.completed_at = Set(Some(now));
                    }
                    TaskStatus::Failed => {
                        changes.error_message = Set(Some(
                            live.error_message()
                                .unwrap_or_else(|| "Generation failed".to_string()),
                        ));
                        changes.completed_at = Set(Some(now));
                    }
                    _ => {}
                }

                let txn = self.pool.begin().await?;
                let res = tasks::Entity::update_many()
                    .set(changes)
                    .filter(tasks::Column::TaskId.eq(task_id))
                    .filter(tasks::Column::Status.is_in(next.predecessors()))
                    .exec(&txn)
                    .await?;
                if res.rows_affected == 1 {
                    log::info!("Task {task_id} moved from {} to {next}", task.status);
                    if next == TaskStatus::Failed {
                        Self::refund_failed_in(&txn, &task).await?;
                    }
                }
                txn.commit().await?;
            }
            Some(_) => {}
            None => log::warn!(
                "Task {task_id} returned unknown provider status: {}",
                live.status
            ),
        }

        let task = self.reload(task_id).await?;
        Ok(TaskSnapshot {
            task,
            live: Some(live),
        })
    }

    /// refunded 由 false 翻转为 true 的那一次才退款
    async fn refund_failed_in<C: ConnectionTrait>(conn: &C, task: &tasks::Model) -> AppResult<bool> {
        let gate = tasks::Entity::update_many()
            .col_expr(tasks::Column::Refunded, Expr::value(true))
            .filter(tasks::Column::TaskId.eq(task.task_id.as_str()))
            .filter(tasks::Column::Status.eq(TaskStatus::Failed))
            .filter(tasks::Column::Refunded.eq(false))
            .exec(conn)
            .await?;
        if gate.rows_affected == 0 {
            return Ok(false);
        }

        let entry = LedgerEntry::new(
            task.user_id.as_str(),
            task.cost_points,
            PointsAction::RefundImageGeneration,
        )
        .description(format!("Refund for failed generation task {}", task.task_id))
        .metadata(json!({ "task_id": task.task_id }));
        PointsLedger::credit_in(conn, &entry).await?;
        log::info!(
            "Refunded {} points to user {} for failed task {}",
            task.cost_points,
            task.user_id,
            task.task_id
        );
        Ok(true)
    }

    pub async fn history(
        &self,
        user_id: &str,
        params: &LimitOffsetParams,
    ) -> AppResult<GenerationHistoryResponse> {
        let limit = params.get_limit();
        let offset = params.get_offset();

        let query = tasks::Entity::find().filter(tasks::Column::UserId.eq(user_id));
        let total = query.clone().count(&self.pool).await?;
        let rows = query
            .order_by_desc(tasks::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.pool)
            .await?;

        Ok(GenerationHistoryResponse {
            tasks: rows.into_iter().map(Into::into).collect(),
            total,
            limit,
            offset,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
