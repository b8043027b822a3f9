//! 积分账本：余额的唯一修改入口。
//!
//! 每次变更都是 "条件更新余额 + 追加一条流水"，两步必须在同一事务里完成。
//! `*_in` 版本接收外部连接/事务，供其他服务组合进自己的事务。

use crate::entities::{PointsAction, PointsType, points_history_entity as history, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::{LimitOffsetParams, PointsBalanceResponse, PointsHistoryResponse};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: String,
    /// 正数；方向由 credit / debit 决定
    pub amount: i64,
    pub points_type: PointsType,
    pub action: PointsAction,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

impl LedgerEntry {
    pub fn new(user_id: impl Into<String>, amount: i64, action: PointsAction) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            points_type: PointsType::Purchased,
            action,
            description: None,
            metadata: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone)]
pub struct PointsLedger {
    pool: DatabaseConnection,
}

impl PointsLedger {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 增加积分，返回新余额
    pub async fn credit_in<C: ConnectionTrait>(conn: &C, entry: &LedgerEntry) -> AppResult<i64> {
        ensure_positive(entry.amount)?;

        let mut update = users::Entity::update_many()
            .col_expr(
                users::Column::Points,
                Expr::col(users::Column::Points).add(entry.amount),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(entry.user_id.as_str()));
        if entry.action == PointsAction::Purchase {
            update = update.col_expr(
                users::Column::PurchasedPoints,
                Expr::col(users::Column::PurchasedPoints).add(entry.amount),
            );
        }

        let res = update.exec(conn).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }

        append_history(conn, entry, entry.amount).await?;
        current_points(conn, &entry.user_id).await
    }

    /// 扣减积分；余额不足时不做任何修改
    pub async fn debit_in<C: ConnectionTrait>(conn: &C, entry: &LedgerEntry) -> AppResult<i64> {
        ensure_positive(entry.amount)?;

        // 读取余额与条件更新之间可能有并发入账，允许重试一次
        let mut retried = false;
        while !try_debit(conn, entry).await? {
            let user = users::Entity::find_by_id(entry.user_id.clone())
                .one(conn)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".into()))?;
            if retried || user.points < entry.amount {
                return Err(insufficient(entry.amount, user.points));
            }
            retried = true;
        }

        append_history(conn, entry, -entry.amount).await?;
        current_points(conn, &entry.user_id).await
    }

    pub async fn credit(&self, entry: &LedgerEntry) -> AppResult<i64> {
        let txn = self.pool.begin().await?;
        let balance = Self::credit_in(&txn, entry).await?;
        txn.commit().await?;
        Ok(balance)
    }

    pub async fn debit(&self, entry: &LedgerEntry) -> AppResult<i64> {
        let txn = self.pool.begin().await?;
        let balance = Self::debit_in(&txn, entry).await?;
        txn.commit().await?;
        Ok(balance)
    }

    pub async fn balance(&self, user_id: &str) -> AppResult<PointsBalanceResponse> {
        let user = users::Entity::find_by_id(user_id.to_string())
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        Ok(user.into())
    }

    /// 积分流水，按时间倒序
    pub async fn history(
        &self,
        user_id: &str,
        params: &LimitOffsetParams,
    ) -> AppResult<PointsHistoryResponse> {
        let limit = params.get_limit();
        let offset = params.get_offset();

        let query = history::Entity::find().filter(history::Column::UserId.eq(user_id));
        let total = query.clone().count(&self.pool).await?;
        let items = query
            .order_by_desc(history::Column::CreatedAt)
            .order_by_desc(history::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.pool)
            .await?;

        Ok(PointsHistoryResponse {
            items: items.into_iter().map(Into::into).collect(),
            total,
            limit,
            offset,
        })
    }
}

fn ensure_positive(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::ValidationError(
            "Points amount must be positive".into(),
        ));
    }
    Ok(())
}

async fn try_debit<C: ConnectionTrait>(conn: &C, entry: &LedgerEntry) -> AppResult<bool> {
    let res = users::Entity::update_many()
        .col_expr(
            users::Column::Points,
            Expr::col(users::Column::Points).sub(entry.amount),
        )
        .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(users::Column::Id.eq(entry.user_id.as_str()))
        .filter(users::Column::Points.gte(entry.amount))
        .exec(conn)
        .await?;
    Ok(res.rows_affected > 0)
}

fn insufficient(required: i64, current: i64) -> AppError {
    AppError::InsufficientCredits {
        required,
        current,
        missing: (required - current).max(0),
    }
}

async fn append_history<C: ConnectionTrait>(
    conn: &C,
    entry: &LedgerEntry,
    signed_points: i64,
) -> AppResult<()> {
    let row = history::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(entry.user_id.clone()),
        points: Set(signed_points),
        points_type: Set(entry.points_type),
        action: Set(entry.action),
        description: Set(entry.description.clone()),
        metadata: Set(entry.metadata.clone()),
        created_at: Set(Utc::now()),
    };
    history::Entity::insert(row).exec_without_returning(conn).await?;
    Ok(())
}

async fn current_points<C: ConnectionTrait>(conn: &C, user_id: &str) -> AppResult<i64> {
    let user = users::Entity::find_by_id(user_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(user.points)
}
