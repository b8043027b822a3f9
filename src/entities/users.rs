use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 用户积分账户
/// - points: 当前可用积分，只能通过积分账本修改
/// - purchased_points: 累计购买积分，只增不减
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: Option<String>,
    pub points: i64,
    pub purchased_points: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
