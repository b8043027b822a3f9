//! 测试用内存数据库

use crate::entities::user_entity as users;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};

/// sqlite 内存库只在单个连接内可见，因此连接池大小固定为 1
pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

pub async fn seed_user(db: &DatabaseConnection, id: &str, points: i64) {
    let now = Utc::now();
    users::Entity::insert(users::ActiveModel {
        id: Set(id.to_string()),
        email: Set(Some(format!("{id}@example.com"))),
        points: Set(points),
        purchased_points: Set(0),
        created_at: Set(Some(now)),
        updated_at: Set(Some(now)),
    })
    .exec_without_returning(db)
    .await
    .expect("seed user");
}

pub async fn user_points(db: &DatabaseConnection, id: &str) -> i64 {
    users::Entity::find_by_id(id.to_string())
        .one(db)
        .await
        .expect("query user")
        .map(|u| u.points)
        .unwrap_or_default()
}
