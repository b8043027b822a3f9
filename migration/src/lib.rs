pub use sea_orm_migration::prelude::*;

mod m20251104_000001_create_users_and_points_history;
mod m20251104_000002_create_payment_records;
mod m20251110_000001_create_generation_tasks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251104_000001_create_users_and_points_history::Migration),
            Box::new(m20251104_000002_create_payment_records::Migration),
            Box::new(m20251110_000001_create_generation_tasks::Migration),
        ]
    }
}
