use sea_orm_migration::prelude::*;

use crate::m20251104_000001_create_users_and_points_history::Users;

#[derive(DeriveIden)]
enum GenerationTasks {
    Table,
    Id,
    UserId,
    TaskId,
    Prompt,
    Model,
    Size,
    Resolution,
    ImageCount,
    CostPoints,
    Status,
    ImageUrls,
    ErrorMessage,
    Refunded,
    CreatedAt,
    CompletedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GenerationTasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GenerationTasks::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::TaskId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GenerationTasks::Prompt).text().not_null())
                    .col(
                        ColumnDef::new(GenerationTasks::Model)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::Size)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::Resolution)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::ImageCount)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::CostPoints)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::Status)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GenerationTasks::ImageUrls).json().null())
                    .col(ColumnDef::new(GenerationTasks::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(GenerationTasks::Refunded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationTasks::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generation_tasks_user")
                            .from(GenerationTasks::Table, GenerationTasks::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, col, unique) in [
            ("uq_generation_tasks_task_id", GenerationTasks::TaskId, true),
            ("idx_generation_tasks_user", GenerationTasks::UserId, false),
        ] {
            let mut index = Index::create();
            index
                .if_not_exists()
                .name(name)
                .table(GenerationTasks::Table)
                .col(col);
            if unique {
                index.unique();
            }
            manager.create_index(index.to_owned()).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(GenerationTasks::Table).to_owned())
            .await?;
        Ok(())
    }
}
