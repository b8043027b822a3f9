use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Users {
    Table,
    Id,
    Email,
    Points,
    PurchasedPoints,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PointsHistory {
    Table,
    Id,
    UserId,
    Points,
    PointsType,
    Action,
    Description,
    Metadata,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // users 由外部身份服务创建，这里只维护积分字段
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string_len(255).null())
                    .col(
                        ColumnDef::new(Users::Points)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Users::PurchasedPoints)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PointsHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PointsHistory::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PointsHistory::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsHistory::Points)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsHistory::PointsType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointsHistory::Action)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PointsHistory::Description).text().null())
                    .col(ColumnDef::new(PointsHistory::Metadata).json().null())
                    .col(
                        ColumnDef::new(PointsHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_points_history_user")
                            .from(PointsHistory::Table, PointsHistory::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_points_history_user_created")
                    .table(PointsHistory::Table)
                    .col(PointsHistory::UserId)
                    .col(PointsHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(PointsHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
