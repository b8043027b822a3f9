use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum PaymentRecords {
    Table,
    Id,
    UserId,
    ProviderCustomerId,
    CheckoutSessionId,
    PaymentStatus,
    Amount,
    Currency,
    PointsAmount,
    Metadata,
    WebhookEventId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PaymentRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentRecords::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::ProviderCustomerId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::CheckoutSessionId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::PaymentStatus)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::Currency)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::PointsAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentRecords::Metadata).json().null())
                    .col(
                        ColumnDef::new(PaymentRecords::WebhookEventId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // checkout_session_id 是 webhook 去重键
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .unique()
                    .name("uq_payment_records_checkout_session")
                    .table(PaymentRecords::Table)
                    .col(PaymentRecords::CheckoutSessionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payment_records_user")
                    .table(PaymentRecords::Table)
                    .col(PaymentRecords::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(PaymentRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}
