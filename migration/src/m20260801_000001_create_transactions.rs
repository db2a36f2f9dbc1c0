use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Minting ledger. One row per transaction ever observed paying the
        // watched address; rows are never deleted while status = pending.
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Txid)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::FirstSeenMs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::AmountSats)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::BlockHeight).big_integer())
                    .col(ColumnDef::new(Transactions::SenderAddress).text())
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::InscriptionId).text())
                    .col(ColumnDef::new(Transactions::CompletedAtMs).big_integer())
                    .to_owned(),
            )
            .await?;

        // The pending queue is read on every worker tick.
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_status")
                    .table(Transactions::Table)
                    .col(Transactions::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Txid,
    FirstSeenMs,
    AmountSats,
    BlockHeight,
    SenderAddress,
    Status,
    InscriptionId,
    CompletedAtMs,
}
