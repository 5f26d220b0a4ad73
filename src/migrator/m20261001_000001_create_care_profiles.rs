use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CareProfiles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CareProfiles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CareProfiles::ProfileId).string().not_null())
                    .col(
                        ColumnDef::new(CareProfiles::DeviceId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(CareProfiles::MoistureMin).double().not_null())
                    .col(ColumnDef::new(CareProfiles::MoistureMax).double().not_null())
                    .col(ColumnDef::new(CareProfiles::LightMin).double())
                    .col(ColumnDef::new(CareProfiles::TempMin).double())
                    .col(ColumnDef::new(CareProfiles::TempMax).double())
                    .col(
                        ColumnDef::new(CareProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CareProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CareProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CareProfiles {
    Table,
    Id,
    ProfileId,
    DeviceId,
    MoistureMin,
    MoistureMax,
    LightMin,
    TempMin,
    TempMax,
    CreatedAt,
    UpdatedAt,
}
