use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SensorReadings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SensorReadings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SensorReadings::DeviceId).string().not_null())
                    .col(
                        ColumnDef::new(SensorReadings::CapturedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SensorReadings::Document).json_binary().not_null())
                    .col(ColumnDef::new(SensorReadings::HealthScore).integer())
                    .col(ColumnDef::new(SensorReadings::Status).string())
                    .col(
                        ColumnDef::new(SensorReadings::ProcessedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SensorReadings::ProcessedBy).string().not_null())
                    .to_owned(),
            )
            .await?;

        // Recent-history lookups: newest first per device. Not unique, replays are stored twice.
        manager
            .create_index(
                Index::create()
                    .name("idx_sensor_readings_device_captured")
                    .table(SensorReadings::Table)
                    .col(SensorReadings::DeviceId)
                    .col((SensorReadings::CapturedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SensorReadings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SensorReadings {
    Table,
    Id,
    DeviceId,
    CapturedAt,
    Document,
    HealthScore,
    Status,
    ProcessedAt,
    ProcessedBy,
}
