use sea_orm_migration::prelude::*;

mod m20261001_000001_create_care_profiles;
mod m20261001_000002_create_sensor_readings;
mod m20261001_000003_create_alerts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_care_profiles::Migration),
            Box::new(m20261001_000002_create_sensor_readings::Migration),
            Box::new(m20261001_000003_create_alerts::Migration),
        ]
    }
}
