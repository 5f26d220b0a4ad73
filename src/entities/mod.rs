pub mod alerts;
pub mod care_profile;
pub mod sensor_reading;

pub use alerts::Entity as Alerts;
pub use care_profile::Entity as CareProfiles;
pub use sensor_reading::Entity as SensorReadings;
