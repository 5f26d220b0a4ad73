pub mod analyzer;
pub mod api;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod migrator;
pub mod model;
pub mod notifications;
pub mod source;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use sea_orm;
