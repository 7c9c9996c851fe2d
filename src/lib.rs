pub mod apis;
pub mod config;
pub mod constants;
pub mod date;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod provenance;
pub mod reconcile;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod types;
pub mod upload;
pub mod validation;
