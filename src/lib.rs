pub mod app;
pub mod cancel;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod types;
