pub mod common;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod observability;
pub mod pipeline;
