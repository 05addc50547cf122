// Shared helpers used across pipeline stages

pub mod constants;
pub mod geo;
pub mod time;
