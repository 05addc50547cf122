//! The processing stages, in pipeline order.

pub mod schema;
pub mod mapper;
pub mod quality;
pub mod reconcile;
pub mod trips;
pub mod verification;
