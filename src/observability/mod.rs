// Observability: metrics and phase counters

pub mod metrics;
