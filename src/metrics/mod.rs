// src/metrics/mod.rs
mod collector;
mod server;

pub use collector::{MetricsCollector, MetricsRegistry, RequestTimer};
pub use server::start_metrics_server;
