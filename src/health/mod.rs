// src/health/mod.rs
mod checker;
mod probe;

pub use checker::{HealthCheckResult, HealthChecker};
pub use probe::{create_probe, HealthProbe, HttpProbe, ProbeError, TcpProbe};
