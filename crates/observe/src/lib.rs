//! Initialization logic for metrics and logging shared between the binaries,
//! plus the probe endpoints monitoring talks to.

pub mod metrics;
pub mod tracing;
