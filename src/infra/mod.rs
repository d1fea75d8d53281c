//! Infrastructure adapters and runtime bootstrap.

pub mod edge;
pub mod error;
pub mod hosting;
pub mod http;
pub mod telemetry;
