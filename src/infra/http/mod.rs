//! Inbound HTTP surface for purge triggers and operator queries.

pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;
