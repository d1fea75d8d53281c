//! Cache-purge coordinator for a CDN edge microservice.
//!
//! Page-cache invalidations (theme switches, admin purges, third-party hooks)
//! are resolved against the site topology, deduplicated and forwarded to the
//! hosting platform's edge purge service, either inline or through a
//! background queue.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod purge;
