//! Cache-purge pipeline.
//!
//! A purge flows through these stages:
//! - `trigger`: inbound events (admin purge, theme switch, third-party hooks)
//! - `environment`: capability gate and edge endpoint resolution
//! - `topology`: expands the scope into URLs and picks the edge endpoint
//! - `normalize`: trims, deduplicates and validates URLs
//! - `dedup`: suppresses repeated purges of the same target set
//! - `dispatch` / `queue`: inline or deferred execution
//!
//! [`coordinator::PurgeCoordinator`] ties the stages together.

pub mod coordinator;
pub mod dedup;
pub mod dispatch;
pub mod environment;
pub mod normalize;
pub mod queue;
pub mod topology;
pub mod trigger;

pub use coordinator::{PurgeCoordinator, PurgeStatus, SkipReason};
pub use dedup::{EvictionPolicy, FingerprintStore, InMemoryFingerprintStore, PurgeFingerprint};
pub use dispatch::{DispatchResult, Dispatcher, EdgePurger};
pub use environment::{Capability, EnvironmentDetector, HostSignals, HostingEnvironmentProbe};
pub use queue::{JobId, JobRecord, PurgeQueue, QueueOptions};
pub use topology::{PurgeScope, SiteRegistry, StaticSiteRegistry};
pub use trigger::PurgeTrigger;
