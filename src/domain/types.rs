//! Shared domain enumerations used across the purge pipeline and its wire formats.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Which edge endpoint a purge request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Invalidate a whole site root, addressed by scheme-less host.
    DomainPurge,
    /// Invalidate one path-based site of a shared-domain network.
    SubdirectoryPurge,
    /// Invalidate individual absolute URLs.
    UrlPurge,
}

impl EndpointKind {
    /// Path segment appended to the edge base URL.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            EndpointKind::DomainPurge => "purge-fpc-domain",
            EndpointKind::SubdirectoryPurge => "purge-fpc-sub-dir",
            EndpointKind::UrlPurge => "purge-fpc-url",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::DomainPurge => "domain",
            EndpointKind::SubdirectoryPurge => "sub_dir",
            EndpointKind::UrlPurge => "url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeMode {
    #[default]
    Immediate,
    Deferred,
}

impl PurgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PurgeMode::Immediate => "immediate",
            PurgeMode::Deferred => "deferred",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexibleStage {
    Staging,
    Production,
}

/// Hosting platform flavour that exposes the edge microservice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "stage")]
pub enum PlatformTag {
    FlexiblePlatform(FlexibleStage),
    AutoscalePlatform,
    Unknown,
}

impl PlatformTag {
    /// Value of the `platform` field in the purge body.
    pub fn wire_value(self) -> &'static str {
        match self {
            PlatformTag::FlexiblePlatform(_) => "fp",
            PlatformTag::AutoscalePlatform => "fmp",
            PlatformTag::Unknown => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EndpointUnresolved,
    TransportFailure,
    Disabled,
    SchedulerUnavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EndpointUnresolved => "endpoint_unresolved",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Disabled => "disabled",
            ErrorKind::SchedulerUnavailable => "scheduler_unavailable",
        }
    }
}

/// Lifecycle of one purge operation inside the edge client.
///
/// `Requested → Resolved | Unresolved`, `Resolved → Dispatched`,
/// `Dispatched → Completed | Failed`. `Unresolved`, `Completed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgePhase {
    Requested,
    Resolved,
    Unresolved,
    Dispatched,
    Completed,
    Failed,
}

impl PurgePhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurgePhase::Unresolved | PurgePhase::Completed | PurgePhase::Failed
        )
    }

    pub fn can_transition_to(self, next: PurgePhase) -> bool {
        matches!(
            (self, next),
            (PurgePhase::Requested, PurgePhase::Resolved)
                | (PurgePhase::Requested, PurgePhase::Unresolved)
                | (PurgePhase::Resolved, PurgePhase::Dispatched)
                | (PurgePhase::Dispatched, PurgePhase::Completed)
                | (PurgePhase::Dispatched, PurgePhase::Failed)
        )
    }

    pub fn advance(self, next: PurgePhase) -> Result<PurgePhase, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invariant(format!(
                "purge phase cannot move from {self:?} to {next:?}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobState {
    Queued,
    Running { attempt: u32 },
    Succeeded { status_code: u16 },
    /// The edge answered with a non-2xx status.
    Rejected { status_code: u16 },
    Failed { error_kind: ErrorKind },
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Rejected { .. } | JobState::Failed { .. }
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running { .. } => "running",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Rejected { .. } => "rejected",
            JobState::Failed { .. } => "failed",
        }
    }
}
