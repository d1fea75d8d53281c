use serde::{Deserialize, Serialize};

use crate::domain::types::PurgeMode;
use crate::purge::environment::Capability;

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PurgeRequestBody {
    /// Omit to purge the whole site.
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub mode: PurgeMode,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HookRequestBody {
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub capability: Capability,
    pub queue_running: bool,
    pub queue_depth: usize,
}
