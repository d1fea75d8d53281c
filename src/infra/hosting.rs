//! Hosting signals read from the process environment.

use std::env;

use crate::config::HostingSettings;
use crate::purge::environment::{HostSignals, HostingEnvironmentProbe};

pub const DOCUMENT_ROOT_VAR: &str = "DOCUMENT_ROOT";
pub const EDGE_ENV_VAR: &str = "FPC_ENV";
pub const CF_WORKER_VAR: &str = "HTTP_CF_WORKER";

/// Reads the hosting variables on every call; configured values win.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvProbe {
    overrides: HostingSettings,
}

impl ProcessEnvProbe {
    pub fn new(overrides: HostingSettings) -> Self {
        Self { overrides }
    }
}

impl HostingEnvironmentProbe for ProcessEnvProbe {
    fn signals(&self) -> HostSignals {
        let document_root = self
            .overrides
            .document_root
            .clone()
            .or_else(|| read_var(DOCUMENT_ROOT_VAR));
        let edge_env = self
            .overrides
            .edge_env
            .clone()
            .or_else(|| read_var(EDGE_ENV_VAR));
        let cf_worker = self
            .overrides
            .cf_worker
            .unwrap_or_else(|| read_var(CF_WORKER_VAR).is_some());

        HostSignals {
            document_root,
            edge_env,
            cf_worker,
        }
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
