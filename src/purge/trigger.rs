//! Inbound events that ask for a cache purge.

use serde::{Deserialize, Serialize};

use crate::domain::types::PurgeMode;

use super::topology::PurgeScope;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PurgeTrigger {
    /// Explicit admin purge. `None` means the whole site.
    SitePurge {
        #[serde(default)]
        urls: Option<Vec<String>>,
        #[serde(default)]
        mode: PurgeMode,
    },
    /// The active theme was switched.
    ThemeChanged,
    /// A third-party integration asked for everything to be cleared.
    ExternalHook { source: String },
}

impl PurgeTrigger {
    pub fn scope(&self) -> PurgeScope {
        match self {
            PurgeTrigger::SitePurge {
                urls: Some(urls), ..
            } => PurgeScope::Urls(urls.clone()),
            _ => PurgeScope::WholeSite,
        }
    }

    pub fn mode(&self) -> PurgeMode {
        match self {
            PurgeTrigger::SitePurge { mode, .. } => *mode,
            PurgeTrigger::ThemeChanged | PurgeTrigger::ExternalHook { .. } => PurgeMode::Immediate,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PurgeTrigger::SitePurge { .. } => "site_purge",
            PurgeTrigger::ThemeChanged => "theme_changed",
            PurgeTrigger::ExternalHook { .. } => "external_hook",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_switch_is_whole_site_and_immediate() {
        let trigger = PurgeTrigger::ThemeChanged;
        assert_eq!(trigger.scope(), PurgeScope::WholeSite);
        assert_eq!(trigger.mode(), PurgeMode::Immediate);
    }

    #[test]
    fn site_purge_with_list_targets_urls() {
        let trigger = PurgeTrigger::SitePurge {
            urls: Some(vec!["https://example.com/a/".to_string()]),
            mode: PurgeMode::Deferred,
        };
        assert_eq!(
            trigger.scope(),
            PurgeScope::Urls(vec!["https://example.com/a/".to_string()])
        );
        assert_eq!(trigger.mode(), PurgeMode::Deferred);
    }

    #[test]
    fn site_purge_deserializes_with_defaults() {
        let trigger: PurgeTrigger =
            serde_json::from_str(r#"{"event":"site_purge"}"#).expect("json");
        assert_eq!(
            trigger,
            PurgeTrigger::SitePurge {
                urls: None,
                mode: PurgeMode::Immediate
            }
        );
        assert_eq!(trigger.scope(), PurgeScope::WholeSite);
    }

    #[test]
    fn external_hook_clears_everything() {
        let trigger = PurgeTrigger::ExternalHook {
            source: "events-calendar".to_string(),
        };
        assert_eq!(trigger.scope(), PurgeScope::WholeSite);
        assert_eq!(trigger.label(), "external_hook");
    }
}
