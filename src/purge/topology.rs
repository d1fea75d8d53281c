//! Topology resolution.
//!
//! Turns a purge scope and the current site network shape into the concrete
//! URL list and the edge endpoint that must receive it. The URL shape and the
//! endpoint kind must agree, otherwise the edge service invalidates the wrong
//! cache partition.

use crate::domain::entities::{MemberSite, SiteTopology};
use crate::domain::types::EndpointKind;

use super::normalize::{ensure_trailing_slash, normalize, strip_scheme, strip_trailing_slash};

/// What the caller asked to purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeScope {
    /// Explicit list of page URLs.
    Urls(Vec<String>),
    /// Everything under every site home URL.
    WholeSite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub urls: Vec<String>,
    pub endpoint_kind: EndpointKind,
}

/// Source of the current site network.
pub trait SiteRegistry: Send + Sync {
    fn topology(&self) -> SiteTopology;
}

/// Registry backed by a fixed topology, typically loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticSiteRegistry {
    topology: SiteTopology,
}

impl StaticSiteRegistry {
    pub fn new(topology: SiteTopology) -> Self {
        Self { topology }
    }
}

impl SiteRegistry for StaticSiteRegistry {
    fn topology(&self) -> SiteTopology {
        self.topology.clone()
    }
}

/// Resolve the targets for `scope`. Returns `None` when nothing valid remains.
pub fn resolve(scope: &PurgeScope, topology: &SiteTopology) -> Option<ResolvedTargets> {
    let (urls, endpoint_kind) = match scope {
        PurgeScope::Urls(urls) => (normalize(urls), EndpointKind::UrlPurge),
        PurgeScope::WholeSite => resolve_whole_site(topology),
    };

    (!urls.is_empty()).then_some(ResolvedTargets {
        urls,
        endpoint_kind,
    })
}

fn resolve_whole_site(topology: &SiteTopology) -> (Vec<String>, EndpointKind) {
    if !topology.is_multisite {
        let homes = normalize(topology.member_sites.first().map(site_home));
        return (
            homes.iter().map(|url| strip_scheme(url)).collect(),
            EndpointKind::DomainPurge,
        );
    }

    let homes = normalize(topology.member_sites.iter().map(site_home));

    if topology.is_subdomain_install {
        (
            homes.iter().map(|url| strip_scheme(url)).collect(),
            EndpointKind::DomainPurge,
        )
    } else {
        (
            homes
                .iter()
                .map(|url| strip_trailing_slash(url).to_string())
                .collect(),
            EndpointKind::SubdirectoryPurge,
        )
    }
}

fn site_home(site: &MemberSite) -> String {
    ensure_trailing_slash(site.home_url.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(subdomain: bool, homes: &[&str]) -> SiteTopology {
        SiteTopology {
            is_multisite: true,
            is_subdomain_install: subdomain,
            member_sites: homes
                .iter()
                .enumerate()
                .map(|(idx, home)| MemberSite {
                    id: idx as u64 + 1,
                    home_url: home.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn explicit_list_uses_url_endpoint() {
        let topology = SiteTopology::single("https://example.com");
        let scope = PurgeScope::Urls(vec![
            "https://example.com/page/".to_string(),
            " https://example.com/page/ ".to_string(),
            "nope".to_string(),
        ]);
        let targets = resolve(&scope, &topology).expect("targets");
        assert_eq!(targets.endpoint_kind, EndpointKind::UrlPurge);
        assert_eq!(targets.urls, vec!["https://example.com/page/"]);
    }

    #[test]
    fn explicit_list_of_garbage_resolves_to_nothing() {
        let topology = SiteTopology::single("https://example.com");
        let scope = PurgeScope::Urls(vec!["   ".to_string(), "bad".to_string()]);
        assert!(resolve(&scope, &topology).is_none());
    }

    #[test]
    fn single_site_strips_scheme() {
        let topology = SiteTopology::single("https://example.com/");
        let targets = resolve(&PurgeScope::WholeSite, &topology).expect("targets");
        assert_eq!(targets.endpoint_kind, EndpointKind::DomainPurge);
        assert_eq!(targets.urls, vec!["example.com"]);
    }

    #[test]
    fn subdomain_network_purges_every_domain() {
        let topology = network(true, &["https://a.example.com", "https://b.example.com/"]);
        let targets = resolve(&PurgeScope::WholeSite, &topology).expect("targets");
        assert_eq!(targets.endpoint_kind, EndpointKind::DomainPurge);
        assert_eq!(targets.urls, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn subdirectory_network_keeps_scheme() {
        let topology = network(
            false,
            &["https://example.com/", "https://example.com/shop/"],
        );
        let targets = resolve(&PurgeScope::WholeSite, &topology).expect("targets");
        assert_eq!(targets.endpoint_kind, EndpointKind::SubdirectoryPurge);
        assert_eq!(
            targets.urls,
            vec!["https://example.com", "https://example.com/shop"]
        );
    }

    #[test]
    fn duplicate_home_urls_collapse() {
        let topology = network(true, &["https://a.example.com", "https://a.example.com/"]);
        let targets = resolve(&PurgeScope::WholeSite, &topology).expect("targets");
        assert_eq!(targets.urls, vec!["a.example.com"]);
    }

    #[test]
    fn empty_registry_resolves_to_nothing() {
        assert!(resolve(&PurgeScope::WholeSite, &SiteTopology::default()).is_none());
    }

    #[test]
    fn home_url_without_authority_slashes_resolves_to_nothing() {
        let topology = SiteTopology::single("https:example.com");
        assert!(resolve(&PurgeScope::WholeSite, &topology).is_none());

        let topology = network(true, &["http:/a.example.com", "https://b.example.com"]);
        let targets = resolve(&PurgeScope::WholeSite, &topology).expect("targets");
        assert_eq!(targets.urls, vec!["b.example.com"]);
    }
}
