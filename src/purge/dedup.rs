//! Purge deduplication.
//!
//! Fingerprints resolved purge targets and remembers which ones were already
//! sent, so that two triggers reacting to the same event only reach the edge
//! service once. Best effort: nothing is shared across processes and racing
//! callers may both dispatch.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::domain::types::EndpointKind;

/// Hex-encoded SHA-256 over the endpoint kind and the sorted URL set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PurgeFingerprint(String);

impl PurgeFingerprint {
    pub fn compute(endpoint_kind: EndpointKind, urls: &[String]) -> Self {
        let mut canonical: Vec<&str> = urls.iter().map(String::as_str).collect();
        canonical.sort_unstable();
        canonical.dedup();

        let mut hasher = Sha256::new();
        hasher.update(endpoint_kind.endpoint_path().as_bytes());
        for url in canonical {
            hasher.update([0u8]);
            hasher.update(url.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PurgeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage seam for processed fingerprints.
pub trait FingerprintStore: Send + Sync {
    fn has_been_processed(&self, fingerprint: &PurgeFingerprint) -> bool;
    fn mark_processed(&self, fingerprint: PurgeFingerprint);
    /// Release a fingerprint whose dispatch failed so a re-invocation is not suppressed.
    fn forget(&self, fingerprint: &PurgeFingerprint);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Entries live for the whole process lifetime.
    None,
    /// Entries older than the duration count as unprocessed.
    Ttl(Duration),
}

impl EvictionPolicy {
    /// `0` seconds means no eviction.
    pub fn from_ttl_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            EvictionPolicy::None
        } else {
            EvictionPolicy::Ttl(Duration::from_secs(seconds))
        }
    }
}

pub struct InMemoryFingerprintStore {
    policy: EvictionPolicy,
    entries: DashMap<PurgeFingerprint, Instant>,
}

impl InMemoryFingerprintStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, recorded_at: Instant) -> bool {
        match self.policy {
            EvictionPolicy::None => true,
            EvictionPolicy::Ttl(ttl) => recorded_at.elapsed() < ttl,
        }
    }
}

impl FingerprintStore for InMemoryFingerprintStore {
    fn has_been_processed(&self, fingerprint: &PurgeFingerprint) -> bool {
        let fresh = match self.entries.get(fingerprint) {
            Some(entry) => self.is_fresh(*entry.value()),
            None => return false,
        };
        if !fresh {
            self.entries.remove(fingerprint);
        }
        fresh
    }

    fn mark_processed(&self, fingerprint: PurgeFingerprint) {
        if let EvictionPolicy::Ttl(ttl) = self.policy {
            self.entries.retain(|_, recorded_at| recorded_at.elapsed() < ttl);
        }
        self.entries.insert(fingerprint, Instant::now());
    }

    fn forget(&self, fingerprint: &PurgeFingerprint) {
        self.entries.remove(fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fingerprint_ignores_order() {
        let a = PurgeFingerprint::compute(
            EndpointKind::DomainPurge,
            &urls(&["a.example.com", "b.example.com"]),
        );
        let b = PurgeFingerprint::compute(
            EndpointKind::DomainPurge,
            &urls(&["b.example.com", "a.example.com"]),
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_endpoint_and_content() {
        let list = urls(&["https://example.com"]);
        let domain = PurgeFingerprint::compute(EndpointKind::DomainPurge, &list);
        let subdir = PurgeFingerprint::compute(EndpointKind::SubdirectoryPurge, &list);
        assert_ne!(domain, subdir);

        let other = PurgeFingerprint::compute(
            EndpointKind::DomainPurge,
            &urls(&["https://example.org"]),
        );
        assert_ne!(domain, other);
    }

    #[test]
    fn fingerprint_is_not_fooled_by_concatenation() {
        let joined = PurgeFingerprint::compute(EndpointKind::UrlPurge, &urls(&["ab"]));
        let split = PurgeFingerprint::compute(EndpointKind::UrlPurge, &urls(&["a", "b"]));
        assert_ne!(joined, split);
    }

    #[test]
    fn store_remembers_until_forgotten() {
        let store = InMemoryFingerprintStore::new(EvictionPolicy::None);
        let fp = PurgeFingerprint::compute(EndpointKind::UrlPurge, &urls(&["https://a.com/"]));

        assert!(!store.has_been_processed(&fp));
        store.mark_processed(fp.clone());
        assert!(store.has_been_processed(&fp));

        store.forget(&fp);
        assert!(!store.has_been_processed(&fp));
        assert!(store.is_empty());
    }

    #[test]
    fn ttl_policy_expires_entries() {
        let store = InMemoryFingerprintStore::new(EvictionPolicy::Ttl(Duration::from_millis(20)));
        let fp = PurgeFingerprint::compute(EndpointKind::UrlPurge, &urls(&["https://a.com/"]));

        store.mark_processed(fp.clone());
        assert!(store.has_been_processed(&fp));

        std::thread::sleep(Duration::from_millis(40));
        assert!(!store.has_been_processed(&fp));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn zero_ttl_means_process_lifetime() {
        assert_eq!(EvictionPolicy::from_ttl_seconds(0), EvictionPolicy::None);
        assert_eq!(
            EvictionPolicy::from_ttl_seconds(5),
            EvictionPolicy::Ttl(Duration::from_secs(5))
        );
    }
}
