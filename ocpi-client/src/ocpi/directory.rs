//! Endpoint directory
//!
//! Per-client cache of what the peer advertised:
//! - version id -> discovery URL (replaced as a whole snapshot)
//! - version id -> version detail (replaced per entry)
//! - the currently selected version
//!
//! The directory itself never talks to the network; `CredentialsClient` fills
//! it on demand.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};
use url::Url;

use super::types::{InterfaceRole, ModuleId, VersionDetail, VersionId, VersionInformation};

#[derive(Debug, Default)]
pub struct EndpointDirectory {
    versions: RwLock<Arc<HashMap<VersionId, Url>>>,
    details: DashMap<VersionId, Arc<VersionDetail>>,
    selected: RwLock<Option<VersionId>>,
}

impl EndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole version map with `versions`.
    ///
    /// Every cached detail is dropped with the old map, so endpoints are
    /// fetched again from the new discovery URLs. The selected version is
    /// left alone.
    pub fn replace_versions(&self, versions: &[VersionInformation]) {
        let snapshot: HashMap<VersionId, Url> = versions
            .iter()
            .map(|v| (v.version.clone(), v.url.clone()))
            .collect();

        *self.versions.write() = Arc::new(snapshot);
        self.details.clear();

        info!("Version cache replaced with {} versions", versions.len());
    }

    /// Discovery URL of `version`, if advertised
    pub fn version_url(&self, version: &VersionId) -> Option<Url> {
        self.versions.read().get(version).cloned()
    }

    /// Cached versions, highest first
    pub fn versions(&self) -> Vec<VersionInformation> {
        let snapshot = self.versions.read().clone();
        let mut versions: Vec<VersionInformation> = snapshot
            .iter()
            .map(|(version, url)| VersionInformation {
                version: version.clone(),
                url: url.clone(),
            })
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions
    }

    pub fn highest_version(&self) -> Option<VersionId> {
        self.versions.read().keys().max().cloned()
    }

    pub fn version_detail(&self, version: &VersionId) -> Option<Arc<VersionDetail>> {
        self.details.get(version).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or replace the detail cached for `version`
    pub fn upsert_version_detail(
        &self,
        version: VersionId,
        detail: VersionDetail,
        set_as_default: bool,
    ) -> Arc<VersionDetail> {
        let detail = Arc::new(detail);
        self.details.insert(version.clone(), Arc::clone(&detail));
        debug!("Cached {} endpoints for version {}", detail.endpoints.len(), version);

        if set_as_default {
            self.select_version(version);
        }
        detail
    }

    pub fn selected_version(&self) -> Option<VersionId> {
        self.selected.read().clone()
    }

    pub fn select_version(&self, version: VersionId) {
        let mut selected = self.selected.write();
        if selected.as_ref() != Some(&version) {
            info!("Selected version {}", version);
            *selected = Some(version);
        }
    }

    /// Version to use when the caller does not name one: the selected
    /// version, else the highest cached one.
    pub fn preferred_version(&self) -> Option<VersionId> {
        self.selected_version().or_else(|| self.highest_version())
    }

    /// URL of `module` in the cached detail of `version`, if both are known
    pub fn cached_endpoint(
        &self,
        module: &ModuleId,
        version: &VersionId,
        role: Option<InterfaceRole>,
    ) -> Option<Url> {
        self.version_detail(version)
            .and_then(|detail| detail.endpoint(module, role).map(|e| e.url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpi::types::Endpoint;

    fn info(version: &str) -> VersionInformation {
        VersionInformation {
            version: VersionId::from(version),
            url: Url::parse(&format!("https://peer.example/ocpi/{}", version)).unwrap(),
        }
    }

    fn detail(version: &str, url: &str) -> VersionDetail {
        VersionDetail {
            version: VersionId::from(version),
            endpoints: vec![Endpoint {
                identifier: ModuleId::credentials(),
                role: None,
                url: Url::parse(url).unwrap(),
            }],
        }
    }

    #[test]
    fn test_replace_versions_is_total() {
        let directory = EndpointDirectory::new();
        directory.replace_versions(&[info("2.1.1"), info("2.2")]);
        assert!(directory.version_url(&VersionId::from("2.1.1")).is_some());

        directory.replace_versions(&[info("2.2")]);
        assert!(directory.version_url(&VersionId::from("2.1.1")).is_none());
        assert!(directory.version_url(&VersionId::from("2.2")).is_some());
        assert_eq!(directory.versions().len(), 1);
    }

    #[test]
    fn test_replace_drops_all_details() {
        let directory = EndpointDirectory::new();
        directory.replace_versions(&[info("2.1.1"), info("2.2")]);
        directory.upsert_version_detail(VersionId::from("2.1.1"), detail("2.1.1", "https://a/c"), false);
        directory.upsert_version_detail(VersionId::from("2.2"), detail("2.2", "https://b/c"), false);

        // 2.2 is still advertised, its detail goes anyway
        directory.replace_versions(&[info("2.2")]);
        assert!(directory.version_detail(&VersionId::from("2.1.1")).is_none());
        assert!(directory.version_detail(&VersionId::from("2.2")).is_none());
        assert!(directory
            .cached_endpoint(&ModuleId::credentials(), &VersionId::from("2.2"), None)
            .is_none());
    }

    #[test]
    fn test_upsert_replaces_detail() {
        let directory = EndpointDirectory::new();
        let version = VersionId::from("2.1.1");

        directory.upsert_version_detail(version.clone(), detail("2.1.1", "https://old/credentials"), false);
        directory.upsert_version_detail(version.clone(), detail("2.1.1", "https://new/credentials"), false);

        let url = directory.cached_endpoint(&ModuleId::credentials(), &version, None).unwrap();
        assert_eq!(url.as_str(), "https://new/credentials");
        assert!(directory.selected_version().is_none());
    }

    #[test]
    fn test_preferred_version() {
        let directory = EndpointDirectory::new();
        assert!(directory.preferred_version().is_none());

        directory.replace_versions(&[info("2.1.1"), info("2.2"), info("2.0")]);
        assert_eq!(directory.preferred_version(), Some(VersionId::from("2.2")));

        directory.upsert_version_detail(VersionId::from("2.1.1"), detail("2.1.1", "https://a/c"), true);
        assert_eq!(directory.preferred_version(), Some(VersionId::from("2.1.1")));
    }

    #[test]
    fn test_selection_survives_version_refresh() {
        let directory = EndpointDirectory::new();
        directory.select_version(VersionId::from("2.1.1"));
        directory.replace_versions(&[info("2.2")]);
        assert_eq!(directory.selected_version(), Some(VersionId::from("2.1.1")));
    }

    #[tokio::test]
    async fn test_concurrent_upserts() {
        let directory = Arc::new(EndpointDirectory::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let directory = directory.clone();
            handles.push(tokio::spawn(async move {
                let version = format!("2.{}", i % 4);
                let url = format!("https://peer.example/{}/credentials", i);
                directory.upsert_version_detail(VersionId::new(version.clone()), detail(&version, &url), false);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..4 {
            let version = VersionId::new(format!("2.{}", i));
            let cached = directory.version_detail(&version).unwrap();
            assert_eq!(cached.endpoints.len(), 1);
        }
    }
}
