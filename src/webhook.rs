//! Nexus webhook wire types and wheel filename parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Asset section of a Nexus repository webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetData {
    pub id: String,
    #[serde(rename = "assetId")]
    pub asset_id: String,
    pub format: String,
    pub name: String,
}

/// Inbound Nexus webhook notification, as Nexus sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusWebhookEvent {
    pub timestamp: String,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub initiator: String,
    #[serde(rename = "repositoryName")]
    pub repository_name: String,
    pub action: String,
    pub asset: AssetData,
}

/// A published package extracted from a CREATED-asset event.
/// This is what gets queued for the dependency worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageRelease {
    pub package_name: String,
    pub version: String,
    pub repository: String,
    pub timestamp: String,
}

impl NexusWebhookEvent {
    /// Returns the package release described by this event, or None when the
    /// event is not a newly created wheel upload.
    pub fn package_release(&self) -> Option<PackageRelease> {
        if self.action != "CREATED" {
            return None;
        }
        if !self.asset.name.ends_with(".whl") {
            return None;
        }

        let package_name = package_name_from_filename(&self.asset.name)?;
        let version = package_version_from_filename(&self.asset.name)?;

        Some(PackageRelease {
            package_name,
            version,
            repository: self.repository_name.clone(),
            timestamp: self.timestamp.clone(),
        })
    }
}

fn wheel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // <distribution>-<x.y.z>..., matched against the path's basename
    RE.get_or_init(|| Regex::new(r"^([\w_]+?)-(\d+\.\d+\.\d+)").unwrap())
}

fn basename(filename: &str) -> &str {
    filename.rsplit('/').next().unwrap_or(filename)
}

/// Extract the distribution name from an uploaded wheel path.
/// Underscores normalise to hyphens, matching the PyPI project name.
pub fn package_name_from_filename(filename: &str) -> Option<String> {
    wheel_re()
        .captures(basename(filename))
        .map(|caps| caps[1].replace('_', "-"))
}

/// Extract the version from an uploaded wheel path.
pub fn package_version_from_filename(filename: &str) -> Option<String> {
    wheel_re()
        .captures(basename(filename))
        .map(|caps| caps[2].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str, asset_name: &str) -> NexusWebhookEvent {
        NexusWebhookEvent {
            timestamp: "2024-01-01T00:00:00.000+00:00".to_string(),
            node_id: "node-1".to_string(),
            initiator: "admin/127.0.0.1".to_string(),
            repository_name: "pypi-internal".to_string(),
            action: action.to_string(),
            asset: AssetData {
                id: "asset".to_string(),
                asset_id: "cHlwaS1pbnRlcm5hbDox".to_string(),
                format: "pypi".to_string(),
                name: asset_name.to_string(),
            },
        }
    }

    #[test]
    fn extracts_name_and_version() {
        let name = "packages/demo_core/1.2.3/demo_core-1.2.3-py3-none-any.whl";
        assert_eq!(package_name_from_filename(name).as_deref(), Some("demo-core"));
        assert_eq!(package_version_from_filename(name).as_deref(), Some("1.2.3"));
    }

    #[test]
    fn non_wheel_names_do_not_match() {
        assert_eq!(package_name_from_filename("README.md"), None);
        assert_eq!(package_version_from_filename("no-version-here.whl"), None);
    }

    #[test]
    fn created_wheel_becomes_release() {
        let release = event("CREATED", "demo_core-1.2.3-py3-none-any.whl")
            .package_release()
            .unwrap();
        assert_eq!(release.package_name, "demo-core");
        assert_eq!(release.version, "1.2.3");
        assert_eq!(release.repository, "pypi-internal");
    }

    #[test]
    fn non_created_events_are_ignored() {
        assert!(event("DELETED", "demo_core-1.2.3-py3-none-any.whl")
            .package_release()
            .is_none());
    }

    #[test]
    fn non_wheel_assets_are_ignored() {
        assert!(event("CREATED", "demo_core-1.2.3.tar.gz")
            .package_release()
            .is_none());
    }

    #[test]
    fn payload_deserializes_from_nexus_camel_case() {
        let raw = r#"{
            "timestamp": "2024-01-01T00:00:00.000+00:00",
            "nodeId": "ABC123",
            "initiator": "admin/127.0.0.1",
            "repositoryName": "pypi-internal",
            "action": "CREATED",
            "asset": {
                "id": "cHlwaS1pbnRlcm5hbDox",
                "assetId": "cHlwaS1pbnRlcm5hbDox",
                "format": "pypi",
                "name": "demo_core-1.2.3-py3-none-any.whl"
            }
        }"#;
        let event: NexusWebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.node_id, "ABC123");
        assert!(event.package_release().is_some());
    }
}
