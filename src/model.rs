//! Version metadata model
//!
//! This module defines the wire format returned by the update endpoint and
//! the immutable [`UpdateModel`] snapshot derived from it. The model is
//! constructed once per successful check, held by the update worker as its
//! only reference to "current known latest version", and replaced wholesale
//! on every new successful check.
//!
//! # The defensive build clamp
//!
//! The server reports its own `needUpgrade` flag, but a response describing a
//! build older than the running build must never trigger an update, whatever
//! the server says. [`UpdateModel::from_wire`] therefore clamps
//! `needs_upgrade` to `false` whenever `latest_build < current_build`. This
//! is a safeguard against a misconfigured or stale server response, not a
//! trust assumption, and it is applied exactly once at construction — the
//! model is never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw version document as returned by the update endpoint
///
/// Field names mirror the server's JSON exactly. This type never leaves the
/// check path; everything downstream works with [`UpdateModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDocument {
    /// Latest build number available on the server
    pub build: u64,
    /// Human-readable release description shown in the decision prompt
    #[serde(default)]
    pub description: String,
    /// Absolute URL of the installable artifact
    #[serde(rename = "upgradeUrl")]
    pub upgrade_url: String,
    /// Server's own opinion on whether this client needs the upgrade
    #[serde(rename = "needUpgrade", default)]
    pub need_upgrade: bool,
    /// Whether the upgrade may not be declined
    #[serde(rename = "mustUpgrade", default)]
    pub must_upgrade: bool,
}

/// Immutable snapshot of one successful version check
///
/// Combines the server-reported document with the caller-supplied running
/// build number and the derived, clamped `needs_upgrade` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateModel {
    /// Latest build number reported by the server
    pub latest_build: u64,
    /// Build number of the running application, supplied by the caller
    pub current_build: u64,
    /// Release description for the decision prompt
    pub description: String,
    /// Artifact download URL
    pub download_url: String,
    /// Whether an upgrade is needed (server flag AND `latest_build >= current_build`)
    pub needs_upgrade: bool,
    /// Whether the upgrade may not be declined
    pub must_upgrade: bool,
    /// When this check completed
    pub checked_at: DateTime<Utc>,
}

impl UpdateModel {
    /// Build a model from a server document and the running build number
    ///
    /// Applies the defensive clamp: a server-reported build older than the
    /// running build can never require an upgrade, regardless of the server's
    /// `needUpgrade` flag.
    #[must_use]
    pub fn from_wire(doc: VersionDocument, current_build: u64) -> Self {
        let needs_upgrade = doc.need_upgrade && doc.build >= current_build;
        Self {
            latest_build: doc.build,
            current_build,
            description: doc.description,
            download_url: doc.upgrade_url,
            needs_upgrade,
            must_upgrade: doc.must_upgrade,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(build: u64, need: bool, must: bool) -> VersionDocument {
        VersionDocument {
            build,
            description: "bug fixes".to_string(),
            upgrade_url: "https://updates.example.com/builds/app-12.apk".to_string(),
            need_upgrade: need,
            must_upgrade: must,
        }
    }

    #[test]
    fn test_clamp_forces_needs_upgrade_false_for_stale_build() {
        // Server claims an upgrade is needed but reports an older build
        let model = UpdateModel::from_wire(doc(9, true, false), 10);
        assert!(!model.needs_upgrade);
    }

    #[test]
    fn test_clamp_respects_server_flag_when_build_is_newer() {
        let model = UpdateModel::from_wire(doc(12, true, false), 10);
        assert!(model.needs_upgrade);

        let model = UpdateModel::from_wire(doc(12, false, false), 10);
        assert!(!model.needs_upgrade);
    }

    #[test]
    fn test_clamp_allows_equal_build() {
        let model = UpdateModel::from_wire(doc(10, true, false), 10);
        assert!(model.needs_upgrade);
    }

    #[test]
    fn test_must_upgrade_passes_through() {
        let model = UpdateModel::from_wire(doc(12, true, true), 10);
        assert!(model.must_upgrade);
    }

    #[test]
    fn test_wire_decode_camel_case_fields() {
        let json = r#"{
            "build": 42,
            "description": "new features",
            "upgradeUrl": "https://updates.example.com/builds/app-42.apk",
            "needUpgrade": true,
            "mustUpgrade": false
        }"#;
        let doc: VersionDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.build, 42);
        assert_eq!(
            doc.upgrade_url,
            "https://updates.example.com/builds/app-42.apk"
        );
        assert!(doc.need_upgrade);
        assert!(!doc.must_upgrade);
    }

    #[test]
    fn test_wire_decode_defaults_for_missing_flags() {
        let json = r#"{"build": 7, "upgradeUrl": "https://u.example.com/a.apk"}"#;
        let doc: VersionDocument = serde_json::from_str(json).unwrap();
        assert!(!doc.need_upgrade);
        assert!(!doc.must_upgrade);
        assert!(doc.description.is_empty());
    }
}
