//! Upstream snapshot contract.
//!
//! A snapshot is what the capture layer (DOM extraction or native
//! view-hierarchy serialization) hands the client: a document reference,
//! declared resources, nested frame snapshots of the same shape, and for
//! native targets a view-hierarchy hash instead of a document tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One captured page, frame, or native view hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Document reference; also the key this snapshot's own document
    /// resource takes when merged into a parent frame's mapping.
    pub url: String,

    /// Serialized document tree (DOM-ish node list). Absent for native
    /// targets, which carry `vhs_hash` instead.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub document_tree: serde_json::Value,

    /// URLs this level references and expects the client to fetch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_urls: Vec<String>,

    /// Inline resource declarations keyed by URL; some may be pre-failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_contents: BTreeMap<String, SnapshotResource>,

    /// Nested frame snapshots, resolved recursively.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Snapshot>,

    /// View-hierarchy hash for native targets (hex, precomputed upstream).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhs_hash: Option<String>,

    /// Kind of view-hierarchy serialization, e.g. `ios` or `android-x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhs_type: Option<String>,

    /// Native platform name, e.g. `ios`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
}

impl Snapshot {
    /// Whether this snapshot describes a native view hierarchy rather
    /// than a document tree.
    pub fn is_native(&self) -> bool {
        self.vhs_hash.is_some()
    }
}

/// Inline resource content carried inside a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<u8>>,

    /// Set when the capture layer already knows the asset failed; carried
    /// through to the final mapping as `{errorStatusCode}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_status_code: Option<u16>,

    /// Ids of resources this one declares as dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}
