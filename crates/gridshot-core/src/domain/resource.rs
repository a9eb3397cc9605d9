//! Content-addressable resource model.
//!
//! A resource is any asset a snapshot depends on: a stylesheet, image,
//! script, the serialized document itself, or a native view-hierarchy
//! payload. Identity is the URL while unresolved and the SHA-256 of the
//! value once the value is known.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::digest::{Digest, HASH_FORMAT};

/// A resource still addressed by URL, waiting on the fetch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResource {
    pub url: String,
    /// Renderer the asset is fetched for; drives the user-agent header.
    pub renderer: Option<String>,
}

/// A resolved resource whose identity is the hash of its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentResource {
    pub hash: Digest,
    pub content_type: String,
    pub value: Vec<u8>,
    /// Ids of resources this one declares as dependencies, if any.
    pub dependencies: Vec<String>,
}

/// A resource that could not be resolved; carried through the mapping as
/// an `{errorStatusCode}` placeholder instead of failing the render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResource {
    pub id: String,
    pub status: u16,
}

/// An asset in one of its three lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Pending(PendingResource),
    Resolved(ContentResource),
    Failed(FailedResource),
}

impl Resource {
    /// An unresolved resource addressed by URL.
    pub fn from_url(url: impl Into<String>, renderer: Option<String>) -> Self {
        Resource::Pending(PendingResource {
            url: url.into(),
            renderer,
        })
    }

    /// A resolved resource; the hash is computed over `value` immediately.
    pub fn from_content(content_type: impl Into<String>, value: Vec<u8>) -> Self {
        Resource::Resolved(ContentResource {
            hash: Digest::compute(&value),
            content_type: content_type.into(),
            value,
            dependencies: Vec::new(),
        })
    }

    /// A resolved resource with declared dependency ids.
    pub fn with_dependencies(
        content_type: impl Into<String>,
        value: Vec<u8>,
        dependencies: Vec<String>,
    ) -> Self {
        Resource::Resolved(ContentResource {
            hash: Digest::compute(&value),
            content_type: content_type.into(),
            value,
            dependencies,
        })
    }

    /// A resource that failed to resolve with the given HTTP status.
    pub fn failed(id: impl Into<String>, status: u16) -> Self {
        Resource::Failed(FailedResource {
            id: id.into(),
            status,
        })
    }

    /// Current identity: URL while pending, hash hex once resolved.
    pub fn id(&self) -> String {
        match self {
            Resource::Pending(p) => p.url.clone(),
            Resource::Resolved(c) => c.hash.to_hex(),
            Resource::Failed(f) => f.id.clone(),
        }
    }

    /// Wire representation for the resource mapping. Pending resources
    /// have no wire form; callers resolve them first.
    pub fn to_wire(&self) -> Option<WireResource> {
        match self {
            Resource::Pending(_) => None,
            Resource::Resolved(c) => Some(WireResource::content(c)),
            Resource::Failed(f) => Some(WireResource::Error {
                error_status_code: f.status,
            }),
        }
    }

    pub fn as_resolved(&self) -> Option<&ContentResource> {
        match self {
            Resource::Resolved(c) => Some(c),
            _ => None,
        }
    }
}

/// A resource entry as it appears on the wire: either a content stub or
/// an error placeholder. The grid never sees resource bodies here; bodies
/// travel through the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireResource {
    #[serde(rename_all = "camelCase")]
    Content {
        hash_format: String,
        hash: Digest,
        content_type: String,
    },
    #[serde(rename_all = "camelCase")]
    Error { error_status_code: u16 },
}

impl WireResource {
    pub fn content(resource: &ContentResource) -> Self {
        WireResource::Content {
            hash_format: HASH_FORMAT.to_string(),
            hash: resource.hash,
            content_type: resource.content_type.clone(),
        }
    }

    pub fn hash(&self) -> Option<Digest> {
        match self {
            WireResource::Content { hash, .. } => Some(*hash),
            WireResource::Error { .. } => None,
        }
    }
}

/// Flattened mapping from original reference (URL, frame URL, or the
/// synthetic `vhs` key) to its wire entry. `BTreeMap` keeps the keys
/// sorted, which fixes the document hash for identical snapshots.
pub type ResourceMapping = BTreeMap<String, WireResource>;

/// Shared handle to a cached resource.
pub type ResourceHandle = Arc<Resource>;
