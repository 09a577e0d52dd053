//! Resource identity, templates, and the merged resource set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::kind::ResourceKind;
use crate::replica::ReplicaInstance;

/// Identity of a resource within a set: kind + name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

static NAME_RE: OnceLock<Regex> = OnceLock::new();

/// Lowercase DNS-label check for resource names. Instance names derived
/// from a valid workload name stay addressable.
pub fn is_valid_name(name: &str) -> bool {
    let re = NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("const pattern"));
    name.len() <= 63 && re.is_match(name)
}

/// A declarative resource definition from the base layer.
/// Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplate {
    pub kind: ResourceKind,
    pub name: String,

    /// Spec fields with default parameter values.
    pub spec: Value,

    /// Base file the template came from, relative to the base directory.
    pub source: String,
}

impl ResourceTemplate {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind, self.name.clone())
    }
}

/// Which layer supplied a merged field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "lowercase")]
pub enum FieldOrigin {
    /// Base template default.
    Base { file: String },
    /// Overlay patch, by declaration index.
    Patch { index: usize },
    /// Bound config reference, by content store key.
    Reference { key: String },
}

impl fmt::Display for FieldOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOrigin::Base { file } => write!(f, "base:{}", file),
            FieldOrigin::Patch { index } => write!(f, "patch#{}", index),
            FieldOrigin::Reference { key } => write!(f, "reference:{}", key),
        }
    }
}

/// Error for two resources claiming the same identity.
#[derive(Debug, Clone, thiserror::Error)]
#[error("resource identity collision: {0}")]
pub struct IdentityCollision(pub ResourceId);

/// Result of applying an overlay to a base template set: an ordered
/// mapping from resource identity to fully resolved resource content,
/// with per-field provenance. Produced fresh per render pass and
/// discarded after serialization.
#[derive(Debug, Clone, Default)]
pub struct MergedResourceSet {
    resources: BTreeMap<ResourceId, Value>,
    origins: BTreeMap<ResourceId, BTreeMap<String, FieldOrigin>>,
}

impl MergedResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource. A second insert under the same identity is a
    /// collision, never an overwrite.
    pub fn insert(&mut self, id: ResourceId, spec: Value) -> Result<(), IdentityCollision> {
        if self.resources.contains_key(&id) {
            return Err(IdentityCollision(id));
        }
        self.resources.insert(id, spec);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Value> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut Value> {
        self.resources.get_mut(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Resources in identity order (kind, then name).
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &Value)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Record which layer supplied the value at `path`. Later records for
    /// the same path win, matching merge precedence.
    pub fn record_origin(&mut self, id: &ResourceId, path: String, origin: FieldOrigin) {
        self.origins.entry(id.clone()).or_default().insert(path, origin);
    }

    /// Field provenance for one resource.
    pub fn origins(&self, id: &ResourceId) -> Option<&BTreeMap<String, FieldOrigin>> {
        self.origins.get(id)
    }

    /// Replica instances derived from workload replica counts, in
    /// identity order then ordinal order. Workloads whose `replicas`
    /// field is missing or not a non-negative integer contribute none;
    /// the validator rejects those before rendering.
    pub fn instances(&self) -> Vec<ReplicaInstance> {
        let mut out = Vec::new();
        for (id, spec) in &self.resources {
            if id.kind != ResourceKind::Workload {
                continue;
            }
            let replicas = spec.get("replicas").and_then(Value::as_u64).unwrap_or(0);
            for ordinal in 0..replicas {
                out.push(ReplicaInstance::new(&id.name, ordinal));
            }
        }
        out
    }
}
