//! Deterministic rendering
//!
//! Serializes a validated resource set to canonical JSON (JCS): the same
//! logical input always yields byte-identical output, keeping rendered
//! artifacts diffable and version-control friendly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stratum_model::{MergedResourceSet, ResourceKind, INSTANCE_NAME_ENV};

/// Schema version for rendered artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier.
pub const SCHEMA_ID: &str = "stratum/rendered_set@1";

/// One fully resolved resource in the rendered artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub spec: Value,
}

/// One replica instance entry. The env map carries the instance-name
/// binding point the orchestrator overrides at instance start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedInstance {
    pub workload: String,
    pub ordinal: u64,
    pub name: String,
    pub env: BTreeMap<String, String>,
}

/// The rendered artifact: resources in identity order plus the expanded
/// replica instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedSet {
    pub schema_version: u32,
    pub schema_id: String,
    pub overlay: String,
    pub resources: Vec<RenderedResource>,
    pub instances: Vec<RenderedInstance>,
}

/// Errors for the render stage. Unreachable after validation; a failure
/// here is an internal-consistency bug, not a user error.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("canonicalization failed: {0}")]
    Canonical(String),

    #[error("failed to write {path}: {reason}")]
    Io { path: String, reason: String },
}

impl RenderedSet {
    /// Build the artifact from a validated merge result.
    pub fn from_set(overlay_name: &str, set: &MergedResourceSet) -> Self {
        let resources = set
            .iter()
            .map(|(id, spec)| RenderedResource {
                kind: id.kind,
                name: id.name.clone(),
                spec: spec.clone(),
            })
            .collect();

        let instances = set
            .instances()
            .into_iter()
            .map(|instance| {
                let mut env = BTreeMap::new();
                env.insert(INSTANCE_NAME_ENV.to_string(), instance.name.clone());
                RenderedInstance {
                    workload: instance.workload,
                    ordinal: instance.ordinal,
                    name: instance.name,
                    env,
                }
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            overlay: overlay_name.to_string(),
            resources,
            instances,
        }
    }

    /// Serialize to canonical JSON (JCS) bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, SerializationError> {
        serde_json_canonicalizer::to_vec(self)
            .map_err(|e| SerializationError::Canonical(e.to_string()))
    }

    /// Write the artifact atomically (write-then-rename). No partial
    /// output is left behind on failure.
    pub fn write_to_file(&self, path: &Path) -> Result<(), SerializationError> {
        let bytes = self.to_canonical_json()?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).map_err(|e| SerializationError::Io {
            path: temp_path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::rename(&temp_path, path).map_err(|e| SerializationError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
