//! Merge provenance explanation
//!
//! Structured JSON and human-readable reports of which layer supplied
//! each merged field. Secret values are redacted before the report is
//! built, so neither output form can leak bound content.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stratum_model::{get_path, FieldOrigin, MergedResourceSet, ResourceId, ResourceKind};

use crate::overlay::Overlay;

/// Key fragments that mark a field as secret-bearing.
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// Provenance report for one render pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainOutput {
    /// Overlay the report was built for.
    pub overlay: String,

    /// Per-resource field provenance, in identity order.
    pub resources: Vec<ResourceExplain>,
}

/// Field provenance for a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceExplain {
    pub kind: ResourceKind,
    pub name: String,
    pub fields: Vec<FieldExplain>,
}

/// One merged field: final value and the layer that supplied it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldExplain {
    pub path: String,
    pub value: Value,
    pub origin: FieldOrigin,
}

impl ExplainOutput {
    /// Build the report from a bound resource set.
    pub fn from_set(overlay: &Overlay, set: &MergedResourceSet) -> Self {
        let mut resources = Vec::new();

        for (id, spec) in set.iter() {
            let mut fields = Vec::new();
            if let Some(origins) = set.origins(id) {
                for (path, origin) in origins {
                    let Some(value) = get_path(spec, path) else {
                        continue;
                    };
                    let value = if is_secret_field(id, path) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        value.clone()
                    };
                    fields.push(FieldExplain {
                        path: path.clone(),
                        value,
                        origin: origin.clone(),
                    });
                }
            }
            resources.push(ResourceExplain {
                kind: id.kind,
                name: id.name.clone(),
                fields,
            });
        }

        Self {
            overlay: overlay.name.clone(),
            resources,
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report.
    pub fn to_human(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Overlay: {}", self.overlay));

        for resource in &self.resources {
            lines.push(String::new());
            lines.push(format!("{}/{}", resource.kind, resource.name));
            for field in &resource.fields {
                lines.push(format!(
                    "  {} = {}  ({})",
                    field.path, field.value, field.origin
                ));
            }
        }

        lines.join("\n")
    }
}

/// Whether a field's value must be redacted: everything under a secret
/// resource's data, plus any field whose last segment contains a
/// secret-like word.
fn is_secret_field(id: &ResourceId, path: &str) -> bool {
    if id.kind == ResourceKind::Secret && (path == "data" || path.starts_with("data.")) {
        return true;
    }
    let last = path.rsplit('.').next().unwrap_or(path);
    let lower = last.to_lowercase();
    SECRET_KEYS.iter().any(|s| lower.contains(s))
}
