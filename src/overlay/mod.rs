//! Overlay definitions
//!
//! An overlay is a named layer of patches and reference declarations
//! applied on top of a base template set to produce an
//! environment-specific resource set.

mod apply;
mod explain;

pub use apply::{apply_overlay, MergeError};
pub use explain::{ExplainOutput, FieldExplain, ResourceExplain};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use stratum_model::{ResourceId, ResourceKind};

use crate::loader::{read_to_string_digest, toml_to_json, LoadError, SourceRecord};

/// File name of the overlay definition inside an overlay directory.
pub const OVERLAY_FILE: &str = "overlay.toml";

/// Default content store directory, relative to the overlay directory.
pub const DEFAULT_CONTENT_DIR: &str = "files";

/// A parsed overlay definition. Read-only input for a render pass.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub name: String,

    /// Base directory the overlay layers onto, resolved against the
    /// overlay directory.
    pub base_dir: PathBuf,

    /// Content store directory supplying reference values.
    pub content_dir: PathBuf,

    /// Patches in declaration order. Later patches win on conflicting
    /// fields.
    pub patches: Vec<Patch>,

    /// Reference declarations, each bound exactly once.
    pub references: Vec<ConfigReference>,

    /// The overlay definition file itself, with digest.
    pub source: SourceRecord,
}

/// One patch: a set of spec fields merged onto a target resource.
#[derive(Debug, Clone)]
pub struct Patch {
    pub target: ResourceId,
    pub set: Value,
}

/// A declared need for externally supplied content, resolved from the
/// content store during binding.
#[derive(Debug, Clone)]
pub struct ConfigReference {
    /// Content store key (file name).
    pub key: String,

    /// Resource the content binds into.
    pub target: ResourceId,

    /// Dotted spec field path receiving the content.
    pub field: String,

    /// Whether absence from the content store is permitted.
    pub optional: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverlayFile {
    name: String,
    base: String,
    #[serde(default = "default_content_dir")]
    content_dir: String,
    #[serde(default, rename = "patch")]
    patches: Vec<PatchDoc>,
    #[serde(default, rename = "reference")]
    references: Vec<ReferenceDoc>,
}

fn default_content_dir() -> String {
    DEFAULT_CONTENT_DIR.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatchDoc {
    kind: String,
    name: String,
    set: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReferenceDoc {
    key: String,
    kind: String,
    name: String,
    field: String,
    #[serde(default)]
    optional: bool,
}

impl Overlay {
    /// Load and validate an overlay definition from `overlay_dir`.
    pub fn from_dir(overlay_dir: &Path) -> Result<Self, LoadError> {
        let path = overlay_dir.join(OVERLAY_FILE);
        if !path.is_file() {
            return Err(LoadError::OverlayNotFound(path));
        }

        let rel = OVERLAY_FILE;
        let (contents, digest) = read_to_string_digest(&path, rel)?;
        let file: OverlayFile = toml::from_str(&contents).map_err(|e| LoadError::Parse {
            path: rel.to_string(),
            reason: e.to_string(),
        })?;

        let mut patches = Vec::with_capacity(file.patches.len());
        for (index, doc) in file.patches.into_iter().enumerate() {
            let kind = doc
                .kind
                .parse::<ResourceKind>()
                .map_err(|e| LoadError::UnknownKind {
                    path: rel.to_string(),
                    index,
                    kind: e.0,
                })?;
            let set = match doc.set {
                Some(value) => toml_to_json(value),
                None => Value::Object(serde_json::Map::new()),
            };
            let target = ResourceId::new(kind, doc.name);
            if let Some(field) = kind.unrecognized_paths(&set).into_iter().next() {
                return Err(LoadError::UnrecognizedField {
                    path: rel.to_string(),
                    id: target,
                    field,
                });
            }
            patches.push(Patch { target, set });
        }

        let mut references = Vec::with_capacity(file.references.len());
        let mut seen_keys = BTreeSet::new();
        let mut seen_targets = BTreeSet::new();
        for (index, doc) in file.references.into_iter().enumerate() {
            let kind = doc
                .kind
                .parse::<ResourceKind>()
                .map_err(|e| LoadError::UnknownKind {
                    path: rel.to_string(),
                    index,
                    kind: e.0,
                })?;
            let target = ResourceId::new(kind, doc.name);
            if !kind.recognizes_path(&doc.field) {
                return Err(LoadError::ReferenceOutsideSchema {
                    overlay: file.name,
                    key: doc.key,
                    kind,
                    field: doc.field,
                });
            }
            if !seen_keys.insert(doc.key.clone()) {
                return Err(LoadError::DuplicateReferenceKey {
                    overlay: file.name,
                    key: doc.key,
                });
            }
            if !seen_targets.insert((target.clone(), doc.field.clone())) {
                return Err(LoadError::DuplicateReferenceTarget {
                    overlay: file.name,
                    id: target,
                    field: doc.field,
                });
            }
            references.push(ConfigReference {
                key: doc.key,
                target,
                field: doc.field,
                optional: doc.optional,
            });
        }

        Ok(Self {
            name: file.name,
            base_dir: overlay_dir.join(file.base),
            content_dir: overlay_dir.join(file.content_dir),
            patches,
            references,
            source: SourceRecord {
                path: rel.to_string(),
                digest,
            },
        })
    }
}
