//! Base layer loading
//!
//! Reads a base directory of TOML resource templates into an ordered
//! template sequence. Every contributing file is recorded with its
//! SHA-256 digest so a pass can report exactly which inputs it consumed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use stratum_model::{ResourceId, ResourceKind, ResourceTemplate};

/// A contributing input file with its provenance digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Path relative to the directory it was loaded from.
    pub path: String,

    /// SHA-256 digest of the raw file bytes.
    pub digest: String,
}

/// Errors for base and overlay input loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("base directory not found: {0}")]
    BaseNotFound(PathBuf),

    #[error("overlay definition not found: {0}")]
    OverlayNotFound(PathBuf),

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("{path}: resource {index}: unknown kind '{kind}'")]
    UnknownKind {
        path: String,
        index: usize,
        kind: String,
    },

    #[error("{path}: {id}: unrecognized field '{field}'")]
    UnrecognizedField {
        path: String,
        id: ResourceId,
        field: String,
    },

    #[error("duplicate resource {id} (defined in {first} and again in {second})")]
    DuplicateResource {
        id: ResourceId,
        first: String,
        second: String,
    },

    #[error("overlay '{overlay}': duplicate reference key '{key}'")]
    DuplicateReferenceKey { overlay: String, key: String },

    #[error("overlay '{overlay}': field '{field}' of {id} bound by more than one reference")]
    DuplicateReferenceTarget {
        overlay: String,
        id: ResourceId,
        field: String,
    },

    #[error("overlay '{overlay}': reference '{key}': field '{field}' is outside the {kind} schema")]
    ReferenceOutsideSchema {
        overlay: String,
        key: String,
        kind: ResourceKind,
        field: String,
    },
}

/// The loaded base layer: ordered templates plus source records.
#[derive(Debug, Clone)]
pub struct LoadedBase {
    pub templates: Vec<ResourceTemplate>,
    pub sources: Vec<SourceRecord>,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default, rename = "resource")]
    resources: Vec<TemplateDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDoc {
    kind: String,
    name: String,
    spec: Option<toml::Value>,
}

/// Load the base layer from a directory of TOML template files.
///
/// Files are visited in sorted name order; resources keep declaration
/// order within a file. Fails on malformed templates, unknown kinds,
/// fields outside a kind's schema, and duplicate resource identities.
/// No side effects beyond file reads.
pub fn load_base(base_dir: &Path) -> Result<LoadedBase, LoadError> {
    if !base_dir.is_dir() {
        return Err(LoadError::BaseNotFound(base_dir.to_path_buf()));
    }

    let mut templates = Vec::new();
    let mut sources = Vec::new();
    let mut seen: BTreeMap<ResourceId, String> = BTreeMap::new();

    for entry in WalkDir::new(base_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| LoadError::Io {
            path: base_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(base_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();

        let (contents, digest) = read_to_string_digest(entry.path(), &rel)?;
        let file: TemplateFile = toml::from_str(&contents).map_err(|e| LoadError::Parse {
            path: rel.clone(),
            reason: e.to_string(),
        })?;
        sources.push(SourceRecord {
            path: rel.clone(),
            digest,
        });

        for (index, doc) in file.resources.into_iter().enumerate() {
            let kind = doc
                .kind
                .parse::<ResourceKind>()
                .map_err(|e| LoadError::UnknownKind {
                    path: rel.clone(),
                    index,
                    kind: e.0,
                })?;
            let spec = match doc.spec {
                Some(value) => toml_to_json(value),
                None => Value::Object(serde_json::Map::new()),
            };

            let id = ResourceId::new(kind, doc.name.clone());
            if let Some(field) = kind.unrecognized_paths(&spec).into_iter().next() {
                return Err(LoadError::UnrecognizedField {
                    path: rel.clone(),
                    id,
                    field,
                });
            }
            if let Some(first) = seen.get(&id) {
                return Err(LoadError::DuplicateResource {
                    id,
                    first: first.clone(),
                    second: rel.clone(),
                });
            }
            seen.insert(id, rel.clone());

            templates.push(ResourceTemplate {
                kind,
                name: doc.name,
                spec,
                source: rel.clone(),
            });
        }
    }

    Ok(LoadedBase { templates, sources })
}

/// Read a file fully (scoped acquisition), returning contents and the
/// SHA-256 digest of the raw bytes.
pub(crate) fn read_to_string_digest(path: &Path, rel: &str) -> Result<(String, String), LoadError> {
    let bytes = fs::read(path).map_err(|e| LoadError::Io {
        path: rel.to_string(),
        reason: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes).map_err(|e| LoadError::Parse {
        path: rel.to_string(),
        reason: format!("invalid UTF-8: {}", e),
    })?;

    Ok((contents, digest))
}

/// Convert a TOML value to a JSON value.
///
/// Datetimes become strings; non-finite floats become null (TOML can
/// express `inf`/`nan`, JSON cannot), keeping the rendered artifact
/// representable.
pub(crate) fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            Value::Object(map)
        }
    }
}
