//! Reference binding
//!
//! Resolves overlay config references from a content store and binds the
//! content into the merged resource set. Missing and empty keys are
//! collected and reported together, not one per retry.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use walkdir::WalkDir;

use stratum_model::{set_path, FieldOrigin, MergedResourceSet, ResourceId};

use crate::loader::LoadError;
use crate::overlay::ConfigReference;

/// Key-value content store backed by a directory of files; key = file
/// name. Supplied by the caller (the external secrets/config directory).
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    entries: BTreeMap<String, String>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a directory. Each regular file becomes one
    /// entry; trailing newlines are stripped (secret files conventionally
    /// end with one). A missing directory yields an empty store; an
    /// overlay with no references needs none.
    pub fn from_dir(dir: &Path) -> Result<Self, LoadError> {
        let mut entries = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(Self { entries });
        }

        for entry in WalkDir::new(dir)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| LoadError::Io {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().to_string();
            let contents = fs::read_to_string(entry.path()).map_err(|e| LoadError::Io {
                path: key.clone(),
                reason: e.to_string(),
            })?;
            entries.insert(key, contents.trim_end_matches('\n').to_string());
        }

        Ok(Self { entries })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One or more config references could not be resolved.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unresolved config references: [{}]", .missing.join(", "))]
pub struct UnresolvedReferenceError {
    /// Missing or empty content store keys, sorted, deduplicated.
    pub missing: Vec<String>,
}

/// Errors for the bind stage.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("{0}")]
    Unresolved(#[from] UnresolvedReferenceError),

    #[error("reference '{key}' targets undefined resource {target}")]
    UnknownTarget { key: String, target: ResourceId },

    #[error("reference '{key}' on {target}: cannot bind at '{path}': {base_type} in the way")]
    PathConflict {
        key: String,
        target: ResourceId,
        path: String,
        base_type: &'static str,
    },
}

/// Bind every overlay reference from the content store into the set.
///
/// All references are checked before any binding happens: a required key
/// that is missing, or any key whose content is empty, lands in one
/// [`UnresolvedReferenceError`] listing the full set. Optional references
/// absent from the store are skipped; when present they bind like any
/// other.
pub fn bind_references(
    set: &mut MergedResourceSet,
    references: &[ConfigReference],
    store: &ContentStore,
) -> Result<(), BindError> {
    let mut missing = Vec::new();

    for reference in references {
        if !set.contains(&reference.target) {
            return Err(BindError::UnknownTarget {
                key: reference.key.clone(),
                target: reference.target.clone(),
            });
        }
        match store.get(&reference.key) {
            None => {
                if !reference.optional {
                    missing.push(reference.key.clone());
                }
            }
            Some(content) if content.trim().is_empty() => {
                // Present-but-empty content never satisfies a reference,
                // optional or not.
                missing.push(reference.key.clone());
            }
            Some(_) => {}
        }
    }

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(UnresolvedReferenceError { missing }.into());
    }

    for reference in references {
        let Some(content) = store.get(&reference.key) else {
            continue;
        };
        let content = content.to_string();
        let Some(spec) = set.get_mut(&reference.target) else {
            continue;
        };
        set_path(spec, &reference.field, Value::String(content)).map_err(|conflict| {
            BindError::PathConflict {
                key: reference.key.clone(),
                target: reference.target.clone(),
                path: conflict.path,
                base_type: conflict.base_type,
            }
        })?;
        set.record_origin(
            &reference.target,
            reference.field.clone(),
            FieldOrigin::Reference {
                key: reference.key.clone(),
            },
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratum_model::ResourceKind;
    use tempfile::TempDir;

    fn reference(key: &str, field: &str, optional: bool) -> ConfigReference {
        ConfigReference {
            key: key.to_string(),
            target: ResourceId::new(ResourceKind::Workload, "runner"),
            field: field.to_string(),
            optional,
        }
    }

    fn set_with_runner() -> MergedResourceSet {
        let mut set = MergedResourceSet::new();
        set.insert(
            ResourceId::new(ResourceKind::Workload, "runner"),
            json!({"runner": {"id": ""}}),
        )
        .unwrap();
        set
    }

    #[test]
    fn test_bind_sets_field_and_origin() {
        let mut set = set_with_runner();
        let mut store = ContentStore::new();
        store.insert("runner-id", "abc-123");

        bind_references(&mut set, &[reference("runner-id", "runner.id", false)], &store).unwrap();

        let id = ResourceId::new(ResourceKind::Workload, "runner");
        assert_eq!(set.get(&id).unwrap()["runner"]["id"], "abc-123");
        assert_eq!(
            set.origins(&id).unwrap()["runner.id"],
            FieldOrigin::Reference {
                key: "runner-id".to_string()
            }
        );
    }

    #[test]
    fn test_all_missing_keys_reported_at_once() {
        let mut set = set_with_runner();
        let store = ContentStore::new();

        let err = bind_references(
            &mut set,
            &[
                reference("runner-id", "runner.id", false),
                reference("client-secret", "runner.organization", false),
            ],
            &store,
        )
        .unwrap_err();

        match err {
            BindError::Unresolved(unresolved) => {
                assert_eq!(unresolved.missing, vec!["client-secret", "runner-id"]);
            }
            other => panic!("expected Unresolved, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_content_counts_as_unresolved() {
        let mut set = set_with_runner();
        let mut store = ContentStore::new();
        store.insert("runner-id", "   \n");

        let err = bind_references(
            &mut set,
            &[reference("runner-id", "runner.id", false)],
            &store,
        )
        .unwrap_err();

        match err {
            BindError::Unresolved(unresolved) => {
                assert_eq!(unresolved.missing, vec!["runner-id"]);
            }
            other => panic!("expected Unresolved, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_reference_absent_is_ok() {
        let mut set = set_with_runner();
        let store = ContentStore::new();

        bind_references(
            &mut set,
            &[reference("ssh-key", "env.SSH_KEY", true)],
            &store,
        )
        .unwrap();

        let id = ResourceId::new(ResourceKind::Workload, "runner");
        assert!(set.get(&id).unwrap().get("env").is_none());
    }

    #[test]
    fn test_optional_reference_present_binds() {
        let mut set = set_with_runner();
        let mut store = ContentStore::new();
        store.insert("ssh-key", "ssh-ed25519 AAAA...");

        bind_references(
            &mut set,
            &[reference("ssh-key", "env.SSH_KEY", true)],
            &store,
        )
        .unwrap();

        let id = ResourceId::new(ResourceKind::Workload, "runner");
        assert_eq!(set.get(&id).unwrap()["env"]["SSH_KEY"], "ssh-ed25519 AAAA...");
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut set = MergedResourceSet::new();
        let mut store = ContentStore::new();
        store.insert("runner-id", "abc");

        let err = bind_references(
            &mut set,
            &[reference("runner-id", "runner.id", false)],
            &store,
        )
        .unwrap_err();

        assert!(matches!(err, BindError::UnknownTarget { .. }));
    }

    #[test]
    fn test_bind_through_scalar_is_path_conflict() {
        let mut set = MergedResourceSet::new();
        set.insert(
            ResourceId::new(ResourceKind::Workload, "runner"),
            json!({"runner": "flat"}),
        )
        .unwrap();
        let mut store = ContentStore::new();
        store.insert("runner-id", "abc");

        let err = bind_references(
            &mut set,
            &[reference("runner-id", "runner.id", false)],
            &store,
        )
        .unwrap_err();

        match err {
            BindError::PathConflict { path, .. } => assert_eq!(path, "runner"),
            other => panic!("expected PathConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_store_from_dir_strips_trailing_newline() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("runner-id"), "abc-123\n").unwrap();
        std::fs::write(dir.path().join("known-hosts"), "host-a\nhost-b\n").unwrap();

        let store = ContentStore::from_dir(dir.path()).unwrap();
        assert_eq!(store.get("runner-id"), Some("abc-123"));
        assert_eq!(store.get("known-hosts"), Some("host-a\nhost-b"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_store_missing_dir_is_empty() {
        let store = ContentStore::from_dir(Path::new("/nonexistent/store")).unwrap();
        assert!(store.is_empty());
    }
}
