//! Patch application
//!
//! Applies overlay patches onto the base template sequence in declaration
//! order, producing the merged resource set with field provenance.

use stratum_model::{
    leaf_paths, merge_strict, FieldOrigin, IdentityCollision, MergedResourceSet, ResourceId,
};

use crate::loader::LoadedBase;
use crate::overlay::Overlay;

/// Errors for overlay application.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("patch {index} targets undefined resource {target}")]
    UnknownTarget { index: usize, target: ResourceId },

    #[error(
        "patch {index} on {target}: structural conflict at '{path}': \
         cannot merge {patch_type} into {base_type}"
    )]
    StructuralConflict {
        index: usize,
        target: ResourceId,
        path: String,
        base_type: &'static str,
        patch_type: &'static str,
    },

    #[error("{0}")]
    IdentityCollision(#[from] IdentityCollision),
}

/// Apply an overlay's patches onto the loaded base templates.
///
/// Patches apply in declaration order: later patches override earlier
/// ones on conflicting fields, non-conflicting fields merge additively.
/// Every base leaf and every patched leaf gets a provenance record, later
/// layers winning.
pub fn apply_overlay(base: &LoadedBase, overlay: &Overlay) -> Result<MergedResourceSet, MergeError> {
    let mut set = MergedResourceSet::new();

    for template in &base.templates {
        let id = template.id();
        set.insert(id.clone(), template.spec.clone())?;
        for (path, _) in leaf_paths(&template.spec) {
            set.record_origin(
                &id,
                path,
                FieldOrigin::Base {
                    file: template.source.clone(),
                },
            );
        }
    }

    for (index, patch) in overlay.patches.iter().enumerate() {
        let current = set
            .get(&patch.target)
            .ok_or_else(|| MergeError::UnknownTarget {
                index,
                target: patch.target.clone(),
            })?
            .clone();

        let merged = merge_strict(current, patch.set.clone(), "").map_err(|conflict| {
            MergeError::StructuralConflict {
                index,
                target: patch.target.clone(),
                path: conflict.path,
                base_type: conflict.base_type,
                patch_type: conflict.patch_type,
            }
        })?;

        if let Some(slot) = set.get_mut(&patch.target) {
            *slot = merged;
        }
        for (path, _) in leaf_paths(&patch.set) {
            set.record_origin(&patch.target, path, FieldOrigin::Patch { index });
        }
    }

    Ok(set)
}
