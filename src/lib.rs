//! Stratum - deterministic overlay rendering for runner deployment manifests
//!
//! Stratum replaces a copy-templates-and-edit deployment workflow with a
//! five-stage render pipeline: load a base template set, apply an
//! environment overlay, bind externally supplied secret/config content,
//! validate the result, and serialize it to canonical JSON.

pub mod binder;
pub mod loader;
pub mod overlay;
pub mod pipeline;
pub mod render;
pub mod state;
pub mod validate;

pub use binder::{bind_references, BindError, ContentStore, UnresolvedReferenceError};
pub use loader::{load_base, LoadError, LoadedBase, SourceRecord};
pub use overlay::{apply_overlay, ConfigReference, ExplainOutput, MergeError, Overlay, Patch};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, RenderOutcome};
pub use render::{RenderedSet, SerializationError};
pub use state::{PassStage, PassState, PassStateError};
pub use validate::{validate_set, ValidationError, Violation};
