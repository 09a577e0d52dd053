//! Render pass orchestration
//!
//! Runs the Load → Merge → Bind → Validate → Render pipeline for one
//! overlay. A pass is synchronous and holds its own copies of every
//! loaded input; independent passes share no mutable state and may run
//! concurrently.

use std::path::{Path, PathBuf};

use thiserror::Error;

use stratum_model::MergedResourceSet;

use crate::binder::{bind_references, BindError, ContentStore};
use crate::loader::{load_base, LoadError, SourceRecord};
use crate::overlay::{apply_overlay, ExplainOutput, MergeError, Overlay};
use crate::render::{RenderedSet, SerializationError};
use crate::state::{PassStage, PassState, PassStateError};
use crate::validate::{validate_set, ValidationError};

/// Pipeline errors, one variant per failing stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("internal state error: {0}")]
    State(#[from] PassStateError),
}

impl PipelineError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Load(_) => "load",
            PipelineError::Merge(_) => "merge",
            PipelineError::Bind(_) => "bind",
            PipelineError::Validation(_) => "validate",
            PipelineError::Serialization(_) => "render",
            PipelineError::State(_) => "internal",
        }
    }

    /// Process exit code for this error: 1 for validation-class
    /// failures the user fixes by editing inputs or the content store,
    /// 2 for structural and internal errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Validation(_) => 1,
            PipelineError::Bind(BindError::Unresolved(_)) => 1,
            PipelineError::Bind(_) => 2,
            PipelineError::Load(_) => 2,
            PipelineError::Merge(_) => 2,
            PipelineError::Serialization(_) => 2,
            PipelineError::State(_) => 2,
        }
    }
}

/// Pipeline configuration. All inputs are explicit; there is no
/// process-wide state.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Override for the overlay's base directory pointer.
    pub base_dir: Option<PathBuf>,

    /// Override for the overlay's content store directory.
    pub content_dir: Option<PathBuf>,

    /// Stage-by-stage progress on stderr.
    pub verbose: bool,
}

/// Outcome of a successful render pass.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// The rendered artifact.
    pub rendered: RenderedSet,

    /// Canonical JSON bytes of the artifact.
    pub canonical: Vec<u8>,

    /// Every input file the pass consumed, with digests.
    pub sources: Vec<SourceRecord>,

    /// Final pass state (RENDERED).
    pub state: PassState,
}

/// A render pipeline bound to one configuration.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run a full render pass for the overlay at `overlay_dir`.
    pub fn render(&self, overlay_dir: &Path) -> Result<RenderOutcome, PipelineError> {
        let mut state = PassState::new(overlay_label(overlay_dir));
        let result = self.run_render(overlay_dir, &mut state);
        if let Err(e) = &result {
            self.report_failure(&mut state, e);
        }
        result
    }

    /// Run load → merge → bind → validate only, producing no artifact.
    pub fn validate(&self, overlay_dir: &Path) -> Result<PassState, PipelineError> {
        let mut state = PassState::new(overlay_label(overlay_dir));
        match self.run_validated(overlay_dir, &mut state) {
            Ok(_) => Ok(state),
            Err(e) => {
                self.report_failure(&mut state, &e);
                Err(e)
            }
        }
    }

    /// Produce the field provenance report for an overlay. Provenance is
    /// useful even when validation would fail, so this stops after the
    /// bind stage.
    pub fn explain(&self, overlay_dir: &Path) -> Result<ExplainOutput, PipelineError> {
        let mut state = PassState::new(overlay_label(overlay_dir));
        match self.run_bound(overlay_dir, &mut state) {
            Ok((set, overlay, _)) => Ok(ExplainOutput::from_set(&overlay, &set)),
            Err(e) => {
                self.report_failure(&mut state, &e);
                Err(e)
            }
        }
    }

    fn run_render(
        &self,
        overlay_dir: &Path,
        state: &mut PassState,
    ) -> Result<RenderOutcome, PipelineError> {
        let (set, overlay, sources) = self.run_validated(overlay_dir, state)?;

        self.log("rendering canonical artifact");
        let rendered = RenderedSet::from_set(&overlay.name, &set);
        let canonical = rendered.to_canonical_json()?;
        state.advance(PassStage::Rendered)?;

        Ok(RenderOutcome {
            rendered,
            canonical,
            sources,
            state: state.clone(),
        })
    }

    fn run_validated(
        &self,
        overlay_dir: &Path,
        state: &mut PassState,
    ) -> Result<(MergedResourceSet, Overlay, Vec<SourceRecord>), PipelineError> {
        let (set, overlay, sources) = self.run_bound(overlay_dir, state)?;

        self.log("validating merged set");
        let violations = validate_set(&set, &overlay.references);
        if !violations.is_empty() {
            return Err(ValidationError { violations }.into());
        }
        state.advance(PassStage::Validated)?;

        Ok((set, overlay, sources))
    }

    fn run_bound(
        &self,
        overlay_dir: &Path,
        state: &mut PassState,
    ) -> Result<(MergedResourceSet, Overlay, Vec<SourceRecord>), PipelineError> {
        let mut overlay = Overlay::from_dir(overlay_dir)?;
        state.overlay = overlay.name.clone();
        if let Some(dir) = &self.config.base_dir {
            overlay.base_dir = dir.clone();
        }
        if let Some(dir) = &self.config.content_dir {
            overlay.content_dir = dir.clone();
        }

        self.log(&format!("loading base from {}", overlay.base_dir.display()));
        let base = load_base(&overlay.base_dir)?;
        let mut sources = vec![overlay.source.clone()];
        sources.extend(base.sources.iter().cloned());
        self.log(&format!(
            "loaded {} template(s) from {} file(s)",
            base.templates.len(),
            base.sources.len()
        ));
        state.advance(PassStage::Loaded)?;

        self.log(&format!("applying {} patch(es)", overlay.patches.len()));
        let mut set = apply_overlay(&base, &overlay)?;
        state.advance(PassStage::Merged)?;

        self.log(&format!(
            "binding {} reference(s) from {}",
            overlay.references.len(),
            overlay.content_dir.display()
        ));
        let store = ContentStore::from_dir(&overlay.content_dir)?;
        bind_references(&mut set, &overlay.references, &store)?;
        state.advance(PassStage::Bound)?;

        Ok((set, overlay, sources))
    }

    fn report_failure(&self, state: &mut PassState, error: &PipelineError) {
        state.fail(error.to_string());
        self.log(&format!("pass failed at {} stage: {}", error.stage(), error));
    }

    fn log(&self, message: &str) {
        if self.config.verbose {
            eprintln!("stratum: {}", message);
        }
    }
}

fn overlay_label(overlay_dir: &Path) -> String {
    overlay_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| overlay_dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let validation = PipelineError::Validation(ValidationError { violations: vec![] });
        assert_eq!(validation.exit_code(), 1);

        let unresolved = PipelineError::Bind(BindError::Unresolved(
            crate::binder::UnresolvedReferenceError {
                missing: vec!["client-secret".to_string()],
            },
        ));
        assert_eq!(unresolved.exit_code(), 1);

        let load = PipelineError::Load(LoadError::BaseNotFound("missing".into()));
        assert_eq!(load.exit_code(), 2);
    }

    #[test]
    fn test_stage_names() {
        let load = PipelineError::Load(LoadError::BaseNotFound("missing".into()));
        assert_eq!(load.stage(), "load");

        let validation = PipelineError::Validation(ValidationError { violations: vec![] });
        assert_eq!(validation.stage(), "validate");
    }

    #[test]
    fn test_overlay_label() {
        assert_eq!(overlay_label(Path::new("overlays/production")), "production");
    }
}
