//! Render pass state machine
//!
//! Pass stages: PENDING → LOADED → MERGED → BOUND → VALIDATED → RENDERED,
//! strictly sequential with no backward transitions; any stage failure
//! moves the pass to FAILED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassStage {
    /// Pass created, nothing read yet.
    Pending,
    /// Base templates and overlay definition loaded.
    Loaded,
    /// Patches applied, merged set built.
    Merged,
    /// Config references bound from the content store.
    Bound,
    /// Semantic invariants checked.
    Validated,
    /// Canonical artifact produced.
    Rendered,
    /// Aborted at some stage.
    Failed,
}

impl PassStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PassStage::Rendered | PassStage::Failed)
    }

    /// Check if transition from this stage to target is valid.
    pub fn can_transition_to(&self, target: PassStage) -> bool {
        match (self, target) {
            (PassStage::Pending, PassStage::Loaded) => true,
            (PassStage::Loaded, PassStage::Merged) => true,
            (PassStage::Merged, PassStage::Bound) => true,
            (PassStage::Bound, PassStage::Validated) => true,
            (PassStage::Validated, PassStage::Rendered) => true,
            (from, PassStage::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PassStage::Pending => "PENDING",
            PassStage::Loaded => "LOADED",
            PassStage::Merged => "MERGED",
            PassStage::Bound => "BOUND",
            PassStage::Validated => "VALIDATED",
            PassStage::Rendered => "RENDERED",
            PassStage::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PassStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors for pass state operations.
#[derive(Debug, thiserror::Error)]
pub enum PassStateError {
    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: PassStage, to: PassStage },
}

/// Render pass state record. Diagnostics only, never part of the
/// rendered artifact, which must stay byte-identical across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassState {
    /// Overlay the pass is rendering.
    pub overlay: String,

    /// Current stage.
    pub stage: PassStage,

    /// When the pass started.
    pub started_at: DateTime<Utc>,

    /// When the stage last changed.
    pub updated_at: DateTime<Utc>,

    /// Failure description, set when the pass fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PassState {
    /// Create a new pass in PENDING.
    pub fn new(overlay: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            overlay: overlay.into(),
            stage: PassStage::Pending,
            started_at: now,
            updated_at: now,
            failure: None,
        }
    }

    /// Advance to the next stage.
    pub fn advance(&mut self, stage: PassStage) -> Result<(), PassStateError> {
        if !self.stage.can_transition_to(stage) {
            return Err(PassStateError::InvalidTransition {
                from: self.stage,
                to: stage,
            });
        }
        self.stage = stage;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the pass failed, recording why. No-op when already terminal.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = PassStage::Failed;
        self.failure = Some(message.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_pass_sequence() {
        let mut state = PassState::new("production");
        assert_eq!(state.stage, PassStage::Pending);

        for stage in [
            PassStage::Loaded,
            PassStage::Merged,
            PassStage::Bound,
            PassStage::Validated,
            PassStage::Rendered,
        ] {
            state.advance(stage).unwrap();
            assert_eq!(state.stage, stage);
        }
        assert!(state.stage.is_terminal());
    }

    #[test]
    fn test_no_stage_skipping() {
        let mut state = PassState::new("production");
        let err = state.advance(PassStage::Merged).unwrap_err();
        assert!(matches!(
            err,
            PassStateError::InvalidTransition {
                from: PassStage::Pending,
                to: PassStage::Merged
            }
        ));
    }

    #[test]
    fn test_no_backward_transition() {
        let mut state = PassState::new("production");
        state.advance(PassStage::Loaded).unwrap();
        state.advance(PassStage::Merged).unwrap();

        assert!(state.advance(PassStage::Loaded).is_err());
    }

    #[test]
    fn test_fail_from_any_active_stage() {
        let mut state = PassState::new("production");
        state.advance(PassStage::Loaded).unwrap();
        state.fail("merge error: patch 0 targets undefined resource");

        assert_eq!(state.stage, PassStage::Failed);
        assert!(state.failure.as_deref().unwrap().contains("patch 0"));
    }

    #[test]
    fn test_fail_is_noop_on_terminal() {
        let mut state = PassState::new("production");
        for stage in [
            PassStage::Loaded,
            PassStage::Merged,
            PassStage::Bound,
            PassStage::Validated,
            PassStage::Rendered,
        ] {
            state.advance(stage).unwrap();
        }

        state.fail("too late");
        assert_eq!(state.stage, PassStage::Rendered);
        assert!(state.failure.is_none());
    }

    #[test]
    fn test_no_transition_out_of_failed() {
        let mut state = PassState::new("production");
        state.fail("load error");
        assert!(state.advance(PassStage::Loaded).is_err());
    }

    #[test]
    fn test_serialization_uses_screaming_snake_case() {
        let state = PassState::new("production");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"stage\":\"PENDING\""));
    }
}
