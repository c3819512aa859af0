//! Update request lifecycle.
//!
//! An [`UpdateRequest`] carries its current phase together with the payload
//! that phase produced. Each pipeline step consumes the request, does its
//! work and returns it in the next phase; the transition table in
//! [`Phase::can_transition_to`] is the only way phases move.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::codegen::ExtractedCode;
use crate::error::PipelineError;
use crate::testing::TestRunResult;
use crate::workspace::{BackupRecord, StagedArtifact};

/// Phases of the update pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Proposed,
    Generating,
    Extracting,
    Validating,
    Staged,
    Testing,
    TestsPassed,
    TestsFailed,
    AwaitingConfirmation,
    Applying,
    Applied,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Proposed => "PROPOSED",
            Phase::Generating => "GENERATING",
            Phase::Extracting => "EXTRACTING",
            Phase::Validating => "VALIDATING",
            Phase::Staged => "STAGED",
            Phase::Testing => "TESTING",
            Phase::TestsPassed => "TESTS_PASSED",
            Phase::TestsFailed => "TESTS_FAILED",
            Phase::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            Phase::Applying => "APPLYING",
            Phase::Applied => "APPLIED",
            Phase::Cancelled => "CANCELLED",
            Phase::Failed => "FAILED",
        }
    }

    /// Terminal phases end a request; nothing follows them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::TestsFailed | Phase::Applied | Phase::Cancelled | Phase::Failed
        )
    }

    /// Whether `next` may directly follow `self`.
    ///
    /// Any non-terminal phase may fail; otherwise phases advance strictly in
    /// pipeline order with the two branch points after testing and at the
    /// confirmation gate.
    pub fn can_transition_to(self, next: Phase) -> bool {
        if next == Phase::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Phase::Proposed, Phase::Generating)
                | (Phase::Generating, Phase::Extracting)
                | (Phase::Extracting, Phase::Validating)
                | (Phase::Validating, Phase::Staged)
                | (Phase::Staged, Phase::Testing)
                | (Phase::Testing, Phase::TestsPassed)
                | (Phase::Testing, Phase::TestsFailed)
                | (Phase::TestsPassed, Phase::AwaitingConfirmation)
                | (Phase::AwaitingConfirmation, Phase::Applying)
                | (Phase::AwaitingConfirmation, Phase::Cancelled)
                | (Phase::Applying, Phase::Applied)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staged main and test artifacts of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPair {
    pub main: StagedArtifact,
    pub test: StagedArtifact,
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedUpdate {
    pub live_path: PathBuf,
    /// Snapshot of the replaced artifact; `None` for a first-time creation.
    pub backup: Option<BackupRecord>,
    pub digest: String,
}

/// Why a request ended in `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFailure {
    /// Phase the request was in when the failure happened.
    pub phase: Phase,
    pub message: String,
    pub diagnostic: Option<String>,
    /// Artifacts staged before the failure; they are left in place.
    pub staged: Option<StagedPair>,
    /// Main artifact staged before staging the tests failed; left in place.
    pub staged_main: Option<StagedArtifact>,
    /// Backup taken before a failed apply.
    pub backup: Option<BackupRecord>,
    /// Whether the live artifact was restored from `backup`.
    pub restored: Option<bool>,
}

impl PhaseFailure {
    pub fn new(phase: Phase, error: &PipelineError) -> Self {
        Self {
            phase,
            message: error.to_string(),
            diagnostic: error.diagnostic(),
            staged: None,
            staged_main: None,
            backup: None,
            restored: None,
        }
    }

    pub fn with_staged_main(mut self, main: Option<StagedArtifact>) -> Self {
        self.staged_main = main;
        self
    }

    pub fn with_staged(mut self, staged: Option<StagedPair>) -> Self {
        self.staged = staged;
        self
    }

    pub fn with_rollback(mut self, backup: Option<BackupRecord>, restored: Option<bool>) -> Self {
        self.backup = backup;
        self.restored = restored;
        self
    }
}

/// Current phase of a request together with the data that phase carries.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateState {
    Proposed,
    Generating { prompt: String },
    Extracting { bundle: String },
    Validating { code: ExtractedCode },
    Staged { staged: StagedPair },
    Testing { staged: StagedPair },
    TestsPassed { staged: StagedPair, tests: TestRunResult },
    TestsFailed { staged: StagedPair, tests: TestRunResult },
    AwaitingConfirmation { staged: StagedPair, summary: String },
    Applying { staged: StagedPair },
    Applied { staged: StagedPair, applied: AppliedUpdate },
    Cancelled { staged: StagedPair },
    Failed { failure: PhaseFailure },
}

impl UpdateState {
    pub fn phase(&self) -> Phase {
        match self {
            UpdateState::Proposed => Phase::Proposed,
            UpdateState::Generating { .. } => Phase::Generating,
            UpdateState::Extracting { .. } => Phase::Extracting,
            UpdateState::Validating { .. } => Phase::Validating,
            UpdateState::Staged { .. } => Phase::Staged,
            UpdateState::Testing { .. } => Phase::Testing,
            UpdateState::TestsPassed { .. } => Phase::TestsPassed,
            UpdateState::TestsFailed { .. } => Phase::TestsFailed,
            UpdateState::AwaitingConfirmation { .. } => Phase::AwaitingConfirmation,
            UpdateState::Applying { .. } => Phase::Applying,
            UpdateState::Applied { .. } => Phase::Applied,
            UpdateState::Cancelled { .. } => Phase::Cancelled,
            UpdateState::Failed { .. } => Phase::Failed,
        }
    }

    /// Staged artifacts carried by this state, if staging has happened.
    pub fn staged(&self) -> Option<&StagedPair> {
        match self {
            UpdateState::Staged { staged }
            | UpdateState::Testing { staged }
            | UpdateState::TestsPassed { staged, .. }
            | UpdateState::TestsFailed { staged, .. }
            | UpdateState::AwaitingConfirmation { staged, .. }
            | UpdateState::Applying { staged }
            | UpdateState::Applied { staged, .. }
            | UpdateState::Cancelled { staged } => Some(staged),
            UpdateState::Failed { failure } => failure.staged.as_ref(),
            _ => None,
        }
    }
}

/// Rejected phase transition.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid phase transition from {from} to {to}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

impl From<TransitionError> for PipelineError {
    fn from(err: TransitionError) -> Self {
        PipelineError::InvalidTransition {
            from: err.from,
            to: err.to,
        }
    }
}

/// One self-modification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRequest {
    pub id: Uuid,
    pub task: String,
    /// Relative path of the main artifact.
    pub target: PathBuf,
    /// Relative path of the test artifact.
    pub test_target: PathBuf,
    pub created_at: DateTime<Utc>,
    state: UpdateState,
    history: Vec<Phase>,
}

impl UpdateRequest {
    pub fn new(task: impl Into<String>, target: impl Into<PathBuf>, test_target: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            target: target.into(),
            test_target: test_target.into(),
            created_at: Utc::now(),
            state: UpdateState::Proposed,
            history: vec![Phase::Proposed],
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Every phase the request has been in, oldest first.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Moves to `next`, returning the phase that was left.
    ///
    /// The request is unchanged when the transition is not allowed.
    pub fn advance(&mut self, next: UpdateState) -> Result<Phase, TransitionError> {
        let from = self.phase();
        let to = next.phase();
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }
        self.state = next;
        self.history.push(to);
        Ok(from)
    }
}
