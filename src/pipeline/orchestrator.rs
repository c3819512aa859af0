//! Update pipeline orchestrator.
//!
//! `UpdatePipeline` drives one [`UpdateRequest`] at a time through:
//! - Generation of a code bundle from the task description
//! - Extraction and static validation of the main and test sections
//! - Staging and running the staged tests
//! - Operator confirmation, backup and apply
//!
//! Every step consumes the request and hands it back in its next phase, so a
//! caller can drive the machine one phase at a time with [`UpdatePipeline::step`]
//! or to completion with [`UpdatePipeline::run`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::codegen::{extract_code, render_update_prompt, BundleMarkers, CodeSection, SyntaxValidator};
use crate::error::{ApplyError, PipelineError, StagingError};
use crate::llm::TextGenerator;
use crate::metrics;
use crate::testing::TestRunner;
use crate::workspace::{validate_relative, BackupArchive, BackupRecord, LiveCodebase, StagedArtifact, StagingArea};

use super::config::PipelineConfig;
use super::confirm::Confirmation;
use super::phase::{AppliedUpdate, Phase, PhaseFailure, StagedPair, UpdateRequest, UpdateState};

/// Self-modification pipeline over one live codebase.
pub struct UpdatePipeline {
    config: PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    confirmer: Arc<dyn Confirmation>,
    staging: StagingArea,
    backups: BackupArchive,
    codebase: LiveCodebase,
    validator: SyntaxValidator,
    test_runner: TestRunner,
    markers: BundleMarkers,
    /// Held for the whole APPLYING phase.
    apply_lock: Mutex<()>,
}

impl UpdatePipeline {
    /// Creates a pipeline, creating the staging and backup roots if needed.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Staging` or `PipelineError::Apply` when a root
    /// directory cannot be created.
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn TextGenerator>,
        confirmer: Arc<dyn Confirmation>,
    ) -> Result<Self, PipelineError> {
        let staging = StagingArea::new(&config.staging_root)?;
        let backups =
            BackupArchive::new(&config.codebase_root, &config.backup_root).map_err(ApplyError::from)?;
        let codebase = LiveCodebase::new(&config.codebase_root);
        let test_runner = TestRunner::new(config.test_runner_config());

        info!(
            "Update pipeline ready: live={}, staging={}, backup={}",
            codebase.root().display(),
            staging.root().display(),
            backups.backup_root().display()
        );

        Ok(Self {
            config,
            generator,
            confirmer,
            staging,
            backups,
            codebase,
            validator: SyntaxValidator::python(),
            test_runner,
            markers: BundleMarkers::default(),
            apply_lock: Mutex::new(()),
        })
    }

    /// Builder method to set the section markers.
    pub fn with_markers(mut self, markers: BundleMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Builder method to set the test runner.
    pub fn with_test_runner(mut self, test_runner: TestRunner) -> Self {
        self.test_runner = test_runner;
        self
    }

    /// Builder method to set the syntax validator.
    pub fn with_validator(mut self, validator: SyntaxValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn backups(&self) -> &BackupArchive {
        &self.backups
    }

    pub fn codebase(&self) -> &LiveCodebase {
        &self.codebase
    }

    /// Creates a request in `PROPOSED`.
    ///
    /// `target` defaults to the configured default target; the test target
    /// is derived from it.
    pub fn propose(&self, task: &str, target: Option<&Path>) -> Result<UpdateRequest, PipelineError> {
        let target = target.unwrap_or(&self.config.default_target);
        let target = validate_relative(target).map_err(StagingError::from)?;
        let test_target = self.config.test_target_for(&target);

        let request = UpdateRequest::new(task, target, test_target);
        info!(
            request_id = %request.id,
            "Proposed update for '{}' (tests: '{}')",
            request.target.display(),
            request.test_target.display()
        );
        Ok(request)
    }

    /// Proposes and runs an update in one call.
    pub async fn execute(&self, task: &str, target: Option<&Path>) -> Result<UpdateReport, PipelineError> {
        let request = self.propose(task, target)?;
        Ok(self.run(request).await)
    }

    /// Drives `request` until it reaches a terminal phase.
    pub async fn run(&self, mut request: UpdateRequest) -> UpdateReport {
        while !request.is_finished() {
            request = self.step(request).await;
        }

        let report = UpdateReport::from_request(&request);
        metrics::record_update(report.final_phase);
        match report.final_phase {
            Phase::Applied | Phase::Cancelled => {
                info!(request_id = %report.request_id, "Update finished: {}", report.message)
            }
            _ => warn!(request_id = %report.request_id, "Update finished: {}", report.message),
        }
        report
    }

    /// Performs the work of the current phase and moves to the next one.
    ///
    /// A request that is already in a terminal phase is returned unchanged.
    pub async fn step(&self, mut request: UpdateRequest) -> UpdateRequest {
        if request.is_finished() {
            return request;
        }

        let started = Instant::now();
        let from = request.phase();
        let next = match self.next_state(&request).await {
            Ok(state) => state,
            Err(failure) => UpdateState::Failed { failure: *failure },
        };

        if let Err(e) = request.advance(next) {
            error!(request_id = %request.id, "{}", e);
            let failure = PhaseFailure::new(from, &PipelineError::from(e))
                .with_staged(request.state().staged().cloned());
            // Failing is always allowed from a non-terminal phase.
            let _ = request.advance(UpdateState::Failed { failure });
        }

        let to = request.phase();
        metrics::record_phase(from, started.elapsed());
        info!(request_id = %request.id, from = %from, to = %to, "Phase transition");
        request
    }

    async fn next_state(&self, request: &UpdateRequest) -> Result<UpdateState, Box<PhaseFailure>> {
        let phase = request.phase();
        let fail = |error: PipelineError| {
            Box::new(PhaseFailure::new(phase, &error).with_staged(request.state().staged().cloned()))
        };

        match request.state() {
            UpdateState::Proposed => Ok(UpdateState::Generating {
                prompt: render_update_prompt(
                    &request.task,
                    &request.target,
                    &request.test_target,
                    &self.markers,
                ),
            }),
            UpdateState::Generating { prompt } => {
                let bundle = self.generator.generate(prompt).await.map_err(|e| fail(e.into()))?;
                Ok(UpdateState::Extracting { bundle })
            }
            UpdateState::Extracting { bundle } => {
                let code = extract_code(bundle, &self.markers).map_err(|e| fail(e.into()))?;
                Ok(UpdateState::Validating { code })
            }
            UpdateState::Validating { code } => {
                self.validator.validate(&code.main_code, CodeSection::Main).map_err(|e| fail(e.into()))?;
                self.validator.validate(&code.test_code, CodeSection::Test).map_err(|e| fail(e.into()))?;

                let main = self
                    .staging
                    .stage_contents(&code.main_code, &request.target)
                    .map_err(|e| fail(e.into()))?;
                let test = self
                    .staging
                    .stage_contents(&code.test_code, &request.test_target)
                    .map_err(|e| {
                        warn!(
                            request_id = %request.id,
                            "Test staging failed; staged main left at '{}'",
                            main.staged_path.display()
                        );
                        Box::new(PhaseFailure::new(phase, &PipelineError::from(e)).with_staged_main(Some(main.clone())))
                    })?;
                Ok(UpdateState::Staged {
                    staged: StagedPair { main, test },
                })
            }
            UpdateState::Staged { staged } => Ok(UpdateState::Testing {
                staged: staged.clone(),
            }),
            UpdateState::Testing { staged } => {
                let tests = self
                    .test_runner
                    .run_tests(&staged.test.staged_path, self.staging.root())
                    .await;
                let staged = staged.clone();
                if tests.passed {
                    Ok(UpdateState::TestsPassed { staged, tests })
                } else {
                    Ok(UpdateState::TestsFailed { staged, tests })
                }
            }
            UpdateState::TestsPassed { staged, .. } => Ok(UpdateState::AwaitingConfirmation {
                summary: self.confirmation_summary(request, staged),
                staged: staged.clone(),
            }),
            UpdateState::AwaitingConfirmation { staged, summary } => {
                let staged = staged.clone();
                if self.confirmer.confirm(summary).await {
                    Ok(UpdateState::Applying { staged })
                } else {
                    info!(request_id = %request.id, "Operator declined the update");
                    Ok(UpdateState::Cancelled { staged })
                }
            }
            UpdateState::Applying { staged } => self.apply(request, staged).await,
            UpdateState::TestsFailed { .. }
            | UpdateState::Applied { .. }
            | UpdateState::Cancelled { .. }
            | UpdateState::Failed { .. } => Err(fail(PipelineError::InvalidTransition {
                from: phase,
                to: Phase::Failed,
            })),
        }
    }

    fn confirmation_summary(&self, request: &UpdateRequest, staged: &StagedPair) -> String {
        format!(
            "Successfully staged to '{}'. This will apply the changes to the live file: '{}'.\nTask: {}\nStaged tests: '{}' (passed)",
            staged.main.staged_path.display(),
            self.codebase.root().join(&request.target).display(),
            request.task,
            staged.test.staged_path.display()
        )
    }

    async fn apply(&self, request: &UpdateRequest, staged: &StagedPair) -> Result<UpdateState, Box<PhaseFailure>> {
        let _guard = self.apply_lock.lock().await;
        let failure = |error: PipelineError| PhaseFailure::new(Phase::Applying, &error).with_staged(Some(staged.clone()));

        let backup = self
            .backups
            .backup(&request.target)
            .map_err(|e| Box::new(failure(ApplyError::from(e).into())))?;

        match self.codebase.apply(&staged.main) {
            Ok(live_path) => Ok(UpdateState::Applied {
                staged: staged.clone(),
                applied: AppliedUpdate {
                    live_path,
                    backup,
                    digest: staged.main.digest.clone(),
                },
            }),
            Err(e) => {
                let restored = match (&e, &backup) {
                    (ApplyError::ReplaceFailed { .. }, Some(record)) => Some(self.roll_back(request, record)),
                    _ => None,
                };
                Err(Box::new(failure(e.into()).with_rollback(backup, restored)))
            }
        }
    }

    fn roll_back(&self, request: &UpdateRequest, record: &BackupRecord) -> bool {
        match self.backups.restore(record) {
            Ok(path) => {
                warn!(request_id = %request.id, "Restored '{}' from backup after a failed apply", path.display());
                true
            }
            Err(e) => {
                error!(
                    request_id = %request.id,
                    "Could not restore '{}' from '{}': {}",
                    record.original_relative_path.display(),
                    record.backup_path.display(),
                    e
                );
                false
            }
        }
    }
}

/// Terminal summary of an update request.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub request_id: Uuid,
    pub task: String,
    pub target: PathBuf,
    pub test_target: PathBuf,
    pub final_phase: Phase,
    pub history: Vec<Phase>,
    /// Human-readable outcome.
    pub message: String,
    /// Raw diagnostic text: test output, parser message or collaborator error.
    pub diagnostic: Option<String>,
    pub staged: Option<StagedPair>,
    /// Main artifact left in staging when staging the tests failed.
    pub staged_main: Option<StagedArtifact>,
    pub backup: Option<BackupRecord>,
    pub applied_path: Option<PathBuf>,
}

impl UpdateReport {
    pub fn from_request(request: &UpdateRequest) -> Self {
        let mut report = Self {
            request_id: request.id,
            task: request.task.clone(),
            target: request.target.clone(),
            test_target: request.test_target.clone(),
            final_phase: request.phase(),
            history: request.history().to_vec(),
            message: String::new(),
            diagnostic: None,
            staged: request.state().staged().cloned(),
            staged_main: None,
            backup: None,
            applied_path: None,
        };

        match request.state() {
            UpdateState::Applied { applied, .. } => {
                report.message = match &applied.backup {
                    Some(record) => format!(
                        "Applied update to '{}' (previous version backed up to '{}')",
                        applied.live_path.display(),
                        record.backup_path.display()
                    ),
                    None => format!("Applied update to '{}'", applied.live_path.display()),
                };
                report.backup = applied.backup.clone();
                report.applied_path = Some(applied.live_path.clone());
            }
            UpdateState::Cancelled { staged } => {
                report.message = format!(
                    "Update cancelled; staged files kept at '{}' and '{}'",
                    staged.main.staged_path.display(),
                    staged.test.staged_path.display()
                );
            }
            UpdateState::TestsFailed { tests, .. } => {
                report.message = match tests.error() {
                    Some(err) => format!("Staged tests could not run: {}", err),
                    None => "Staged tests failed".to_string(),
                };
                report.diagnostic = Some(tests.output.clone());
            }
            UpdateState::Failed { failure } => {
                report.message = format!("Failed during {}: {}", failure.phase, failure.message);
                match failure.restored {
                    Some(true) => report.message.push_str("; live artifact restored from backup"),
                    Some(false) => report.message.push_str("; restoring the live artifact from backup failed"),
                    None => {}
                }
                report.diagnostic = failure.diagnostic.clone();
                report.staged_main = failure.staged_main.clone();
                report.backup = failure.backup.clone();
            }
            state => {
                report.message = format!("Update stopped in {}", state.phase());
            }
        }

        report
    }

    /// Whether the request ended the way an operator intended.
    pub fn succeeded(&self) -> bool {
        matches!(self.final_phase, Phase::Applied | Phase::Cancelled)
    }
}
