//! End-to-end update pipeline scenarios.
//!
//! Generation is scripted. Most scenarios stand in for the test tool with
//! `sh -c 'grep -q PASS_TOKEN "$1"'`: a staged test file containing the token
//! passes, one without it fails with exit code 1. The Python scenarios run
//! only when `python3` is available.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use selfmod::error::LlmError;
use selfmod::llm::TextGenerator;
use selfmod::pipeline::{AutoConfirm, Phase, PipelineConfig, UpdatePipeline, UpdateReport};

const TARGET: &str = "utils/generated_utils.py";
const TEST_TARGET: &str = "tests/test_generated_utils.py";

struct ScriptedGenerator {
    bundle: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(bundle: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            bundle: bundle.into(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.bundle.clone())
    }
}

fn bundle(main: &str, test: &str) -> String {
    format!(
        "Here is the update.\n\
         # === BEGIN MAIN CODE ===\n{main}\n# === END MAIN CODE ===\n\
         # === BEGIN TEST CODE ===\n{test}\n# === END TEST CODE ===\n"
    )
}

const ADD_MAIN: &str = "def add(a, b):\n    return a + b\n";
const PASSING_TEST: &str = "# PASS_TOKEN\nfrom utils.generated_utils import add\n\n\ndef test_add():\n    assert add(2, 3) == 5\n";
const FAILING_TEST: &str = "from utils.generated_utils import add\n\n\ndef test_add():\n    assert add(2, 3) == 6\n";

fn grep_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig::default()
        .with_codebase_root(dir.path().join("live"))
        .with_staging_root(dir.path().join("staging"))
        .with_backup_root(dir.path().join("backup"))
        .with_test_program(
            "sh",
            vec![
                "-c".to_string(),
                "grep -q PASS_TOKEN \"$1\"".to_string(),
                "sh".to_string(),
            ],
        )
        .with_test_timeout_secs(10)
}

fn pipeline(config: PipelineConfig, generator: Arc<ScriptedGenerator>, confirm: bool) -> UpdatePipeline {
    UpdatePipeline::new(config, generator, Arc::new(AutoConfirm(confirm))).unwrap()
}

async fn propose(pipeline: &UpdatePipeline, task: &str) -> UpdateReport {
    pipeline.execute(task, None).await.unwrap()
}

fn live(dir: &TempDir) -> PathBuf {
    dir.path().join("live").join(TARGET)
}

fn staging_entries(dir: &TempDir) -> usize {
    fs::read_dir(dir.path().join("staging")).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_applies_new_artifact() {
    let dir = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new(bundle(ADD_MAIN, PASSING_TEST));
    let pipeline = pipeline(grep_config(&dir), generator.clone(), true);

    let report = propose(&pipeline, "write a function that adds two numbers").await;

    assert_eq!(report.final_phase, Phase::Applied, "{}", report.message);
    assert_eq!(
        report.history,
        vec![
            Phase::Proposed,
            Phase::Generating,
            Phase::Extracting,
            Phase::Validating,
            Phase::Staged,
            Phase::Testing,
            Phase::TestsPassed,
            Phase::AwaitingConfirmation,
            Phase::Applying,
            Phase::Applied,
        ]
    );
    assert!(report.succeeded());
    assert!(report.backup.is_none());
    assert_eq!(report.applied_path.as_deref(), Some(live(&dir).as_path()));

    let applied = fs::read_to_string(live(&dir)).unwrap();
    assert!(applied.contains("def add(a, b):"));

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("write a function that adds two numbers"));
    assert!(prompts[0].contains(TEST_TARGET));

    // Only the main artifact goes live.
    assert!(!dir.path().join("live").join(TEST_TARGET).exists());
}

#[tokio::test]
async fn test_second_apply_backs_up_previous_version() {
    let dir = TempDir::new().unwrap();
    let first = pipeline(grep_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, PASSING_TEST)), true);
    assert_eq!(propose(&first, "add").await.final_phase, Phase::Applied);

    let updated = "def add(a, b):\n    return b + a\n";
    let second = pipeline(grep_config(&dir), ScriptedGenerator::new(bundle(updated, PASSING_TEST)), true);
    let report = propose(&second, "add, commuted").await;

    assert_eq!(report.final_phase, Phase::Applied);
    let record = report.backup.expect("replacing an existing artifact takes a backup");
    assert_eq!(record.original_relative_path, PathBuf::from(TARGET));
    assert!(fs::read_to_string(&record.backup_path).unwrap().contains("return a + b"));
    assert!(fs::read_to_string(live(&dir)).unwrap().contains("return b + a"));

    let history = second.backups().history(Path::new(TARGET)).unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_failing_tests_leave_live_tree_unchanged() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(grep_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, FAILING_TEST)), true);

    let report = propose(&pipeline, "add").await;

    assert_eq!(report.final_phase, Phase::TestsFailed);
    assert_eq!(report.history.last(), Some(&Phase::TestsFailed));
    assert!(!report.succeeded());
    assert!(report.diagnostic.is_some());
    assert!(!live(&dir).exists());

    let staged = report.staged.expect("staged files are reported");
    assert!(staged.main.staged_path.exists());
    assert!(staged.test.staged_path.exists());
    assert!(pipeline.backups().history(Path::new(TARGET)).unwrap().is_empty());
}

#[tokio::test]
async fn test_test_tool_error_is_reported_as_tests_failed() {
    let dir = TempDir::new().unwrap();
    let config = grep_config(&dir).with_test_program("sh", vec!["-c".to_string(), "echo crashed >&2; exit 7".to_string()]);
    let pipeline = pipeline(config, ScriptedGenerator::new(bundle(ADD_MAIN, PASSING_TEST)), true);

    let report = propose(&pipeline, "add").await;

    assert_eq!(report.final_phase, Phase::TestsFailed);
    assert!(report.message.contains("could not run"), "{}", report.message);
    let diagnostic = report.diagnostic.unwrap();
    assert!(diagnostic.starts_with("[test tool error]"), "{}", diagnostic);
    assert!(diagnostic.contains("crashed"));
}

#[tokio::test]
async fn test_declined_confirmation_cancels() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(grep_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, PASSING_TEST)), false);

    let report = propose(&pipeline, "add").await;

    assert_eq!(report.final_phase, Phase::Cancelled);
    assert!(report.succeeded());
    assert!(!live(&dir).exists());
    assert!(report.staged.unwrap().main.staged_path.exists());
    assert!(pipeline.backups().history(Path::new(TARGET)).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_test_markers_fail_before_staging() {
    let dir = TempDir::new().unwrap();
    let only_main = format!("# === BEGIN MAIN CODE ===\n{ADD_MAIN}# === END MAIN CODE ===\n");
    let pipeline = pipeline(grep_config(&dir), ScriptedGenerator::new(only_main), true);

    let report = propose(&pipeline, "add").await;

    assert_eq!(report.final_phase, Phase::Failed);
    assert_eq!(
        report.history,
        vec![Phase::Proposed, Phase::Generating, Phase::Extracting, Phase::Failed]
    );
    assert!(report.message.contains("# === BEGIN TEST CODE ==="), "{}", report.message);
    assert!(report.staged.is_none());
    assert_eq!(staging_entries(&dir), 0);
}

#[tokio::test]
async fn test_invalid_test_code_fails_before_staging() {
    let dir = TempDir::new().unwrap();
    let broken_test = "def test_add(:\n    assert True\n";
    let pipeline = pipeline(grep_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, broken_test)), true);

    let report = propose(&pipeline, "add").await;

    assert_eq!(report.final_phase, Phase::Failed);
    assert!(report.message.contains("test code failed syntax validation"), "{}", report.message);
    assert!(report.diagnostic.is_some());
    assert_eq!(staging_entries(&dir), 0);
    assert!(!live(&dir).exists());
}

#[tokio::test]
async fn test_structured_bundle_is_accepted() {
    let dir = TempDir::new().unwrap();
    let structured = serde_json::json!({
        "main_code": ADD_MAIN,
        "test_code": PASSING_TEST,
    })
    .to_string();
    let pipeline = pipeline(grep_config(&dir), ScriptedGenerator::new(structured), true);

    let report = propose(&pipeline, "add").await;

    assert_eq!(report.final_phase, Phase::Applied, "{}", report.message);
    assert!(fs::read_to_string(live(&dir)).unwrap().contains("return a + b"));
}

#[tokio::test]
async fn test_report_serialises_phase_names() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(grep_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, PASSING_TEST)), false);

    let report = propose(&pipeline, "add").await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["final_phase"], "CANCELLED");
    assert_eq!(json["history"][0], "PROPOSED");
    assert_eq!(json["target"], TARGET);
}

// ============================================================================
// Python scenarios
// ============================================================================

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Runs the staged test file as a plain script, so pytest is not needed.
fn python_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig::default()
        .with_codebase_root(dir.path().join("live"))
        .with_staging_root(dir.path().join("staging"))
        .with_backup_root(dir.path().join("backup"))
        .with_test_program("python3", vec![])
        .with_test_timeout_secs(30)
}

const PY_PASSING_TEST: &str = "from utils.generated_utils import add\n\nassert add(2, 3) == 5\n";
const PY_FAILING_TEST: &str = "from utils.generated_utils import add\n\nassert add(2, 3) == 6\n";

#[tokio::test]
async fn test_python_add_function_is_applied() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(python_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, PY_PASSING_TEST)), true);

    let report = propose(&pipeline, "write a function that adds two numbers").await;

    assert_eq!(report.final_phase, Phase::Applied, "{:?}", report.diagnostic);
    assert!(report.backup.is_none());
    assert!(fs::read_to_string(live(&dir)).unwrap().contains("def add(a, b):"));
}

#[tokio::test]
async fn test_python_wrong_assertion_fails_tests() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(python_config(&dir), ScriptedGenerator::new(bundle(ADD_MAIN, PY_FAILING_TEST)), true);

    let report = propose(&pipeline, "write a function that adds two numbers").await;

    assert_eq!(report.final_phase, Phase::TestsFailed);
    assert!(report.diagnostic.unwrap().contains("AssertionError"));
    assert!(!live(&dir).exists());
    let staged = report.staged.unwrap();
    assert!(staged.main.staged_path.exists());
    assert!(staged.test.staged_path.exists());
}
