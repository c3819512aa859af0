//! Configuration for the update pipeline and snippet execution.
//!
//! Values come from defaults, an optional YAML file and `SELFMOD_*`
//! environment variables, in that order of increasing priority.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codegen::derive_test_target;
use crate::execution::Interpreter;
use crate::testing::TestRunnerConfig;
use crate::workspace::validate_relative;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The configuration file is not valid YAML for this schema.
    #[error("Failed to parse configuration file: {0}")]
    Parse(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the update pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Filesystem roots
    /// Root of the live codebase that updates are applied to.
    pub codebase_root: PathBuf,
    /// Scratch tree for candidate artifacts.
    pub staging_root: PathBuf,
    /// Archive of replaced artifacts.
    pub backup_root: PathBuf,

    // Target layout
    /// Directory, relative to the codebase root, holding test files.
    pub tests_root: PathBuf,
    /// Prefix added to the target's file name to form the test file name.
    pub test_file_prefix: String,
    /// Target used when a proposal does not name one.
    pub default_target: PathBuf,

    // Snippet execution
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub snippet_timeout_secs: u64,

    // Test tool
    pub test_program: String,
    pub test_args: Vec<String>,
    pub test_timeout_secs: u64,
    /// Exit codes meaning "tests ran and some failed".
    pub test_failure_exit_codes: Vec<i32>,

    // Generation
    /// Model name; empty uses the LLM client's default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codebase_root: PathBuf::from("."),
            staging_root: PathBuf::from("./staging"),
            backup_root: PathBuf::from("./backup"),

            tests_root: PathBuf::from("tests"),
            test_file_prefix: "test_".to_string(),
            default_target: PathBuf::from("utils/generated_utils.py"),

            interpreter: "python3".to_string(),
            interpreter_args: vec!["-I".to_string(), "-u".to_string()],
            snippet_timeout_secs: 10,

            test_program: "python3".to_string(),
            test_args: vec!["-m".to_string(), "pytest".to_string(), "-q".to_string()],
            test_timeout_secs: 60,
            test_failure_exit_codes: vec![1],

            model: String::new(),
            temperature: 0.2,
            max_tokens: 4000,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from defaults and environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SELFMOD_CODEBASE_ROOT`: Live codebase root (default: .)
    /// - `SELFMOD_STAGING_ROOT`: Staging root (default: ./staging)
    /// - `SELFMOD_BACKUP_ROOT`: Backup root (default: ./backup)
    /// - `SELFMOD_TESTS_ROOT`: Test directory (default: tests)
    /// - `SELFMOD_TEST_PREFIX`: Test file prefix (default: test_)
    /// - `SELFMOD_DEFAULT_TARGET`: Default target (default: utils/generated_utils.py)
    /// - `SELFMOD_INTERPRETER`: Snippet interpreter (default: python3)
    /// - `SELFMOD_INTERPRETER_ARGS`: Whitespace-separated interpreter flags (default: -I -u)
    /// - `SELFMOD_SNIPPET_TIMEOUT_SECS`: Snippet timeout (default: 10)
    /// - `SELFMOD_TEST_PROGRAM`: Test tool (default: python3)
    /// - `SELFMOD_TEST_ARGS`: Whitespace-separated test tool arguments (default: -m pytest -q)
    /// - `SELFMOD_TEST_TIMEOUT_SECS`: Test timeout (default: 60)
    /// - `SELFMOD_TEST_FAILURE_CODES`: Comma-separated failure exit codes (default: 1)
    /// - `SELFMOD_MODEL`: LLM model (default: client default)
    /// - `SELFMOD_TEMPERATURE`: LLM temperature (default: 0.2)
    /// - `SELFMOD_MAX_TOKENS`: LLM max tokens (default: 4000)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// result fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a YAML configuration file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Loads the optional file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `SELFMOD_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("SELFMOD_CODEBASE_ROOT") {
            self.codebase_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SELFMOD_STAGING_ROOT") {
            self.staging_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SELFMOD_BACKUP_ROOT") {
            self.backup_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SELFMOD_TESTS_ROOT") {
            self.tests_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SELFMOD_TEST_PREFIX") {
            self.test_file_prefix = val;
        }
        if let Ok(val) = std::env::var("SELFMOD_DEFAULT_TARGET") {
            self.default_target = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("SELFMOD_INTERPRETER") {
            self.interpreter = val;
        }
        if let Ok(val) = std::env::var("SELFMOD_INTERPRETER_ARGS") {
            self.interpreter_args = split_args(&val);
        }
        if let Ok(val) = std::env::var("SELFMOD_SNIPPET_TIMEOUT_SECS") {
            self.snippet_timeout_secs = parse_env_value(&val, "SELFMOD_SNIPPET_TIMEOUT_SECS")?;
        }

        if let Ok(val) = std::env::var("SELFMOD_TEST_PROGRAM") {
            self.test_program = val;
        }
        if let Ok(val) = std::env::var("SELFMOD_TEST_ARGS") {
            self.test_args = split_args(&val);
        }
        if let Ok(val) = std::env::var("SELFMOD_TEST_TIMEOUT_SECS") {
            self.test_timeout_secs = parse_env_value(&val, "SELFMOD_TEST_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("SELFMOD_TEST_FAILURE_CODES") {
            self.test_failure_exit_codes = parse_env_list(&val, "SELFMOD_TEST_FAILURE_CODES")?;
        }

        if let Ok(val) = std::env::var("SELFMOD_MODEL") {
            self.model = val;
        }
        if let Ok(val) = std::env::var("SELFMOD_TEMPERATURE") {
            self.temperature = parse_env_value(&val, "SELFMOD_TEMPERATURE")?;
        }
        if let Ok(val) = std::env::var("SELFMOD_MAX_TOKENS") {
            self.max_tokens = parse_env_value(&val, "SELFMOD_MAX_TOKENS")?;
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snippet_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "snippet_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.test_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "test_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "interpreter cannot be empty".to_string(),
            ));
        }

        if self.test_program.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "test_program cannot be empty".to_string(),
            ));
        }

        if self.test_failure_exit_codes.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "test_failure_exit_codes cannot be empty".to_string(),
            ));
        }

        if self.test_failure_exit_codes.contains(&0) {
            return Err(ConfigError::ValidationFailed(
                "test_failure_exit_codes cannot contain 0".to_string(),
            ));
        }

        validate_relative(&self.tests_root)
            .map_err(|e| ConfigError::ValidationFailed(format!("tests_root: {e}")))?;
        validate_relative(&self.default_target)
            .map_err(|e| ConfigError::ValidationFailed(format!("default_target: {e}")))?;

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn snippet_timeout(&self) -> Duration {
        Duration::from_secs(self.snippet_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Snippet interpreter described by this configuration.
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.interpreter.clone(), self.interpreter_args.clone(), "py")
    }

    /// Test tool invocation described by this configuration.
    pub fn test_runner_config(&self) -> TestRunnerConfig {
        TestRunnerConfig::pytest()
            .with_program(self.test_program.clone(), self.test_args.clone())
            .with_timeout(self.test_timeout())
            .with_failure_exit_codes(self.test_failure_exit_codes.clone())
    }

    /// Test artifact path for a main artifact.
    pub fn test_target_for(&self, target: &Path) -> PathBuf {
        derive_test_target(target, &self.tests_root, &self.test_file_prefix)
    }

    /// Builder method to set the live codebase root.
    pub fn with_codebase_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.codebase_root = path.into();
        self
    }

    /// Builder method to set the staging root.
    pub fn with_staging_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_root = path.into();
        self
    }

    /// Builder method to set the backup root.
    pub fn with_backup_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_root = path.into();
        self
    }

    /// Builder method to set the default target.
    pub fn with_default_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_target = path.into();
        self
    }

    /// Builder method to set the snippet interpreter.
    pub fn with_interpreter(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.interpreter = program.into();
        self.interpreter_args = args;
        self
    }

    /// Builder method to set the test tool.
    pub fn with_test_program(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.test_program = program.into();
        self.test_args = args;
        self
    }

    /// Builder method to set the test timeout.
    pub fn with_test_timeout_secs(mut self, secs: u64) -> Self {
        self.test_timeout_secs = secs;
        self
    }

    /// Builder method to set the snippet timeout.
    pub fn with_snippet_timeout_secs(mut self, secs: u64) -> Self {
        self.snippet_timeout_secs = secs;
        self
    }

    /// Builder method to set the failure exit codes of the test tool.
    pub fn with_test_failure_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.test_failure_exit_codes = codes;
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse a comma-separated environment variable into a list.
fn parse_env_list<T: std::str::FromStr>(value: &str, key: &str) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_env_value(s, key))
        .collect()
}

fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
