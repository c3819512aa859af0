//! Generated-code handling.
//!
//! A generation bundle is the raw text returned by the text generator. This
//! module pulls the main and test sections out of it, checks each one parses
//! as Python, and builds the instruction prompt that asks for a bundle.

pub mod extractor;
pub mod prompt;
pub mod validator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use extractor::{
    extract_code, extract_section, strip_markdown_fence, BundleMarkers, SectionMarkers,
    MAIN_CODE_BEGIN, MAIN_CODE_END, TEST_CODE_BEGIN, TEST_CODE_END,
};
pub use prompt::{
    derive_module_path, derive_test_target, render_update_prompt, SYSTEM_PROMPT,
    UPDATE_INSTRUCTION_PROMPT,
};
pub use validator::SyntaxValidator;

/// The two sections of a generation bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSection {
    Main,
    Test,
}

impl fmt::Display for CodeSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeSection::Main => write!(f, "main"),
            CodeSection::Test => write!(f, "test"),
        }
    }
}

/// Main and test code pulled out of a generation bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCode {
    pub main_code: String,
    pub test_code: String,
}

impl ExtractedCode {
    pub fn new(main_code: impl Into<String>, test_code: impl Into<String>) -> Self {
        Self {
            main_code: main_code.into(),
            test_code: test_code.into(),
        }
    }

    /// Returns the code for one section.
    pub fn section(&self, section: CodeSection) -> &str {
        match section {
            CodeSection::Main => &self.main_code,
            CodeSection::Test => &self.test_code,
        }
    }
}
