//! Splits a generation bundle into main and test code.
//!
//! Structured bundles (a JSON object with `main_code` and `test_code`) are
//! decoded first. Anything else goes through the literal marker pairs that
//! the instruction prompt asks the model to emit.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{CodeSection, ExtractedCode};
use crate::error::ExtractionError;
use crate::utils::{try_extract_json_object, JsonExtractionResult};

pub const MAIN_CODE_BEGIN: &str = "# === BEGIN MAIN CODE ===";
pub const MAIN_CODE_END: &str = "# === END MAIN CODE ===";
pub const TEST_CODE_BEGIN: &str = "# === BEGIN TEST CODE ===";
pub const TEST_CODE_END: &str = "# === END TEST CODE ===";

/// Begin/end marker pair delimiting one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarkers {
    pub begin: String,
    pub end: String,
}

impl SectionMarkers {
    pub fn new(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }
}

/// Marker pairs for both sections of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMarkers {
    pub main: SectionMarkers,
    pub test: SectionMarkers,
}

impl Default for BundleMarkers {
    fn default() -> Self {
        Self {
            main: SectionMarkers::new(MAIN_CODE_BEGIN, MAIN_CODE_END),
            test: SectionMarkers::new(TEST_CODE_BEGIN, TEST_CODE_END),
        }
    }
}

impl BundleMarkers {
    pub fn for_section(&self, section: CodeSection) -> &SectionMarkers {
        match section {
            CodeSection::Main => &self.main,
            CodeSection::Test => &self.test,
        }
    }
}

#[derive(Deserialize)]
struct StructuredBundle {
    main_code: Option<String>,
    test_code: Option<String>,
}

/// Returns the trimmed text between the first `begin` and the first `end` after it.
///
/// `None` when either marker is missing or `end` only occurs before `begin`.
pub fn extract_section(bundle: &str, begin: &str, end: &str) -> Option<String> {
    locate_section(bundle, begin, end)
        .ok()
        .map(|body| body.trim().to_string())
}

/// Extracts both sections from a bundle.
///
/// Each section has a surrounding markdown fence removed. A section that is
/// empty after trimming counts as missing.
pub fn extract_code(bundle: &str, markers: &BundleMarkers) -> Result<ExtractedCode, ExtractionError> {
    if let Some(code) = decode_structured(bundle) {
        debug!("Decoded structured generation bundle");
        return Ok(code);
    }

    let main_code = extract_marked(bundle, CodeSection::Main, &markers.main)?;
    let test_code = extract_marked(bundle, CodeSection::Test, &markers.test)?;
    Ok(ExtractedCode {
        main_code,
        test_code,
    })
}

/// Removes a single ```` ```python ```` (or bare ```` ``` ````) fence wrapping
/// the whole of `code`.
pub fn strip_markdown_fence(code: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let trimmed = code.trim();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)^```(?:python|py)?[ \t]*\r?\n(.*?)\r?\n?```$").ok());

    match fence.as_ref().and_then(|re| re.captures(trimmed)) {
        Some(caps) => caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        None => trimmed.to_string(),
    }
}

fn decode_structured(bundle: &str) -> Option<ExtractedCode> {
    let json = match try_extract_json_object(bundle) {
        JsonExtractionResult::Success(json) => json,
        JsonExtractionResult::Truncated { unclosed_braces, .. } => {
            debug!(unclosed_braces, "Bundle holds an unterminated JSON object; using section markers");
            return None;
        }
        JsonExtractionResult::NotFound => return None,
    };
    let parsed: StructuredBundle = serde_json::from_str(&json).ok()?;
    let main_code = strip_markdown_fence(parsed.main_code.as_deref()?);
    let test_code = strip_markdown_fence(parsed.test_code.as_deref()?);
    if main_code.is_empty() || test_code.is_empty() {
        return None;
    }
    Some(ExtractedCode {
        main_code,
        test_code,
    })
}

fn extract_marked(
    bundle: &str,
    section: CodeSection,
    markers: &SectionMarkers,
) -> Result<String, ExtractionError> {
    let body = locate_section(bundle, &markers.begin, &markers.end).map_err(|missing| match missing {
        MissingMarker::Begin => ExtractionError::MissingBeginMarker {
            section,
            marker: markers.begin.clone(),
        },
        MissingMarker::End => ExtractionError::MissingEndMarker {
            section,
            marker: markers.end.clone(),
        },
    })?;

    let code = strip_markdown_fence(body);
    if code.is_empty() {
        return Err(ExtractionError::EmptySection { section });
    }
    Ok(code)
}

enum MissingMarker {
    Begin,
    End,
}

fn locate_section<'a>(bundle: &'a str, begin: &str, end: &str) -> Result<&'a str, MissingMarker> {
    let start = bundle.find(begin).ok_or(MissingMarker::Begin)? + begin.len();
    let len = bundle[start..].find(end).ok_or(MissingMarker::End)?;
    Ok(&bundle[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(main: &str, test: &str) -> String {
        format!(
            "Here is the code.\n{MAIN_CODE_BEGIN}\n{main}\n{MAIN_CODE_END}\n\n{TEST_CODE_BEGIN}\n{test}\n{TEST_CODE_END}\n"
        )
    }

    #[test]
    fn test_extract_section_trims() {
        let text = "noise <<A>>\n  body line \n<<B>> tail";
        assert_eq!(
            extract_section(text, "<<A>>", "<<B>>").as_deref(),
            Some("body line")
        );
    }

    #[test]
    fn test_extract_section_out_of_order() {
        let text = "<<B>> something <<A>> more";
        assert_eq!(extract_section(text, "<<A>>", "<<B>>"), None);
    }

    #[test]
    fn test_extract_section_uses_first_end_after_begin() {
        let text = "<<A>>one<<B>>two<<B>>";
        assert_eq!(extract_section(text, "<<A>>", "<<B>>").as_deref(), Some("one"));
    }

    #[test]
    fn test_extract_code_both_sections() {
        let code = extract_code(
            &bundle("def add(a, b):\n    return a + b", "assert add(1, 2) == 3"),
            &BundleMarkers::default(),
        )
        .expect("both sections present");
        assert_eq!(code.main_code, "def add(a, b):\n    return a + b");
        assert_eq!(code.test_code, "assert add(1, 2) == 3");
    }

    #[test]
    fn test_missing_test_markers() {
        let text = format!("{MAIN_CODE_BEGIN}\nx = 1\n{MAIN_CODE_END}\n");
        let err = extract_code(&text, &BundleMarkers::default()).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::MissingBeginMarker {
                section: CodeSection::Test,
                marker: TEST_CODE_BEGIN.to_string(),
            }
        );
    }

    #[test]
    fn test_missing_end_marker() {
        let text = format!("{MAIN_CODE_BEGIN}\nx = 1\n");
        let err = extract_code(&text, &BundleMarkers::default()).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::MissingEndMarker {
                section: CodeSection::Main,
                ..
            }
        ));
    }

    #[test]
    fn test_whitespace_only_section_is_empty() {
        let err = extract_code(&bundle("x = 1", "   \n  "), &BundleMarkers::default()).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::EmptySection {
                section: CodeSection::Test
            }
        );
    }

    #[test]
    fn test_fenced_section_is_unwrapped() {
        let code = extract_code(
            &bundle("```python\nx = 1\n```", "```\nassert x == 1\n```"),
            &BundleMarkers::default(),
        )
        .expect("fenced sections");
        assert_eq!(code.main_code, "x = 1");
        assert_eq!(code.test_code, "assert x == 1");
    }

    #[test]
    fn test_strip_fence_leaves_plain_code() {
        assert_eq!(strip_markdown_fence("  y = 2  "), "y = 2");
        assert_eq!(strip_markdown_fence("a = '```'"), "a = '```'");
    }

    #[test]
    fn test_structured_bundle_preferred() {
        let text = r#"```json
{"main_code": "def f():\n    return 1", "test_code": "assert f() == 1"}
```"#;
        let code = extract_code(text, &BundleMarkers::default()).expect("structured bundle");
        assert_eq!(code.main_code, "def f():\n    return 1");
        assert_eq!(code.test_code, "assert f() == 1");
    }

    #[test]
    fn test_structured_bundle_without_tests_falls_back_to_markers() {
        let text = r#"{"main_code": "x = 1"}"#;
        let err = extract_code(text, &BundleMarkers::default()).unwrap_err();
        assert_eq!(err.section(), CodeSection::Main);
    }

    #[test]
    fn test_truncated_structured_bundle_falls_back_to_markers() {
        let text = "# === BEGIN MAIN CODE ===\nx = 1\n# === END MAIN CODE ===\n\
                    # === BEGIN TEST CODE ===\nassert x == 1\n# === END TEST CODE ===\n\
                    {\"main_code\": \"y = 2\", \"test_code\": \"assert y";
        assert!(matches!(
            try_extract_json_object(text),
            JsonExtractionResult::Truncated { unclosed_braces: 1, .. }
        ));

        let code = extract_code(text, &BundleMarkers::default()).unwrap();
        assert_eq!(code.main_code, "x = 1");
        assert_eq!(code.test_code, "assert x == 1");
    }

    #[test]
    fn test_custom_markers() {
        let markers = BundleMarkers {
            main: SectionMarkers::new("<main>", "</main>"),
            test: SectionMarkers::new("<test>", "</test>"),
        };
        let code = extract_code("<main>a = 1</main><test>assert a</test>", &markers)
            .expect("custom markers");
        assert_eq!(code.section(CodeSection::Test), "assert a");
    }
}
