//! Instruction prompt for a self-modification and the paths it names.

use std::path::{Component, Path, PathBuf};

use super::BundleMarkers;

/// Fixed instruction template sent to the text generator.
///
/// Placeholders are filled by [`render_update_prompt`].
pub const UPDATE_INSTRUCTION_PROMPT: &str = r#"You are a careful Python engineer extending an existing code base.

Write a Python module that will be saved as '{target}' and importable as '{module}'.

Task: {task}

Respond with exactly two sections and nothing outside them.

The first section holds the complete module source:
{main_begin}
<module source>
{main_end}

The second section holds a pytest test file that will be saved as '{test_target}'.
It must import what it tests with `from {module} import ...` and contain at least one test function:
{test_begin}
<test source>
{test_end}

Rules:
1. Output raw Python inside each section, no markdown fences
2. Keep the marker lines exactly as written
3. Use only the standard library unless the task says otherwise
"#;

/// System message that accompanies the instruction prompt.
pub const SYSTEM_PROMPT: &str =
    "You write Python modules together with pytest tests. Follow the requested output format exactly.";

/// Fills the instruction template for `task`.
pub fn render_update_prompt(task: &str, target: &Path, test_target: &Path, markers: &BundleMarkers) -> String {
    UPDATE_INSTRUCTION_PROMPT
        .replace("{target}", &slash_path(target))
        .replace("{module}", &derive_module_path(target))
        .replace("{test_target}", &slash_path(test_target))
        .replace("{main_begin}", &markers.main.begin)
        .replace("{main_end}", &markers.main.end)
        .replace("{test_begin}", &markers.test.begin)
        .replace("{test_end}", &markers.test.end)
        .replace("{task}", task.trim())
}

/// Dotted import path of a relative source file: `utils/generated_utils.py` -> `utils.generated_utils`.
pub fn derive_module_path(target: &Path) -> String {
    let stemmed = target.with_extension("");
    stemmed
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Test artifact path for a target: same basename, `prefix`ed, under `tests_root`.
///
/// `utils/generated_utils.py` with `tests` and `test_` becomes
/// `tests/test_generated_utils.py`.
pub fn derive_test_target(target: &Path, tests_root: &Path, prefix: &str) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tests_root.join(format!("{prefix}{file_name}"))
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{MAIN_CODE_BEGIN, TEST_CODE_END};

    #[test]
    fn test_module_path() {
        assert_eq!(
            derive_module_path(Path::new("utils/generated_utils.py")),
            "utils.generated_utils"
        );
        assert_eq!(derive_module_path(Path::new("helpers.py")), "helpers");
    }

    #[test]
    fn test_test_target() {
        assert_eq!(
            derive_test_target(Path::new("utils/generated_utils.py"), Path::new("tests"), "test_"),
            PathBuf::from("tests/test_generated_utils.py")
        );
    }

    #[test]
    fn test_render_embeds_task_and_markers() {
        let prompt = render_update_prompt(
            "write a function that adds two numbers",
            Path::new("utils/generated_utils.py"),
            Path::new("tests/test_generated_utils.py"),
            &BundleMarkers::default(),
        );
        assert!(prompt.contains("Task: write a function that adds two numbers"));
        assert!(prompt.contains(MAIN_CODE_BEGIN));
        assert!(prompt.contains(TEST_CODE_END));
        assert!(prompt.contains("from utils.generated_utils import"));
        assert!(!prompt.contains("{module}"));
    }
}
