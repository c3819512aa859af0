//! Static syntax validation of generated Python.
//!
//! The code is parsed with tree-sitter and the tree is discarded; nothing is
//! executed. The first ERROR or MISSING node in document order is reported.
//! The Python grammar also accepts a few Python 2 forms and statement-level
//! `:=`; a clean tree is walked once more and those are rejected too.

use tree_sitter::{Language, Node, Parser};

use super::CodeSection;
use crate::error::SyntaxError;

const SNIPPET_PREVIEW: usize = 40;

/// Parses code with a tree-sitter grammar and reports the first syntax error.
#[derive(Clone)]
pub struct SyntaxValidator {
    language: Language,
}

impl std::fmt::Debug for SyntaxValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxValidator").finish_non_exhaustive()
    }
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::python()
    }
}

impl SyntaxValidator {
    /// Validator for Python source.
    pub fn python() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    /// Validator for an arbitrary tree-sitter grammar.
    pub fn with_language(language: Language) -> Self {
        Self { language }
    }

    /// Checks that `code` parses cleanly.
    ///
    /// `section` is carried into the error so callers can tell whether the
    /// main code or the test code was rejected.
    pub fn validate(&self, code: &str, section: CodeSection) -> Result<(), SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| positionless(section, format!("parser initialisation failed: {e}")))?;

        let tree = parser
            .parse(code, None)
            .ok_or_else(|| positionless(section, "parser produced no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let node = first_error(root).unwrap_or(root);
            return Err(located(section, node, describe(node, code)));
        }

        match first_rejected(root) {
            Some((node, reason)) => Err(located(section, node, format!("{reason} near '{}'", preview(node, code)))),
            None => Ok(()),
        }
    }
}

fn located(section: CodeSection, node: Node<'_>, detail: String) -> SyntaxError {
    let position = node.start_position();
    SyntaxError {
        section,
        line: position.row + 1,
        column: position.column + 1,
        detail,
    }
}

fn positionless(section: CodeSection, detail: String) -> SyntaxError {
    SyntaxError {
        section,
        line: 0,
        column: 0,
        detail,
    }
}

fn first_error<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// First node, in document order, that parses but is not valid Python 3.
fn first_rejected<'t>(root: Node<'t>) -> Option<(Node<'t>, &'static str)> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if let Some(reason) = rejection(node) {
            return Some((node, reason));
        }
        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn rejection(node: Node<'_>) -> Option<&'static str> {
    match node.kind() {
        "print_statement" => Some("Python 2 print statement; call print() instead"),
        "exec_statement" => Some("Python 2 exec statement; call exec() instead"),
        "named_expression" if node.parent().is_some_and(|p| p.kind() == "expression_statement") => {
            Some("unparenthesized assignment expression")
        }
        "<>" if !node.is_named() => Some("'<>' is not a Python 3 operator; use '!='"),
        _ => None,
    }
}

fn describe(node: Node<'_>, code: &str) -> String {
    if node.is_missing() {
        return format!("missing '{}'", node.kind());
    }

    let preview = preview(node, code);
    if preview.is_empty() {
        return "invalid syntax".to_string();
    }
    format!("invalid syntax near '{preview}'")
}

fn preview(node: Node<'_>, code: &str) -> String {
    let text = node.utf8_text(code.as_bytes()).unwrap_or_default();
    let first_line = text.lines().next().unwrap_or_default().trim();
    first_line.chars().take(SNIPPET_PREVIEW).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_code() {
        let validator = SyntaxValidator::python();
        let code = "def add(a, b):\n    return a + b\n\nclass Point:\n    x: int = 0\n";
        assert!(validator.validate(code, CodeSection::Main).is_ok());
    }

    #[test]
    fn test_empty_code_is_valid() {
        assert!(SyntaxValidator::python()
            .validate("", CodeSection::Main)
            .is_ok());
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        let err = SyntaxValidator::python()
            .validate("def add(a, b:\n    return a + b\n", CodeSection::Main)
            .unwrap_err();
        assert_eq!(err.section, CodeSection::Main);
        assert!(err.line >= 1 && err.column >= 1);
        assert!(!err.detail.is_empty());
    }

    #[test]
    fn test_error_on_later_line_in_test_section() {
        let code = "import math\n\nassert math.pi > 3\nx = = 1\n";
        let err = SyntaxValidator::python()
            .validate(code, CodeSection::Test)
            .unwrap_err();
        assert_eq!(err.section, CodeSection::Test);
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_rejects_forms_the_grammar_accepts() {
        let validator = SyntaxValidator::python();
        for (code, detail) in [
            ("print \"hello\"\n", "print statement"),
            ("exec \"x=1\"\n", "exec statement"),
            ("a := 1\n", "assignment expression"),
        ] {
            let err = validator.validate(code, CodeSection::Main).unwrap_err();
            assert_eq!((err.line, err.column), (1, 1), "{code}");
            assert!(err.detail.contains(detail), "{}", err.detail);
        }

        let err = validator
            .validate("import os\n\nif True:\n    print \"x\"\n", CodeSection::Test)
            .unwrap_err();
        assert_eq!(err.section, CodeSection::Test);
        assert_eq!((err.line, err.column), (4, 5));
    }

    #[test]
    fn test_accepts_python3_equivalents() {
        let validator = SyntaxValidator::python();
        let code = "print(\"hello\")\nexec(\"x=1\")\nif (a := 1):\n    pass\n";
        assert!(validator.validate(code, CodeSection::Main).is_ok());
    }

    #[test]
    fn test_never_executes_code() {
        let code = "raise SystemExit(3)\n";
        assert!(SyntaxValidator::python()
            .validate(code, CodeSection::Main)
            .is_ok());
    }
}
