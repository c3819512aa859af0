//! Operator confirmation before an update is applied.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tracing::warn;

/// Yes/no gate between passing tests and applying an update.
#[async_trait]
pub trait Confirmation: Send + Sync {
    /// Shows `summary` to the operator and returns whether to proceed.
    async fn confirm(&self, summary: &str) -> bool;
}

/// Asks on the terminal, re-prompting until the answer is yes or no.
///
/// The summary and prompt go to stderr so stdout stays machine-readable.
/// End of input or a read error counts as "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleConfirmation;

#[async_trait]
impl Confirmation for ConsoleConfirmation {
    async fn confirm(&self, summary: &str) -> bool {
        let summary = summary.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            ask(&summary, &mut stdin.lock(), &mut io::stderr().lock())
        })
        .await;

        answer.unwrap_or_else(|e| {
            warn!("Confirmation prompt failed: {}", e);
            false
        })
    }
}

/// Answers every confirmation the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, _summary: &str) -> bool {
        self.0
    }
}

/// Parses an operator answer.
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

fn ask<R: BufRead, W: Write>(summary: &str, input: &mut R, output: &mut W) -> bool {
    let _ = writeln!(output, "{summary}");
    loop {
        let _ = write!(output, "Apply this update? (yes/no): ");
        let _ = output.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => return false,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read confirmation: {}", e);
                return false;
            }
        }

        match parse_answer(&line) {
            Some(answer) => return answer,
            None => {
                let _ = writeln!(output, "Please answer 'yes' or 'no'.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(" YES\n"), Some(true));
        assert_eq!(parse_answer("y"), Some(true));
        assert_eq!(parse_answer("No"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
        assert_eq!(parse_answer(""), None);
    }

    #[test]
    fn test_ask_reprompts_until_valid() {
        let mut input = Cursor::new("sure\n\nno\n");
        let mut output = Vec::new();
        assert!(!ask("Apply x?", &mut input, &mut output));

        let printed = String::from_utf8(output).unwrap();
        assert_eq!(printed.matches("Apply this update?").count(), 3);
        assert_eq!(printed.matches("Please answer").count(), 2);
    }

    #[test]
    fn test_ask_eof_declines() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        assert!(!ask("summary", &mut input, &mut output));
    }

    #[tokio::test]
    async fn test_auto_confirm() {
        assert!(AutoConfirm(true).confirm("x").await);
        assert!(!AutoConfirm(false).confirm("x").await);
    }
}
