//! JSON object extraction from LLM responses.
//!
//! Structured generation bundles arrive as a JSON object, but models often
//! wrap it in a markdown fence or surround it with prose. The helpers here
//! locate the object without assuming either shape:
//! 1. A ```json fenced block
//! 2. The whole response, when it starts with '{'
//! 3. The largest valid object anywhere in the response, preferring later ones

use regex::Regex;

/// Result of a JSON object extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtractionResult {
    /// A complete object that parses as JSON.
    Success(String),
    /// An object was opened but never closed.
    Truncated { partial_json: String, unclosed_braces: usize },
    /// Nothing JSON-like in the response.
    NotFound,
}

impl JsonExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JsonExtractionResult::Success(_))
    }

    /// Returns the extracted JSON for the Success case.
    pub fn json(&self) -> Option<&str> {
        match self {
            JsonExtractionResult::Success(json) => Some(json),
            _ => None,
        }
    }
}

/// Attempts to locate a JSON object in `content`.
pub fn try_extract_json_object(content: &str) -> JsonExtractionResult {
    let trimmed = content.trim();

    if let Some(json) = extract_from_json_code_block(trimmed) {
        if is_json_object(&json) {
            return JsonExtractionResult::Success(json);
        }
    }

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            let candidate = &trimmed[..=end];
            if is_json_object(candidate) {
                return JsonExtractionResult::Success(candidate.to_string());
            }
        }
    }

    if let Some(json) = extract_last_valid_json_object(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    match trimmed.find('{') {
        Some(start) => {
            let unclosed_braces = count_unclosed_braces(&trimmed[start..]);
            if unclosed_braces > 0 {
                JsonExtractionResult::Truncated {
                    partial_json: trimmed[start..].to_string(),
                    unclosed_braces,
                }
            } else {
                JsonExtractionResult::NotFound
            }
        }
        None => JsonExtractionResult::NotFound,
    }
}

/// Finds the index of the '}' closing the object that `s` starts with.
///
/// String literals and escape sequences are skipped, so braces inside
/// JSON strings do not count.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extracts the object inside a ```json ... ``` block.
pub fn extract_from_json_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    if !block.starts_with('{') {
        return None;
    }
    match find_matching_brace(block) {
        Some(end) => Some(block[..=end].to_string()),
        None => Some(block.to_string()),
    }
}

/// Extracts the largest valid JSON object, preferring later occurrences on ties.
pub fn extract_last_valid_json_object(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| {
            let substr = &content[start..];
            let end = find_matching_brace(substr)?;
            let candidate = &substr[..=end];
            is_json_object(candidate).then(|| (start, candidate))
        })
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}

fn is_json_object(candidate: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(candidate),
        Ok(serde_json::Value::Object(_))
    )
}

fn count_unclosed_braces(s: &str) -> usize {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }

    depth.max(0) as usize
}
