//! Prompt composition: default system prompts and correction prompts.
//!
//! Everything here is pure string building with no I/O.

use crate::attempt::FieldErrors;
use crate::rules::RuleSet;

/// Hard cap on how much of a non-JSON response is echoed back to the model.
pub const RESPONSE_ECHO_LIMIT: usize = 500;

/// Build the prompt for the next attempt after a failed one.
///
/// The original prompt is reproduced verbatim, followed by a correction
/// section:
/// - invalid JSON: an instruction to answer with only a JSON object and the
///   previous response, cut to [`RESPONSE_ECHO_LIMIT`] characters;
/// - rule failures: one `field: message` line per error, in the order given.
///
/// The prompt always ends with an instruction to return only the corrected
/// JSON object.
///
/// # Example
///
/// ```
/// use llm_validator::attempt::FieldErrors;
/// use llm_validator::prompt::build_retry_prompt;
///
/// let mut errors = FieldErrors::new();
/// errors.insert("age".into(), vec!["The age must be an integer.".into()]);
///
/// let next = build_retry_prompt("Extract: John is 30", r#"{"age": "30"}"#, true, &errors);
/// assert!(next.starts_with("Extract: John is 30"));
/// assert!(next.contains("age: The age must be an integer."));
/// assert!(next.ends_with("Return only the corrected JSON object."));
/// ```
pub fn build_retry_prompt(
    original_prompt: &str,
    previous_response: &str,
    json_was_valid: bool,
    field_errors: &FieldErrors,
) -> String {
    let mut body = String::new();

    if !json_was_valid {
        body.push_str(
            "Your previous response was not valid JSON. Respond with ONLY a JSON object: \
             no explanations, no prose, no markdown code fences.\n\n",
        );
        body.push_str("Your previous response was:\n");
        body.push_str(truncate_chars(previous_response, RESPONSE_ECHO_LIMIT));
        body.push_str("\n\n");
    } else if field_errors.is_empty() {
        body.push_str("Your previous response did not pass validation.\n\n");
    } else {
        body.push_str("Your previous response did not pass validation. Fix these errors:\n");
        body.push_str(&error_lines(field_errors));
        body.push_str("\n\n");
    }

    body.push_str("Return only the corrected JSON object.");

    format!("{}\n\n{}", original_prompt, section("Correction", &body))
}

/// Default system prompt derived from a rule set.
pub fn default_system_prompt(rules: &RuleSet) -> String {
    let mut prompt = String::from(
        "You are a structured data assistant. Respond with a single JSON object and \
         nothing else: no prose, no markdown code fences.",
    );
    if !rules.is_empty() {
        let lines: Vec<String> = rules
            .iter()
            .map(|(field, rule)| format!("- {}: {}", field, rule))
            .collect();
        prompt.push_str("\n\nThe object must satisfy these field rules:\n");
        prompt.push_str(&lines.join("\n"));
    }
    prompt
}

/// One `field: message` line per error, preserving order and duplicates.
fn error_lines(field_errors: &FieldErrors) -> String {
    field_errors
        .iter()
        .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{}: {}", field, m)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// At most `max` characters of `s`, cut on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
