//! Recovering JSON from free-form model output.
//!
//! Models asked for JSON still wrap it in prose, fence it in markdown, or
//! leave trailing commas. [`parse_json`] tries a fixed sequence of recovery
//! strategies and only then gives up with `MalformedResponse`.

use serde::de::DeserializeOwned;

use crate::error::OracleError;

/// Parse `raw` into `T`, trying each recovery strategy in turn:
///
/// 1. Direct `serde_json` deserialization
/// 2. Extract JSON from a markdown code block
/// 3. Strip trailing commas and retry
/// 4. Extract from code block then strip commas
/// 5. Take the outermost `{ ... }` span and strip commas
///
/// # Errors
///
/// Returns [`OracleError::MalformedResponse`] if every strategy fails.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    let trimmed = raw.trim();

    // Strategy 1: direct parse
    if let Ok(parsed) = serde_json::from_str::<T>(trimmed) {
        return Ok(parsed);
    }

    // Strategy 2: extract from markdown code block
    let fenced = extract_json_from_codeblock(trimmed);
    if let Some(json_str) = fenced
        && let Ok(parsed) = serde_json::from_str::<T>(json_str)
    {
        return Ok(parsed);
    }

    // Strategy 3: strip trailing commas and retry
    if let Ok(parsed) = serde_json::from_str::<T>(&strip_trailing_commas(trimmed)) {
        return Ok(parsed);
    }

    // Strategy 4: extract from code block then strip commas
    if let Some(json_str) = fenced
        && let Ok(parsed) = serde_json::from_str::<T>(&strip_trailing_commas(json_str))
    {
        return Ok(parsed);
    }

    // Strategy 5: outermost braces, for JSON embedded in prose
    if let Some(json_str) = extract_object_span(trimmed)
        && let Ok(parsed) = serde_json::from_str::<T>(&strip_trailing_commas(json_str))
    {
        return Ok(parsed);
    }

    Err(OracleError::MalformedResponse(format!(
        "all parse strategies failed for: {}",
        truncate(trimmed, 200)
    )))
}

/// Extract the contents of the first markdown code block (```json or ```).
pub fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = text.get(start.saturating_add(3)..)?;
    // Skip an optional language tag on the fence line.
    let body_start = after_fence.find('\n').map_or(0, |i| i.saturating_add(1));
    let body = after_fence.get(body_start..)?;
    let end = body.find("```")?;
    body.get(..end).map(str::trim)
}

/// Remove commas that directly precede a closing `}` or `]`.
pub fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_comma = false;
    let mut pending_ws = String::new();
    for ch in text.chars() {
        if pending_comma {
            if ch.is_whitespace() {
                pending_ws.push(ch);
                continue;
            }
            if ch != '}' && ch != ']' {
                out.push(',');
            }
            out.push_str(&pending_ws);
            pending_ws.clear();
            pending_comma = false;
        }
        if ch == ',' {
            pending_comma = true;
        } else {
            out.push(ch);
        }
    }
    if pending_comma {
        out.push(',');
    }
    out.push_str(&pending_ws);
    out
}

/// The span from the first `{` to the last `}`.
fn extract_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ActionReply {
        action_detected: bool,
        #[serde(default)]
        description: String,
    }

    #[test]
    fn parses_clean_json() {
        let parsed: Result<ActionReply, _> = parse_json(r#"{"action_detected": true, "description": "waves"}"#);
        assert_eq!(
            parsed.ok(),
            Some(ActionReply {
                action_detected: true,
                description: "waves".to_owned()
            })
        );
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Here you go:\n```json\n{\"action_detected\": false}\n```";
        let parsed: Result<ActionReply, _> = parse_json(raw);
        assert_eq!(parsed.map(|p| p.action_detected).ok(), Some(false));
    }

    #[test]
    fn parses_trailing_commas() {
        let raw = "{\"action_detected\": true, \"description\": \"bows\",\n}";
        let parsed: Result<ActionReply, _> = parse_json(raw);
        assert_eq!(parsed.map(|p| p.description).ok().as_deref(), Some("bows"));
    }

    #[test]
    fn parses_json_inside_prose() {
        let raw = "Sure! {\"action_detected\": true, \"description\": \"shoves\",} Hope that helps.";
        let parsed: Result<ActionReply, _> = parse_json(raw);
        assert_eq!(parsed.map(|p| p.action_detected).ok(), Some(true));
    }

    #[test]
    fn garbage_is_malformed() {
        let parsed: Result<ActionReply, _> = parse_json("I cannot answer that.");
        assert!(matches!(parsed, Err(OracleError::MalformedResponse(_))));
    }

    #[test]
    fn strip_keeps_inner_commas() {
        assert_eq!(strip_trailing_commas("[1, 2, ]"), "[1, 2 ]");
        assert_eq!(strip_trailing_commas("a, b"), "a, b");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
