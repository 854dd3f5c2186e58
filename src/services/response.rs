//! Recovers a JSON object from a model reply.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

fn strip_trailing_commas(text: &str) -> String {
    trailing_comma_re().replace_all(text, "$1").into_owned()
}

/// Tries, in order: whole reply, fenced block (with comma repair), and the
/// first `{` up to its balanced end or with missing closers appended.
pub fn extract_json(reply: &str) -> Result<Value, String> {
    let cleaned = think_re().replace_all(reply, "");
    let text = cleaned.trim();

    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Ok(v);
    }

    if let Some(caps) = fence_re().captures(text) {
        let block = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if let Ok(v) = serde_json::from_str::<Value>(block) {
            return Ok(v);
        }
        if let Ok(v) = serde_json::from_str::<Value>(&strip_trailing_commas(block)) {
            return Ok(v);
        }
    }

    if let Some(start) = text.find('{') {
        let candidate = &text[start..];
        let json = match balanced_end(candidate) {
            Some(end) => candidate[..=end].to_string(),
            None => close_unbalanced(candidate),
        };
        if let Ok(v) = serde_json::from_str::<Value>(&strip_trailing_commas(&json)) {
            return Ok(v);
        }
    }

    let snippet: String = text.chars().take(100).collect();
    Err(format!("no valid JSON in response: {snippet}..."))
}

/// Byte index of the last bracket that returns depth to zero.
fn balanced_end(text: &str) -> Option<usize> {
    let mut in_str = false;
    let mut escape = false;
    let mut depth = 0usize;
    let mut last_end = None;

    for (i, ch) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            '"' => in_str = !in_str,
            '{' | '[' if !in_str => depth += 1,
            '}' | ']' if !in_str => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    last_end = Some(i);
                }
            }
            _ => {}
        }
    }
    last_end
}

fn close_unbalanced(text: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_str = false;
    let mut escape = false;

    for ch in text.chars() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            '"' => in_str = !in_str,
            '{' | '[' if !in_str => stack.push(ch),
            '}' | ']' if !in_str => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_str {
        out.push('"');
    }
    for open in stack.iter().rev() {
        out.push(if *open == '{' { '}' } else { ']' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json() {
        assert_eq!(extract_json(r#"{"a": "甲"}"#).unwrap(), json!({"a": "甲"}));
    }

    #[test]
    fn fenced_block_with_trailing_comma() {
        let reply = "Here you go:\n```json\n{\"a\": {\"title\": \"标题\",},}\n```\nDone.";
        assert_eq!(extract_json(reply).unwrap(), json!({"a": {"title": "标题"}}));
    }

    #[test]
    fn prose_around_balanced_object() {
        let reply = "结果如下 {\"n\": {\"inputs\": {\"x\": \"输入}\"}}} 以上";
        assert_eq!(
            extract_json(reply).unwrap(),
            json!({"n": {"inputs": {"x": "输入}"}}})
        );
    }

    #[test]
    fn truncated_reply_is_closed() {
        let reply = r#"{"n": {"title": "节点", "inputs": {"x": "输入""#;
        assert_eq!(
            extract_json(reply).unwrap(),
            json!({"n": {"title": "节点", "inputs": {"x": "输入"}}})
        );
    }

    #[test]
    fn reasoning_block_is_ignored() {
        let reply = "<think>{not json}</think>{\"a\": \"甲\"}";
        assert_eq!(extract_json(reply).unwrap(), json!({"a": "甲"}));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(extract_json("sorry, I cannot help").is_err());
    }
}
