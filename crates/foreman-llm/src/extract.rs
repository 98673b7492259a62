//! Tolerant JSON extraction from free-form model output.
//!
//! Models wrap structured answers in prose and markdown fences. These
//! helpers strip the wrapping and pull out the first balanced JSON region;
//! `None` means the reply carried no usable structure and the caller should
//! take its degraded path.

use regex::Regex;

/// Returns the content of the first markdown code fence, or the input
/// unchanged when there is none.
fn strip_fences(text: &str) -> String {
    if let Ok(re) = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```") {
        if let Some(cap) = re.captures(text) {
            if let Some(inner) = cap.get(1) {
                return inner.as_str().to_string();
            }
        }
    }
    text.to_string()
}

/// Slice of the first balanced `open`..`close` region, honoring JSON string
/// escapes so braces inside strings do not confuse the depth count.
fn balanced_region(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extracts the first JSON array from model output.
pub fn extract_json_array(text: &str) -> Option<Vec<serde_json::Value>> {
    let stripped = strip_fences(text);
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(stripped.trim()) {
        return Some(items);
    }
    let region = balanced_region(&stripped, '[', ']')?;
    match serde_json::from_str(region) {
        Ok(serde_json::Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Extracts the first JSON object from model output.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let stripped = strip_fences(text);
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(stripped.trim()) {
        return Some(map);
    }
    let region = balanced_region(&stripped, '{', '}')?;
    match serde_json::from_str(region) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}
