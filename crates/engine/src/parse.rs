//! Response parser — turns raw model text into an [`AssistantResponse`].
//!
//! The model is asked for bare JSON but often wraps it in a code fence or a
//! sentence of prose. The first JSON object found is taken and then checked
//! strictly against the shape the asking phase expects. Nothing is coerced.

use infrared_core::{AssistantResponse, Error, FileCreateOp, FileEditOp, Phase, Result, Verdict};
use serde_json::{Map, Value};

/// Keys each phase may carry. Anything else means the model mixed shapes.
const PLAN_FIELDS: &[&str] = &["assistant_reply", "files_to_create", "files_to_edit"];
const IMPLEMENTATION_FIELDS: &[&str] = &["assistant_reply", "files_to_create", "files_to_edit"];
const REVIEW_FIELDS: &[&str] = &[
    "analysis",
    "explanation",
    "output",
    "files_to_create",
    "files_to_edit",
];

fn malformed(phase: Phase, detail: impl Into<String>) -> Error {
    Error::MalformedResponse {
        phase,
        detail: detail.into(),
    }
}

/// Parse `raw` as the response to a `phase` request.
pub fn parse(raw: &str, phase: Phase) -> Result<AssistantResponse> {
    let object = extract_object(raw).ok_or_else(|| {
        malformed(phase, "no JSON object found in response")
    })?;

    match phase {
        Phase::Planning => parse_plan(&object),
        Phase::Implementing => parse_implementation(&object),
        Phase::Reviewing => parse_review(&object),
        other => Err(malformed(other, "phase does not accept model responses")),
    }
}

/// Find the JSON object in `raw`: whole text, fenced block, or the first
/// balanced `{...}` that parses.
pub fn extract_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }

    if let Some(body) = fenced_block(trimmed)
        && let Ok(Value::Object(map)) = serde_json::from_str(body.trim())
    {
        return Some(map);
    }

    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&trimmed[start..])
            && let Ok(Value::Object(map)) = serde_json::from_str(&trimmed[start..start + end])
        {
            return Some(map);
        }
        search_from = start + 1;
    }
    None
}

/// Body of the first ``` fence, with an optional language tag dropped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Length of the balanced object starting at `text[0] == '{'`, skipping
/// braces inside string literals.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    phase: Phase,
) -> Result<Option<String>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(malformed(
            phase,
            format!("'{field}' must be a string, got {}", type_name(other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn file_array<T: serde::de::DeserializeOwned>(
    object: &Map<String, Value>,
    field: &str,
    phase: Phase,
) -> Result<Vec<T>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())
            .map_err(|e| malformed(phase, format!("invalid '{field}': {e}"))),
        Some(other) => Err(malformed(
            phase,
            format!("'{field}' must be an array, got {}", type_name(other)),
        )),
    }
}

fn reject_unknown_fields(
    object: &Map<String, Value>,
    allowed: &[&str],
    phase: Phase,
) -> Result<()> {
    match object.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(malformed(phase, format!("unexpected field '{key}'"))),
        None => Ok(()),
    }
}

fn has_file_ops(object: &Map<String, Value>) -> bool {
    ["files_to_create", "files_to_edit"].iter().any(|field| {
        match object.get(*field) {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    })
}

fn parse_plan(object: &Map<String, Value>) -> Result<AssistantResponse> {
    let phase = Phase::Planning;
    if object.contains_key("output") {
        return Err(malformed(phase, "plan must not carry a review verdict"));
    }
    if has_file_ops(object) {
        return Err(malformed(phase, "plan must not propose file operations"));
    }
    reject_unknown_fields(object, PLAN_FIELDS, phase)?;
    let reply_text = optional_string(object, "assistant_reply", phase)?
        .ok_or_else(|| malformed(phase, "missing 'assistant_reply'"))?;
    Ok(AssistantResponse::Plan { reply_text })
}

fn parse_implementation(object: &Map<String, Value>) -> Result<AssistantResponse> {
    let phase = Phase::Implementing;
    if object.contains_key("output") {
        return Err(malformed(phase, "implementation must not carry a review verdict"));
    }
    reject_unknown_fields(object, IMPLEMENTATION_FIELDS, phase)?;
    let reply_text = optional_string(object, "assistant_reply", phase)?.unwrap_or_default();
    let creates: Vec<FileCreateOp> = file_array(object, "files_to_create", phase)?;
    let edits: Vec<FileEditOp> = file_array(object, "files_to_edit", phase)?;
    Ok(AssistantResponse::Implementation {
        reply_text,
        creates,
        edits,
    })
}

fn parse_review(object: &Map<String, Value>) -> Result<AssistantResponse> {
    let phase = Phase::Reviewing;
    if has_file_ops(object) {
        return Err(malformed(phase, "review must not propose file operations"));
    }
    reject_unknown_fields(object, REVIEW_FIELDS, phase)?;
    let output = optional_string(object, "output", phase)?
        .ok_or_else(|| malformed(phase, "missing 'output'"))?;
    let verdict = Verdict::from_wire(&output)
        .ok_or_else(|| malformed(phase, format!("unknown verdict '{output}'")))?;
    Ok(AssistantResponse::Review {
        verdict,
        analysis: optional_string(object, "analysis", phase)?,
        explanation: optional_string(object, "explanation", phase)?,
    })
}
