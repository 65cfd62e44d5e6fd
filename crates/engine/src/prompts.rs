//! System prompts and the text framing each phase sends to the model.

use infrared_core::FileOp;
use serde_json::json;

pub const PLANNING_PROMPT: &str = r#"You are a senior software engineer writing an implementation plan.
Analyze the request and the provided files, then produce a step-by-step plan that the implementation phase will follow.

Respond ONLY with a JSON object of this exact shape:
{
  "assistant_reply": "the plan, as markdown text"
}

The plan should:
1. Break the work into ordered implementation steps
2. Name every file and component that will be created or changed
3. Call out edge cases and failure conditions
4. Note security and performance concerns
5. Describe how the change will be validated

Rules:
- assistant_reply MUST be a single JSON string; encode line breaks as \n
- Do NOT include files_to_create, files_to_edit, or any other field
- Escape every double quote inside the text
"#;

pub const IMPLEMENTATION_PROMPT: &str = r#"You are a senior software engineer working directly on the user's files.
You read files the user has shared, create new files, and edit existing ones with precise snippet replacement.

Respond ONLY with a JSON object of this shape, with no text before or after it:
{
  "assistant_reply": "what you changed and why",
  "files_to_create": [
    { "path": "relative/path/to/new/file", "content": "complete file content" }
  ],
  "files_to_edit": [
    {
      "path": "relative/path/to/existing/file",
      "original_snippet": "exact text to replace",
      "new_snippet": "replacement text"
    }
  ]
}

Editing rules:
- Paths are relative to the workspace root. Never use absolute paths, "..", or "~".
- original_snippet must appear EXACTLY ONCE in the current file. Include enough surrounding lines to make it unique.
- Edits in one response are applied in order; a later edit sees the result of earlier ones.
- Keep indentation intact in new_snippet.
- Prefer targeted edits over rewriting a whole existing file.
- Omit files_to_create / files_to_edit when no file changes are needed.

If review feedback is present in the conversation, address every point it raises.
If a technical stack document is present, follow its versions and conventions.
"#;

pub const REVIEW_PROMPT: &str = r#"You are a senior software engineer reviewing proposed code changes.
Decide whether the changes correctly and completely solve the request without breaking anything.

The changes arrive as JSON:
{
  "total_new_files": N,
  "total_edits": M,
  "changes": [
    { "change_type": "new_file", "path": "...", "content": "..." },
    { "change_type": "file_edit", "path": "...", "original": "replaced text", "new": "replacement text" }
  ]
}

Evaluate:
1. COMPLETENESS: the request is fully addressed
2. CORRECTNESS: no syntax, type, or logic errors
3. FOCUS: no unrelated modifications
4. QUALITY: matches the existing code's conventions
5. SAFETY: input validation and error handling are in place

Respond ONLY with a JSON object of this exact shape:
{
  "analysis": "one paragraph describing the changes and their problems",
  "explanation": "one or two sentences justifying the verdict",
  "output": "CORRECT | NEED_CHANGES | INCORRECT | UNNECESSARY"
}

Verdicts:
- CORRECT: the changes solve the request with no issues
- NEED_CHANGES: mostly right, specific fixes are required
- INCORRECT: too broken to repair, or does not address the request
- UNNECESSARY: scope creep or unrelated modifications

Do NOT include files_to_create or files_to_edit.
"#;

/// Appended when the implementation context does not already end on a user
/// turn.
pub const IMPLEMENTATION_NUDGE: &str =
    "Implement the request above now. Respond with the JSON object only.";

const FILE_ENTRY_PREFIX: &str = "Content of file '";

/// The text of a file entry in the conversation.
pub fn file_entry(path: &str, content: &str) -> String {
    format!("{FILE_ENTRY_PREFIX}{path}':\n\n{content}")
}

/// Recover the file body from a rendered file entry.
pub fn file_entry_body<'a>(path: &str, rendered: &'a str) -> Option<&'a str> {
    rendered
        .strip_prefix(FILE_ENTRY_PREFIX)?
        .strip_prefix(path)?
        .strip_prefix("':\n\n")
}

/// Review feedback carried into the next implementation attempt.
pub fn feedback(attempt: u32, analysis: Option<&str>, explanation: Option<&str>) -> String {
    format!(
        "Code Review Feedback (Attempt {attempt}):\nAnalysis: {}\nExplanation: {}",
        analysis.unwrap_or("No analysis provided"),
        explanation.unwrap_or("No explanation provided"),
    )
}

/// System note recorded after an op lands on disk.
pub fn operation_note(op: &FileOp) -> String {
    match op {
        FileOp::Create(c) => format!("File operation: Created/updated file at '{}'", c.path),
        FileOp::Edit(e) => format!("File operation: Applied diff edit to '{}'", e.path),
    }
}

/// The JSON change summary the reviewer sees.
pub fn change_summary(ops: &[FileOp]) -> serde_json::Value {
    let mut total_new_files = 0;
    let mut total_edits = 0;
    let changes: Vec<_> = ops
        .iter()
        .map(|op| match op {
            FileOp::Create(c) => {
                total_new_files += 1;
                json!({ "change_type": op.kind(), "path": c.path, "content": c.content })
            }
            FileOp::Edit(e) => {
                total_edits += 1;
                json!({
                    "change_type": op.kind(),
                    "path": e.path,
                    "original": e.original_snippet,
                    "new": e.new_snippet,
                })
            }
        })
        .collect();

    json!({
        "total_new_files": total_new_files,
        "total_edits": total_edits,
        "changes": changes,
    })
}

/// The user turn of a review request.
pub fn review_request(
    file_entries: &[&str],
    plan: Option<&str>,
    ops: &[FileOp],
) -> Result<String, serde_json::Error> {
    let summary = serde_json::to_string_pretty(&change_summary(ops))?;
    let mut out = String::from("Review the following proposed changes.\n\n");

    out.push_str("EXISTING FILE CONTEXT:\n");
    if file_entries.is_empty() {
        out.push_str("(no files in context)\n");
    }
    for entry in file_entries {
        out.push_str(entry);
        out.push_str("\n\n");
    }

    if let Some(plan) = plan {
        out.push_str("\nIMPLEMENTATION PLAN:\n");
        out.push_str(plan);
        out.push('\n');
    }

    out.push_str("\nCOMPLETE CHANGES SUMMARY:\n");
    out.push_str(&summary);
    out.push_str(
        "\n\nCheck that the changes solve the request, introduce no bugs or security issues, \
         and are all necessary. Answer with the JSON verdict.",
    );
    Ok(out)
}
