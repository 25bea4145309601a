use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::Value;

/// Lines shown around a near-miss region.
const NEAR_MISS_CONTEXT: usize = 3;

/// Region of the file that best resembles the searched text, compared line
/// by line with surrounding whitespace ignored.
#[derive(Debug, PartialEq)]
struct NearMiss {
    start: usize,
    matched: usize,
    wanted: usize,
}

fn find_near_miss(file_lines: &[&str], wanted: &[&str]) -> Option<NearMiss> {
    if wanted.is_empty() || file_lines.is_empty() {
        return None;
    }
    let best = (0..file_lines.len())
        .map(|start| {
            let matched = file_lines[start..]
                .iter()
                .zip(wanted)
                .filter(|(have, want)| have.trim() == want.trim())
                .count();
            (start, matched)
        })
        .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best });

    // At least 30% of the wanted lines must line up.
    let threshold = ((wanted.len() as f64 * 0.3).ceil() as usize).max(1);
    (best.1 >= threshold).then_some(NearMiss {
        start: best.0,
        matched: best.1,
        wanted: wanted.len(),
    })
}

fn render_near_miss(file_lines: &[&str], near: &NearMiss) -> String {
    let end = (near.start + near.wanted).min(file_lines.len());
    let from = near.start.saturating_sub(NEAR_MISS_CONTEXT);
    let to = (end + NEAR_MISS_CONTEXT).min(file_lines.len());
    let mut out = format!(
        "Closest match ({}/{} lines) at lines {}-{}:\n",
        near.matched,
        near.wanted,
        near.start + 1,
        end
    );
    for (i, line) in file_lines.iter().enumerate().take(to).skip(from) {
        let marker = if (near.start..end).contains(&i) { "|" } else { " " };
        out.push_str(&format!("{:>6} {} {}\n", i + 1, marker, line));
    }
    out
}

/// 1-based line numbers of every occurrence of `needle`, overlapping ones
/// included.
fn match_lines(content: &str, needle: &str) -> Vec<usize> {
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut lines = Vec::new();
    let mut from = 0;
    while let Some(pos) = content[from..].find(needle) {
        let pos = from + pos;
        lines.push(content[..pos].matches('\n').count() + 1);
        from = pos + step;
    }
    lines
}

/// Replaces one exact, unique region of a file.
#[derive(Debug, Default)]
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace exact text in a file. old_text must occur exactly once; include enough surrounding lines to make it unique."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to edit, relative to the workspace"
                },
                "old_text": {
                    "type": "string",
                    "description": "The exact text to find"
                },
                "new_text": {
                    "type": "string",
                    "description": "The replacement text"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, input: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ToolError> {
        let field = |name: &str| {
            input
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidInput(format!("{} is required", name)))
        };
        let path_arg = field("path")?;
        let old_text = field("old_text")?;
        let new_text = field("new_text")?;

        if old_text.is_empty() {
            return Err(ToolError::InvalidInput("old_text must not be empty".to_string()));
        }

        let path = ctx.workspace.resolve_path(path_arg)?;
        let shown = ctx.workspace.display_path(&path).to_string();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to read {}: {}", shown, e)))?;

        let lines = match_lines(&content, old_text);
        match lines.len() {
            0 => {
                let file_lines: Vec<&str> = content.lines().collect();
                let wanted: Vec<&str> = old_text.lines().collect();
                let hint = match find_near_miss(&file_lines, &wanted) {
                    Some(near) => render_near_miss(&file_lines, &near),
                    None => "No similar region found. Use read_file to check the file.".to_string(),
                };
                return Err(ToolError::ExecutionFailed(format!(
                    "old_text not found in {}. {}",
                    shown, hint
                )));
            }
            1 => {}
            n => {
                let at = lines.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ");
                return Err(ToolError::ExecutionFailed(format!(
                    "old_text found {} times in {} (lines {}). Include more context to make the match unique.",
                    n, shown, at
                )));
            }
        }

        let updated = content.replacen(old_text, new_text, 1);
        tokio::fs::write(&path, &updated)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to write {}: {}", shown, e)))?;

        Ok(Value::String(format!("Edited {} (line {})", shown, lines[0])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;
    use crate::dispatch::ToolRegistry;
    use crate::llm::ScriptedLLM;
    use crate::workspace::Workspace;
    use serde_json::json;
    use tempfile::TempDir;

    async fn edit(tmp: &TempDir, input: Value) -> Result<Value, ToolError> {
        let mut ws = Workspace::bare(tmp.path());
        let registry = ToolRegistry::new();
        let llm = ScriptedLLM::new(vec![]);
        let settings = RuntimeSettings::default();
        let mut ctx = ToolContext::new(&mut ws, &registry, &llm, &settings);
        EditFileTool.execute(input, &mut ctx).await
    }

    #[tokio::test]
    async fn test_unique_replacement() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let out = edit(&tmp, json!({"path": "a.txt", "old_text": "two", "new_text": "2"}))
            .await
            .unwrap();
        assert_eq!(out, json!("Edited a.txt (line 2)"));
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "one\n2\nthree\n");
    }

    #[tokio::test]
    async fn test_multiple_matches_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x = 1\ny = 2\nx = 1\n").unwrap();
        let err = edit(&tmp, json!({"path": "a.txt", "old_text": "x = 1", "new_text": "x = 3"}))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("found 2 times"), "{}", msg);
        assert!(msg.contains("lines 1, 3"), "{}", msg);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(),
            "x = 1\ny = 2\nx = 1\n"
        );
    }

    #[tokio::test]
    async fn test_overlapping_matches_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "aaa\n").unwrap();
        let err = edit(&tmp, json!({"path": "a.txt", "old_text": "aa", "new_text": "b"}))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("found 2 times"), "{}", msg);
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "aaa\n");
    }

    #[test]
    fn test_match_lines_counts_overlaps() {
        assert_eq!(match_lines("aaa", "aa"), vec![1, 1]);
        assert_eq!(match_lines("ab\nabab", "abab"), vec![2]);
        assert_eq!(match_lines("éé\néé", "éé"), vec![1, 2]);
        assert!(match_lines("abc", "x").is_empty());
    }

    #[tokio::test]
    async fn test_missing_match_shows_near_miss() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "fn main() {\n    let a = 1;\n    let b = 2;\n}\n").unwrap();
        let err = edit(
            &tmp,
            json!({"path": "a.rs", "old_text": "let a = 1;\nlet b = 3;", "new_text": "x"}),
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("old_text not found in a.rs"), "{}", msg);
        assert!(msg.contains("Closest match (1/2 lines) at lines 2-3"), "{}", msg);
    }

    #[tokio::test]
    async fn test_missing_file_and_escape() {
        let tmp = TempDir::new().unwrap();
        let err = edit(&tmp, json!({"path": "none.txt", "old_text": "a", "new_text": "b"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read none.txt"));

        let err = edit(&tmp, json!({"path": "../x", "old_text": "a", "new_text": "b"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Path escapes workspace"));
    }

    #[test]
    fn test_find_near_miss_threshold() {
        let file = ["alpha", "beta", "gamma"];
        assert_eq!(
            find_near_miss(&file, &["  beta", "delta"]),
            Some(NearMiss { start: 1, matched: 1, wanted: 2 })
        );
        assert_eq!(find_near_miss(&file, &["zeta", "eta", "theta"]), None);
    }
}
