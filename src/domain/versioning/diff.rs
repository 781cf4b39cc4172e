//! Version comparison: unified diffs and breaking-change detection.
//!
//! Tool sources are small scripts, so a plain line-based LCS diff is
//! sufficient; there is no need for a full patience-diff implementation.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::VersionId;

/// Cached textual comparison between two versions of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub tool_name: String,
    pub from_version_id: VersionId,
    pub to_version_id: VersionId,
    pub unified_diff: String,
    pub lines_added: i32,
    pub lines_removed: i32,
    pub breaking_changes: bool,
    pub breaking_change_details: Vec<String>,
}

impl VersionDiff {
    /// Computes the full comparison between two source texts.
    pub fn compute(
        tool_name: impl Into<String>,
        from_version_id: VersionId,
        to_version_id: VersionId,
        from_code: &str,
        to_code: &str,
    ) -> Self {
        let (unified_diff, lines_added, lines_removed) = unified_diff(from_code, to_code);
        let (breaking_changes, breaking_change_details) =
            detect_breaking_changes(from_code, to_code);
        Self {
            tool_name: tool_name.into(),
            from_version_id,
            to_version_id,
            unified_diff,
            lines_added,
            lines_removed,
            breaking_changes,
            breaking_change_details,
        }
    }
}

/// Line-based unified diff. Returns the text plus added/removed counts.
pub fn unified_diff(from: &str, to: &str) -> (String, i32, i32) {
    let from_lines: Vec<&str> = from.lines().collect();
    let to_lines: Vec<&str> = to.lines().collect();

    // LCS table over lines.
    let n = from_lines.len();
    let m = to_lines.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if from_lines[i] == to_lines[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::from("--- before\n+++ after\n");
    let mut added = 0;
    let mut removed = 0;
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if from_lines[i] == to_lines[j] {
            out.push(' ');
            out.push_str(from_lines[i]);
            out.push('\n');
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push('-');
            out.push_str(from_lines[i]);
            out.push('\n');
            removed += 1;
            i += 1;
        } else {
            out.push('+');
            out.push_str(to_lines[j]);
            out.push('\n');
            added += 1;
            j += 1;
        }
    }
    for line in &from_lines[i..] {
        out.push('-');
        out.push_str(line);
        out.push('\n');
        removed += 1;
    }
    for line in &to_lines[j..] {
        out.push('+');
        out.push_str(line);
        out.push('\n');
        added += 1;
    }

    (out, added, removed)
}

/// A change is breaking iff a top-level function present in `from` is
/// absent in `to`, or the parameter list of the `execute` entry point
/// differs between the two.
pub fn detect_breaking_changes(from: &str, to: &str) -> (bool, Vec<String>) {
    let mut breaking = false;
    let mut details = Vec::new();

    let from_fns = extract_function_names(from);
    let to_fns = extract_function_names(to);

    let removed: Vec<&String> = from_fns.iter().filter(|f| !to_fns.contains(*f)).collect();
    if !removed.is_empty() {
        breaking = true;
        let names: Vec<&str> = removed.iter().map(|s| s.as_str()).collect();
        details.push(format!("Removed functions: {}", names.join(", ")));
    }

    let from_params = extract_params(from, "execute");
    let to_params = extract_params(to, "execute");
    if let (Some(before), Some(after)) = (&from_params, &to_params) {
        if before != after {
            breaking = true;
            details.push(format!(
                "execute() signature changed: ({}) -> ({})",
                before, after
            ));
        }
    }

    (breaking, details)
}

/// Names of `def name(`-style function definitions.
fn extract_function_names(code: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("def ") {
            if let Some(paren) = rest.find('(') {
                let name = rest[..paren].trim();
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// Parameter list of a named function, normalised for whitespace.
fn extract_params(code: &str, function: &str) -> Option<String> {
    let needle = format!("def {}", function);
    for line in code.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&needle) {
            let open = trimmed.find('(')?;
            let close = trimmed[open..].find(')')? + open;
            let params: Vec<&str> = trimmed[open + 1..close]
                .split(',')
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect();
            return Some(params.join(", "));
        }
    }
    None
}
