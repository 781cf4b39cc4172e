//! Code Validator - model-free checks on generated programs.
//!
//! Validating with small, targeted checks plus a retry loop beats
//! inflating the generator's prompt: feedback stays specific and the
//! prompt stays small. The validator never calls the model.

use serde::{Deserialize, Serialize};

use crate::ports::GeneratedProgram;

/// Default constructs a generated program may never contain. The list is
/// policy, injected from configuration.
pub fn default_forbidden_constructs() -> Vec<String> {
    [
        "import subprocess",
        "os.system(",
        "shutil.rmtree(",
        "eval(",
        "exec(",
        "__import__(",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: String,
    pub message: String,
}

/// The validator's verdict plus feedback the generator can act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub feedback: String,
}

pub struct CodeValidator {
    forbidden_constructs: Vec<String>,
    max_retries: u32,
}

impl CodeValidator {
    pub fn new(forbidden_constructs: Vec<String>, max_retries: u32) -> Self {
        Self {
            forbidden_constructs,
            max_retries,
        }
    }

    /// Whether another generation attempt is allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Validates a generated program against the selected tool.
    pub fn validate(&self, program: &GeneratedProgram, entry_point: &str) -> ValidationReport {
        let mut issues = Vec::new();
        let source = program.source.trim();

        if source.is_empty() {
            issues.push(ValidationIssue {
                kind: "structure".into(),
                message: "the program is empty".into(),
            });
        }

        if !source.contains("set_result(") {
            issues.push(ValidationIssue {
                kind: "structure".into(),
                message: "the program must publish its value via set_result(...)".into(),
            });
        }

        if !source.contains(&program.tool_name) && !source.contains(entry_point) {
            issues.push(ValidationIssue {
                kind: "tool_usage".into(),
                message: format!(
                    "the program must import and use the selected tool '{}' ({})",
                    program.tool_name, entry_point
                ),
            });
        }

        if let Some(message) = Self::check_balance(source) {
            issues.push(ValidationIssue {
                kind: "syntax".into(),
                message,
            });
        }

        for construct in &self.forbidden_constructs {
            if source.contains(construct.as_str()) {
                issues.push(ValidationIssue {
                    kind: "forbidden".into(),
                    message: format!("forbidden construct: {}", construct),
                });
            }
        }

        let feedback = Self::build_feedback(&issues);
        ValidationReport {
            valid: issues.is_empty(),
            issues,
            feedback,
        }
    }

    /// Cheap structural parse: brackets must balance outside of string
    /// literals. Catches the truncated-output failure mode of small
    /// models without needing a full parser for the target language.
    fn check_balance(source: &str) -> Option<String> {
        let mut stack = Vec::new();
        let mut in_string: Option<char> = None;
        let mut escaped = false;

        for c in source.chars() {
            if let Some(quote) = in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    in_string = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => in_string = Some(c),
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Some(format!("unbalanced '{}'", c));
                    }
                }
                _ => {}
            }
        }
        if let Some(open) = stack.last() {
            return Some(format!("unclosed '{}'", open));
        }
        None
    }

    fn build_feedback(issues: &[ValidationIssue]) -> String {
        if issues.is_empty() {
            return String::new();
        }
        let mut feedback = String::from("The generated code has issues that need fixing:\n");
        for (i, issue) in issues.iter().enumerate() {
            feedback.push_str(&format!("{}. [{}] {}\n", i + 1, issue.kind, issue.message));
        }
        feedback.push_str(
            "Follow the pattern: import the tool, instantiate it, call execute(), \
             pass the result to set_result().",
        );
        feedback
    }
}
