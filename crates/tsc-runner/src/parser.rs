//! tsc output parser.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// A diagnostic reported by the compiler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TscDiagnostic {
    /// Absolute path of the file the diagnostic belongs to, if any.
    pub file: Option<Utf8PathBuf>,
    /// Start position, present whenever `file` is.
    pub start: Option<DiagnosticPosition>,
    /// The diagnostic category.
    pub category: DiagnosticCategory,
    /// The numeric TypeScript code (`2322` for `TS2322`).
    pub code: u32,
    /// The message. Continuation lines of a message chain follow the head,
    /// separated by newlines and keeping their indentation.
    pub message: String,
}

impl TscDiagnostic {
    /// Returns the first line of the message chain.
    pub fn head_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Returns the code in `TS1234` form.
    pub fn code_label(&self) -> String {
        format!("TS{}", self.code)
    }
}

/// A position in a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticPosition {
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
}

/// Diagnostic category as printed by the compiler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
    Message,
}

impl DiagnosticCategory {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "suggestion" => Some(Self::Suggestion),
            "message" => Some(Self::Message),
            _ => None,
        }
    }

    /// Returns the lowercase name used by the compiler.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Suggestion => "suggestion",
            Self::Message => "message",
        }
    }
}

/// Parsed compiler output.
#[derive(Debug, Default)]
pub struct TscOutput {
    /// The diagnostics, in the order the compiler printed them.
    pub diagnostics: Vec<TscDiagnostic>,
}

/// Parses `tsc --pretty false` output into diagnostics.
///
/// Relative file paths are resolved against `project_root`, which must be the
/// working directory the compiler ran in.
pub fn parse_tsc_output(output: &str, project_root: &Utf8Path) -> TscOutput {
    let mut diagnostics: Vec<TscDiagnostic> = Vec::new();
    let mut in_diagnostic = false;

    for raw_line in output.lines() {
        let line = raw_line.trim_end_matches('\r');

        if line.starts_with([' ', '\t']) {
            if in_diagnostic {
                if let Some(last) = diagnostics.last_mut() {
                    last.message.push('\n');
                    last.message.push_str(line.trim_end());
                }
            }
            continue;
        }

        match parse_diagnostic_line(line, project_root) {
            Some(diag) => {
                diagnostics.push(diag);
                in_diagnostic = true;
            }
            None => in_diagnostic = false,
        }
    }

    TscOutput { diagnostics }
}

/// Parses a single diagnostic head line.
fn parse_diagnostic_line(line: &str, project_root: &Utf8Path) -> Option<TscDiagnostic> {
    parse_paren_location(line, project_root)
        .or_else(|| parse_dash_location(line, project_root))
        .or_else(|| parse_global(line))
}

/// Format: `file.ts(line,col): error TS1234: message`
fn parse_paren_location(line: &str, project_root: &Utf8Path) -> Option<TscDiagnostic> {
    for (idx, _) in line.match_indices("): ") {
        let before = &line[..idx];
        let Some(open) = before.rfind('(') else {
            continue;
        };
        let Some((line_str, col_str)) = before[open + 1..].split_once(',') else {
            continue;
        };
        let (Ok(line_num), Ok(column)) = (line_str.parse::<u32>(), col_str.parse::<u32>()) else {
            continue;
        };
        let file_path = &before[..open];
        if file_path.is_empty() {
            continue;
        }

        let (category, code, message) = parse_category_and_code(&line[idx + 3..])?;
        return Some(TscDiagnostic {
            file: Some(resolve_path(file_path, project_root)),
            start: Some(DiagnosticPosition {
                line: line_num,
                column,
            }),
            category,
            code,
            message,
        });
    }

    None
}

/// Format: `file.ts:line:column - error TS1234: message`
fn parse_dash_location(line: &str, project_root: &Utf8Path) -> Option<TscDiagnostic> {
    let (location, message_part) = line.split_once(" - ")?;

    // Parse location (file:line:column)
    let loc_parts: Vec<&str> = location.rsplitn(3, ':').collect();
    if loc_parts.len() < 3 {
        return None;
    }

    let column: u32 = loc_parts[0].parse().ok()?;
    let line_num: u32 = loc_parts[1].parse().ok()?;
    let file_path = loc_parts[2];

    let (category, code, message) = parse_category_and_code(message_part)?;
    Some(TscDiagnostic {
        file: Some(resolve_path(file_path, project_root)),
        start: Some(DiagnosticPosition {
            line: line_num,
            column,
        }),
        category,
        code,
        message,
    })
}

/// Format: `error TS5023: message`
fn parse_global(line: &str) -> Option<TscDiagnostic> {
    let (category, code, message) = parse_category_and_code(line)?;
    Some(TscDiagnostic {
        file: None,
        start: None,
        category,
        code,
        message,
    })
}

/// Parses `error TS1234: message`.
fn parse_category_and_code(text: &str) -> Option<(DiagnosticCategory, u32, String)> {
    let (word, rest) = text.split_once(' ')?;
    let category = DiagnosticCategory::parse(word)?;

    let rest = rest.trim_start().strip_prefix("TS")?;
    let (code, message) = rest.split_once(':')?;
    let code = code.trim().parse().ok()?;

    Some((category, code, message.trim().to_string()))
}

/// Resolves a path printed by the compiler to a normalized absolute path.
fn resolve_path(raw: &str, project_root: &Utf8Path) -> Utf8PathBuf {
    let path = Utf8Path::new(raw);
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&project_root.join(path))
    }
}

/// Lexically removes `.` and `..` components.
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}
