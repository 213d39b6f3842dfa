//! Output formatting.

use crate::cli::OutputFormat;
use crate::paths::relative_path;
use camino::{Utf8Path, Utf8PathBuf};
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use tsc_runner::{DiagnosticCategory, TscDiagnostic};

/// A formatted diagnostic for JSON output.
#[derive(Debug, Serialize)]
pub struct FormattedDiagnostic {
    /// The diagnostic type (Error, Warning, etc.).
    #[serde(rename = "type")]
    pub diagnostic_type: String,
    /// The workspace-relative file path, if the diagnostic has one.
    pub filename: Option<String>,
    /// The start position.
    pub start: Option<Position>,
    /// The message, including any chained lines.
    pub message: String,
    /// The diagnostic code (`TS2322`).
    pub code: String,
}

/// A position in the source.
#[derive(Debug, Serialize)]
pub struct Position {
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
}

/// Formats diagnostics for output.
pub struct Formatter {
    format: OutputFormat,
    root: Utf8PathBuf,
}

impl Formatter {
    /// Creates a new formatter printing paths relative to `root`.
    pub fn new(format: OutputFormat, root: &Utf8Path) -> Self {
        Self {
            format,
            root: root.to_owned(),
        }
    }

    /// Formats a collection of diagnostics.
    pub fn format(&self, diagnostics: &[TscDiagnostic]) -> String {
        match self.format {
            OutputFormat::Human => self.format_human(diagnostics, false),
            OutputFormat::HumanVerbose => self.format_human(diagnostics, true),
            OutputFormat::Json => self.format_json(diagnostics),
            OutputFormat::Machine => self.format_machine(diagnostics),
        }
    }

    fn display_path(&self, file: &Utf8Path) -> String {
        relative_path(file, &self.root)
    }

    /// Formats as human-readable output, optionally with code frames.
    fn format_human(&self, diagnostics: &[TscDiagnostic], code_frames: bool) -> String {
        let mut sources: HashMap<&Utf8Path, Option<Vec<String>>> = HashMap::new();
        let mut output = String::new();

        for diag in diagnostics {
            let header = format!(
                "{} {}: {}",
                colored_category(diag.category),
                diag.code_label().bright_black(),
                diag.message
            );

            match (&diag.file, diag.start) {
                (Some(file), Some(start)) => {
                    output.push_str(&format!(
                        "{}:{}:{} - {}\n",
                        self.display_path(file).cyan(),
                        start.line.to_string().yellow(),
                        start.column.to_string().yellow(),
                        header
                    ));

                    if code_frames {
                        let lines = sources
                            .entry(file.as_path())
                            .or_insert_with(|| read_lines(file));
                        if let Some(lines) = lines.as_deref() {
                            output.push_str(&code_frame(
                                lines,
                                start.line,
                                start.column,
                                diag.category,
                            ));
                        }
                    }
                }
                (Some(file), None) => {
                    output.push_str(&format!("{} - {}\n", self.display_path(file).cyan(), header));
                }
                (None, _) => {
                    output.push_str(&header);
                    output.push('\n');
                }
            }

            output.push('\n');
        }

        output
    }

    /// Formats as JSON output.
    fn format_json(&self, diagnostics: &[TscDiagnostic]) -> String {
        let formatted = self.format_json_diagnostics(diagnostics);
        serde_json::to_string_pretty(&formatted).unwrap_or_else(|_| "[]".to_string())
    }

    /// Formats diagnostics into JSON-ready structs.
    pub fn format_json_diagnostics(
        &self,
        diagnostics: &[TscDiagnostic],
    ) -> Vec<FormattedDiagnostic> {
        diagnostics
            .iter()
            .map(|diag| FormattedDiagnostic {
                diagnostic_type: category_label(diag.category).to_string(),
                filename: diag.file.as_deref().map(|file| self.display_path(file)),
                start: diag.start.map(|start| Position {
                    line: start.line,
                    column: start.column,
                }),
                message: diag.message.clone(),
                code: diag.code_label(),
            })
            .collect()
    }

    /// Formats as machine-readable output.
    fn format_machine(&self, diagnostics: &[TscDiagnostic]) -> String {
        let mut output = String::new();

        for diag in diagnostics {
            let location = match (&diag.file, diag.start) {
                (Some(file), Some(start)) => {
                    format!("{}:{}:{}", self.display_path(file), start.line, start.column)
                }
                (Some(file), None) => self.display_path(file),
                (None, _) => "-".to_string(),
            };
            let message = diag
                .message
                .lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ");

            output.push_str(&format!(
                "{} {} {} ({})\n",
                category_label(diag.category).to_uppercase(),
                location,
                message,
                diag.code_label()
            ));
        }

        output
    }
}

fn category_label(category: DiagnosticCategory) -> &'static str {
    match category {
        DiagnosticCategory::Error => "Error",
        DiagnosticCategory::Warning => "Warning",
        DiagnosticCategory::Suggestion => "Suggestion",
        DiagnosticCategory::Message => "Message",
    }
}

fn colored_category(category: DiagnosticCategory) -> ColoredString {
    let label = category.as_str();
    match category {
        DiagnosticCategory::Error => label.red(),
        DiagnosticCategory::Warning => label.yellow(),
        DiagnosticCategory::Suggestion | DiagnosticCategory::Message => label.blue(),
    }
}

fn read_lines(file: &Utf8Path) -> Option<Vec<String>> {
    let source = fs::read_to_string(file).ok()?;
    Some(source.lines().map(str::to_string).collect())
}

/// Renders the source line at `line` with a `~` underline from `column`.
fn code_frame(lines: &[String], line: u32, column: u32, category: DiagnosticCategory) -> String {
    let Some(text) = (line as usize).checked_sub(1).and_then(|idx| lines.get(idx)) else {
        return String::new();
    };
    let text = text.trim_end_matches('\r');
    let gutter = line.to_string();
    let start = column.saturating_sub(1) as usize;
    let padding: String = text
        .chars()
        .take(start)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    let underline = "~".repeat(underline_width(text, start));
    let underline = match category {
        DiagnosticCategory::Error => underline.red(),
        DiagnosticCategory::Warning => underline.yellow(),
        DiagnosticCategory::Suggestion | DiagnosticCategory::Message => underline.blue(),
    };

    format!(
        "\n  {} | {}\n  {} | {}{}\n",
        gutter.bright_black(),
        text,
        " ".repeat(gutter.len()),
        padding,
        underline
    )
}

/// Width of the identifier-like token starting at `start`, at least 1.
fn underline_width(text: &str, start: usize) -> usize {
    text.chars()
        .skip(start)
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .count()
        .max(1)
}

/// Summary of a check run.
#[derive(Debug, Default)]
pub struct CheckSummary {
    /// Number of root files handed to the compiler.
    pub file_count: usize,
    /// Number of reported errors.
    pub error_count: usize,
    /// Number of reported diagnostics of other categories.
    pub warning_count: usize,
    /// Whether to fail on warnings.
    pub fail_on_warnings: bool,
}

impl CheckSummary {
    /// Counts reported diagnostics by category.
    pub fn from_diagnostics(
        diagnostics: &[TscDiagnostic],
        file_count: usize,
        fail_on_warnings: bool,
    ) -> Self {
        let error_count = diagnostics
            .iter()
            .filter(|d| d.category == DiagnosticCategory::Error)
            .count();
        Self {
            file_count,
            error_count,
            warning_count: diagnostics.len() - error_count,
            fail_on_warnings,
        }
    }

    /// Returns whether the run should exit with a failure code.
    pub fn failed(&self) -> bool {
        self.error_count > 0 || (self.fail_on_warnings && self.warning_count > 0)
    }

    /// Formats the result line.
    pub fn format(&self) -> String {
        if self.error_count == 0 && self.warning_count == 0 {
            return format!(
                "No type errors found in {} {}.",
                self.file_count,
                plural(self.file_count, "file")
            );
        }

        format!(
            "Found {} {} and {} {} in {} {}. Please fix them.",
            self.error_count,
            plural(self.error_count, "error"),
            self.warning_count,
            plural(self.warning_count, "warning"),
            self.file_count,
            plural(self.file_count, "file")
        )
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
