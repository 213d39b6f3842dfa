//! Diagnostic scoping.

use crate::paths::{relative_path, PatternSet};
use camino::Utf8PathBuf;
use std::collections::BTreeSet;
use tsc_runner::TscDiagnostic;

/// Message suffix shared by all implicit-any diagnostics.
const IMPLICIT_ANY_SUFFIX: &str = "implicitly has an 'any' type.";

/// Decides which compiler diagnostics are reported.
#[derive(Debug, Clone)]
pub struct DiagnosticFilter {
    /// Workspace root that patterns are relative to.
    pub root: Utf8PathBuf,
    /// Files whose diagnostics are reported.
    pub include: PatternSet,
    /// Files whose diagnostics are never reported (exclude, ignore, todo).
    pub exclude: PatternSet,
    /// Files where implicit-any diagnostics are reported. Empty means all.
    pub any_check_include: PatternSet,
    /// Files where implicit-any diagnostics are suppressed.
    pub any_check_exclude: PatternSet,
    /// Codes treated as implicit-any.
    pub implicit_any_codes: BTreeSet<u32>,
}

impl DiagnosticFilter {
    /// Returns whether a diagnostic should be reported.
    ///
    /// Diagnostics without a file are configuration or global errors and are
    /// always reported.
    pub fn is_reported(&self, diagnostic: &TscDiagnostic) -> bool {
        let Some(file) = &diagnostic.file else {
            return true;
        };
        let relative = relative_path(file, &self.root);

        if !self.include.is_match(&relative) || self.exclude.is_match(&relative) {
            return false;
        }

        if self.is_implicit_any(diagnostic) {
            return self.is_any_checked(&relative);
        }

        true
    }

    /// Returns whether a diagnostic comes from `noImplicitAny`.
    pub fn is_implicit_any(&self, diagnostic: &TscDiagnostic) -> bool {
        self.implicit_any_codes.contains(&diagnostic.code)
            || diagnostic.head_message().ends_with(IMPLICIT_ANY_SUFFIX)
    }

    /// Returns whether implicit-any diagnostics apply to a root-relative path.
    fn is_any_checked(&self, relative: &str) -> bool {
        let included = self.any_check_include.is_empty() || self.any_check_include.is_match(relative);
        included && !self.any_check_exclude.is_match(relative)
    }

    /// Keeps the reported diagnostics, preserving order.
    pub fn apply(&self, diagnostics: Vec<TscDiagnostic>) -> Vec<TscDiagnostic> {
        diagnostics
            .into_iter()
            .filter(|diag| self.is_reported(diag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_IMPLICIT_ANY_CODES;
    use tsc_runner::{DiagnosticCategory, DiagnosticPosition};

    fn patterns(list: &[&str]) -> PatternSet {
        let list: Vec<String> = list.iter().map(|p| p.to_string()).collect();
        PatternSet::new(&list).unwrap()
    }

    fn filter(any_include: &[&str], any_exclude: &[&str]) -> DiagnosticFilter {
        DiagnosticFilter {
            root: Utf8PathBuf::from("/work/app"),
            include: patterns(&["src/**/*.ts"]),
            exclude: patterns(&["src/vendor/**", "src/todo/*.ts"]),
            any_check_include: patterns(any_include),
            any_check_exclude: patterns(any_exclude),
            implicit_any_codes: DEFAULT_IMPLICIT_ANY_CODES.iter().copied().collect(),
        }
    }

    fn diag(file: Option<&str>, code: u32, message: &str) -> TscDiagnostic {
        TscDiagnostic {
            file: file.map(Utf8PathBuf::from),
            start: file.map(|_| DiagnosticPosition { line: 1, column: 1 }),
            category: DiagnosticCategory::Error,
            code,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_global_diagnostics_always_reported() {
        let filter = filter(&[], &[]);
        assert!(filter.is_reported(&diag(None, 5023, "Unknown compiler option 'x'.")));
    }

    #[test]
    fn test_include_and_exclude() {
        let filter = filter(&[], &[]);
        let msg = "Cannot find name 'x'.";

        assert!(filter.is_reported(&diag(Some("/work/app/src/a.ts"), 2304, msg)));
        assert!(filter.is_reported(&diag(Some("/work/app/src/deep/b.ts"), 2304, msg)));
        assert!(!filter.is_reported(&diag(Some("/work/app/lib/a.ts"), 2304, msg)));
        assert!(!filter.is_reported(&diag(Some("/work/app/src/vendor/x/y.ts"), 2304, msg)));
        assert!(!filter.is_reported(&diag(Some("/work/app/src/todo/c.ts"), 2304, msg)));
        assert!(!filter.is_reported(&diag(Some("/elsewhere/src/a.ts"), 2304, msg)));
    }

    #[test]
    fn test_implicit_any_without_any_check_sets() {
        let filter = filter(&[], &[]);
        let msg = "Parameter 'x' implicitly has an 'any' type.";
        assert!(filter.is_reported(&diag(Some("/work/app/src/a.ts"), 7006, msg)));
    }

    #[test]
    fn test_implicit_any_scoped_by_any_check_sets() {
        let filter = filter(&["src/strict/**"], &["src/strict/generated/**"]);
        let msg = "Parameter 'x' implicitly has an 'any' type.";

        assert!(filter.is_reported(&diag(Some("/work/app/src/strict/a.ts"), 7006, msg)));
        assert!(!filter.is_reported(&diag(Some("/work/app/src/loose/a.ts"), 7006, msg)));
        assert!(!filter.is_reported(&diag(
            Some("/work/app/src/strict/generated/api.ts"),
            7006,
            msg
        )));
        // Other diagnostics in the same files are unaffected
        assert!(filter.is_reported(&diag(Some("/work/app/src/loose/a.ts"), 2322, "Type mismatch.")));
    }

    #[test]
    fn test_implicit_any_detected_by_message() {
        let mut filter = filter(&[], &["src/**"]);
        filter.implicit_any_codes.clear();

        let by_message = diag(
            Some("/work/app/src/a.ts"),
            9999,
            "Variable 'y' implicitly has an 'any' type.\n  Some follow-up.",
        );
        assert!(filter.is_implicit_any(&by_message));
        assert!(!filter.is_reported(&by_message));
    }

    #[test]
    fn test_apply_preserves_order() {
        let filter = filter(&[], &[]);
        let diagnostics = vec![
            diag(Some("/work/app/src/b.ts"), 2304, "b"),
            diag(Some("/work/app/lib/x.ts"), 2304, "dropped"),
            diag(None, 5023, "global"),
            diag(Some("/work/app/src/a.ts"), 2304, "a"),
        ];

        let kept: Vec<String> = filter
            .apply(diagnostics)
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert_eq!(kept, vec!["b", "global", "a"]);
    }
}
