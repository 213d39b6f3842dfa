//! Glob expansion and path matching.

use crate::config::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use tracing::debug;
use tsc_runner::normalize_path;
use walkdir::WalkDir;

/// Extensions of files handed to the compiler.
const CHECKABLE_EXTENSIONS: &[&str] = &[".ts", ".tsx"];

/// Characters that make a path component a glob.
const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '!'];

/// A compiled list of root-relative glob patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    /// Normalized patterns, indexed like the globs in `set`.
    patterns: Vec<String>,
    set: GlobSet,
}

impl PatternSet {
    /// Compiles `patterns`.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(compile(pattern)?);
        }
        let set = builder.build().map_err(|e| ConfigError::InvalidGlob {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            patterns: patterns
                .iter()
                .map(|pattern| normalize_pattern(pattern).to_string())
                .collect(),
            set,
        })
    }

    /// Returns whether no patterns were given.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns whether a root-relative path matches any pattern.
    pub fn is_match(&self, relative: &str) -> bool {
        self.set
            .matches(relative)
            .into_iter()
            .any(|index| dot_segments_spelled(&self.patterns[index], relative))
    }
}

/// Drops the `./` or `/` prefix; patterns are always rooted at the workspace.
fn normalize_pattern(pattern: &str) -> &str {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern.trim_start_matches('/')
}

/// Compiles a pattern so `*` stops at `/` and `**` spans directories.
fn compile(pattern: &str) -> Result<Glob, ConfigError> {
    GlobBuilder::new(normalize_pattern(pattern))
        .literal_separator(true)
        .build()
        .map_err(|e| ConfigError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.kind().to_string(),
        })
}

/// Returns whether every dot-prefixed segment of `relative` is matched by a
/// dot-prefixed segment of `pattern`. Wildcards never match dotfiles.
fn dot_segments_spelled(pattern: &str, relative: &str) -> bool {
    let dotted: Vec<&str> = pattern
        .split('/')
        .filter(|segment| segment.starts_with('.'))
        .collect();

    relative
        .split('/')
        .filter(|segment| segment.starts_with('.'))
        .all(|segment| {
            dotted
                .iter()
                .any(|spelled| *spelled == segment || spelled.contains(GLOB_META))
        })
}

/// Returns the leading components of a pattern that contain no glob syntax.
fn literal_prefix(pattern: &str) -> Utf8PathBuf {
    pattern
        .split('/')
        .take_while(|component| !component.contains(GLOB_META))
        .filter(|component| !component.is_empty())
        .collect()
}

/// Returns whether the compiler should be given this file.
pub fn is_checkable_file(path: &Utf8Path) -> bool {
    let name = path.file_name().unwrap_or("");
    CHECKABLE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Returns `path` relative to `root` with `/` separators.
///
/// Paths outside `root` get leading `..` segments. Paths sharing no prefix
/// with `root` (another drive) stay absolute.
pub fn relative_path(path: &Utf8Path, root: &Utf8Path) -> String {
    if let Ok(relative) = path.strip_prefix(root) {
        return relative.as_str().replace('\\', "/");
    }

    let path_parts: Vec<_> = path.components().collect();
    let root_parts: Vec<_> = root.components().collect();
    let common = path_parts
        .iter()
        .zip(&root_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path.as_str().replace('\\', "/");
    }

    let mut parts = vec![".."; root_parts.len() - common];
    parts.extend(path_parts[common..].iter().map(|c| c.as_str()));
    parts.join("/")
}

/// Resolves `path` against `base` unless it is already absolute.
pub fn absolute_from(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    if path.is_relative() {
        normalize_path(&base.join(path))
    } else {
        path.to_owned()
    }
}

/// Expands root-relative glob patterns into absolute, sorted, de-duplicated
/// paths of checkable files.
pub fn expand_patterns(
    root: &Utf8Path,
    patterns: &[String],
) -> Result<BTreeSet<Utf8PathBuf>, ConfigError> {
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let normalized = normalize_pattern(pattern);
        let matcher: GlobMatcher = compile(pattern)?.compile_matcher();
        let base = literal_prefix(normalized);
        let walk_root = root.join(&base);
        if !walk_root.exists() {
            debug!(pattern = %pattern, "pattern base does not exist");
            continue;
        }

        let before = files.len();
        for entry in WalkDir::new(&walk_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
                continue;
            };
            if !is_checkable_file(&path) {
                continue;
            }
            // Match on the pattern's own spelling of the path so `../` bases work
            let suffix = path.strip_prefix(&walk_root).unwrap_or(&path);
            let candidate = if suffix.as_str().is_empty() {
                base.as_str().to_string()
            } else {
                base.join(suffix).as_str().replace('\\', "/")
            };
            if matcher.is_match(candidate.as_str())
                && dot_segments_spelled(normalized, &candidate)
            {
                files.insert(normalize_path(&path));
            }
        }
        debug!(pattern = %pattern, matched = files.len() - before, "expanded pattern");
    }

    Ok(files)
}
