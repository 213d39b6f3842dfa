//! Configuration loading.

use crate::filter::DiagnosticFilter;
use crate::paths::{expand_patterns, relative_path, PatternSet};
use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::sync::Arc;
use swc_common::SourceMap;
use swc_ecma_ast::{
    AssignExpr, AssignTarget, CallExpr, Decl, ExportDecl, ExportDefaultExpr, Expr, ExprStmt,
    KeyValueProp, Lit, MemberProp, ModuleDecl, ModuleItem, ObjectLit, Pat, Prop, PropName,
    PropOrSpread, SimpleAssignTarget, Stmt, VarDecl,
};
use swc_ecma_parser::{parse_file_as_module, EsSyntax, Syntax, TsSyntax};
use thiserror::Error;
use tracing::{debug, warn};

/// Config file names looked up in the workspace root, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "tscheck.config.json",
    "tscheck.config.js",
    "tscheck.config.mjs",
    "tscheck.config.cjs",
    "tscheck.config.ts",
];

/// Codes of the diagnostics `noImplicitAny` produces.
pub const DEFAULT_IMPLICIT_ANY_CODES: &[u32] = &[
    7005, 7006, 7008, 7010, 7011, 7015, 7016, 7017, 7018, 7019, 7022, 7023, 7024, 7031, 7034,
    7053,
];

/// Nesting limit when following identifiers in JS configs.
const MAX_BINDING_DEPTH: usize = 16;

/// Configuration errors.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// Failed to read a file.
    #[error("failed to read {path}")]
    #[diagnostic(code(ts_check::config::read))]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    #[diagnostic(
        code(ts_check::config::parse),
        help("JS/TS configs must export a literal object via `export default` or `module.exports`")
    )]
    Parse { path: Utf8PathBuf, message: String },

    /// Unknown config file extension.
    #[error("unsupported config file: {0}")]
    #[diagnostic(
        code(ts_check::config::extension),
        help("use one of .json, .js, .mjs, .cjs or .ts")
    )]
    UnsupportedExtension(Utf8PathBuf),

    /// No tsconfig.json at or above the workspace.
    #[error("tsconfig.json not found from {0}")]
    #[diagnostic(
        code(ts_check::config::tsconfig),
        help("create a tsconfig.json or pass --tsconfig")
    )]
    TsconfigNotFound(Utf8PathBuf),

    /// Invalid glob pattern.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    #[diagnostic(code(ts_check::config::glob))]
    InvalidGlob { pattern: String, message: String },
}

/// User configuration read from `tscheck.config.*`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TsCheckConfig {
    /// Global declaration files always handed to the compiler.
    pub types: Vec<String>,
    /// Files whose diagnostics are reported.
    pub include: Vec<String>,
    /// Files whose diagnostics are never reported.
    pub exclude: Vec<String>,
    /// Files carved out of `include`.
    pub ignore: Vec<String>,
    /// Like `ignore`, for files whose types are still to be fixed.
    pub todo: Vec<String>,
    /// Files where implicit-any diagnostics are reported. Empty means all.
    pub any_check_include: Vec<String>,
    /// Files where implicit-any diagnostics are suppressed.
    pub any_check_exclude: Vec<String>,
    /// Codes treated as implicit-any diagnostics.
    pub no_implicit_any_codes: Option<Vec<u32>>,
    /// Raw compiler option overrides.
    #[serde(rename = "__innerConfig")]
    pub inner_config: Map<String, Value>,
}

impl TsCheckConfig {
    /// Returns the first `tscheck.config.*` present in `root`.
    pub fn find(root: &Utf8Path) -> Option<Utf8PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
    }

    /// Loads the config at `explicit`, or the one found in `root`.
    ///
    /// Returns `Ok(None)` when no config exists.
    pub fn load_from_workspace(
        root: &Utf8Path,
        explicit: Option<&Utf8Path>,
    ) -> Result<Option<(Utf8PathBuf, Self)>, ConfigError> {
        let path = match explicit {
            Some(path) if path.is_relative() => root.join(path),
            Some(path) => path.to_owned(),
            None => match Self::find(root) {
                Some(path) => path,
                None => return Ok(None),
            },
        };

        let config = Self::load(&path)?;
        Ok(Some((path, config)))
    }

    /// Loads a config file, dispatching on its extension.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        let value = match path.extension() {
            Some("json") => serde_json::from_str(&strip_jsonc(&content)).map_err(|e| {
                ConfigError::Parse {
                    path: path.to_owned(),
                    message: e.to_string(),
                }
            })?,
            Some("js" | "mjs" | "cjs" | "ts" | "mts" | "cts") => {
                parse_js_config(path, content)?
            }
            _ => return Err(ConfigError::UnsupportedExtension(path.to_owned())),
        };

        debug!(config = %path, "loaded user config");
        serde_json::from_value(value).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            message: e.to_string(),
        })
    }

    /// Returns the implicit-any codes, falling back to the defaults.
    pub fn implicit_any_codes(&self) -> BTreeSet<u32> {
        match &self.no_implicit_any_codes {
            Some(codes) => codes.iter().copied().collect(),
            None => DEFAULT_IMPLICIT_ANY_CODES.iter().copied().collect(),
        }
    }
}

/// Parses a JS or TS config file using SWC and converts the exported object
/// literal to JSON.
fn parse_js_config(path: &Utf8Path, content: String) -> Result<Value, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_owned(),
        message,
    };

    let cm: Arc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        swc_common::FileName::Custom(path.to_string()).into(),
        content,
    );

    let syntax = if matches!(path.extension(), Some("ts" | "mts" | "cts")) {
        Syntax::Typescript(TsSyntax {
            tsx: false,
            ..Default::default()
        })
    } else {
        Syntax::Es(EsSyntax {
            jsx: false,
            ..Default::default()
        })
    };

    let module = parse_file_as_module(
        &fm,
        syntax,
        swc_ecma_ast::EsVersion::Es2022,
        None,
        &mut Vec::new(),
    )
    .map_err(|e| parse_error(format!("{:?}", e)))?;

    let mut bindings: HashMap<String, &Expr> = HashMap::new();
    let mut exported: Option<&Expr> = None;

    for item in &module.body {
        match item {
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(ExportDefaultExpr {
                expr, ..
            })) => exported = Some(expr.as_ref()),
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                decl: Decl::Var(var),
                ..
            }))
            | ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) => collect_bindings(var, &mut bindings),
            ModuleItem::Stmt(Stmt::Expr(ExprStmt { expr, .. })) => {
                if let Expr::Assign(assign) = expr.as_ref() {
                    if is_module_exports(assign) {
                        exported = Some(assign.right.as_ref());
                    }
                }
            }
            _ => {}
        }
    }

    let exported =
        exported.ok_or_else(|| parse_error("no `export default` or `module.exports`".into()))?;
    let object = resolve_object(exported, &bindings, 0)
        .ok_or_else(|| parse_error("exported value is not an object literal".into()))?;

    Ok(object_to_json(object, &bindings, 0))
}

/// Records `const name = <init>` declarations.
fn collect_bindings<'a>(var: &'a VarDecl, bindings: &mut HashMap<String, &'a Expr>) {
    for decl in &var.decls {
        if let (Pat::Ident(binding), Some(init)) = (&decl.name, &decl.init) {
            bindings.insert(binding.id.sym.as_str().to_string(), init.as_ref());
        }
    }
}

/// Matches `module.exports = ...`.
fn is_module_exports(assign: &AssignExpr) -> bool {
    let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
        return false;
    };
    let is_module = matches!(member.obj.as_ref(), Expr::Ident(ident) if ident.sym.as_str() == "module");
    let is_exports =
        matches!(&member.prop, MemberProp::Ident(prop) if prop.sym.as_str() == "exports");
    is_module && is_exports
}

/// Strips wrappers that don't change the value of an expression.
fn unwrap_expr(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(inner) => unwrap_expr(&inner.expr),
        Expr::TsAs(inner) => unwrap_expr(&inner.expr),
        Expr::TsConstAssertion(inner) => unwrap_expr(&inner.expr),
        Expr::TsSatisfies(inner) => unwrap_expr(&inner.expr),
        _ => expr,
    }
}

/// Finds the object literal behind an exported expression.
fn resolve_object<'a>(
    expr: &'a Expr,
    bindings: &HashMap<String, &'a Expr>,
    depth: usize,
) -> Option<&'a ObjectLit> {
    if depth > MAX_BINDING_DEPTH {
        return None;
    }
    match unwrap_expr(expr) {
        Expr::Object(obj) => Some(obj),
        Expr::Ident(ident) => {
            let target: &'a Expr = *bindings.get(ident.sym.as_str())?;
            resolve_object(target, bindings, depth + 1)
        }
        // defineConfig({ ... })
        Expr::Call(CallExpr { args, .. }) => {
            let first = args.first()?;
            resolve_object(&first.expr, bindings, depth + 1)
        }
        _ => None,
    }
}

/// Gets a string value from a PropName.
fn prop_name_str(key: &PropName) -> Option<&str> {
    match key {
        PropName::Ident(ident) => Some(ident.sym.as_str()),
        PropName::Str(s) => str_value(s),
        _ => None,
    }
}

/// Gets a string value from a Str literal.
fn str_value(s: &swc_ecma_ast::Str) -> Option<&str> {
    s.value.as_str()
}

/// Converts an object literal to a JSON object.
fn object_to_json(obj: &ObjectLit, bindings: &HashMap<String, &Expr>, depth: usize) -> Value {
    let mut map = Map::new();

    for prop in &obj.props {
        let PropOrSpread::Prop(prop) = prop else {
            warn!("skipping spread in config object");
            continue;
        };
        let (key, value) = match prop.as_ref() {
            Prop::KeyValue(KeyValueProp { key, value }) => {
                let Some(key) = prop_name_str(key) else {
                    continue;
                };
                (key.to_string(), expr_to_json(value, bindings, depth + 1))
            }
            Prop::Shorthand(ident) => {
                let name = ident.sym.as_str();
                let value = bindings
                    .get(name)
                    .and_then(|expr| expr_to_json(expr, bindings, depth + 1));
                (name.to_string(), value)
            }
            _ => continue,
        };

        match value {
            Some(value) => {
                map.insert(key, value);
            }
            None => warn!(key = %key, "skipping non-literal config value"),
        }
    }

    Value::Object(map)
}

/// Converts a literal expression to JSON.
fn expr_to_json(expr: &Expr, bindings: &HashMap<String, &Expr>, depth: usize) -> Option<Value> {
    if depth > MAX_BINDING_DEPTH {
        return None;
    }
    match unwrap_expr(expr) {
        Expr::Lit(Lit::Str(s)) => str_value(s).map(|s| Value::String(s.to_string())),
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),
        Expr::Lit(Lit::Num(n)) => number_to_json(n.value),
        Expr::Array(arr) => Some(Value::Array(
            arr.elems
                .iter()
                .flatten()
                .filter_map(|elem| expr_to_json(&elem.expr, bindings, depth + 1))
                .collect(),
        )),
        Expr::Object(obj) => Some(object_to_json(obj, bindings, depth)),
        Expr::Ident(ident) => {
            let target = *bindings.get(ident.sym.as_str())?;
            expr_to_json(target, bindings, depth + 1)
        }
        _ => None,
    }
}

fn number_to_json(value: f64) -> Option<Value> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(Value::Number(Number::from(value as i64)))
    } else {
        Number::from_f64(value).map(Value::Number)
    }
}

/// TypeScript project configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsConfig {
    /// Exclude patterns.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl TsConfig {
    /// Loads configuration from a tsconfig.json file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        serde_json::from_str(&strip_jsonc(&content)).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            message: e.to_string(),
        })
    }
}

/// Removes comments and trailing commas from JSON.
fn strip_jsonc(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if c == '"' {
                in_string = false;
            } else if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            }
        } else if c == '"' {
            result.push(c);
            in_string = true;
        } else if c == '/' && chars.peek() == Some(&'/') {
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            while let Some(next) = chars.next() {
                if next == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    break;
                }
            }
        } else if c == ']' || c == '}' {
            // Drop a trailing comma before the closing bracket
            let trimmed_len = result.trim_end().len();
            if result[..trimmed_len].ends_with(',') {
                result.truncate(trimmed_len - 1);
            }
            result.push(c);
        } else {
            result.push(c);
        }
    }

    result
}

/// Configuration resolved against the filesystem for one run.
#[derive(Debug)]
pub struct ResolvedConfig {
    /// The project tsconfig.
    pub tsconfig_path: Utf8PathBuf,
    /// Declaration files from `types`.
    pub type_files: BTreeSet<Utf8PathBuf>,
    /// Files from `include`.
    pub include_files: BTreeSet<Utf8PathBuf>,
    /// Decides which diagnostics are reported.
    pub filter: DiagnosticFilter,
    /// Compiler option overrides from `__innerConfig`.
    pub inner_config: Map<String, Value>,
}

impl ResolvedConfig {
    /// Expands the user config's globs and merges in the tsconfig excludes.
    pub fn resolve(
        root: &Utf8Path,
        tsconfig_path: Utf8PathBuf,
        tsconfig: &TsConfig,
        user: &TsCheckConfig,
    ) -> Result<Self, ConfigError> {
        let exclude: Vec<String> = tsconfig
            .exclude
            .iter()
            .chain(&user.exclude)
            .cloned()
            .collect();
        let report_exclude: Vec<String> = exclude
            .iter()
            .chain(&user.ignore)
            .chain(&user.todo)
            .cloned()
            .collect();
        let report_exclude = PatternSet::new(&report_exclude)?;

        let (type_files, include_files) = rayon::join(
            || expand_patterns(root, &user.types),
            || expand_patterns(root, &user.include),
        );
        let retain = |files: BTreeSet<Utf8PathBuf>| -> BTreeSet<Utf8PathBuf> {
            files
                .into_iter()
                .filter(|file| !report_exclude.is_match(&relative_path(file, root)))
                .collect()
        };
        let type_files = retain(type_files?);
        let include_files = retain(include_files?);
        debug!(
            types = type_files.len(),
            include = include_files.len(),
            "resolved file sets"
        );

        let filter = DiagnosticFilter {
            root: root.to_owned(),
            include: PatternSet::new(&user.include)?,
            exclude: report_exclude,
            any_check_include: PatternSet::new(&user.any_check_include)?,
            any_check_exclude: PatternSet::new(&user.any_check_exclude)?,
            implicit_any_codes: user.implicit_any_codes(),
        };

        Ok(Self {
            tsconfig_path,
            type_files,
            include_files,
            filter,
            inner_config: user.inner_config.clone(),
        })
    }

    /// Root files handed to the compiler: declaration files first.
    pub fn root_files(&self) -> Vec<Utf8PathBuf> {
        let mut files: Vec<Utf8PathBuf> = self.type_files.iter().cloned().collect();
        files.extend(
            self.include_files
                .iter()
                .filter(|file| !self.type_files.contains(*file))
                .cloned(),
        );
        files
    }
}
