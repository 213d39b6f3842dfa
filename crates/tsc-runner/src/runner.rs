//! tsc process runner.

use crate::options::CompilerOverrides;
use crate::parser::{parse_tsc_output, TscDiagnostic};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Package that provides the `tsc` binary.
const TYPESCRIPT_PACKAGE: &str = "typescript";

/// Directory inside the project root holding generated files.
pub const WORK_DIR_NAME: &str = ".ts-check-rs";

/// Supported package managers for installing the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    /// Detect package manager from lockfiles, walking up from the workspace
    /// so monorepo roots are found too.
    pub fn detect_from_workspace(workspace_root: &Utf8Path) -> Option<Self> {
        for dir in workspace_root.ancestors() {
            if dir.join("pnpm-lock.yaml").exists() {
                return Some(Self::Pnpm);
            }
            if dir.join("bun.lockb").exists() || dir.join("bun.lock").exists() {
                return Some(Self::Bun);
            }
            if dir.join("yarn.lock").exists() {
                return Some(Self::Yarn);
            }
            if dir.join("package-lock.json").exists() {
                return Some(Self::Npm);
            }
        }

        None
    }

    /// Detect any available package manager from PATH.
    pub fn detect_from_path() -> Option<Self> {
        [Self::Npm, Self::Pnpm, Self::Yarn, Self::Bun]
            .into_iter()
            .find(|pm| which::which(pm.command_name()).is_ok())
    }

    /// Returns the command name for this package manager.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Returns the install arguments for this package manager.
    pub fn install_args(&self, package: &str) -> Vec<String> {
        let verb = match self {
            Self::Npm => "install",
            Self::Pnpm | Self::Yarn | Self::Bun => "add",
        };
        vec![verb.to_string(), package.to_string()]
    }
}

/// Error types for the compiler runner.
#[derive(Debug, Error)]
pub enum TscError {
    /// Failed to spawn the compiler process.
    #[error("failed to spawn tsc: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The compiler exited with an error and printed no diagnostics.
    #[error("tsc exited with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    /// Compiler binary not found.
    #[error("tsc binary not found at: {0}")]
    NotFound(Utf8PathBuf),

    /// Failed to write the overlay tsconfig.
    #[error("failed to write overlay tsconfig: {0}")]
    OverlayFailed(String),

    /// Failed to install the compiler.
    #[error("failed to install tsc: {0}")]
    InstallFailed(String),

    /// No package manager found.
    #[error(
        "no package manager found - please install npm, pnpm, yarn, or bun to auto-download typescript"
    )]
    PackageManagerNotFound,
}

/// Runs the TypeScript compiler in diagnostics-only mode.
pub struct TscRunner {
    /// Path to the compiler binary.
    tsc_path: Utf8PathBuf,
    /// Project root directory, also the compiler's working directory.
    project_root: Utf8PathBuf,
    /// The project tsconfig the overlay extends.
    tsconfig_path: Utf8PathBuf,
}

#[derive(Debug, Default, Clone)]
pub struct TscTimingStats {
    pub write_time: Duration,
    pub tsc_time: Duration,
    pub parse_time: Duration,
    pub total_time: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct TscCheckStats {
    pub timings: TscTimingStats,
    /// Whether the overlay tsconfig was rewritten on this run.
    pub overlay_written: bool,
    /// The `--extendedDiagnostics` block, when requested.
    pub diagnostics: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct TscCheckOutput {
    pub diagnostics: Vec<TscDiagnostic>,
    pub stats: TscCheckStats,
}

impl TscRunner {
    /// Creates a new runner.
    pub fn new(
        tsc_path: Utf8PathBuf,
        project_root: Utf8PathBuf,
        tsconfig_path: Utf8PathBuf,
    ) -> Self {
        Self {
            tsc_path,
            project_root,
            tsconfig_path,
        }
    }

    /// Finds `tsconfig.json` in `start` or the closest ancestor.
    pub fn find_tsconfig(start: &Utf8Path) -> Option<Utf8PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join("tsconfig.json"))
            .find(|candidate| candidate.is_file())
    }

    /// Attempts to find tsc in the workspace, PATH, or common locations.
    ///
    /// Search order:
    /// 1. node_modules/.bin/tsc in the workspace and its ancestors
    /// 2. System PATH
    /// 3. Common installation locations
    /// 4. Cache directory
    pub fn find_tsc(workspace_root: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
        if let Some(workspace) = workspace_root {
            for dir in workspace.ancestors() {
                let local = dir.join("node_modules/.bin/tsc");
                if local.exists() {
                    return Some(local);
                }
            }
        }

        if let Ok(path) = which::which("tsc") {
            if let Ok(utf8_path) = Utf8PathBuf::try_from(path) {
                return Some(utf8_path);
            }
        }

        let common_paths = ["/usr/local/bin/tsc", "/usr/bin/tsc", "~/.local/bin/tsc"];
        for path in common_paths {
            let expanded = shellexpand::tilde(path);
            let path = Utf8Path::new(expanded.as_ref());
            if path.exists() {
                return Some(path.to_owned());
            }
        }

        let cached = Self::get_cache_dir()?.join("node_modules/.bin/tsc");
        cached.exists().then_some(cached)
    }

    /// Gets the cache directory for ts-check-rs.
    pub fn get_cache_dir() -> Option<Utf8PathBuf> {
        dirs::cache_dir()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .map(|p| p.join("ts-check-rs"))
    }

    /// Returns the version string printed by `tsc --version`.
    pub async fn get_tsc_version(tsc_path: &Utf8Path) -> Result<String, TscError> {
        let output = Command::new(tsc_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(TscError::ProcessFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Installs or updates typescript in the cache directory.
    pub async fn update_tsc(version: Option<&str>) -> Result<Utf8PathBuf, TscError> {
        let pm = PackageManager::detect_from_path().ok_or(TscError::PackageManagerNotFound)?;
        let package_spec = match version {
            Some(v) => format!("{TYPESCRIPT_PACKAGE}@{v}"),
            None => format!("{TYPESCRIPT_PACKAGE}@latest"),
        };
        Self::install_into_cache(pm, &package_spec).await
    }

    /// Finds tsc, installing typescript into the cache directory when it is
    /// not available anywhere.
    pub async fn ensure_tsc(workspace_root: Option<&Utf8Path>) -> Result<Utf8PathBuf, TscError> {
        if let Some(path) = Self::find_tsc(workspace_root) {
            return Ok(path);
        }

        let pm = workspace_root
            .and_then(PackageManager::detect_from_workspace)
            .or_else(PackageManager::detect_from_path)
            .ok_or(TscError::PackageManagerNotFound)?;

        Self::install_into_cache(pm, TYPESCRIPT_PACKAGE).await
    }

    async fn install_into_cache(
        pm: PackageManager,
        package_spec: &str,
    ) -> Result<Utf8PathBuf, TscError> {
        let cache_dir = Self::get_cache_dir().ok_or_else(|| {
            TscError::InstallFailed("could not determine cache directory".into())
        })?;

        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| TscError::InstallFailed(format!("failed to create cache dir: {e}")))?;

        eprintln!("Installing {} using {}...", package_spec, pm.command_name());

        let output = Command::new(pm.command_name())
            .args(pm.install_args(package_spec))
            .current_dir(&cache_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                TscError::InstallFailed(format!("failed to run {}: {e}", pm.command_name()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TscError::InstallFailed(format!(
                "{} install failed: {stderr}",
                pm.command_name()
            )));
        }

        let tsc_path = cache_dir.join("node_modules/.bin/tsc");
        if !tsc_path.exists() {
            return Err(TscError::InstallFailed(format!(
                "tsc binary not found after {} install",
                pm.command_name()
            )));
        }

        eprintln!("tsc installed at {}", tsc_path);
        Ok(tsc_path)
    }

    /// Path of the generated overlay tsconfig.
    pub fn overlay_path(&self) -> Utf8PathBuf {
        self.project_root.join(WORK_DIR_NAME).join("tsconfig.json")
    }

    /// Renders the overlay tsconfig.
    ///
    /// The overlay extends the project tsconfig, replaces its inputs with
    /// `root_files` and layers `overrides` over its compiler options.
    fn render_overlay(
        &self,
        root_files: &[Utf8PathBuf],
        overrides: &CompilerOverrides,
    ) -> Result<String, TscError> {
        let mut root = Map::new();
        root.insert(
            "extends".to_string(),
            Value::String(self.tsconfig_path.to_string()),
        );
        root.insert(
            "compilerOptions".to_string(),
            Value::Object(overrides.as_map().clone()),
        );
        root.insert(
            "files".to_string(),
            Value::Array(
                root_files
                    .iter()
                    .map(|f| Value::String(f.to_string()))
                    .collect(),
            ),
        );
        root.insert("include".to_string(), Value::Array(Vec::new()));

        serde_json::to_string_pretty(&Value::Object(root))
            .map_err(|e| TscError::OverlayFailed(e.to_string()))
    }

    /// Type-checks `root_files` and returns the compiler's diagnostics.
    pub async fn check(
        &self,
        root_files: &[Utf8PathBuf],
        overrides: &CompilerOverrides,
        emit_diagnostics: bool,
    ) -> Result<TscCheckOutput, TscError> {
        let total_start = Instant::now();
        let mut stats = TscCheckStats::default();

        if root_files.is_empty() {
            debug!("no root files, skipping tsc");
            return Ok(TscCheckOutput::default());
        }

        if !self.tsc_path.exists() {
            return Err(TscError::NotFound(self.tsc_path.clone()));
        }

        let write_start = Instant::now();
        let overlay_path = self.overlay_path();
        if let Some(parent) = overlay_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TscError::OverlayFailed(format!("create {parent}: {e}")))?;
        }
        let overlay = self.render_overlay(root_files, overrides)?;
        stats.overlay_written = write_if_changed(&overlay_path, overlay.as_bytes())?;
        stats.timings.write_time = write_start.elapsed();
        debug!(
            overlay = %overlay_path,
            written = stats.overlay_written,
            files = root_files.len(),
            "prepared overlay tsconfig"
        );

        let tsc_start = Instant::now();
        let mut command = Command::new(&self.tsc_path);
        command
            .arg("--project")
            .arg(&overlay_path)
            .arg("--pretty")
            .arg("false");
        if emit_diagnostics {
            command.arg("--extendedDiagnostics");
        }
        info!(tsc = %self.tsc_path, "running compiler");
        let output = command
            .current_dir(&self.project_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        stats.timings.tsc_time = tsc_start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let parse_start = Instant::now();
        let parsed = parse_tsc_output(&stdout, &self.project_root);
        stats.timings.parse_time = parse_start.elapsed();

        // tsc exits non-zero whenever it reports diagnostics, which is expected
        if !output.status.success() && parsed.diagnostics.is_empty() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(TscError::ProcessFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: detail,
            });
        }

        if emit_diagnostics {
            stats.diagnostics = extract_extended_diagnostics(&stdout);
        }
        stats.timings.total_time = total_start.elapsed();
        debug!(
            count = parsed.diagnostics.len(),
            elapsed = ?stats.timings.total_time,
            "tsc finished"
        );

        Ok(TscCheckOutput {
            diagnostics: parsed.diagnostics,
            stats,
        })
    }
}

/// Writes `contents` unless the file already holds exactly these bytes.
fn write_if_changed(path: &Utf8Path, contents: &[u8]) -> Result<bool, TscError> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == contents {
            return Ok(false);
        }
    }

    std::fs::write(path, contents).map_err(|e| TscError::OverlayFailed(format!("{path}: {e}")))?;
    Ok(true)
}

/// Extracts the statistics block printed by `--extendedDiagnostics`.
fn extract_extended_diagnostics(stdout: &str) -> Option<String> {
    let start = stdout.lines().position(|line| line.starts_with("Files:"))?;
    Some(stdout.lines().skip(start).collect::<Vec<_>>().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utf8_temp_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_detect_package_manager_from_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_temp_dir(&dir);
        let nested = root.join("packages/app");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("pnpm-lock.yaml"), "").unwrap();

        assert_eq!(
            PackageManager::detect_from_workspace(&nested),
            Some(PackageManager::Pnpm)
        );
    }

    #[test]
    fn test_install_args() {
        assert_eq!(
            PackageManager::Npm.install_args("typescript"),
            vec!["install".to_string(), "typescript".to_string()]
        );
        assert_eq!(PackageManager::Bun.install_args("typescript")[0], "add");
    }

    #[test]
    fn test_find_tsconfig_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_temp_dir(&dir);
        let nested = root.join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("tsconfig.json"), "{}").unwrap();

        assert_eq!(
            TscRunner::find_tsconfig(&nested),
            Some(root.join("tsconfig.json"))
        );
    }

    #[test]
    fn test_find_tsc_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_temp_dir(&dir);
        let bin = root.join("node_modules/.bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("tsc"), "").unwrap();

        let nested = root.join("packages/web");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(TscRunner::find_tsc(Some(&nested)), Some(bin.join("tsc")));
    }

    #[test]
    fn test_render_overlay() {
        let runner = TscRunner::new(
            Utf8PathBuf::from("/bin/tsc"),
            Utf8PathBuf::from("/work/app"),
            Utf8PathBuf::from("/work/app/tsconfig.json"),
        );
        let files = vec![
            Utf8PathBuf::from("/work/app/types/global.d.ts"),
            Utf8PathBuf::from("/work/app/src/index.ts"),
        ];
        let rendered = runner
            .render_overlay(&files, &CompilerOverrides::check_only())
            .unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["extends"], "/work/app/tsconfig.json");
        assert_eq!(value["files"][1], "/work/app/src/index.ts");
        assert_eq!(value["include"], Value::Array(Vec::new()));
        assert_eq!(value["compilerOptions"]["noEmit"], Value::Bool(true));
        assert_eq!(
            runner.overlay_path().as_str(),
            "/work/app/.ts-check-rs/tsconfig.json"
        );
    }

    #[test]
    fn test_write_if_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = utf8_temp_dir(&dir).join("tsconfig.json");

        assert!(write_if_changed(&path, b"{}").unwrap());
        assert!(!write_if_changed(&path, b"{}").unwrap());
        assert!(write_if_changed(&path, b"{ }").unwrap());
    }

    #[test]
    fn test_extract_extended_diagnostics() {
        let stdout = "src/a.ts(1,1): error TS2304: Cannot find name 'x'.\nFiles:   3\nLines:   120\n";
        assert_eq!(
            extract_extended_diagnostics(stdout),
            Some("Files:   3\nLines:   120".to_string())
        );
        assert_eq!(extract_extended_diagnostics("no stats"), None);
    }

    #[tokio::test]
    async fn test_empty_root_files_skips_compiler() {
        let runner = TscRunner::new(
            Utf8PathBuf::from("/nonexistent/tsc"),
            Utf8PathBuf::from("/work/app"),
            Utf8PathBuf::from("/work/app/tsconfig.json"),
        );
        let output = runner
            .check(&[], &CompilerOverrides::check_only(), false)
            .await
            .unwrap();
        assert!(output.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = TscRunner::new(
            Utf8PathBuf::from("/nonexistent/tsc"),
            Utf8PathBuf::from("/work/app"),
            Utf8PathBuf::from("/work/app/tsconfig.json"),
        );
        let result = runner
            .check(
                &[Utf8PathBuf::from("/work/app/a.ts")],
                &CompilerOverrides::check_only(),
                false,
            )
            .await;
        assert!(matches!(result, Err(TscError::NotFound(_))));
    }
}
