//! Main orchestration logic.

use crate::cli::{Args, OutputFormat};
use crate::config::{ConfigError, ResolvedConfig, TsCheckConfig, TsConfig};
use crate::output::{CheckSummary, Formatter};
use crate::paths::{absolute_from, is_checkable_file, relative_path};
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::Diagnostic;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use tsc_runner::{CompilerOverrides, TscCheckStats, TscError, TscRunner, WORK_DIR_NAME};

/// Orchestration errors.
#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    /// Invalid workspace directory.
    #[error("invalid workspace: {0}")]
    #[diagnostic(code(ts_check::workspace))]
    Workspace(String),

    /// Configuration error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// Compiler error.
    #[error("tsc error: {0}")]
    #[diagnostic(
        code(ts_check::tsc),
        help("install typescript in the project or pass --tsc <path>")
    )]
    Tsc(#[from] TscError),

    /// Watch error.
    #[error("watch error: {0}")]
    #[diagnostic(code(ts_check::watch))]
    WatchFailed(String),
}

/// Resolves the workspace argument to an absolute path.
pub fn resolve_workspace(workspace: &Utf8Path) -> Result<Utf8PathBuf, OrchestratorError> {
    let absolute = if workspace.is_relative() {
        let cwd = std::env::current_dir().map_err(|e| OrchestratorError::Workspace(e.to_string()))?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|e| OrchestratorError::Workspace(e.to_string()))?;
        cwd.join(workspace)
    } else {
        workspace.to_owned()
    };

    let normalized = tsc_runner::normalize_path(&absolute);
    if !normalized.is_dir() {
        return Err(OrchestratorError::Workspace(format!(
            "{normalized} is not a directory"
        )));
    }
    Ok(normalized)
}

/// Runs the check once, or repeatedly in watch mode.
pub async fn run(args: Args) -> Result<CheckSummary, OrchestratorError> {
    let workspace = resolve_workspace(&args.workspace)?;

    if args.watch {
        run_watch_mode(&args, &workspace).await
    } else {
        run_single_check(&args, &workspace).await
    }
}

/// Prints a progress line with the elapsed time (human output only).
fn notice(args: &Args, message: &str, started: Instant) {
    if args.output.is_human() {
        println!(
            "{} {}",
            format!("[info] {message}").blue(),
            format!("{}ms", started.elapsed().as_millis()).bright_black()
        );
    }
}

/// Runs a single check pass.
async fn run_single_check(
    args: &Args,
    workspace: &Utf8Path,
) -> Result<CheckSummary, OrchestratorError> {
    let started = Instant::now();
    let timings_enabled = args.timings || read_env_bool("TS_CHECK_RS_TIMINGS").unwrap_or(false);
    notice(args, "Starting TypeScript type check", started);

    let Some((config_path, user_config)) =
        TsCheckConfig::load_from_workspace(workspace, args.config.as_deref())?
    else {
        notice(args, "No tscheck config found, nothing to check", started);
        if args.output == OutputFormat::Json {
            println!("[]");
        }
        return Ok(CheckSummary::default());
    };

    let tsconfig_path = match &args.tsconfig {
        Some(path) => absolute_from(path, workspace),
        None => TscRunner::find_tsconfig(workspace)
            .ok_or_else(|| ConfigError::TsconfigNotFound(workspace.to_owned()))?,
    };
    let tsconfig = TsConfig::load(&tsconfig_path)?;

    let resolve_start = Instant::now();
    let resolved = ResolvedConfig::resolve(workspace, tsconfig_path, &tsconfig, &user_config)?;
    let resolve_time = resolve_start.elapsed();
    notice(
        args,
        &format!(
            "Loaded {}, checking {} files",
            relative_path(&config_path, workspace),
            resolved.include_files.len()
        ),
        started,
    );

    let root_files = resolved.root_files();
    let overrides = CompilerOverrides::check_only().merge(&resolved.inner_config);

    let tsc_path = match &args.tsc {
        Some(path) => absolute_from(path, workspace),
        None => TscRunner::ensure_tsc(Some(workspace)).await?,
    };
    debug!(tsc = %tsc_path, tsconfig = %resolved.tsconfig_path, "resolved compiler");

    let runner = TscRunner::new(
        tsc_path,
        workspace.to_owned(),
        resolved.tsconfig_path.clone(),
    );
    let output = runner
        .check(&root_files, &overrides, args.tsc_diagnostics)
        .await?;
    notice(args, "Scan complete, reporting", started);

    let total = output.diagnostics.len();
    let reported = resolved.filter.apply(output.diagnostics);
    info!(total, reported = reported.len(), "filtered diagnostics");

    let formatter = Formatter::new(args.output, workspace);
    let formatted = formatter.format(&reported);
    if args.output == OutputFormat::Json {
        println!("{formatted}");
    } else {
        print!("{formatted}");
    }

    let summary =
        CheckSummary::from_diagnostics(&reported, root_files.len(), args.fail_on_warnings);

    if args.output.is_human() {
        let line = summary.format();
        let line = if summary.error_count > 0 || summary.warning_count > 0 {
            line.bright_red()
        } else {
            line.green()
        };
        println!(
            "{} {}",
            line,
            format!("{}ms", started.elapsed().as_millis()).bright_black()
        );
    }

    if args.tsc_diagnostics {
        if let Some(block) = &output.stats.diagnostics {
            eprintln!("=== tsc diagnostics ===");
            eprintln!("{block}");
        }
    }

    if timings_enabled {
        print_timings(resolve_time, &output.stats, started.elapsed());
    }

    Ok(summary)
}

fn print_timings(resolve_time: Duration, stats: &TscCheckStats, total: Duration) {
    eprintln!("=== ts-check-rs timings ===");
    eprintln!("resolve: {:?}", resolve_time);
    eprintln!(
        "tsc: write {:?} ({}) run {:?} parse {:?}",
        stats.timings.write_time,
        if stats.overlay_written {
            "written"
        } else {
            "unchanged"
        },
        stats.timings.tsc_time,
        stats.timings.parse_time
    );
    eprintln!("total: {:?}", total);
}

fn read_env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns whether a change to `path` should trigger a re-check.
fn is_watched_path(path: &std::path::Path, workspace: &Utf8Path) -> bool {
    let Some(path) = Utf8Path::from_path(path) else {
        return false;
    };
    let relative = relative_path(path, workspace);
    if relative
        .split('/')
        .any(|component| component == "node_modules" || component == WORK_DIR_NAME)
    {
        return false;
    }

    let name = path.file_name().unwrap_or("");
    name == "tsconfig.json" || name.starts_with("tscheck.config.") || is_checkable_file(path)
}

fn report_failure(result: Result<CheckSummary, OrchestratorError>) {
    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
    }
}

/// Runs in watch mode.
async fn run_watch_mode(
    args: &Args,
    workspace: &Utf8Path,
) -> Result<CheckSummary, OrchestratorError> {
    use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

    println!("Starting watch mode...\n");

    report_failure(run_single_check(args, workspace).await);

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        Config::default().with_poll_interval(Duration::from_secs(1)),
    )
    .map_err(|e| OrchestratorError::WatchFailed(e.to_string()))?;

    watcher
        .watch(workspace.as_std_path(), RecursiveMode::Recursive)
        .map_err(|e| OrchestratorError::WatchFailed(e.to_string()))?;

    println!("Watching for changes... (Ctrl+C to stop)\n");

    while let Some(event) = rx.recv().await {
        if !event
            .paths
            .iter()
            .any(|p| is_watched_path(p, workspace))
        {
            continue;
        }

        // Let bursts of events from one save settle
        tokio::time::sleep(Duration::from_millis(100)).await;
        while rx.try_recv().is_ok() {}

        if !args.preserve_watch_output {
            print!("\x1B[2J\x1B[1;1H");
        }
        println!("File change detected, re-checking...\n");

        report_failure(run_single_check(args, workspace).await);
    }

    Err(OrchestratorError::WatchFailed(
        "watch channel closed unexpectedly".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_resolve_relative_workspace() {
        let workspace = resolve_workspace(Utf8Path::new(".")).unwrap();
        assert!(workspace.is_absolute());
        assert!(!workspace.as_str().ends_with("/."));
    }

    #[test]
    fn test_resolve_missing_workspace() {
        let err = resolve_workspace(Utf8Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, OrchestratorError::Workspace(_)));
    }

    #[test]
    fn test_watched_paths() {
        let root = Utf8Path::new("/work/app");
        assert!(is_watched_path(Path::new("/work/app/src/a.ts"), root));
        assert!(is_watched_path(Path::new("/work/app/src/view.tsx"), root));
        assert!(is_watched_path(Path::new("/work/app/tsconfig.json"), root));
        assert!(is_watched_path(Path::new("/work/app/tscheck.config.js"), root));
        assert!(!is_watched_path(Path::new("/work/app/README.md"), root));
        assert!(!is_watched_path(
            Path::new("/work/app/node_modules/x/index.d.ts"),
            root
        ));
        assert!(!is_watched_path(
            Path::new("/work/app/.ts-check-rs/tsconfig.json"),
            root
        ));
    }

    #[test]
    fn test_read_env_bool() {
        std::env::set_var("TS_CHECK_RS_TEST_FLAG", "Yes");
        assert_eq!(read_env_bool("TS_CHECK_RS_TEST_FLAG"), Some(true));
        std::env::set_var("TS_CHECK_RS_TEST_FLAG", "off");
        assert_eq!(read_env_bool("TS_CHECK_RS_TEST_FLAG"), Some(false));
        std::env::remove_var("TS_CHECK_RS_TEST_FLAG");
        assert_eq!(read_env_bool("TS_CHECK_RS_TEST_FLAG"), None);
    }
}
