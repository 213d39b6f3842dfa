//! CLI argument parsing.

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};

/// Project-wide TypeScript type-checking with glob-scoped diagnostics.
#[derive(Debug, Parser)]
#[command(name = "ts-check-rs")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Working directory for the check
    #[arg(long, default_value = ".")]
    pub workspace: Utf8PathBuf,

    /// Path to the tscheck config file (default: tscheck.config.* in the workspace)
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// Path to tsconfig.json (default: closest tsconfig.json at or above the workspace)
    #[arg(long)]
    pub tsconfig: Option<Utf8PathBuf>,

    /// Path to the tsc binary
    #[arg(long, env = "TS_CHECK_RS_TSC")]
    pub tsc: Option<Utf8PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human-verbose")]
    pub output: OutputFormat,

    /// Exit with error on warnings
    #[arg(long = "fail-on-warnings")]
    pub fail_on_warnings: bool,

    /// Watch mode
    #[arg(long)]
    pub watch: bool,

    /// Preserve watch output (don't clear screen)
    #[arg(long = "preserveWatchOutput")]
    pub preserve_watch_output: bool,

    /// Print tsc compiler statistics (--extendedDiagnostics)
    #[arg(long = "tsc-diagnostics")]
    pub tsc_diagnostics: bool,

    /// Print timing breakdowns
    #[arg(long)]
    pub timings: bool,

    /// Show tsc version and installation path
    #[arg(long = "tsc-version")]
    pub tsc_version: bool,

    /// Install or update typescript in the cache directory (e.g., --tsc-update or --tsc-update=5.6.3)
    #[arg(long = "tsc-update")]
    pub tsc_update: Option<Option<String>>,

    /// Log progress details to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Log debug details to stderr
    #[arg(long)]
    pub debug: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One header line per diagnostic
    Human,
    /// Header line plus a code frame (default)
    #[default]
    HumanVerbose,
    /// JSON array of diagnostics
    Json,
    /// Machine-readable (one line per diagnostic)
    Machine,
}

impl OutputFormat {
    /// Returns whether progress notices should be printed.
    pub fn is_human(&self) -> bool {
        matches!(self, Self::Human | Self::HumanVerbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["ts-check-rs"]);
        assert_eq!(args.workspace.as_str(), ".");
        assert_eq!(args.output, OutputFormat::HumanVerbose);
        assert!(args.config.is_none());
        assert!(!args.watch);
        assert!(args.tsc_update.is_none());
    }

    #[test]
    fn test_custom_workspace_and_config() {
        let args = Args::parse_from([
            "ts-check-rs",
            "--workspace",
            "/path/to/project",
            "--config",
            "ci/tscheck.config.json",
        ]);
        assert_eq!(args.workspace.as_str(), "/path/to/project");
        assert_eq!(
            args.config.as_ref().map(|p| p.as_str()),
            Some("ci/tscheck.config.json")
        );
    }

    #[test]
    fn test_output_formats() {
        let args = Args::parse_from(["ts-check-rs", "--output", "json"]);
        assert_eq!(args.output, OutputFormat::Json);
        assert!(!args.output.is_human());

        let args = Args::parse_from(["ts-check-rs", "--output", "human"]);
        assert!(args.output.is_human());
    }

    #[test]
    fn test_tsc_update_optional_value() {
        let args = Args::parse_from(["ts-check-rs", "--tsc-update"]);
        assert_eq!(args.tsc_update, Some(None));

        let args = Args::parse_from(["ts-check-rs", "--tsc-update=5.6.3"]);
        assert_eq!(args.tsc_update, Some(Some("5.6.3".to_string())));
    }
}
