//! TypeScript compiler runner for diagnostics-only type-checking.
//!
//! The compiler (`tsc`, or any binary accepting the same command line such as
//! `tsgo`) is run against a generated overlay tsconfig that extends the
//! project's own configuration, lists an explicit set of root files and turns
//! off every kind of output emission. Its `--pretty false` output is parsed
//! into [`TscDiagnostic`]s.
//!
//! # Example
//!
//! ```ignore
//! use tsc_runner::{CompilerOverrides, TscRunner};
//! use camino::Utf8PathBuf;
//!
//! #[tokio::main]
//! async fn main() {
//!     let project_root = Utf8PathBuf::from("/path/to/project");
//!     let tsc_path = TscRunner::ensure_tsc(Some(&project_root)).await.unwrap();
//!     let tsconfig = TscRunner::find_tsconfig(&project_root).unwrap();
//!     let runner = TscRunner::new(tsc_path, project_root.clone(), tsconfig);
//!
//!     let files = vec![project_root.join("src/index.ts")];
//!     let result = runner
//!         .check(&files, &CompilerOverrides::check_only(), false)
//!         .await
//!         .unwrap();
//!
//!     for diag in result.diagnostics {
//!         println!("{:?}: {}", diag.file, diag.message);
//!     }
//! }
//! ```

mod options;
mod parser;
mod runner;

pub use options::CompilerOverrides;
pub use parser::{
    normalize_path, parse_tsc_output, DiagnosticCategory, DiagnosticPosition, TscDiagnostic,
    TscOutput,
};
pub use runner::{
    PackageManager, TscCheckOutput, TscCheckStats, TscError, TscRunner, TscTimingStats,
    WORK_DIR_NAME,
};
