//! # Command-Line Interface
//!
//! Maintenance and inspection tooling for a storage root. The site's
//! request-serving surface lives elsewhere; this binary is for operators
//! and scripts.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Root management | `init`, `status` |
//! | Doc | Document inspection | `doc get`, `doc set`, `doc list` |
//! | Cache | Feed cache maintenance | `cache cleanup`, `cache stats` |
//! | Lock | Stuck lock recovery | `lock status`, `lock break` |
//!
//! All commands support `--format text|json` and `--verbose`; the storage
//! root comes from `--root`, `LARDER_ROOT`, or the platform data directory.
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod cache_cmd;
mod doc_cmd;
mod lock_cmd;
mod output;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
