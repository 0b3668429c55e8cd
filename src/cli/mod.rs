//! CLI subcommands for the `crawl-core-cli` binary.
//!
//! ## Usage
//!
//! ```bash
//! crawl-core-cli run --tasks 200 --fail-rate 0.2   # synthetic workload
//! crawl-core-cli config show                       # effective config
//! crawl-core-cli config validate --config crawl.toml
//! ```

pub mod config_cmd;
pub mod run_cmd;

pub use run_cmd::{run_workload, FetchJob, RunOptions, SyntheticFetcher};

/// Value following `flag` in `args`, if present.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
