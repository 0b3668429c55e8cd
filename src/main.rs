//! crawl-core CLI entry point.
//!
//! ## Subcommands
//!
//! - `crawl-core-cli run` - Run a synthetic crawl workload (default)
//! - `crawl-core-cli config show|defaults|validate` - Inspect configuration
//! - `crawl-core-cli help` / `version`

use std::path::Path;
use std::process::ExitCode;

use crawl_core::cli::{config_cmd, flag_value, run_workload, RunOptions};
use crawl_core::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" => {
            if let Err(e) = init_logging(&LogConfig::from_env()) {
                eprintln!("Logging setup failed: {}", e);
                return ExitCode::from(2u8);
            }
            let opts = match RunOptions::parse(&args) {
                Ok(opts) => opts,
                Err(e) => {
                    eprintln!("{}", e);
                    print_command_help("run");
                    return ExitCode::from(2u8);
                }
            };
            let code = run_workload(opts).await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let file = flag_value(&args, "--config").map(Path::new);
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show(file) as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate(file) as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("crawl-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "crawl-core - Crawl task scheduler and rate limiter v{}

USAGE:
    crawl-core-cli [COMMAND] [OPTIONS]

COMMANDS:
    run          Run a synthetic crawl workload (default)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    crawl-core-cli run --tasks 500 --fail-rate 0.2
    crawl-core-cli run --checkpoint /var/lib/crawl/queue.json
    crawl-core-cli config validate --config crawl.toml

ENVIRONMENT:
    CRAWL_CORE_*           Scheduler settings (see `config defaults`)
    CRAWL_CORE_LOG         Log filter (default: crawl_core=info)
    CRAWL_CORE_LOG_FORMAT  json or pretty (default: json)
    CRAWL_CORE_LOG_FILE    Write logs to this file instead of stderr

EXIT CODES:
    0    Success
    1    Some tasks failed
    2    Configuration error
    130  Interrupted
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "crawl-core-cli run - Run a synthetic crawl workload

USAGE:
    crawl-core-cli run [OPTIONS]

OPTIONS:
    --tasks N           Number of fetch tasks to submit (default: 100)
    --hosts N           Number of distinct hosts (default: 4)
    --fail-rate F       Probability of a 503 per attempt (default: 0.1)
    --checkpoint PATH   Resume from and save to this checkpoint file
    --config FILE       Load scheduler configuration from a TOML file

DESCRIPTION:
    Submits fetch tasks to a simulated fetcher and runs them to completion
    under the configured rate limit. With --checkpoint, a previous
    interrupted run is resumed instead of submitting new tasks, and
    Ctrl+C writes the pending tasks back before exiting.
"
            );
        }
        "config" => {
            eprintln!(
                "crawl-core-cli config - Inspect configuration

USAGE:
    crawl-core-cli config [show|defaults|validate] [--config FILE]

SUBCOMMANDS:
    show       Print the effective configuration
    defaults   Print built-in defaults
    validate   Check for errors and suspicious settings
"
            );
        }
        _ => {
            eprintln!("No detailed help for '{}'.", command);
            print_usage();
        }
    }
}
