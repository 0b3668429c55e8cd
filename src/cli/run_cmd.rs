//! `run` subcommand: drive a synthetic fetch workload through the scheduler.
//!
//! The fetcher never touches the network. It sleeps for a random latency and
//! fails with 503 (retryable) or 404 (terminal) at configurable rates, which
//! is enough to exercise rate limiting, backoff, and checkpoint resume.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::flag_value;
use crate::config;
use crate::scheduler::{
    ExecContext, ExecError, Executor, JsonFileStore, Priority, Scheduler, SchedulerConfig,
    SchedulerStats, StatusClassifier, TaskSpec,
};
use crate::shutdown::ShutdownResult;

/// One page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchJob {
    pub url: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub status: u16,
    pub bytes: usize,
}

/// Executor that simulates HTTP fetches.
#[derive(Debug, Clone)]
pub struct SyntheticFetcher {
    /// Probability of a 503 response.
    pub fail_rate: f64,
    /// Probability of a 404 response.
    pub missing_rate: f64,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

impl SyntheticFetcher {
    pub fn new(fail_rate: f64) -> Self {
        Self {
            fail_rate: fail_rate.clamp(0.0, 1.0),
            missing_rate: 0.0,
            min_latency: Duration::from_millis(5),
            max_latency: Duration::from_millis(50),
        }
    }
}

#[async_trait]
impl Executor for SyntheticFetcher {
    type Payload = FetchJob;
    type Output = FetchReport;

    async fn execute(&self, job: Arc<FetchJob>, ctx: ExecContext) -> Result<FetchReport, ExecError> {
        let (latency, roll) = {
            let mut rng = rand::thread_rng();
            let latency = if self.max_latency > self.min_latency {
                rng.gen_range(self.min_latency..=self.max_latency)
            } else {
                self.min_latency
            };
            (latency, rng.gen::<f64>())
        };

        tokio::select! {
            () = ctx.cancel.cancelled() => return Err(ExecError::terminal("fetch cancelled")),
            () = tokio::time::sleep(latency) => {}
        }

        if roll < self.fail_rate {
            Err(ExecError::status(503, format!("{} unavailable", job.host)))
        } else if roll < self.fail_rate + self.missing_rate {
            Err(ExecError::status(404, format!("{} not found", job.url)))
        } else {
            Ok(FetchReport { status: 200, bytes: job.url.len() * 64 })
        }
    }
}

/// Options for `crawl-core-cli run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub tasks: usize,
    pub hosts: usize,
    pub fail_rate: f64,
    pub checkpoint: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { tasks: 100, hosts: 4, fail_rate: 0.1, checkpoint: None, config: None }
    }
}

impl RunOptions {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = Self::default();
        if let Some(v) = flag_value(args, "--tasks") {
            opts.tasks = v.parse().map_err(|_| format!("invalid --tasks value: {v}"))?;
        }
        if let Some(v) = flag_value(args, "--hosts") {
            opts.hosts = v.parse().map_err(|_| format!("invalid --hosts value: {v}"))?;
            if opts.hosts == 0 {
                return Err("--hosts must be at least 1".into());
            }
        }
        if let Some(v) = flag_value(args, "--fail-rate") {
            let rate: f64 = v.parse().map_err(|_| format!("invalid --fail-rate value: {v}"))?;
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("--fail-rate must be in [0, 1], got {rate}"));
            }
            opts.fail_rate = rate;
        }
        opts.checkpoint = flag_value(args, "--checkpoint").map(PathBuf::from);
        opts.config = flag_value(args, "--config").map(PathBuf::from);
        Ok(opts)
    }
}

/// What a workload run did.
#[derive(Debug)]
pub struct WorkloadSummary {
    pub restored: usize,
    pub submitted: usize,
    pub interrupted: bool,
    pub shutdown: ShutdownResult,
    pub stats: SchedulerStats,
}

/// Resolve configuration, run the workload, and print a JSON stats summary.
/// Returns the process exit code.
pub async fn run_workload(opts: RunOptions) -> i32 {
    let resolved = match &opts.config {
        Some(path) => config::load_file(path),
        None => {
            let cfg = config::load();
            cfg.validate().map(|()| cfg)
        }
    };
    let cfg = match resolved {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return 2;
        }
    };

    match execute_workload(cfg, &opts).await {
        Ok(summary) => {
            match serde_json::to_string_pretty(&summary.stats) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "run: failed to encode stats"),
            }
            if summary.interrupted {
                130
            } else if summary.stats.failed > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            2
        }
    }
}

/// Build a scheduler for `cfg`, resume from the checkpoint if one exists,
/// otherwise submit `opts.tasks` fresh jobs, and run until drained or Ctrl+C.
pub async fn execute_workload(cfg: SchedulerConfig, opts: &RunOptions) -> Result<WorkloadSummary, String> {
    let mut fetcher = SyntheticFetcher::new(opts.fail_rate);
    fetcher.missing_rate = (opts.fail_rate / 10.0).min(1.0 - fetcher.fail_rate);

    let mut builder = Scheduler::builder(cfg, fetcher).classifier(StatusClassifier);
    if let Some(path) = &opts.checkpoint {
        builder = builder.checkpoint_store(JsonFileStore::new(path));
    }
    let scheduler = builder.build().map_err(|e| e.to_string())?;

    let restored = scheduler.restore_from_store().map_err(|e| e.to_string())?;
    let submitted = if restored > 0 {
        info!(restored, "run: resuming from checkpoint");
        0
    } else {
        let hosts = opts.hosts.max(1);
        let specs = (0..opts.tasks).map(|i| {
            let host = format!("host-{}.test", i % hosts);
            let priority = if i % 10 == 0 { Priority::HIGH } else { Priority::NORMAL };
            TaskSpec::new(FetchJob { url: format!("https://{host}/page/{i}"), host: host.clone() })
                .with_priority(priority)
                .with_partition(host)
        });
        let accepted = scheduler.submit_many(specs).into_iter().filter(Result::is_ok).count();
        info!(submitted = accepted, "run: workload submitted");
        accepted
    };

    scheduler.start();
    let interrupted = tokio::select! {
        () = scheduler.drain() => false,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("run: interrupted, shutting down");
                true
            }
            Err(e) => {
                warn!(error = %e, "run: cannot listen for Ctrl+C, waiting for drain");
                scheduler.drain().await;
                false
            }
        },
    };

    let report = scheduler.request_shutdown().await;
    if let Some(Err(e)) = &report.checkpoint {
        return Err(format!("final checkpoint failed: {e}"));
    }
    Ok(WorkloadSummary {
        restored,
        submitted,
        interrupted,
        shutdown: report.result,
        stats: scheduler.stats(),
    })
}
