use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use clap::Parser;
use tracing::{error, info, warn};

use safedrop::config::{load_config, Config};
use safedrop::logging::init_logging;
use safedrop::sanitize::redact_path;
use safedrop::{
    DirectoryWatcher, Job, JobResult, Outcome, Pipeline, PipelineConfig, WorkerError, WorkerPool,
};

#[derive(Parser, Debug)]
#[command(name = "safedrop", version, about = "Scan, unpack and file newly downloaded files")]
struct Args {
    /// Configuration file (JSON, or YAML by extension)
    #[arg(short, long, env = "SAFEDROP_CONFIG")]
    config: PathBuf,

    /// Process what is already in the source directory, then exit
    #[arg(long)]
    once: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct RunSummary {
    organized: usize,
    quarantined: usize,
    deferred: usize,
    failed: usize,
}

impl RunSummary {
    fn record(&mut self, result: &JobResult) {
        let file = redact_path(&result.source_path);
        let destination = result
            .result
            .final_path
            .as_deref()
            .map(redact_path)
            .unwrap_or_default();

        match result.outcome() {
            Outcome::Organized => {
                self.organized += 1;
                info!(file = %file, destination = %destination, "File organized");
            }
            Outcome::Quarantined => {
                self.quarantined += 1;
                let threat = result
                    .result
                    .metadata
                    .get("threat_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                warn!(file = %file, threat = %threat, quarantined_as = %destination, "File quarantined");
            }
            Outcome::Deferred => {
                self.deferred += 1;
                info!(file = %file, "File still being written, deferred");
            }
            Outcome::Failed => {
                self.failed += 1;
                error!(
                    file = %file,
                    error = result.result.error.as_deref().unwrap_or("unknown error"),
                    "File processing failed"
                );
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging, args.verbose) {
        eprintln!("Warning: {}", e);
    }

    match run(&args, &config) {
        Ok(summary) => {
            info!(
                organized = summary.organized,
                quarantined = summary.quarantined,
                deferred = summary.deferred,
                failed = summary.failed,
                "safedrop stopped"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "safedrop failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &Config) -> safedrop::Result<RunSummary> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting safedrop");

    let pipeline_config = Arc::new(PipelineConfig::from_config(config));
    let pipeline = Arc::new(Pipeline::from_config(Arc::clone(&pipeline_config)));
    let pool = WorkerPool::new(pipeline, config.processing.worker_count)?;
    let reporter = spawn_reporter(&pool)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, initiating shutdown...");
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|e| WorkerError::SignalHandler(e.to_string()))?;
    }

    let watcher = DirectoryWatcher::new(&pipeline_config.source_directory)
        .exclude(&pipeline_config.quarantine_directory)
        .exclude(&pipeline_config.destination_directory);

    for job in watcher.scan()? {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        pool.submit(job)?;
    }

    if !args.once {
        watcher.watch(
            |path| {
                if let Err(e) = pool.submit(Job::new(path)) {
                    warn!(error = %e, "Could not queue file");
                }
            },
            Arc::clone(&shutdown),
        )?;
        pool.shutdown();
    } else if shutdown.load(Ordering::SeqCst) {
        pool.shutdown();
    }

    let leftover = pool.wait();
    let mut summary = reporter.join().unwrap_or_default();
    for result in &leftover {
        summary.record(result);
    }
    Ok(summary)
}

/// Logs results as they arrive so the bounded result queue never stalls the
/// workers. Ends once every worker has exited.
fn spawn_reporter(pool: &WorkerPool) -> Result<JoinHandle<RunSummary>, WorkerError> {
    let results = pool.results();
    thread::Builder::new()
        .name("safedrop-reporter".to_string())
        .spawn(move || {
            let mut summary = RunSummary::default();
            for result in results.iter() {
                summary.record(&result);
            }
            summary
        })
        .map_err(|e| WorkerError::SpawnFailed(e.to_string()))
}
