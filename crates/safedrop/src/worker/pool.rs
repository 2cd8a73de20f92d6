use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::pipeline::Pipeline;
use crate::sanitize::redact_path;
use crate::worker::job::{Job, JobResult};

/// Fixed set of threads sharing one pipeline. The pool size caps how many
/// scanner and OCR subprocesses can run at once.
pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be greater than zero".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("safedrop-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_pipeline);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        })
    }

    /// Queues a job, blocking while the queue is full.
    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    /// A second handle on the result queue, for a reporting thread.
    pub fn results(&self) -> Receiver<JobResult> {
        self.result_receiver.clone()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Workers finish the file they are on and stop taking new ones.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins every worker. Jobs still queued are
    /// drained by the workers unless `shutdown` was called first. Results
    /// not yet received are returned.
    pub fn wait(self) -> Vec<JobResult> {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        let mut leftover = Vec::new();
        for (i, worker) in self.workers.into_iter().enumerate() {
            // Keep the result queue moving so no worker blocks on a full channel.
            while !worker.is_finished() {
                match self.result_receiver.recv_timeout(Duration::from_millis(50)) {
                    Ok(result) => leftover.push(result),
                    Err(_) => continue,
                }
            }
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        leftover.extend(self.result_receiver.try_iter());

        info!("All workers have stopped");
        leftover
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!(
                    "Worker {} processing job {}: {}",
                    worker_id,
                    job.id,
                    redact_path(&job.source_path)
                );

                let result = JobResult::new(&job, pipeline.process(&job.source_path));

                if let Err(e) = result_sender.send(result) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, ConfigFormat};
    use crate::pipeline::{Collaborators, Outcome, PipelineConfig};
    use crate::classifier::RuleClassifier;
    use crate::processor::TextExtractor;
    use crate::security::{ScanOutcome, Scanner};
    use crate::stability::StabilityConfig;
    use std::path::Path;
    use tempfile::TempDir;

    struct CleanScanner;

    impl Scanner for CleanScanner {
        fn name(&self) -> &str {
            "clean"
        }

        fn scan(&self, _path: &Path, _timeout: Duration) -> ScanOutcome {
            ScanOutcome::Clean {
                output: String::new(),
            }
        }
    }

    struct NoText;

    impl TextExtractor for NoText {
        fn extract(&self, _path: &Path) -> Option<String> {
            None
        }
    }

    fn create_test_pipeline(input_dir: &Path, output_dir: &Path) -> Arc<Pipeline> {
        let json = format!(
            r#"{{"version": "1.0", "directories": {{"source": {:?}, "destination": {:?}}}}}"#,
            input_dir.display().to_string(),
            output_dir.display().to_string()
        );
        let mut config =
            PipelineConfig::from_config(&load_config_from_str(&json, ConfigFormat::Json).unwrap());
        config.stability = StabilityConfig::disabled();

        Arc::new(Pipeline::new(
            Arc::new(config),
            Collaborators {
                classifier: Arc::new(RuleClassifier::new()),
                scanner: Arc::new(CleanScanner),
                text_extractor: Arc::new(NoText),
            },
        ))
    }

    fn setup_dirs() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&input_dir).unwrap();
        (temp_dir, input_dir, output_dir)
    }

    #[test]
    fn test_worker_pool_creation() {
        let (_temp, input_dir, output_dir) = setup_dirs();
        let pool = WorkerPool::new(create_test_pipeline(&input_dir, &output_dir), 2).unwrap();

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());

        assert!(pool.wait().is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let (_temp, input_dir, output_dir) = setup_dirs();
        let result = WorkerPool::new(create_test_pipeline(&input_dir, &output_dir), 0);
        assert!(matches!(result, Err(WorkerError::SpawnFailed(_))));
    }

    #[test]
    fn test_submit_and_process_text_job() {
        let (_temp, input_dir, output_dir) = setup_dirs();
        let pool = WorkerPool::new(create_test_pipeline(&input_dir, &output_dir), 2).unwrap();

        let test_file = input_dir.join("test.txt");
        std::fs::write(&test_file, b"Hello, World!").unwrap();

        pool.submit(Job::new(test_file.clone())).unwrap();

        let result = pool.recv_result().unwrap();
        assert!(result.success(), "Job failed: {:?}", result.result.error);
        assert_eq!(result.outcome(), Outcome::Organized);
        assert_eq!(result.source_path, test_file);
        assert!(output_dir.join("documents/test.txt").exists());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_many_jobs_with_same_name_all_land() {
        let (_temp, input_dir, output_dir) = setup_dirs();
        let pool = WorkerPool::new(create_test_pipeline(&input_dir, &output_dir), 4).unwrap();

        for i in 0..8 {
            let dir = input_dir.join(format!("batch{}", i));
            std::fs::create_dir_all(&dir).unwrap();
            let file = dir.join("same.txt");
            std::fs::write(&file, format!("copy {}", i)).unwrap();
            pool.submit(Job::new(file)).unwrap();
        }

        let mut results = Vec::new();
        while results.len() < 8 {
            results.push(pool.recv_result().unwrap());
        }
        assert!(results.iter().all(|r| r.success()));

        let landed = std::fs::read_dir(output_dir.join("documents")).unwrap().count();
        assert_eq!(landed, 8);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let (_temp, input_dir, output_dir) = setup_dirs();
        let pool = WorkerPool::new(create_test_pipeline(&input_dir, &output_dir), 1).unwrap();

        pool.shutdown();
        let job = Job::new(input_dir.join("late.txt"));
        assert!(matches!(pool.submit(job), Err(WorkerError::ChannelClosed)));
        pool.wait();
    }
}
