use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::broadcast::{JobProgressBroadcaster, JobStore};
use crate::clipping::{BroadcastProgress, NoopProgress};
use crate::error::WorkerError;
use crate::store::Transactional;
use crate::worker::job::{ClipJob, JobOutcome};
use crate::worker::runner::JobRunner;

/// Broadcaster and store a pool reports job state to.
pub type JobTracking = (JobProgressBroadcaster, Arc<JobStore>);

pub struct WorkerPool {
    job_sender: Sender<ClipJob>,
    result_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` threads, each running jobs to completion one
    /// at a time.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new<T: Transactional + 'static>(
        runner: Arc<JobRunner<T>>,
        worker_count: usize,
        tracking: Option<JobTracking>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<ClipJob>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_runner = Arc::clone(&runner);
            let worker_tracking = tracking.clone();
            let worker_dispatch = dispatch.clone();

            let handle = thread::spawn(move || {
                tracing::dispatcher::with_default(&worker_dispatch, || {
                    run_worker(
                        worker_id,
                        job_rx,
                        result_tx,
                        shutdown_flag,
                        worker_runner,
                        worker_tracking,
                    );
                });
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, job: ClipJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobOutcome> {
        self.result_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker<T: Transactional>(
    worker_id: usize,
    job_receiver: Receiver<ClipJob>,
    result_sender: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    runner: Arc<JobRunner<T>>,
    tracking: Option<JobTracking>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing job {}", worker_id, job.id);

                let outcome = match &tracking {
                    Some((broadcaster, store)) => {
                        let progress = BroadcastProgress::new(
                            broadcaster,
                            Arc::clone(store),
                            &job.id,
                            job.entity_label(),
                            Some(&job.actor.id),
                        );
                        runner.run(&job, &progress)
                    }
                    None => runner.run(&job, &NoopProgress),
                };

                // Outcomes are also in the job store; nobody has to drain this.
                match result_sender.try_send(outcome) {
                    Ok(()) => {}
                    Err(TrySendError::Full(outcome)) => {
                        debug!(
                            "Worker {} dropped outcome of job {}: result channel full",
                            worker_id,
                            outcome.job_id()
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        error!("Worker {} result channel disconnected", worker_id);
                        break;
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
