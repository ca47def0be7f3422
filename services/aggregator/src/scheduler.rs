//! In-process periodic task runner with bounded concurrency.
//!
//! Jobs tick on fixed intervals. Execution happens on a shared worker pool
//! (default 30 permits); the same job may overlap up to 5 instances, and a
//! tick that finds all instances busy is skipped with a warning. Missed
//! firings are not merged. A panicking job is caught and logged without
//! disturbing its schedule or any other job.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const DEFAULT_WORKERS: usize = 30;
pub const DEFAULT_MAX_INSTANCES: usize = 5;

pub struct Scheduler {
    workers: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(workers: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            workers: Arc::new(Semaphore::new(workers)),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// A shutdown receiver other long-lived tasks can select on.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Register a periodic job. With `run_immediately` the first execution
    /// happens right away instead of one interval in.
    pub fn add_job<F, Fut>(
        &mut self,
        id: &'static str,
        interval: Duration,
        run_immediately: bool,
        job: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        let mut shutdown = self.shutdown_rx.clone();
        let instances = Arc::new(Semaphore::new(DEFAULT_MAX_INSTANCES));
        let job = Arc::new(job);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            if !run_immediately {
                // interval() fires immediately; consume that tick.
                ticker.tick().await;
            }
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { break; }
                    }
                    _ = ticker.tick() => {
                        let Ok(instance) = Arc::clone(&instances).try_acquire_owned() else {
                            warn!(job = id, "max instances reached, skipping run");
                            continue;
                        };
                        let runner = tokio::spawn({
                            let job = Arc::clone(&job);
                            let workers = Arc::clone(&workers);
                            async move {
                                let Ok(_worker) = workers.acquire_owned().await else {
                                    return;
                                };
                                job().await;
                            }
                        });
                        tokio::spawn(async move {
                            if let Err(e) = runner.await {
                                if e.is_panic() {
                                    error!(job = id, "job panicked; schedule unaffected");
                                }
                            }
                            drop(instance);
                        });
                    }
                }
            }
            debug!(job = id, "job removed");
        });
        self.handles.push(handle);
    }

    /// Remove all jobs and stop without waiting for in-flight executions.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
