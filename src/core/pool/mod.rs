//! Bounded worker pool for independent, fallible units of work.
//!
//! A fixed number of workers pull tasks from one shared queue until it is
//! drained. `Pool::run` returns only after every task has finished, and a
//! failing or panicking task never affects its siblings.

use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, TaskStatus};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info};

type Work = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), AppError>> + Send>;

/// A named unit of work with an observable status.
pub struct Task {
    name: String,
    work: Work,
    status: watch::Sender<TaskStatus>,
}

impl Task {
    pub fn new<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let (status, _) = watch::channel(TaskStatus::Pending);
        Task {
            name: name.into(),
            work: Box::new(move || work().boxed()),
            status,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    /// Watch status transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    async fn execute(self) -> TaskReport {
        let Task { name, work, status } = self;

        status.send_replace(TaskStatus::Running);
        info!("Validating with {}...", name);

        let outcome = AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await;
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(task = %name, panic = %detail, "task panicked");
                Some(
                    AppError::new(
                        ErrorCategory::InternalError,
                        format!("{} panicked: {}", name, detail),
                    )
                    .with_code("POOL-001"),
                )
            }
        };

        let final_status = if error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Succeeded
        };
        status.send_replace(final_status);
        info!("Validation with {} complete.", name);

        TaskReport {
            name,
            status: final_status,
            error,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Outcome of one task.
#[derive(Debug)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub error: Option<AppError>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Counting barrier released once every added unit is done.
#[derive(Clone)]
struct WaitGroup {
    remaining: Arc<watch::Sender<usize>>,
}

impl WaitGroup {
    fn new() -> Self {
        let (remaining, _) = watch::channel(0);
        WaitGroup {
            remaining: Arc::new(remaining),
        }
    }

    fn add(&self, n: usize) {
        self.remaining.send_modify(|count| *count += n);
    }

    fn done(&self) {
        self.remaining
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

/// Runs tasks with at most `concurrency` of them active at once.
pub struct Pool {
    tasks: Vec<Task>,
    concurrency: usize,
}

impl Pool {
    /// A concurrency of zero is treated as one.
    pub fn new(tasks: Vec<Task>, concurrency: usize) -> Self {
        Pool {
            tasks,
            concurrency: concurrency.max(1),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task to completion. Reports come back in submission order.
    pub async fn run(self) -> Vec<TaskReport> {
        let total = self.tasks.len();
        let (sender, receiver) = mpsc::unbounded_channel::<(usize, Task)>();
        let receiver = Arc::new(Mutex::new(receiver));
        let wait_group = WaitGroup::new();

        debug!(tasks = total, workers = self.concurrency, "starting worker pool");

        let workers: Vec<_> = (0..self.concurrency)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let wait_group = wait_group.clone();
                tokio::spawn(async move {
                    let mut reports = Vec::new();
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some((index, task)) = next else {
                            break;
                        };
                        debug!(worker, task = %task.name(), "picked up task");
                        reports.push((index, task.execute().await));
                        wait_group.done();
                    }
                    reports
                })
            })
            .collect();

        wait_group.add(total);
        for (index, task) in self.tasks.into_iter().enumerate() {
            if sender.send((index, task)).is_err() {
                // Every worker is gone; nothing else can run.
                error!("worker pool closed before all tasks were queued");
                break;
            }
        }
        drop(sender);

        wait_group.wait().await;

        let mut slots: Vec<Option<TaskReport>> = (0..total).map(|_| None).collect();
        for worker in workers {
            match worker.await {
                Ok(reports) => {
                    for (index, report) in reports {
                        slots[index] = Some(report);
                    }
                }
                Err(err) => error!(error = %err, "worker stopped unexpectedly"),
            }
        }

        slots.into_iter().flatten().collect()
    }
}
