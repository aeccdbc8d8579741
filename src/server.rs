//! Single-worker execution context.
//!
//! A [`Server`] runs submitted tasks to completion, one at a time, on a
//! dedicated worker thread, and invokes completion callbacks on a separate
//! delivery thread so consumers are never blocked by in-flight work. FIFO
//! order is preserved among tasks submitted to the same server.
//!
//! Task state is an explicit machine, `None -> Ready -> {Success, Error,
//! Canceled}`, held in an atomic cell. Cancellation is cooperative: it takes
//! effect while a task is still queued (it never runs) or between completion
//! and callback delivery (the callback is suppressed), never mid-execution.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{StrataError, StrataResult};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Maximum number of queued tasks.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// Lifecycle of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskStatus {
    /// Created but not yet queued.
    None = 0,
    /// Queued or executing.
    Ready = 1,
    /// Ran to completion successfully; callback delivered or imminent.
    Success = 2,
    /// Ran to completion with an error; callback delivered or imminent.
    Error = 3,
    /// Canceled before it ran or before its callback was delivered.
    Canceled = 4,
}

impl TaskStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Ready,
            2 => Self::Success,
            3 => Self::Error,
            4 => Self::Canceled,
            _ => Self::None,
        }
    }
}

#[derive(Debug)]
struct StatusCell(AtomicU8);

impl StatusCell {
    fn new() -> Self {
        Self(AtomicU8::new(TaskStatus::None as u8))
    }

    fn load(&self) -> TaskStatus {
        TaskStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A unit of work executed on the server's worker thread.
pub trait Task: Send + 'static {
    /// Performs the work. The returned result decides the `success` flag
    /// handed to the completion callback.
    ///
    /// # Errors
    /// Any failure of the work; it is logged and reported as `success =
    /// false`, and the task status becomes [`TaskStatus::Error`].
    fn run(&mut self) -> StrataResult<()>;
}

impl<F> Task for F
where
    F: FnMut() -> StrataResult<()> + Send + 'static,
{
    fn run(&mut self) -> StrataResult<()> {
        self()
    }
}

/// Handle to a submitted task: status observation and cooperative cancel.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cell: Arc<StatusCell>,
}

impl TaskHandle {
    /// Returns the task's current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.cell.load()
    }

    /// Requests cancellation. Returns true if the request took effect, i.e.
    /// the task had not already reached a terminal state. A task already
    /// executing is not interrupted, but its callback is suppressed.
    pub fn cancel(&self) -> bool {
        self.cell
            .transition(TaskStatus::Ready, TaskStatus::Canceled)
    }
}

type Deliver = Box<dyn FnOnce() + Send>;
type Job = Box<dyn FnOnce() -> Option<Deliver> + Send>;

/// Executes tasks on a single worker and delivers callbacks elsewhere.
///
/// # Examples
///
/// ```
/// use strata::{Server, ServerConfig};
///
/// let mut server = Server::new(&ServerConfig::default());
/// let (tx, rx) = crossbeam_channel::bounded(1);
/// server
///     .submit(
///         move || Ok(()),
///         move |_task, success| {
///             let _ = tx.send(success);
///         },
///     )
///     .unwrap();
/// assert!(rx.recv().unwrap());
/// server.quit();
/// ```
pub struct Server {
    tx: Option<Sender<Job>>,
    queue_capacity: usize,
    worker: Option<JoinHandle<()>>,
    delivery: Option<JoinHandle<()>>,
}

impl Server {
    /// Starts the worker and delivery threads.
    ///
    /// # Panics
    /// If the operating system refuses to spawn a thread.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);
        let (delivery_tx, delivery_rx) = bounded::<Deliver>(queue_capacity);

        let worker = thread::Builder::new()
            .name("strata-worker".to_string())
            .spawn(move || {
                for job in rx.iter() {
                    if let Some(deliver) = job() {
                        if delivery_tx.send(deliver).is_err() {
                            break;
                        }
                    }
                }
                // Dropping delivery_tx here lets the delivery thread drain
                // and exit.
            })
            .expect("failed to spawn strata worker thread");

        let delivery = thread::Builder::new()
            .name("strata-delivery".to_string())
            .spawn(move || {
                for deliver in delivery_rx.iter() {
                    deliver();
                }
            })
            .expect("failed to spawn strata delivery thread");

        debug!(queue_capacity, "server started");
        Self {
            tx: Some(tx),
            queue_capacity,
            worker: Some(worker),
            delivery: Some(delivery),
        }
    }

    /// Queues a task. On completion, `callback(task, success)` is invoked on
    /// the delivery thread; a canceled task gets no callback.
    ///
    /// # Errors
    /// `StrataError::QueueFull` when the queue is at capacity,
    /// `StrataError::Shutdown` after [`quit`](Self::quit).
    pub fn submit<T, F>(&self, task: T, callback: F) -> StrataResult<TaskHandle>
    where
        T: Task,
        F: FnOnce(T, bool) + Send + 'static,
    {
        let Some(tx) = self.tx.as_ref() else {
            return Err(StrataError::Shutdown);
        };

        let cell = Arc::new(StatusCell::new());
        cell.transition(TaskStatus::None, TaskStatus::Ready);

        let run_cell = Arc::clone(&cell);
        let job: Job = Box::new(move || {
            if run_cell.load() == TaskStatus::Canceled {
                trace!("task canceled while queued, skipping");
                return None;
            }

            let mut task = task;
            let success = match task.run() {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "task failed");
                    false
                }
            };

            Some(Box::new(move || {
                let outcome = if success {
                    TaskStatus::Success
                } else {
                    TaskStatus::Error
                };
                if run_cell.transition(TaskStatus::Ready, outcome) {
                    callback(task, success);
                }
            }) as Deliver)
        });

        match tx.try_send(job) {
            Ok(()) => Ok(TaskHandle { cell }),
            Err(TrySendError::Full(_)) => Err(StrataError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(StrataError::Shutdown),
        }
    }

    /// Stops accepting work, drains the queue, and joins both threads.
    pub fn quit(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!("server shutting down");
            drop(tx);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(delivery) = self.delivery.take() {
            let _ = delivery.join();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Deterministic shutdown: queued work drains, then both threads exit.
        self.quit();
    }
}
