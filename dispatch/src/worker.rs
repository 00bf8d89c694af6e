// src/worker.rs

//! A [`WorkQueue`] paired with one dedicated thread that drains it.

use crate::error::SpawnError;
use crate::queue::WorkQueue;

use core::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Thread name used when the builder is not given one.
pub const DEFAULT_THREAD_NAME: &str = "fibre-dispatch";

/// Configuration for a [`WorkerThread`].
#[derive(Debug, Clone, Default)]
pub struct WorkerBuilder {
  name: Option<String>,
  stack_size: Option<usize>,
}

impl WorkerBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the name of the worker's thread. Defaults to [`DEFAULT_THREAD_NAME`].
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets the stack size of the worker's thread, in bytes.
  pub fn stack_size(mut self, size: usize) -> Self {
    self.stack_size = Some(size);
    self
  }

  /// Creates the queue and starts the thread draining it.
  pub fn spawn(self) -> Result<WorkerThread, SpawnError> {
    let queue = Arc::new(WorkQueue::new());
    let name = self.name.unwrap_or_else(|| DEFAULT_THREAD_NAME.to_owned());

    let mut builder = thread::Builder::new().name(name.clone());
    if let Some(size) = self.stack_size {
      builder = builder.stack_size(size);
    }

    let consumer = Arc::clone(&queue);
    let handle = builder.spawn(move || {
      debug!(thread = %name, "dispatch worker started");
      consumer.run_until_closed();
      debug!(thread = %name, "dispatch worker stopped");
    })?;

    Ok(WorkerThread {
      queue,
      handle: Some(handle),
    })
  }
}

/// Runs submitted tasks, in order, on a dedicated background thread.
///
/// Dropping the worker closes its queue, waits for every accepted task to finish, and
/// joins the thread. Tasks that keep resubmitting themselves stop as soon as one of
/// their submits is rejected by the closed queue.
///
/// The worker must not be dropped from one of its own tasks: the drop would wait for
/// the batch it is running in.
pub struct WorkerThread {
  queue: Arc<WorkQueue<'static>>,
  handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
  /// Starts a worker with the default configuration.
  ///
  /// # Panics
  ///
  /// Panics if the OS fails to create a thread, like [`std::thread::spawn`]. Use
  /// [`WorkerThread::builder`] to handle that case.
  pub fn new() -> Self {
    match WorkerBuilder::new().spawn() {
      Ok(worker) => worker,
      Err(err) => panic!("{}: {}", err, err.kind()),
    }
  }

  pub fn builder() -> WorkerBuilder {
    WorkerBuilder::new()
  }

  /// Queues `f` to run on the worker thread. Returns `false` once the worker is closed.
  pub fn submit<F>(&self, f: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    self.queue.submit(f)
  }

  /// Stops accepting new tasks. Idempotent.
  pub fn close(&self) {
    self.queue.close();
  }

  /// The queue drained by this worker's thread.
  pub fn queue(&self) -> &WorkQueue<'static> {
    &self.queue
  }

  /// A shared handle to the queue, for tasks that submit follow-up work.
  ///
  /// The handle only submits; draining stays with the worker's thread.
  pub fn queue_handle(&self) -> Arc<WorkQueue<'static>> {
    Arc::clone(&self.queue)
  }

  /// The worker's thread, if it has not been joined yet.
  pub fn thread(&self) -> Option<&thread::Thread> {
    self.handle.as_ref().map(JoinHandle::thread)
  }

  /// Closes the queue, waits for it to drain, and joins the thread.
  ///
  /// Unlike dropping the worker, a panic raised by one of its tasks is returned.
  pub fn join(mut self) -> thread::Result<()> {
    self.shutdown().unwrap_or(Ok(()))
  }

  fn shutdown(&mut self) -> Option<thread::Result<()>> {
    let handle = self.handle.take()?;
    self.queue.close();
    self.queue.wait_until_done();
    Some(handle.join())
  }
}

impl Default for WorkerThread {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for WorkerThread {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerThread")
      .field("queue", &self.queue)
      .field("thread", &self.thread().and_then(|t| t.name()))
      .finish()
  }
}

impl Drop for WorkerThread {
  fn drop(&mut self) {
    if let Some(Err(_)) = self.shutdown() {
      error!("dispatch worker thread panicked");
    }
  }
}
