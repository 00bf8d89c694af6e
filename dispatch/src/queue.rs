// src/queue.rs

//! The work queue: an ordered, mutex-guarded sequence of [`InlineTask`]s.
//!
//! ### Design Principles:
//!
//! 1.  **Central Mutex**: A `parking_lot::Mutex` guards the pending tasks, the closed
//!     flag, and the drain bookkeeping. A single `Condvar` carries every wake-up: new
//!     work, closing, and a finished batch.
//! 2.  **Swap, then run unlocked**: A drainer exchanges the whole pending `Vec` for its
//!     own empty buffer in O(1) and invokes the detached batch with the lock released.
//!     A running task may therefore submit to its own queue without deadlocking.
//! 3.  **Buffer reuse**: The emptied batch buffer is parked as the next spare, so two
//!     buffers alternate and steady-state submission does not allocate.

use crate::task::InlineTask;

use core::fmt;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::thread;
use tracing::{debug, trace, warn};

struct QueueState<'a> {
  /// Accepted, not yet detached tasks, in submission order.
  tasks: Vec<InlineTask<'a>>,
  /// Empty buffer handed to the next drainer.
  spare: Vec<InlineTask<'a>>,
  /// Monotonic: never cleared once set.
  closed: bool,
  /// A consumer is inside `process_available` or `run_until_closed`.
  draining: bool,
  /// A detached batch is currently being invoked.
  in_flight: bool,
}

impl QueueState<'_> {
  #[inline]
  fn is_done(&self) -> bool {
    self.closed && self.tasks.is_empty() && !self.in_flight
  }
}

/// A thread-safe FIFO of tasks, drained by one consumer at a time.
///
/// Any number of threads may [`submit`](WorkQueue::submit). Exactly one thread at a
/// time should drain, either by calling [`process_available`](WorkQueue::process_available)
/// from its own loop or by parking in [`run_until_closed`](WorkQueue::run_until_closed).
/// Two concurrent drainers would each take a different slice of the queue and break
/// FIFO order; debug builds assert against it.
///
/// Dropping the queue closes it and waits until it is drained. Because nothing else
/// can reach the queue while it is being dropped, any task still pending at that point
/// can never run: close and drain the queue first (for example
/// `close()` then `run_until_closed()`). Debug builds assert on this; release builds
/// block forever.
pub struct WorkQueue<'a> {
  state: Mutex<QueueState<'a>>,
  cond: Condvar,
}

impl<'a> WorkQueue<'a> {
  /// Creates an empty, open queue.
  pub fn new() -> Self {
    WorkQueue {
      state: Mutex::new(QueueState {
        tasks: Vec::new(),
        spare: Vec::new(),
        closed: false,
        draining: false,
        in_flight: false,
      }),
      cond: Condvar::new(),
    }
  }

  /// Appends `f` to the tail of the queue.
  ///
  /// Returns `false`, dropping `f` uninvoked, if the queue has been closed. A submit
  /// racing with [`close`](WorkQueue::close) may land on either side of it.
  pub fn submit<F>(&self, f: F) -> bool
  where
    F: FnOnce() + Send + 'a,
  {
    let task = InlineTask::new(f);

    let mut state = self.state.lock();
    if state.closed {
      drop(state);
      debug!("work queue is closed, submission rejected");
      // Captured state is released here, outside the lock.
      drop(task);
      return false;
    }
    state.tasks.push(task);
    drop(state);

    self.cond.notify_all();
    true
  }

  /// Stops accepting new tasks. Idempotent.
  ///
  /// Tasks already accepted still run.
  pub fn close(&self) {
    let mut state = self.state.lock();
    let newly_closed = !mem::replace(&mut state.closed, true);
    let pending = state.tasks.len();
    drop(state);

    if newly_closed {
      debug!(pending, "work queue closed");
    }
    self.cond.notify_all();
  }

  /// Blocks until the queue is closed and every accepted task has run.
  ///
  /// Tasks that resubmit work keep the queue busy; the condition is rechecked on
  /// every wake-up. Calling this from inside one of the queue's own tasks never
  /// returns.
  pub fn wait_until_done(&self) {
    let mut state = self.state.lock();
    while !state.is_done() {
      self.cond.wait(&mut state);
    }
  }

  /// Runs every task queued at the moment of the call, in order, then returns.
  ///
  /// Does not block waiting for work. Tasks submitted while the batch runs are left
  /// for the next call.
  pub fn process_available(&self) {
    let mut drain = self.begin_drain();
    if drain.refill(false) {
      drain.run();
    }
  }

  /// Runs tasks as they arrive until the queue is closed and fully drained.
  ///
  /// Sleeps on the condition variable while the queue is open and empty. Returns only
  /// once a swap finds nothing pending after [`close`](WorkQueue::close); at that point
  /// any thread in [`wait_until_done`](WorkQueue::wait_until_done) is released.
  pub fn run_until_closed(&self) {
    let mut drain = self.begin_drain();
    while drain.refill(true) {
      drain.run();
    }
    trace!("work queue closed and drained");
  }

  /// Returns `true` once [`close`](WorkQueue::close) has been called.
  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Number of accepted tasks not yet picked up by a drainer.
  pub fn len(&self) -> usize {
    self.state.lock().tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state.lock().tasks.is_empty()
  }

  fn begin_drain(&self) -> Drain<'_, 'a> {
    let mut state = self.state.lock();
    let already_draining = mem::replace(&mut state.draining, true);
    let batch = mem::take(&mut state.spare);
    drop(state);

    debug_assert!(
      !already_draining,
      "work queue drained by more than one consumer at a time"
    );
    Drain {
      queue: self,
      batch,
      running: false,
    }
  }
}

impl Default for WorkQueue<'_> {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for WorkQueue<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("WorkQueue")
      .field("closed", &state.closed)
      .field("pending", &state.tasks.len())
      .field("draining", &state.draining)
      .finish_non_exhaustive()
  }
}

impl Drop for WorkQueue<'_> {
  fn drop(&mut self) {
    self.close();

    let state = self.state.get_mut();
    let pending = state.tasks.len();
    if pending > 0 && thread::panicking() {
      // Blocking here would turn an unwinding panic into a hang.
      warn!(pending, "work queue dropped during a panic, discarding pending tasks");
      state.tasks.clear();
      return;
    }
    debug_assert!(
      pending == 0,
      "work queue dropped with {} pending task(s) and no consumer",
      pending
    );

    self.wait_until_done();
  }
}

/// Exclusive drain session over a queue; releases the drain slot when dropped.
struct Drain<'q, 'a> {
  queue: &'q WorkQueue<'a>,
  batch: Vec<InlineTask<'a>>,
  /// Set while tasks are being invoked; still set on drop means a task panicked.
  running: bool,
}

impl<'a> Drain<'_, 'a> {
  /// Detaches all pending tasks into the batch. Returns `false` if there were none.
  ///
  /// With `block`, sleeps until there is work or the queue is closed.
  fn refill(&mut self, block: bool) -> bool {
    let queue = self.queue;
    let mut state = queue.state.lock();
    state.in_flight = false;

    if block {
      while state.tasks.is_empty() && !state.closed {
        queue.cond.wait(&mut state);
      }
    }

    if state.tasks.is_empty() {
      // A blocking drain only ever stops on a closed, empty queue.
      debug_assert!(!block || state.closed);
      return false;
    }

    mem::swap(&mut state.tasks, &mut self.batch);
    state.in_flight = true;
    true
  }

  fn run(&mut self) {
    trace!(tasks = self.batch.len(), "running batch");
    self.running = true;
    for task in self.batch.drain(..) {
      task.invoke();
    }
    self.running = false;
  }
}

impl Drop for Drain<'_, '_> {
  fn drop(&mut self) {
    let queue = self.queue;
    let mut state = queue.state.lock();
    state.draining = false;
    state.in_flight = false;

    // The rest of a panicked batch is already gone, so the queue can no longer
    // honour its ordering; close it so owners waiting on it are released.
    let abandoned = if self.running {
      state.closed = true;
      mem::take(&mut state.tasks)
    } else {
      Vec::new()
    };

    if self.batch.capacity() > state.spare.capacity() {
      mem::swap(&mut state.spare, &mut self.batch);
    }
    let closed = state.closed;
    drop(state);

    if closed {
      queue.cond.notify_all();
    }
    if self.running {
      warn!(
        discarded = abandoned.len(),
        "task panicked while draining, work queue closed"
      );
    }
  }
}
