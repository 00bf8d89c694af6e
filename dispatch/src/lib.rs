//! Ordered, allocation-free work queues with an optional dedicated consumer thread.
//!
//! `fibre_dispatch` provides the small building block behind "run this on a background
//! thread": producers submit zero-argument closures, and a single consumer runs them in
//! strict submission order.
//!
//! - [`InlineTask`]: a move-only `FnOnce()` stored inline in a fixed
//!   [`TASK_CAPACITY`]-byte buffer. Oversized closures fail to compile.
//! - [`WorkQueue`]: a mutex/condvar-guarded FIFO of tasks with `submit`, `close`,
//!   `process_available`, `run_until_closed` and `wait_until_done`. Batches run outside
//!   the lock, so a task may submit to its own queue.
//! - [`WorkerThread`]: a queue plus one thread draining it for the worker's lifetime.
//!
//! ```
//! use fibre_dispatch::WorkerThread;
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(String::new()));
//! let worker = WorkerThread::new();
//! for ch in ['A', 'B', 'C'] {
//!   let log = log.clone();
//!   assert!(worker.submit(move || log.lock().unwrap().push(ch)));
//! }
//! drop(worker); // closes, drains, and joins
//! assert_eq!(*log.lock().unwrap(), "ABC");
//! ```

pub mod error;
pub mod queue;
pub mod task;
pub mod worker;

pub use error::SpawnError;
pub use queue::WorkQueue;
pub use task::{InlineTask, TASK_CAPACITY, TASK_CAPACITY_WORDS};
pub use worker::{WorkerBuilder, WorkerThread, DEFAULT_THREAD_NAME};
