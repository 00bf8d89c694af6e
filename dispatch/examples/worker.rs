//! Runs a few tasks on a background worker, including one that keeps resubmitting
//! itself, then shuts the worker down.
//!
//! Run with `RUST_LOG=trace cargo run -p fibre_dispatch --example worker` to see the
//! queue's own log output.

use fibre_dispatch::{WorkQueue, WorkerThread};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn infinite_increment(counter: Arc<AtomicUsize>, queue: Arc<WorkQueue<'static>>) {
  counter.fetch_add(1, Ordering::Relaxed);
  let next = Arc::clone(&queue);
  queue.submit(move || infinite_increment(counter, next));
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_thread_names(true)
    .init();

  println!("Basic worker test...");
  {
    let worker = WorkerThread::new();
    worker.submit(|| print!(" Hello"));
    worker.submit(|| print!(" world!"));
    worker.submit(|| println!());
  }

  println!("Stopping a recursive loop...");
  let count1 = Arc::new(AtomicUsize::new(0));
  let count2 = Arc::new(AtomicUsize::new(0));
  {
    let worker = WorkerThread::builder()
      .name("example-worker")
      .spawn()
      .expect("failed to spawn worker");
    let (c1, q1) = (count1.clone(), worker.queue_handle());
    let (c2, q2) = (count2.clone(), worker.queue_handle());
    worker.submit(move || infinite_increment(c1, q1));
    worker.submit(move || infinite_increment(c2, q2));
    thread::sleep(Duration::from_millis(10));
  }
  println!(
    " count1: {}, count2: {}",
    count1.load(Ordering::Relaxed),
    count2.load(Ordering::Relaxed)
  );
}
