mod common;
use common::*;

use fibre_dispatch::{WorkQueue, WorkerBuilder, WorkerThread, DEFAULT_THREAD_NAME};
use serial_test::serial;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

#[test]
fn worker_drop_runs_pending_tasks_in_order() {
  init_tracing();
  let log = Arc::new(Mutex::new(String::new()));

  let worker = WorkerThread::new();
  for ch in ['A', 'B', 'C'] {
    let log = log.clone();
    assert!(worker.submit(move || log.lock().unwrap().push(ch)));
  }
  drop(worker);

  assert_eq!(*log.lock().unwrap(), "ABC");
}

#[test]
fn tasks_run_on_the_worker_thread() {
  let worker = WorkerThread::new();
  let worker_id = worker.thread().expect("worker thread is running").id();
  let seen = Arc::new(Mutex::new(None));

  let s = seen.clone();
  assert!(worker.submit(move || *s.lock().unwrap() = Some(thread::current().id())));
  worker.join().expect("worker thread panicked");

  assert_eq!(*seen.lock().unwrap(), Some(worker_id));
  assert_ne!(worker_id, thread::current().id());
}

#[test]
fn close_rejects_new_tasks_but_keeps_accepted_ones() {
  let hits = Arc::new(AtomicUsize::new(0));
  let worker = WorkerThread::new();

  for _ in 0..ITEMS_LOW {
    let hits = hits.clone();
    assert!(worker.submit(move || {
      hits.fetch_add(1, Ordering::SeqCst);
    }));
  }
  worker.close();
  worker.close();
  assert!(worker.queue().is_closed());

  let h = hits.clone();
  assert!(!worker.submit(move || {
    h.fetch_add(1000, Ordering::SeqCst);
  }));

  drop(worker);
  assert_eq!(hits.load(Ordering::SeqCst), ITEMS_LOW);
}

fn infinite_increment(counter: Arc<AtomicUsize>, queue: Arc<WorkQueue<'static>>) {
  counter.fetch_add(1, Ordering::Relaxed);
  let next = Arc::clone(&queue);
  queue.submit(move || infinite_increment(counter, next));
}

#[test]
#[serial]
fn dropping_worker_stops_self_resubmitting_tasks() {
  init_tracing();
  let count1 = Arc::new(AtomicUsize::new(0));
  let count2 = Arc::new(AtomicUsize::new(0));
  let (done_tx, done_rx) = mpsc::channel();

  let (c1, c2) = (count1.clone(), count2.clone());
  let scenario = thread::spawn(move || {
    let worker = WorkerThread::new();
    let (q1, q2) = (worker.queue_handle(), worker.queue_handle());
    assert!(worker.submit(move || infinite_increment(c1, q1)));
    assert!(worker.submit(move || infinite_increment(c2, q2)));
    thread::sleep(SHORT_TIMEOUT);
    drop(worker);
    let _ = done_tx.send(());
  });

  done_rx
    .recv_timeout(LONG_TIMEOUT)
    .expect("worker shutdown did not finish in time");
  scenario.join().expect("scenario thread panicked");

  let (n1, n2) = (count1.load(Ordering::Relaxed), count2.load(Ordering::Relaxed));
  assert!(n1 > 0 && n2 > 0, "count1: {}, count2: {}", n1, n2);
  // Only the counters' own handles remain; the chains released theirs.
  assert_eq!(Arc::strong_count(&count1), 1);
  assert_eq!(Arc::strong_count(&count2), 1);
}

#[test]
fn builder_configures_the_thread() {
  let worker = WorkerBuilder::new()
    .name("dispatch-test")
    .stack_size(256 * 1024)
    .spawn()
    .expect("failed to spawn worker");
  assert_eq!(worker.thread().and_then(|t| t.name()), Some("dispatch-test"));

  let seen = Arc::new(Mutex::new(None));
  let s = seen.clone();
  assert!(worker.submit(move || {
    *s.lock().unwrap() = thread::current().name().map(str::to_owned);
  }));
  drop(worker);

  assert_eq!(seen.lock().unwrap().as_deref(), Some("dispatch-test"));
}

#[test]
fn default_worker_uses_default_name() {
  let worker = WorkerThread::builder().spawn().expect("failed to spawn worker");
  assert_eq!(worker.thread().and_then(|t| t.name()), Some(DEFAULT_THREAD_NAME));
  let text = format!("{:?}", worker);
  assert!(text.contains(DEFAULT_THREAD_NAME));
  assert!(worker.join().is_ok());
}

#[test]
fn queue_handle_submits_from_other_threads() {
  let hits = Arc::new(AtomicUsize::new(0));
  let worker = WorkerThread::default();

  let handles: Vec<_> = (0..4)
    .map(|_| {
      let queue = worker.queue_handle();
      let hits = hits.clone();
      thread::spawn(move || {
        for _ in 0..ITEMS_MEDIUM {
          let hits = hits.clone();
          assert!(queue.submit(move || {
            hits.fetch_add(1, Ordering::Relaxed);
          }));
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().expect("producer thread panicked");
  }

  worker.join().expect("worker thread panicked");
  assert_eq!(hits.load(Ordering::Relaxed), 4 * ITEMS_MEDIUM);
}

#[test]
fn join_reports_a_panicking_task() {
  let worker = WorkerThread::new();
  assert!(worker.submit(|| panic!("task failure")));

  // The failed drain closes the queue, which releases this wait.
  worker.queue().wait_until_done();
  assert!(!worker.submit(|| {}));
  assert!(worker.join().is_err());
}

#[test]
fn drop_after_a_panicking_task_does_not_hang() {
  init_tracing();
  let (done_tx, done_rx) = mpsc::channel();
  let scenario = thread::spawn(move || {
    let worker = WorkerThread::new();
    worker.submit(|| panic!("task failure"));
    drop(worker);
    let _ = done_tx.send(());
  });

  done_rx
    .recv_timeout(LONG_TIMEOUT)
    .expect("worker drop hung after a task panic");
  scenario.join().expect("scenario thread panicked");
}
