// src/task.rs

//! A type-erased, move-only `FnOnce()` stored inline, without boxing.
//!
//! An [`InlineTask`] reserves a fixed buffer of [`TASK_CAPACITY`] bytes and writes the
//! closure directly into it, next to a pointer to a static per-closure-type vtable.
//! Relocating a task (into a queue, out into a batch) is a plain Rust move, so no
//! allocation happens between submission and invocation.
//!
//! The price is a hard ceiling on captured state. A closure that does not fit is
//! rejected at compile time:
//!
//! ```compile_fail
//! use fibre_dispatch::InlineTask;
//!
//! let big = [0u64; 16];
//! let _task = InlineTask::new(move || assert_eq!(big.len(), 16));
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop, MaybeUninit};
use core::ptr;

/// Number of pointer-sized words available for a task's captured state.
pub const TASK_CAPACITY_WORDS: usize = 4;

/// Number of bytes available for a task's captured state.
pub const TASK_CAPACITY: usize = TASK_CAPACITY_WORDS * mem::size_of::<usize>();

type Storage = MaybeUninit<[usize; TASK_CAPACITY_WORDS]>;

struct TaskVTable {
  invoke: unsafe fn(*mut u8),
  drop: unsafe fn(*mut u8),
}

struct VTableFor<F>(PhantomData<F>);

impl<F: FnOnce()> VTableFor<F> {
  const VTABLE: TaskVTable = TaskVTable {
    invoke: invoke_raw::<F>,
    drop: drop_raw::<F>,
  };

  // Evaluated during monomorphization, so an oversized closure is a build error.
  const FITS: () = assert!(
    InlineTask::<'static>::fits::<F>(),
    "closure state exceeds the inline task capacity"
  );
}

unsafe fn invoke_raw<F: FnOnce()>(slot: *mut u8) {
  let f = ptr::read(slot.cast::<F>());
  f();
}

unsafe fn drop_raw<F>(slot: *mut u8) {
  ptr::drop_in_place(slot.cast::<F>());
}

/// A pending unit of work: a captured closure plus the code to run it, invocable once.
///
/// The lifetime `'a` bounds whatever the closure borrows. Tasks handed to a
/// [`WorkerThread`](crate::WorkerThread) must be `'static`.
pub struct InlineTask<'a> {
  storage: Storage,
  vtable: &'static TaskVTable,
  // Send is granted below only because `new` requires `F: Send`; never Sync.
  _marker: PhantomData<(&'a (), *mut ())>,
}

unsafe impl Send for InlineTask<'_> {}

impl<'a> InlineTask<'a> {
  /// Wraps `f` in inline storage.
  ///
  /// Fails to compile if `F` is larger than [`TASK_CAPACITY`] bytes or more strictly
  /// aligned than a pointer.
  #[inline]
  pub fn new<F>(f: F) -> Self
  where
    F: FnOnce() + Send + 'a,
  {
    #[allow(clippy::let_unit_value)]
    let () = VTableFor::<F>::FITS;

    let mut storage = Storage::uninit();
    // SAFETY: `FITS` guarantees size and alignment of `F` are within the buffer.
    unsafe { ptr::write(storage.as_mut_ptr().cast::<F>(), f) };

    InlineTask {
      storage,
      vtable: &VTableFor::<F>::VTABLE,
      _marker: PhantomData,
    }
  }

  /// Returns `true` if a value of type `F` can be stored in an `InlineTask`.
  pub const fn fits<F>() -> bool {
    mem::size_of::<F>() <= TASK_CAPACITY && mem::align_of::<F>() <= mem::align_of::<Storage>()
  }

  /// Runs the closure, consuming the task.
  #[inline]
  pub fn invoke(self) {
    let mut this = ManuallyDrop::new(self);
    // SAFETY: the slot holds a live `F` matching the vtable; `ManuallyDrop`
    // keeps our `Drop` from touching it again after it has been read out.
    unsafe { (this.vtable.invoke)(this.storage.as_mut_ptr().cast::<u8>()) }
  }
}

impl Drop for InlineTask<'_> {
  fn drop(&mut self) {
    // SAFETY: a task that still exists has not been invoked.
    unsafe { (self.vtable.drop)(self.storage.as_mut_ptr().cast::<u8>()) }
  }
}

impl fmt::Debug for InlineTask<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InlineTask").finish_non_exhaustive()
  }
}
