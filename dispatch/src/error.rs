use std::fmt;
use std::io;

/// Error returned when a [`WorkerThread`](crate::WorkerThread) could not start its
/// dedicated thread.
#[derive(Debug)]
pub struct SpawnError {
  source: io::Error,
}

impl SpawnError {
  /// The kind of the underlying OS error.
  pub fn kind(&self) -> io::ErrorKind {
    self.source.kind()
  }

  /// Consumes the error, returning the OS error reported by thread creation.
  #[inline]
  pub fn into_inner(self) -> io::Error {
    self.source
  }
}

impl From<io::Error> for SpawnError {
  fn from(source: io::Error) -> Self {
    SpawnError { source }
  }
}

impl fmt::Display for SpawnError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("failed to spawn dispatch worker thread")
  }
}

impl std::error::Error for SpawnError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.source)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::error::Error;

  #[test]
  fn wraps_io_error() {
    let err = SpawnError::from(io::Error::new(io::ErrorKind::OutOfMemory, "no threads left"));
    assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
    assert!(err.to_string().starts_with("failed to spawn dispatch worker thread"));
    assert!(err.source().is_some());
    assert_eq!(err.into_inner().kind(), io::ErrorKind::OutOfMemory);
  }
}
