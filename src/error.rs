use std::fmt;

pub type GcResult<T> = Result<T, GcError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
  /// Zero-byte allocations are not tracked; size 0 marks finalizer-only
  /// blocks.
  ZeroSize,
  /// The payload could not be obtained.
  OutOfMemory { size: usize },
  /// The block record could not be obtained.
  RecordExhausted,
  /// A finalizer was attached to a null address.
  NullAddress,
  /// A finalizer was attached before anything was allocated.
  EmptyHeap,
  /// The work queue is full and the overflow policy forbids growing it.
  WorkQueueOverflow { capacity: usize },
}

impl fmt::Display for GcError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      GcError::ZeroSize => write!(f, "cannot allocate a zero-size block"),
      GcError::OutOfMemory { size } => write!(f, "out of memory allocating {size} bytes"),
      GcError::RecordExhausted => write!(f, "could not allocate a block record"),
      GcError::NullAddress => write!(f, "cannot attach a finalizer to a null address"),
      GcError::EmptyHeap => write!(f, "cannot attach a finalizer to an empty heap"),
      GcError::WorkQueueOverflow { capacity } => {
        write!(f, "work queue overflow (capacity {capacity})")
      }
    }
  }
}

impl std::error::Error for GcError {}
