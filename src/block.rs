use std::{fmt, ptr::NonNull};

/// Cleanup callback run with a block's address right before the block is
/// released.
pub type Finalizer = Box<dyn FnOnce(NonNull<u8>)>;

/// Per-block collection state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Mark {
  /// Allocated after the last unmark pass, not part of any cycle yet.
  #[default]
  Unset,
  /// Provisionally unreachable, swept if still white at the end of a cycle.
  White,
  /// Reachable in the current cycle.
  Black,
}

/// Handle of a block record inside the registry arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

pub struct Block {
  address: NonNull<u8>,
  size: usize,
  finalizer: Option<Finalizer>,
  pub(crate) mark: Mark,
  pub(crate) next: Option<BlockId>,
  pub(crate) prev: Option<BlockId>,
}

impl Block {
  /// A block owning `size` bytes of `calloc`ed payload at `address`.
  pub(crate) fn new(
    address: NonNull<u8>,
    size: usize,
  ) -> Self {
    Self {
      address,
      size,
      finalizer: None,
      mark: Mark::Unset,
      next: None,
      prev: None,
    }
  }

  /// A zero-size block that only ties `finalizer` to `address`.
  pub(crate) fn finalizer_only(
    address: NonNull<u8>,
    finalizer: Finalizer,
  ) -> Self {
    let mut block = Self::new(address, 0);
    block.finalizer = Some(finalizer);
    block
  }

  pub fn address(&self) -> NonNull<u8> {
    self.address
  }

  /// Payload length; 0 for finalizer-only blocks, which are never scanned
  /// and whose address is never freed.
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn mark(&self) -> Mark {
    self.mark
  }

  pub fn has_finalizer(&self) -> bool {
    self.finalizer.is_some()
  }

  pub(crate) fn set_finalizer(
    &mut self,
    finalizer: Finalizer,
  ) {
    self.finalizer = Some(finalizer);
  }

  /// Runs the finalizer, then frees the payload if the block owns one.
  ///
  /// # Safety
  ///
  /// The block must already be unlinked, and a non-zero `size` must mean
  /// `address` came from `libc::calloc` and was not freed yet.
  pub(crate) unsafe fn release(mut self) {
    if let Some(finalizer) = self.finalizer.take() {
      finalizer(self.address);
    }

    if self.size > 0 {
      unsafe { libc::free(self.address.as_ptr() as *mut libc::c_void) };
    }
  }
}

impl fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Block")
      .field("address", &self.address)
      .field("size", &self.size)
      .field("finalizer", &self.finalizer.is_some())
      .field("mark", &self.mark)
      .field("next", &self.next)
      .field("prev", &self.prev)
      .finish()
  }
}
