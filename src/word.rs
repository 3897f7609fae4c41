use std::{mem, ptr::NonNull};

/// Width in bytes of a candidate pointer.
pub const WORD: usize = mem::size_of::<usize>();

/// Number of byte offsets in a payload of `$size` bytes at which a whole
/// pointer-sized word starts.
///
/// # Examples
///
/// ```rust
/// use rcollector::{window_count, word::WORD};
///
/// assert_eq!(window_count!(WORD - 1), 0);
/// assert_eq!(window_count!(WORD), 1);
/// assert_eq!(window_count!(WORD + 3), 4);
/// ```
#[macro_export]
macro_rules! window_count {
  ($size:expr) => {
    ($size).saturating_sub($crate::word::WORD - 1)
  };
}

/// Iterator over every candidate word of a payload, one per byte offset.
///
/// Windows overlap: offset `n` and offset `n + 1` share `WORD - 1` bytes.
/// Reads are unaligned.
pub struct Windows {
  base: *const u8,
  offset: usize,
  count: usize,
}

impl Windows {
  /// # Safety
  ///
  /// `base` must be valid for reads of `size` bytes for as long as the
  /// iterator is alive, and nothing may write to it in the meantime.
  pub unsafe fn new(
    base: NonNull<u8>,
    size: usize,
  ) -> Self {
    Self {
      base: base.as_ptr(),
      offset: 0,
      count: window_count!(size),
    }
  }
}

impl Iterator for Windows {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    if self.offset >= self.count {
      return None;
    }

    // SAFETY: offset + WORD <= size, guaranteed by window_count!
    let word = unsafe { (self.base.add(self.offset) as *const usize).read_unaligned() };
    self.offset += 1;
    Some(word)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let left = self.count - self.offset;
    (left, Some(left))
  }
}
