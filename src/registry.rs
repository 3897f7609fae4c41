use std::ptr::{self, NonNull};

use crate::{
  block::{Block, BlockId, Finalizer, Mark},
  error::{GcError, GcResult},
};

enum Slot {
  Occupied(Block),
  Vacant { next_free: Option<usize> },
}

/// Owner of every block: an arena of records threaded into a doubly linked
/// list in allocation order, with vacated records chained into a free-list.
///
/// The first block ever appended is the root. It is never swept and stays
/// the head of the list until teardown.
pub struct Registry {
  slots: Vec<Slot>,
  free_head: Option<usize>,
  root: Option<BlockId>,
  last: Option<BlockId>,
  len: usize,
  live_bytes: usize,
  needs_collect: bool,
  epoch: u64,
}

impl Registry {
  pub fn new() -> Self {
    Self {
      slots: Vec::new(),
      free_head: None,
      root: None,
      last: None,
      len: 0,
      live_bytes: 0,
      needs_collect: false,
      epoch: 0,
    }
  }

  /// Allocates `size` zeroed bytes and tracks them as a new tail block.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> GcResult<NonNull<u8>> {
    if size == 0 {
      return Err(GcError::ZeroSize);
    }

    // SAFETY: plain calloc, checked for null below
    let raw = unsafe { libc::calloc(1, size) } as *mut u8;
    let Some(address) = NonNull::new(raw) else {
      return Err(GcError::OutOfMemory { size });
    };

    if let Err(err) = self.insert(Block::new(address, size)) {
      // SAFETY: just obtained from calloc and never published
      unsafe { libc::free(raw as *mut libc::c_void) };
      return Err(err);
    }

    self.live_bytes += size;
    Ok(address)
  }

  /// Ties `finalizer` to the block at `address`, replacing any previous
  /// one. An address no block owns gets a zero-size, finalizer-only block
  /// of its own.
  pub fn attach_finalizer(
    &mut self,
    address: *mut u8,
    finalizer: Finalizer,
  ) -> GcResult<()> {
    let Some(address) = NonNull::new(address) else {
      return Err(GcError::NullAddress);
    };

    if self.is_empty() {
      return Err(GcError::EmptyHeap);
    }

    if let Some(id) = self.find_from_tail(address) {
      self.block_mut(id).set_finalizer(finalizer);
      return Ok(());
    }

    self.insert(Block::finalizer_only(address, finalizer))?;
    Ok(())
  }

  /// Releases every non-root block for which `purge` holds, walking from
  /// the tail. Returns the number of blocks released.
  pub(crate) fn sweep(
    &mut self,
    mut purge: impl FnMut(&Block) -> bool,
  ) -> usize {
    let mut purged = 0;
    let mut cursor = self.last;

    while let Some(id) = cursor {
      let block = self.block(id);
      cursor = block.prev;

      if Some(id) == self.root || !purge(block) {
        continue;
      }

      let block = self.unlink(id);
      self.live_bytes -= block.size();
      log::trace!("sweeping block {:?} ({} bytes)", block.address(), block.size());
      // SAFETY: unlinked above, payload owned by the block
      unsafe { block.release() };
      purged += 1;
    }

    if purged > 0 {
      self.epoch += 1;
    }
    purged
  }

  /// Releases every block, tail first, regardless of marks. The registry
  /// is empty afterwards and may be reused; the next allocation becomes a
  /// new root.
  pub fn teardown(&mut self) -> usize {
    let mut destroyed = 0;
    let mut cursor = self.last;

    while let Some(id) = cursor {
      let block = self.unlink(id);
      cursor = block.prev;
      log::trace!("destroying block {:?} ({} bytes)", block.address(), block.size());
      // SAFETY: unlinked above, payload owned by the block
      unsafe { block.release() };
      destroyed += 1;
    }

    self.slots = Vec::new();
    self.free_head = None;
    self.root = None;
    self.last = None;
    self.len = 0;
    self.live_bytes = 0;
    self.needs_collect = false;
    self.epoch += 1;

    if destroyed > 0 {
      log::info!("garbage collector: {destroyed} destroys");
    }
    destroyed
  }

  pub fn root(&self) -> Option<BlockId> {
    self.root
  }

  pub fn last(&self) -> Option<BlockId> {
    self.last
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.root.is_none()
  }

  /// Bytes of payload currently owned by the registry.
  pub fn live_bytes(&self) -> usize {
    self.live_bytes
  }

  /// Set once a second block has been appended since the last full
  /// collection.
  pub fn needs_collect(&self) -> bool {
    self.needs_collect
  }

  /// Bumped whenever blocks leave the registry, invalidating any
  /// `BlockId` held from before.
  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub(crate) fn clear_needs_collect(&mut self) {
    self.needs_collect = false;
  }

  pub fn block(
    &self,
    id: BlockId,
  ) -> &Block {
    match &self.slots[id.0] {
      Slot::Occupied(block) => block,
      Slot::Vacant { .. } => panic!("stale block id {id:?}"),
    }
  }

  pub(crate) fn block_mut(
    &mut self,
    id: BlockId,
  ) -> &mut Block {
    match &mut self.slots[id.0] {
      Slot::Occupied(block) => block,
      Slot::Vacant { .. } => panic!("stale block id {id:?}"),
    }
  }

  pub(crate) fn set_mark(
    &mut self,
    id: BlockId,
    mark: Mark,
  ) {
    self.block_mut(id).mark = mark;
  }

  /// Block ids in list order, root first.
  pub fn ids(&self) -> Ids<'_> {
    Ids {
      registry: self,
      cursor: self.root,
    }
  }

  /// First block in list order whose address equals `word`.
  pub fn find_address(
    &self,
    word: usize,
  ) -> Option<BlockId> {
    if word == 0 {
      return None;
    }
    self.ids()
      .find(|&id| self.block(id).address().as_ptr() as usize == word)
  }

  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    self.find_address(address as usize).is_some()
  }

  fn find_from_tail(
    &self,
    address: NonNull<u8>,
  ) -> Option<BlockId> {
    let mut cursor = self.last;

    while let Some(id) = cursor {
      let block = self.block(id);
      if ptr::eq(block.address().as_ptr(), address.as_ptr()) {
        return Some(id);
      }
      cursor = block.prev;
    }

    None
  }

  fn insert(
    &mut self,
    block: Block,
  ) -> GcResult<BlockId> {
    let id = match self.free_head {
      Some(index) => {
        let Slot::Vacant { next_free } = self.slots[index] else {
          unreachable!("free-list points at an occupied slot");
        };
        self.free_head = next_free;
        self.slots[index] = Slot::Occupied(block);
        BlockId(index)
      }
      None => {
        self.slots
          .try_reserve(1)
          .map_err(|_| GcError::RecordExhausted)?;
        self.slots.push(Slot::Occupied(block));
        BlockId(self.slots.len() - 1)
      }
    };

    self.append(id);
    Ok(id)
  }

  fn append(
    &mut self,
    id: BlockId,
  ) {
    self.len += 1;

    let Some(last) = self.last else {
      self.root = Some(id);
      self.last = Some(id);
      return;
    };

    self.block_mut(last).next = Some(id);
    self.block_mut(id).prev = Some(last);
    self.last = Some(id);
    self.needs_collect = true;
  }

  fn unlink(
    &mut self,
    id: BlockId,
  ) -> Block {
    let (prev, next) = {
      let block = self.block(id);
      (block.prev, block.next)
    };

    match prev {
      Some(prev) => self.block_mut(prev).next = next,
      None => self.root = next,
    }
    match next {
      Some(next) => self.block_mut(next).prev = prev,
      None => self.last = prev,
    }

    let slot = std::mem::replace(
      &mut self.slots[id.0],
      Slot::Vacant {
        next_free: self.free_head,
      },
    );
    self.free_head = Some(id.0);
    self.len -= 1;

    match slot {
      Slot::Occupied(block) => block,
      Slot::Vacant { .. } => unreachable!("unlinked a vacant slot"),
    }
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for Registry {
  fn drop(&mut self) {
    self.teardown();
  }
}

pub struct Ids<'a> {
  registry: &'a Registry,
  cursor: Option<BlockId>,
}

impl Iterator for Ids<'_> {
  type Item = BlockId;

  fn next(&mut self) -> Option<BlockId> {
    let id = self.cursor?;
    self.cursor = self.registry.block(id).next;
    Some(id)
  }
}
