use crate::{
  block::BlockId,
  config::OverflowPolicy,
  error::{GcError, GcResult},
};

/// LIFO list of blocks waiting for the incremental collector.
///
/// Capacity is reserved up front and never exceeded silently: a full queue
/// either grows or rejects the push, depending on its policy.
#[derive(Debug)]
pub struct WorkQueue {
  items: Vec<BlockId>,
  capacity: usize,
  policy: OverflowPolicy,
}

impl WorkQueue {
  pub fn new(
    capacity: usize,
    policy: OverflowPolicy,
  ) -> Self {
    let capacity = capacity.max(1);
    Self {
      items: Vec::with_capacity(capacity),
      capacity,
      policy,
    }
  }

  pub fn push(
    &mut self,
    id: BlockId,
  ) -> GcResult<()> {
    if self.items.len() == self.capacity {
      match self.policy {
        OverflowPolicy::Fail => {
          return Err(GcError::WorkQueueOverflow {
            capacity: self.capacity,
          });
        }
        OverflowPolicy::Grow => {
          let grown = self.capacity * 2;
          log::warn!("work queue full at {} entries, growing to {}", self.capacity, grown);
          self.items.reserve_exact(grown - self.items.len());
          self.capacity = grown;
        }
      }
    }

    self.items.push(id);
    Ok(())
  }

  pub fn pop(&mut self) -> Option<BlockId> {
    self.items.pop()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn clear(&mut self) {
    self.items.clear();
  }
}
