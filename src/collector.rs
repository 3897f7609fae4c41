//! Reachability analysis over the registry's blocks.
//!
//! Both modes share one primitive: every byte offset of a payload that
//! starts a whole word is read as a candidate pointer and compared against
//! the base address of every block. Only exact base addresses count.

use std::mem;

use crate::{
  block::{BlockId, Mark},
  config::GcSettings,
  error::GcResult,
  queue::WorkQueue,
  registry::Registry,
  word::Windows,
};

/// Position of the incremental state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Phase {
  #[default]
  Unmark,
  Mark,
  Remark,
  Sweep,
}

/// What a single incremental step did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepOutcome {
  /// The heap is empty, there is nothing to collect.
  Idle,
  /// Every block was whitened and the root queued.
  Unmarked { blocks: usize },
  /// One block was scanned, `discovered` new blocks were queued.
  Marked { discovered: usize },
  /// One white block was re-validated against the rest of the heap.
  Remarked { promoted: bool },
  /// The cycle ended, `purged` blocks were released.
  Swept { purged: usize },
}

pub struct Collector {
  phase: Phase,
  queue: WorkQueue,
  scratch: Vec<BlockId>,
  remark_cursor: Option<BlockId>,
  epoch: u64,
}

impl Collector {
  pub fn new(settings: &GcSettings) -> Self {
    Self {
      phase: Phase::Unmark,
      queue: WorkQueue::new(settings.queue_capacity(), settings.overflow()),
      scratch: Vec::new(),
      remark_cursor: None,
      epoch: 0,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn queue_capacity(&self) -> usize {
    self.queue.capacity()
  }

  /// Marks everything reachable from the root and sweeps the rest in one
  /// go. Does nothing unless a block was appended since the last full
  /// collection. Any incremental cycle in progress is abandoned.
  pub fn collect_full(
    &mut self,
    registry: &mut Registry,
  ) -> usize {
    if !registry.needs_collect() {
      return 0;
    }
    let Some(root) = registry.root() else {
      return 0;
    };

    unmark_all(registry);
    self.trace(registry, root);
    let purged = sweep_white(registry);

    registry.clear_needs_collect();
    self.reset();

    purged
  }

  /// Advances the incremental state machine by one unit of work.
  pub fn collect_step(
    &mut self,
    registry: &mut Registry,
  ) -> GcResult<StepOutcome> {
    if self.phase != Phase::Unmark && self.epoch != registry.epoch() {
      log::warn!("blocks were removed behind the collector, restarting cycle");
      self.reset();
    }

    match self.phase {
      Phase::Unmark => self.unmark_step(registry),
      Phase::Mark => self.mark_step(registry),
      Phase::Remark => self.remark_step(registry),
      Phase::Sweep => Ok(self.sweep_step(registry)),
    }
  }

  /// Steps until the current cycle sweeps, returning the purged count.
  pub fn collect_incremental(
    &mut self,
    registry: &mut Registry,
  ) -> GcResult<usize> {
    loop {
      match self.collect_step(registry)? {
        StepOutcome::Idle => return Ok(0),
        StepOutcome::Swept { purged } => return Ok(purged),
        _ => {}
      }
    }
  }

  fn trace(
    &mut self,
    registry: &mut Registry,
    root: BlockId,
  ) {
    registry.set_mark(root, Mark::Black);
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
      self.scratch.clear();
      self.scratch.extend(references(registry, id));

      for &target in &self.scratch {
        if registry.block(target).mark() != Mark::Black {
          registry.set_mark(target, Mark::Black);
          stack.push(target);
        }
      }
    }
  }

  fn unmark_step(
    &mut self,
    registry: &mut Registry,
  ) -> GcResult<StepOutcome> {
    let Some(root) = registry.root() else {
      return Ok(StepOutcome::Idle);
    };

    log::debug!("marking blocks");
    let blocks = unmark_all(registry);
    self.reset();
    self.epoch = registry.epoch();
    registry.set_mark(root, Mark::Black);
    self.push(root)?;
    self.enter(Phase::Mark);

    Ok(StepOutcome::Unmarked { blocks })
  }

  fn mark_step(
    &mut self,
    registry: &mut Registry,
  ) -> GcResult<StepOutcome> {
    let Some(id) = self.queue.pop() else {
      self.enter(Phase::Remark);
      return Ok(StepOutcome::Marked { discovered: 0 });
    };

    let mut targets = mem::take(&mut self.scratch);
    targets.clear();
    targets.extend(references(registry, id));

    let mut discovered = 0;
    let mut pushed = Ok(());
    for &target in &targets {
      if registry.block(target).mark() == Mark::Black {
        continue;
      }
      registry.set_mark(target, Mark::Black);
      pushed = self.push(target);
      if pushed.is_err() {
        break;
      }
      discovered += 1;
    }
    self.scratch = targets;
    pushed?;

    if self.queue.is_empty() {
      self.enter(Phase::Remark);
    }

    Ok(StepOutcome::Marked { discovered })
  }

  fn remark_step(
    &mut self,
    registry: &mut Registry,
  ) -> GcResult<StepOutcome> {
    let candidate = match self.remark_cursor.take() {
      Some(id) => Some(id),
      None => {
        log::debug!("remarking blocks");
        next_white(registry, registry.last())
      }
    };

    let Some(candidate) = candidate else {
      self.enter(Phase::Sweep);
      return Ok(StepOutcome::Remarked { promoted: false });
    };

    if is_referenced(registry, candidate) {
      // the promoted block may hold the only reference to other whites, so
      // the next step starts a fresh pass
      registry.set_mark(candidate, Mark::Black);
      return Ok(StepOutcome::Remarked { promoted: true });
    }

    self.remark_cursor = next_white(registry, registry.block(candidate).prev);
    if self.remark_cursor.is_none() {
      self.enter(Phase::Sweep);
    }

    Ok(StepOutcome::Remarked { promoted: false })
  }

  fn sweep_step(
    &mut self,
    registry: &mut Registry,
  ) -> StepOutcome {
    log::debug!("sweeping blocks");
    let purged = sweep_white(registry);
    self.enter(Phase::Unmark);

    StepOutcome::Swept { purged }
  }

  fn push(
    &mut self,
    id: BlockId,
  ) -> GcResult<()> {
    let pushed = self.queue.push(id);
    if let Err(err) = &pushed {
      log::warn!("abandoning incremental cycle: {err}");
      self.reset();
    }
    pushed
  }

  fn reset(&mut self) {
    self.queue.clear();
    self.remark_cursor = None;
    self.phase = Phase::Unmark;
  }

  fn enter(
    &mut self,
    phase: Phase,
  ) {
    log::debug!("collector phase {:?} -> {:?}", self.phase, phase);
    self.phase = phase;
  }
}

/// Blocks whose base address appears at some byte offset of `id`'s payload,
/// once per occurrence.
fn references(
  registry: &Registry,
  id: BlockId,
) -> impl Iterator<Item = BlockId> + '_ {
  let block = registry.block(id);
  // SAFETY: the registry owns `size` readable bytes at `address`, and the
  // mutator does not run while the collector holds the registry
  let windows = unsafe { Windows::new(block.address(), block.size()) };
  windows.filter_map(move |word| registry.find_address(word))
}

/// First white block at or before `from`, walking toward the root.
fn next_white(
  registry: &Registry,
  from: Option<BlockId>,
) -> Option<BlockId> {
  let mut cursor = from;

  while let Some(id) = cursor {
    let block = registry.block(id);
    if block.mark() == Mark::White {
      return Some(id);
    }
    cursor = block.prev;
  }

  None
}

/// Whether any block that is not white holds `candidate`'s exact address.
fn is_referenced(
  registry: &Registry,
  candidate: BlockId,
) -> bool {
  let target = registry.block(candidate).address().as_ptr() as usize;

  registry
    .ids()
    .map(|id| registry.block(id))
    .filter(|block| block.size() > 0 && block.mark() != Mark::White)
    .any(|block| {
      // SAFETY: as in `references`
      let mut windows = unsafe { Windows::new(block.address(), block.size()) };
      windows.any(|word| word == target)
    })
}

fn unmark_all(registry: &mut Registry) -> usize {
  let mut count = 0;
  let mut cursor = registry.root();

  while let Some(id) = cursor {
    let block = registry.block_mut(id);
    block.mark = Mark::White;
    cursor = block.next;
    count += 1;
  }

  count
}

fn sweep_white(registry: &mut Registry) -> usize {
  let purged = registry.sweep(|block| block.mark() == Mark::White);
  if purged > 0 {
    log::info!("garbage collector: {purged} purges");
  }
  purged
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;
  use crate::{
    config::{GcCreateInfo, OverflowPolicy},
    error::GcError,
    word::WORD,
  };

  fn store(
    from: NonNull<u8>,
    offset: usize,
    to: NonNull<u8>,
  ) {
    unsafe { (from.as_ptr().add(offset) as *mut usize).write_unaligned(to.as_ptr() as usize) };
  }

  fn clear(
    from: NonNull<u8>,
    offset: usize,
  ) {
    unsafe { (from.as_ptr().add(offset) as *mut usize).write_unaligned(0) };
  }

  fn collector() -> Collector {
    Collector::new(&GcSettings::default())
  }

  fn mark_of(
    registry: &Registry,
    address: NonNull<u8>,
  ) -> Mark {
    let id = registry.find_address(address.as_ptr() as usize).unwrap();
    registry.block(id).mark()
  }

  #[test]
  fn full_collection_keeps_reachable_chain() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD * 2).unwrap();
    let b = registry.allocate(WORD).unwrap();
    let garbage = registry.allocate(WORD).unwrap();
    store(root, 0, a);
    store(a, WORD, b);

    let purged = collector().collect_full(&mut registry);

    assert_eq!(purged, 1);
    assert!(registry.contains(root.as_ptr()));
    assert!(registry.contains(a.as_ptr()));
    assert!(registry.contains(b.as_ptr()));
    assert!(!registry.contains(garbage.as_ptr()));
    assert!(!registry.needs_collect());
  }

  #[test]
  fn full_collection_is_a_no_op_when_clean() {
    let mut registry = Registry::new();
    registry.allocate(WORD).unwrap();
    let mut collector = collector();

    assert_eq!(collector.collect_full(&mut registry), 0);
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn unaligned_reference_is_found() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD * 2 + 3).unwrap();
    let a = registry.allocate(1).unwrap();
    store(root, 3, a);

    collector().collect_full(&mut registry);

    assert!(registry.contains(a.as_ptr()));
  }

  #[test]
  fn reference_in_last_word_is_found() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD + 5).unwrap();
    let a = registry.allocate(WORD).unwrap();
    store(root, 5, a);

    collector().collect_full(&mut registry);

    assert!(registry.contains(a.as_ptr()));
  }

  #[test]
  fn interior_pointer_does_not_keep_block_alive() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD * 4).unwrap();
    let interior = unsafe { NonNull::new_unchecked(a.as_ptr().add(WORD)) };
    store(root, 0, interior);

    assert_eq!(collector().collect_full(&mut registry), 1);
    assert!(!registry.contains(a.as_ptr()));
  }

  #[test]
  fn unreachable_cycle_is_collected() {
    let mut registry = Registry::new();
    registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD).unwrap();
    let b = registry.allocate(WORD).unwrap();
    store(a, 0, b);
    store(b, 0, a);

    assert_eq!(collector().collect_full(&mut registry), 2);
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn self_reference_is_harmless() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD).unwrap();
    store(root, 0, root);
    store(a, 0, a);

    assert_eq!(collector().collect_full(&mut registry), 1);
    assert!(registry.contains(root.as_ptr()));
  }

  #[test]
  fn incremental_walks_every_phase_in_order() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD).unwrap();
    registry.allocate(WORD).unwrap();
    store(root, 0, a);
    let mut collector = collector();

    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Unmarked { blocks: 3 })
    );
    assert_eq!(collector.phase(), Phase::Mark);

    // root, then a
    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Marked { discovered: 1 })
    );
    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Marked { discovered: 0 })
    );
    assert_eq!(collector.phase(), Phase::Remark);

    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Remarked { promoted: false })
    );
    assert_eq!(collector.phase(), Phase::Sweep);

    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Swept { purged: 1 })
    );
    assert_eq!(collector.phase(), Phase::Unmark);
    assert!(registry.contains(a.as_ptr()));
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn incremental_on_empty_heap_is_idle() {
    let mut registry = Registry::new();
    let mut collector = collector();

    assert_eq!(collector.collect_step(&mut registry), Ok(StepOutcome::Idle));
    assert_eq!(collector.phase(), Phase::Unmark);
    assert_eq!(collector.collect_incremental(&mut registry), Ok(0));
  }

  #[test]
  fn remark_rescues_reference_stored_after_scan() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD).unwrap();
    let b = registry.allocate(WORD).unwrap();
    let c = registry.allocate(WORD).unwrap();
    store(root, 0, a);
    let mut collector = collector();

    while collector.phase() != Phase::Remark {
      collector.collect_step(&mut registry).unwrap();
    }
    assert_eq!(mark_of(&registry, a), Mark::Black);
    assert_eq!(mark_of(&registry, b), Mark::White);

    // the mutator links b from a, which has already been scanned, and c
    // from b
    store(a, 0, b);
    store(b, 0, c);

    let purged = collector.collect_incremental(&mut registry).unwrap();

    assert_eq!(purged, 0);
    assert_eq!(registry.len(), 4);
  }

  #[test]
  fn block_allocated_mid_cycle_survives_it() {
    let mut registry = Registry::new();
    registry.allocate(WORD).unwrap();
    registry.allocate(WORD).unwrap();
    let mut collector = collector();

    collector.collect_step(&mut registry).unwrap();
    let late = registry.allocate(WORD).unwrap();
    assert_eq!(mark_of(&registry, late), Mark::Unset);

    assert_eq!(collector.collect_incremental(&mut registry), Ok(1));
    assert!(registry.contains(late.as_ptr()));

    assert_eq!(collector.collect_incremental(&mut registry), Ok(1));
    assert!(!registry.contains(late.as_ptr()));
  }

  #[test]
  fn unset_block_counts_as_a_source_during_remark() {
    let mut registry = Registry::new();
    registry.allocate(WORD).unwrap();
    let orphan = registry.allocate(WORD).unwrap();
    let mut collector = collector();

    collector.collect_step(&mut registry).unwrap();
    let holder = registry.allocate(WORD).unwrap();
    store(holder, 0, orphan);

    assert_eq!(collector.collect_incremental(&mut registry), Ok(0));
    assert!(registry.contains(orphan.as_ptr()));
  }

  #[test]
  fn overflow_with_fail_policy_abandons_cycle() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD * 2).unwrap();
    let a = registry.allocate(WORD).unwrap();
    let b = registry.allocate(WORD).unwrap();
    store(root, 0, a);
    store(root, WORD, b);
    let settings = GcSettings::from(GcCreateInfo {
      queue_capacity: Some(1),
      overflow: Some(OverflowPolicy::Fail),
    });
    let mut collector = Collector::new(&settings);

    collector.collect_step(&mut registry).unwrap();
    assert_eq!(
      collector.collect_step(&mut registry),
      Err(GcError::WorkQueueOverflow { capacity: 1 })
    );
    assert_eq!(collector.phase(), Phase::Unmark);
    assert_eq!(registry.len(), 3);

    // full collection is unaffected
    assert_eq!(collector.collect_full(&mut registry), 0);
    assert_eq!(registry.len(), 3);
  }

  #[test]
  fn overflow_with_grow_policy_finishes_cycle() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD * 8).unwrap();
    for slot in 0..8 {
      let child = registry.allocate(WORD).unwrap();
      store(root, slot * WORD, child);
    }
    for _ in 0..3 {
      registry.allocate(WORD).unwrap();
    }
    let settings = GcSettings::from(GcCreateInfo {
      queue_capacity: Some(2),
      ..Default::default()
    });
    let mut collector = Collector::new(&settings);

    assert_eq!(collector.collect_incremental(&mut registry), Ok(3));
    assert_eq!(registry.len(), 9);
    assert!(collector.queue_capacity() >= 8);
  }

  #[test]
  fn remark_does_not_need_queue_room_for_garbage() {
    let mut registry = Registry::new();
    for _ in 0..5 {
      registry.allocate(WORD).unwrap();
    }
    let settings = GcSettings::from(GcCreateInfo {
      queue_capacity: Some(2),
      overflow: Some(OverflowPolicy::Fail),
    });
    let mut collector = Collector::new(&settings);

    assert_eq!(collector.collect_incremental(&mut registry), Ok(4));
    assert_eq!(registry.len(), 1);
    assert_eq!(collector.queue_capacity(), 2);
  }

  #[test]
  fn teardown_mid_cycle_restarts_the_cycle() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD * 3).unwrap();
    for slot in 0..3 {
      let child = registry.allocate(WORD).unwrap();
      store(root, slot * WORD, child);
    }
    let mut collector = collector();

    collector.collect_step(&mut registry).unwrap();
    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Marked { discovered: 3 })
    );

    registry.teardown();
    registry.allocate(WORD).unwrap();
    registry.allocate(WORD).unwrap();

    assert_eq!(
      collector.collect_step(&mut registry),
      Ok(StepOutcome::Unmarked { blocks: 2 })
    );
    assert_eq!(collector.collect_incremental(&mut registry), Ok(1));
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn full_collection_resets_incremental_cycle() {
    let mut registry = Registry::new();
    let root = registry.allocate(WORD).unwrap();
    let a = registry.allocate(WORD).unwrap();
    registry.allocate(WORD).unwrap();
    store(root, 0, a);
    let mut collector = collector();

    collector.collect_step(&mut registry).unwrap();
    collector.collect_step(&mut registry).unwrap();
    assert_eq!(collector.phase(), Phase::Mark);

    assert_eq!(collector.collect_full(&mut registry), 1);
    assert_eq!(collector.phase(), Phase::Unmark);

    clear(root, 0);
    assert_eq!(collector.collect_incremental(&mut registry), Ok(1));
    assert!(!registry.contains(a.as_ptr()));
  }
}
