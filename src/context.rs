use std::ptr::NonNull;

use crate::{
  block::Mark,
  collector::{Collector, Phase, StepOutcome},
  config::{GcCreateInfo, GcSettings},
  error::GcResult,
  registry::Registry,
};

/// A collected heap: one registry of blocks plus the collector that
/// decides which of them are still reachable from the root.
///
/// The first allocation made through a context is its root for the rest of
/// the context's life. Everything else survives a collection only while a
/// chain of exact addresses leads to it from the root's payload.
///
/// Dropping a context tears it down like [`GcContext::destroy`], through
/// the registry's own `Drop`.
pub struct GcContext {
  registry: Registry,
  collector: Collector,
}

impl GcContext {
  pub fn new() -> Self {
    Self::with_info(GcCreateInfo::default())
  }

  pub fn with_info(info: GcCreateInfo) -> Self {
    let settings = GcSettings::from(info);
    log::debug!(
      "creating gc context, queue capacity {}, overflow {:?}",
      settings.queue_capacity(),
      settings.overflow()
    );

    Self {
      registry: Registry::new(),
      collector: Collector::new(&settings),
    }
  }

  /// Allocates `size` zeroed bytes. The first successful allocation
  /// becomes the root.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> GcResult<NonNull<u8>> {
    self.registry.allocate(size)
  }

  /// Runs `finalizer` with `address` right before the block at `address`
  /// is released. Addresses the heap does not own (a handle held by
  /// another subsystem, say) get a zero-size block that lives exactly as
  /// long as some reachable payload holds that address.
  pub fn attach_finalizer(
    &mut self,
    address: *mut u8,
    finalizer: impl FnOnce(NonNull<u8>) + 'static,
  ) -> GcResult<()> {
    self.registry.attach_finalizer(address, Box::new(finalizer))
  }

  /// Full, synchronous collection. Returns the number of purged blocks.
  pub fn collect_full(&mut self) -> usize {
    self.collector.collect_full(&mut self.registry)
  }

  /// One bounded unit of incremental work, meant to be called once per
  /// tick.
  pub fn collect_step(&mut self) -> GcResult<StepOutcome> {
    self.collector.collect_step(&mut self.registry)
  }

  /// Runs incremental steps until the current cycle sweeps.
  pub fn collect_incremental(&mut self) -> GcResult<usize> {
    self.collector.collect_incremental(&mut self.registry)
  }

  /// Releases every block regardless of reachability and returns how many
  /// there were.
  pub fn destroy(mut self) -> usize {
    self.registry.teardown()
  }

  pub fn phase(&self) -> Phase {
    self.collector.phase()
  }

  pub fn needs_collect(&self) -> bool {
    self.registry.needs_collect()
  }

  pub fn block_count(&self) -> usize {
    self.registry.len()
  }

  pub fn live_bytes(&self) -> usize {
    self.registry.live_bytes()
  }

  pub fn root(&self) -> Option<NonNull<u8>> {
    self
      .registry
      .root()
      .map(|id| self.registry.block(id).address())
  }

  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    self.registry.contains(address)
  }

  pub fn mark_of(
    &self,
    address: *const u8,
  ) -> Option<Mark> {
    self
      .registry
      .find_address(address as usize)
      .map(|id| self.registry.block(id).mark())
  }

  pub fn queue_capacity(&self) -> usize {
    self.collector.queue_capacity()
  }
}

impl Default for GcContext {
  fn default() -> Self {
    Self::new()
  }
}
