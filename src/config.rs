/// Default number of entries reserved for the incremental work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What the incremental collector does when its work queue is full.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
  /// Double the capacity and keep going.
  #[default]
  Grow,
  /// Abandon the current cycle and report `GcError::WorkQueueOverflow`.
  Fail,
}

/// Caller-facing knobs, every field optional.
#[derive(Debug, Default, Clone)]
pub struct GcCreateInfo {
  pub queue_capacity: Option<usize>,
  pub overflow: Option<OverflowPolicy>,
}

#[derive(Debug, Copy, Clone)]
pub struct GcSettings {
  pub(crate) queue_capacity: usize,
  pub(crate) overflow: OverflowPolicy,
}

impl Default for GcSettings {
  fn default() -> Self {
    Self {
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      overflow: OverflowPolicy::Grow,
    }
  }
}

impl From<GcCreateInfo> for GcSettings {
  fn from(info: GcCreateInfo) -> Self {
    let mut settings = GcSettings::default();
    info.queue_capacity
      .inspect(|&val| settings.queue_capacity = val.max(1));
    info.overflow.inspect(|&val| settings.overflow = val);
    settings
  }
}

impl GcSettings {
  pub fn queue_capacity(&self) -> usize {
    self.queue_capacity
  }

  pub fn overflow(&self) -> OverflowPolicy {
    self.overflow
  }
}
