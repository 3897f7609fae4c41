//! # rcollector - A Conservative Mark-and-Sweep Collector
//!
//! This crate provides a small **conservative garbage collector** for
//! opaque, untyped allocations. It never looks at types: a block is alive
//! when the exact address of its first byte can be found, at any byte
//! offset, inside the payload of another live block, starting from the
//! root.
//!
//! ## Overview
//!
//! ```text
//!   Block List (allocation order):
//!
//!   root                                                      last
//!    │                                                          │
//!    ▼                                                          ▼
//!   ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────────┐
//!   │ payload  │◄──►│ payload  │◄──►│ payload  │◄──►│ size 0       │
//!   │ 16 bytes │    │ 24 bytes │    │ 8 bytes  │    │ finalizer    │
//!   │ [ A  ] ──┼──┐ │          │    │          │    │ only (handle)│
//!   └──────────┘  │ └──────────┘    └──────────┘    └──────────────┘
//!                 │  ▲ A
//!                 └──┘
//!
//!   The first allocation is the root, forever. Anything not reachable
//!   from it through exact addresses is garbage.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rcollector
//!   ├── word       - Pointer width, window_count!, payload word iterator
//!   ├── block      - Block record, marks, finalizers
//!   ├── registry   - Arena + doubly linked block list, allocation, sweep
//!   ├── queue      - Bounded work queue for incremental marking
//!   ├── collector  - Full and incremental reachability analysis
//!   ├── config     - GcCreateInfo / GcSettings
//!   ├── error      - GcError
//!   └── context    - GcContext, the public entry point
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rcollector::GcContext;
//!
//! let mut ctx = GcContext::new();
//!
//! let root = ctx.allocate(16).unwrap();
//! let child = ctx.allocate(8).unwrap();
//! let garbage = ctx.allocate(8).unwrap();
//!
//! // The root refers to `child` by its exact address.
//! unsafe { (root.as_ptr() as *mut usize).write_unaligned(child.as_ptr() as usize) };
//!
//! assert_eq!(ctx.collect_full(), 1);
//! assert!(ctx.contains(child.as_ptr()));
//! assert!(!ctx.contains(garbage.as_ptr()));
//! ```
//!
//! ## How It Works
//!
//! Every byte offset of a payload that starts a whole word is read as a
//! candidate pointer:
//!
//! ```text
//!   Payload of 12 bytes, 8-byte words:
//!
//!   offset  0   1   2   3   4   5   6   7   8   9  10  11
//!         ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┐
//!         │   │   │   │   │   │   │   │   │   │   │   │   │
//!         └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┘
//!          [ window 0                    ]
//!              [ window 1                    ]
//!                  ...
//!                          [ window 4                    ]
//! ```
//!
//! A window that equals the base address of a block marks that block
//! reachable. Interior pointers do not count; incidental bit patterns
//! that happen to equal an address do.
//!
//! Collection runs in one of two modes:
//!
//! ```text
//!   Full:         whiten all ─► trace from root ─► sweep white
//!
//!   Incremental:  ┌────────┐   ┌──────┐   ┌────────┐   ┌───────┐
//!                 │ UNMARK │──►│ MARK │──►│ REMARK │──►│ SWEEP │──┐
//!                 └────────┘   └──────┘   └────────┘   └───────┘  │
//!                      ▲        1 block    1 block                │
//!                      │        per step   per step               │
//!                      └──────────────────────────────────────────┘
//! ```
//!
//! REMARK re-validates every block still white against all non-white
//! payloads, catching references the mutator stored between steps.
//!
//! ## Finalizers
//!
//! A finalizer runs with the block's address right before the block is
//! released, whether by a sweep or by teardown. Attaching one to an
//! address the heap does not own creates a zero-size block: it is never
//! scanned or freed, and its finalizer runs once no reachable payload
//! holds that address anymore. This is how external resources such as
//! GPU handles ride along with the heap.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: contexts are neither `Send` nor `Sync`
//! - **Quadratic scanning**: each window is compared against every block
//! - **No compaction**: blocks never move
//! - **One root**: the first allocation is the only entry point
//!
//! ## Safety
//!
//! Payloads are raw memory handed out as `NonNull<u8>`. Writing to them is
//! up to the caller, and must stay within the allocated size and stop once
//! the block has been collected.

pub mod block;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod queue;
pub mod registry;
pub mod word;

pub use block::{BlockId, Finalizer, Mark};
pub use collector::{Collector, Phase, StepOutcome};
pub use config::{DEFAULT_QUEUE_CAPACITY, GcCreateInfo, GcSettings, OverflowPolicy};
pub use context::GcContext;
pub use error::{GcError, GcResult};
pub use registry::Registry;
