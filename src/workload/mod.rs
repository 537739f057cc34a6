//! Workload threads
//!
//! Three thread families drive the device: a single paced generator
//! producing small-read requests, per-queue worker pools issuing them,
//! and per-device large-block read/write loops. All of them observe the
//! shared running flag and exit cooperatively.

pub mod generator;
pub mod large_block;
pub mod reader;

use crossbeam::channel::{self, Receiver, Sender};
use std::time::Duration;

/// Per-device offset applied to large-block nominal start times, so the
/// staggered loops don't peak in lockstep across devices.
pub const STAGGER_US: u64 = 1000;

/// Additional offset between one device's read and write loops.
pub const RW_STAGGER_US: u64 = STAGGER_US / 2;

/// Worker queue pop timeout; bounds shutdown latency.
pub const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// One transaction read, owned by the queue between the generator's push
/// and a single worker's pop.
#[derive(Debug)]
pub struct ReadRequest {
    pub dev_index: usize,
    pub offset: u64,
    pub size: u32,
    pub enqueue_time_ns: u64,
}

/// Unbounded FIFO of pending transaction reads.
pub struct ReadQueue {
    pub tx: Sender<ReadRequest>,
    pub rx: Receiver<ReadRequest>,
}

impl ReadQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }
}

impl Default for ReadQueue {
    fn default() -> Self {
        Self::new()
    }
}
