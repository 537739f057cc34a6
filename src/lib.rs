//! flashcert - flash-device certification workload generator
//!
//! flashcert drives the I/O pattern of a real-time, flash-backed record store
//! against raw block devices: a rate-paced stream of small random transaction
//! reads fanned out across worker queues, plus per-device constant-rate
//! large-block read and write streams modeling defragmentation and
//! write-back. All I/O is direct (page-cache bypass) with aligned buffers,
//! and per-operation latency is reported as histograms on a fixed tick.
//!
//! # Architecture
//!
//! - **Paced generator**: drift-corrected request production at a configured
//!   aggregate rate, round-robin across queues
//! - **Worker pools**: fixed threads per queue issuing the reads and feeding
//!   raw and end-to-end latency histograms
//! - **Large-block loops**: two per device (read + write-back), staggered to
//!   avoid synchronous peaks
//! - **Overload detection**: queue-depth and scheduling-lag thresholds stop
//!   the run when the drive can't keep up

pub mod config;
pub mod coordinator;
pub mod device;
pub mod engine;
pub mod stats;
pub mod util;
pub mod workload;

pub use config::Config;

/// Result type used throughout flashcert
pub type Result<T> = anyhow::Result<T>;
