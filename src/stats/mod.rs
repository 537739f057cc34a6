//! Latency statistics
//!
//! Four global histograms cover the two large-block streams and the two
//! views of transaction reads (raw device latency vs end-to-end including
//! queue wait); each device additionally carries its own raw-read histogram.

pub mod histogram;

pub use histogram::{HistScale, LatencyHistogram};

/// The four process-global latency histograms.
pub struct HistogramSet {
    pub large_block_reads: LatencyHistogram,
    pub large_block_writes: LatencyHistogram,
    /// Transaction reads, timed strictly around the I/O.
    pub raw_reads: LatencyHistogram,
    /// Transaction reads, timed from request creation (includes queue wait).
    pub reads: LatencyHistogram,
}

impl HistogramSet {
    pub fn new(scale: HistScale) -> Self {
        Self {
            large_block_reads: LatencyHistogram::new(scale),
            large_block_writes: LatencyHistogram::new(scale),
            raw_reads: LatencyHistogram::new(scale),
            reads: LatencyHistogram::new(scale),
        }
    }
}
