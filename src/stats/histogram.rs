//! Thread-safe latency histogram
//!
//! Wraps `hdrhistogram` for concurrent insertion from worker threads and
//! periodic snapshot dumps from the reporter. Samples are recorded in
//! nanoseconds; dumps render power-of-two buckets in the configured unit
//! (milliseconds by default, microseconds for fine-grained runs).
//!
//! The reporter's snapshot is taken under the same lock as insertion, so a
//! dump observes a consistent histogram; samples landing during rendering
//! show up in the next tick.

use hdrhistogram::Histogram;
use std::fmt::Write as _;
use std::sync::Mutex;

/// Bucket scale for histogram dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistScale {
    Milliseconds,
    Microseconds,
}

impl HistScale {
    #[inline]
    fn unit_ns(self) -> u64 {
        match self {
            HistScale::Milliseconds => 1_000_000,
            HistScale::Microseconds => 1_000,
        }
    }
}

/// Latency histogram safe for insertion from many threads.
///
/// Tracks 1 ns through 1 hour at 3 significant digits. Insertion is a
/// short critical section; the histogram itself records in O(1).
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: Mutex<Histogram<u64>>,
    scale: HistScale,
}

impl LatencyHistogram {
    pub fn new(scale: HistScale) -> Self {
        let histogram = Histogram::new_with_bounds(1, 3_600_000_000_000, 3)
            .expect("histogram bounds are valid");

        Self {
            inner: Mutex::new(histogram),
            scale,
        }
    }

    /// Record one latency sample in nanoseconds.
    ///
    /// Values are clamped into the trackable range rather than dropped.
    #[inline]
    pub fn record_ns(&self, ns: u64) {
        self.inner.lock().unwrap().saturating_record(ns.max(1));
    }

    /// Number of samples recorded so far.
    pub fn len(&self) -> u64 {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest recorded sample in nanoseconds, 0 when empty.
    pub fn max_ns(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        if inner.is_empty() {
            0
        } else {
            inner.max()
        }
    }

    /// Render the dump block for this histogram.
    ///
    /// Format: a header `TAG (N total)` followed by power-of-two bucket
    /// cells `(bb: cccccccccc)`, four per line. Bucket `i` counts samples
    /// whose value in the configured unit lies in `[2^i, 2^(i+1))`.
    pub fn render(&self, tag: &str) -> String {
        let snapshot = self.inner.lock().unwrap().clone();
        let unit_ns = self.scale.unit_ns();

        let mut out = String::new();
        let _ = writeln!(out, "{} ({} total)", tag, snapshot.len());

        if snapshot.is_empty() {
            return out;
        }

        let max_units = snapshot.max() / unit_ns;
        let last_bucket = 63 - (max_units | 1).leading_zeros();

        for bucket in 0..=last_bucket {
            let low_ns = if bucket == 0 {
                1
            } else {
                (1u64 << bucket) * unit_ns
            };
            let high_ns = (1u64 << (bucket + 1)) * unit_ns - 1;
            let count = snapshot.count_between(low_ns, high_ns);

            let _ = write!(out, " ({:02}: {:010})", bucket, count);
            if bucket % 4 == 3 {
                out.push('\n');
            }
        }

        if !out.ends_with('\n') {
            out.push('\n');
        }

        out
    }

    /// Print the dump block to standard output.
    pub fn dump(&self, tag: &str) {
        print!("{}", self.render(tag));
    }
}
