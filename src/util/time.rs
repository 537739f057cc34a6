//! Monotonic clock helpers
//!
//! Latency measurement and rate pacing both work on raw integer timestamps
//! from `clock_gettime(CLOCK_MONOTONIC)`. Calling libc directly is cheaper
//! than `std::time::Instant` and, unlike `Instant`, yields plain numbers
//! that the pacing arithmetic can offset and subtract across threads.

use std::time::Duration;

#[inline(always)]
fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // SAFETY: clock_gettime with a valid timespec pointer is thread-safe
    // and cannot fail for CLOCK_MONOTONIC on Linux.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }

    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}

/// Current monotonic time in nanoseconds.
#[inline(always)]
pub fn now_ns() -> u64 {
    monotonic_ns()
}

/// Current monotonic time in microseconds.
#[inline(always)]
pub fn now_us() -> u64 {
    monotonic_ns() / 1_000
}

/// Current monotonic time in milliseconds.
#[inline(always)]
pub fn now_ms() -> u64 {
    monotonic_ns() / 1_000_000
}

/// Difference between two timestamps, clamped at zero.
///
/// Start and stop may be taken on different threads; a reordered pair must
/// not wrap into a huge unsigned delta.
#[inline(always)]
pub fn safe_delta_ns(start_ns: u64, stop_ns: u64) -> u64 {
    stop_ns.saturating_sub(start_ns)
}

/// Sleep for `us` microseconds.
#[inline]
pub fn sleep_us(us: u64) {
    std::thread::sleep(Duration::from_micros(us));
}
