//! Transaction read workers
//!
//! Each queue has a fixed pool of workers popping requests and issuing
//! the read through the engine. Every successful read lands in three
//! histograms: the raw global and per-device views timed strictly around
//! the I/O, and the end-to-end view timed from request creation, which
//! diverges from raw as the queue deepens.

use super::POP_TIMEOUT;
use crate::coordinator::RunContext;
use crate::engine;
use crate::util::buffer::AlignedBuffer;
use crate::util::time;
use std::sync::atomic::Ordering;

pub fn run(ctx: &RunContext, queue_index: usize) {
    let rx = ctx.queues[queue_index].rx.clone();

    // One reusable buffer sized for the largest device read.
    let mut buf = AlignedBuffer::new(ctx.max_read_bytes());

    while ctx.is_running() {
        let req = match rx.recv_timeout(POP_TIMEOUT) {
            Ok(req) => req,
            Err(_) => continue,
        };

        let dev = &ctx.devices[req.dev_index];
        let slice = &mut buf.as_mut_slice()[..req.size as usize];

        let raw_start_ns = time::now_ns();

        if let Ok(stop_ns) = engine::read(dev, req.offset, slice) {
            let raw_ns = time::safe_delta_ns(raw_start_ns, stop_ns);

            ctx.hist.raw_reads.record_ns(raw_ns);
            dev.raw_read_histogram.record_ns(raw_ns);
            ctx.hist
                .reads
                .record_ns(time::safe_delta_ns(req.enqueue_time_ns, stop_ns));
        }

        ctx.reqs_queued.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::coordinator::RunContext;
    use crate::device::fd_pool::OpenFlags;
    use crate::device::Device;
    use crate::stats::HistScale;
    use crate::workload::ReadRequest;
    use std::io::Write as _;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;

    const BUFFERED: OpenFlags = OpenFlags {
        direct: false,
        dsync: false,
    };

    fn test_ctx() -> (NamedTempFile, Arc<RunContext>) {
        let cfg = Config::from_settings([
            ("device-names".to_string(), "unused".to_string()),
            ("test-duration-sec".to_string(), "10".to_string()),
            ("read-reqs-per-sec".to_string(), "1000".to_string()),
            ("write-reqs-per-sec".to_string(), "0".to_string()),
            ("num-queues".to_string(), "1".to_string()),
            ("threads-per-queue".to_string(), "1".to_string()),
        ])
        .unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 1 << 20]).unwrap();
        file.flush().unwrap();

        let dev = Device::setup(
            file.path().to_str().unwrap(),
            0,
            &cfg,
            BUFFERED,
            HistScale::Milliseconds,
        )
        .unwrap();

        (file, RunContext::build(cfg, vec![dev]))
    }

    #[test]
    fn test_worker_consumes_and_reports() {
        let (_file, ctx) = test_ctx();
        let dev = &ctx.devices[0];

        const N: u32 = 20;
        for i in 0..N {
            let offset = (i as u64 % dev.num_read_offsets) * dev.min_op_bytes as u64;
            ctx.queues[0].tx.send(ReadRequest {
                dev_index: 0,
                offset,
                size: dev.read_bytes,
                enqueue_time_ns: time::now_ns(),
            })
            .unwrap();
            ctx.reqs_queued.fetch_add(1, Ordering::Relaxed);
        }

        let handle = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || run(&ctx, 0))
        };

        // Wait for the worker to drain the queue.
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctx.reqs_queued.load(Ordering::Relaxed) != 0 {
            assert!(Instant::now() < deadline, "worker did not drain queue");
            thread::sleep(Duration::from_millis(5));
        }

        ctx.halt();
        handle.join().unwrap();

        assert_eq!(ctx.hist.raw_reads.len(), N as u64);
        assert_eq!(ctx.hist.reads.len(), N as u64);
        assert_eq!(ctx.devices[0].raw_read_histogram.len(), N as u64);

        // End-to-end includes queue wait, so its extreme can only be
        // at or above the raw extreme.
        assert!(ctx.hist.reads.max_ns() >= ctx.hist.raw_reads.max_ns());
    }

    #[test]
    fn test_worker_skips_sample_on_io_error() {
        let (_file, ctx) = test_ctx();
        let dev = &ctx.devices[0];

        // Offset past EOF: the engine reports an error, the sample is
        // dropped, but the request is still consumed and accounted.
        ctx.queues[0].tx.send(ReadRequest {
            dev_index: 0,
            offset: dev.size_bytes,
            size: dev.read_bytes,
            enqueue_time_ns: time::now_ns(),
        })
        .unwrap();
        ctx.reqs_queued.fetch_add(1, Ordering::Relaxed);

        let handle = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || run(&ctx, 0))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while ctx.reqs_queued.load(Ordering::Relaxed) != 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        // The run keeps going: an I/O error is not an overload.
        assert!(ctx.is_running());

        ctx.halt();
        handle.join().unwrap();

        assert_eq!(ctx.hist.raw_reads.len(), 0);
        assert_eq!(ctx.hist.reads.len(), 0);
    }

    #[test]
    fn test_worker_exits_via_pop_timeout() {
        let (_file, ctx) = test_ctx();

        let handle = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || run(&ctx, 0))
        };

        thread::sleep(Duration::from_millis(20));
        let halted_at = Instant::now();
        ctx.halt();
        handle.join().unwrap();

        // Bounded by the 100 ms pop timeout plus slack.
        assert!(halted_at.elapsed() < Duration::from_millis(400));
    }
}
