//! Run lifecycle
//!
//! The coordinator owns the whole run: it probes the devices, assembles
//! the shared [`RunContext`], launches the thread inventory (large-block
//! loops when writes are enabled, the per-queue worker pools, the
//! generator), prints the periodic report, and tears everything down
//! cooperatively through the shared running flag.
//!
//! The only process-global state is the signal handler; everything else
//! hangs off the context.

use crate::config::Config;
use crate::device::fd_pool::OpenFlags;
use crate::device::{scheduler, Device};
use crate::stats::HistogramSet;
use crate::util::buffer::BUFFER_ALIGN;
use crate::util::time;
use crate::workload::large_block::Direction;
use crate::workload::{generator, large_block, reader, ReadQueue, STAGGER_US};
use crate::Result;
use anyhow::Context as _;
use log::info;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Shared state for one run, constructed before any workload thread
/// starts and passed by `Arc` to all of them.
pub struct RunContext {
    pub cfg: Config,
    pub devices: Vec<Device>,
    pub queues: Vec<ReadQueue>,
    pub hist: HistogramSet,
    pub running: AtomicBool,
    /// Monotonic µs timestamp fixed once, just before spawn; all pacing
    /// targets are computed against it.
    pub run_start_us: u64,
    /// Requests currently between generator push and worker completion.
    pub reqs_queued: AtomicU32,
}

impl RunContext {
    /// Assemble the context; the run clock starts here.
    pub fn build(cfg: Config, devices: Vec<Device>) -> Arc<RunContext> {
        let queues = (0..cfg.num_queues).map(|_| ReadQueue::new()).collect();
        let hist = HistogramSet::new(cfg.scale());

        Arc::new(RunContext {
            queues,
            hist,
            running: AtomicBool::new(true),
            run_start_us: time::now_us(),
            reqs_queued: AtomicU32::new(0),
            devices,
            cfg,
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn halt(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Sleep up to `sleep_us`, waking early when the run stops. Sliced
    /// at 100 ms so overload and signal shutdown stay prompt.
    pub fn sleep_while_running_us(&self, sleep_us: u64) {
        const SLICE_US: u64 = 100_000;

        let mut remaining_us = sleep_us;
        while remaining_us > 0 && self.is_running() {
            let step_us = remaining_us.min(SLICE_US);
            time::sleep_us(step_us);
            remaining_us -= step_us;
        }
    }

    /// Capacity for a worker's reusable read buffer: the largest small
    /// read any device can ask for.
    pub fn max_read_bytes(&self) -> usize {
        self.devices
            .iter()
            .map(|dev| dev.read_bytes as usize)
            .max()
            .unwrap_or(BUFFER_ALIGN)
    }
}

/// Workload thread handles, joined in spawn-reverse dependency order:
/// the generator stops producing, workers drain, large-block loops exit.
pub struct WorkloadHandles {
    generator: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    large_block: Vec<JoinHandle<()>>,
}

impl WorkloadHandles {
    pub fn join_all(self) {
        let _ = self.generator.join();

        for handle in self.workers {
            let _ = handle.join();
        }

        for handle in self.large_block {
            let _ = handle.join();
        }
    }

    pub fn num_large_block(&self) -> usize {
        self.large_block.len()
    }
}

/// Launch the full thread inventory against a built context.
pub fn spawn_workload(ctx: &Arc<RunContext>) -> WorkloadHandles {
    let mut large_block = Vec::new();

    if ctx.cfg.write_reqs_per_sec != 0 {
        // Writers first in their own pass, readers after, so the two
        // directions land on different cores.
        for dev_index in 0..ctx.devices.len() {
            let ctx = Arc::clone(ctx);
            large_block.push(thread::spawn(move || {
                large_block::run(&ctx, dev_index, Direction::Write)
            }));
        }

        for dev_index in 0..ctx.devices.len() {
            let ctx = Arc::clone(ctx);
            large_block.push(thread::spawn(move || {
                large_block::run(&ctx, dev_index, Direction::Read)
            }));
        }
    }

    let mut workers = Vec::new();
    for queue_index in 0..ctx.queues.len() {
        for _ in 0..ctx.cfg.threads_per_queue {
            let ctx = Arc::clone(ctx);
            workers.push(thread::spawn(move || reader::run(&ctx, queue_index)));
        }
    }

    let generator = {
        let ctx = Arc::clone(ctx);
        thread::spawn(move || generator::run(&ctx))
    };

    WorkloadHandles {
        generator,
        workers,
        large_block,
    }
}

/// Execute one full certification run.
pub fn run(cfg: Config) -> Result<()> {
    scheduler::set_schedulers(&cfg);

    let scale = cfg.scale();
    let flags = OpenFlags::direct_rw(cfg.disable_odsync);

    let mut devices = Vec::with_capacity(cfg.device_names.len());
    for (index, name) in cfg.device_names.iter().enumerate() {
        devices.push(Device::setup(name, index as u32, &cfg, flags, scale)?);
    }

    // Let every staggered nominal start predate the run clock.
    time::sleep_us((devices.len() as u64 + 1) * STAGGER_US);

    let ctx = RunContext::build(cfg, devices);

    install_signal_bridge(&ctx)?;

    let handles = spawn_workload(&ctx);

    report_loop(&ctx);

    ctx.halt();
    handles.join_all();

    // Requests still parked in the queues were counted but never
    // completed; account for them before the final depth check.
    for queue in &ctx.queues {
        while queue.rx.try_recv().is_ok() {
            ctx.reqs_queued.fetch_sub(1, Ordering::Relaxed);
        }
    }

    for dev in &ctx.devices {
        dev.fd_pool.close_all();
    }

    info!("run complete");

    Ok(())
}

/// Print the report block on every tick until the duration elapses or
/// the run stops.
fn report_loop(ctx: &RunContext) {
    let interval_us = ctx.cfg.report_interval_us();
    let run_stop_us = ctx.run_start_us + ctx.cfg.run_us();

    let mut count: u64 = 0;

    while ctx.is_running() && time::now_us() < run_stop_us {
        count += 1;

        let sleep_us =
            (count * interval_us) as i64 - (time::now_us() - ctx.run_start_us) as i64;
        if sleep_us > 0 {
            ctx.sleep_while_running_us(sleep_us as u64);
        }

        if !ctx.is_running() {
            break;
        }

        println!("After {} sec:", count * interval_us / 1_000_000);
        println!(
            "read-reqs queued: {}",
            ctx.reqs_queued.load(Ordering::Relaxed)
        );

        ctx.hist.large_block_reads.dump("LARGE BLOCK READS ");
        ctx.hist.large_block_writes.dump("LARGE BLOCK WRITES");
        ctx.hist.raw_reads.dump("RAW READS         ");

        for dev in &ctx.devices {
            dev.raw_read_histogram.dump(&dev.tag);
        }

        ctx.hist.reads.dump("READS             ");
        println!();
        let _ = std::io::stdout().flush();
    }
}

/// Route SIGINT/SIGTERM into the cooperative shutdown path.
fn install_signal_bridge(ctx: &Arc<RunContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);

    ctrlc::set_handler(move || {
        info!("termination signal received - stopping");
        ctx.halt();
    })
    .context("can't install signal handler")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fd_pool::OpenFlags;
    use crate::stats::HistScale;
    use std::io::Write as _;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;

    const BUFFERED: OpenFlags = OpenFlags {
        direct: false,
        dsync: false,
    };

    fn file_devices(cfg: &Config, count: u32) -> (Vec<NamedTempFile>, Vec<Device>) {
        let mut files = Vec::new();
        let mut devices = Vec::new();

        for index in 0..count {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(&vec![0u8; 1 << 20]).unwrap();
            file.flush().unwrap();

            devices.push(
                Device::setup(
                    file.path().to_str().unwrap(),
                    index,
                    cfg,
                    BUFFERED,
                    HistScale::Milliseconds,
                )
                .unwrap(),
            );
            files.push(file);
        }

        (files, devices)
    }

    fn settings(write_rate: &str) -> Vec<(String, String)> {
        vec![
            ("device-names".to_string(), "unused".to_string()),
            ("test-duration-sec".to_string(), "10".to_string()),
            ("read-reqs-per-sec".to_string(), "2000".to_string()),
            ("write-reqs-per-sec".to_string(), write_rate.to_string()),
            ("num-queues".to_string(), "2".to_string()),
            ("threads-per-queue".to_string(), "2".to_string()),
        ]
    }

    #[test]
    fn test_full_workload_smoke() {
        let cfg = Config::from_settings(settings("100000")).unwrap();
        let (_files, devices) = file_devices(&cfg, 1);
        let ctx = RunContext::build(cfg, devices);

        let handles = spawn_workload(&ctx);
        assert_eq!(handles.num_large_block(), 2);

        std::thread::sleep(Duration::from_millis(300));
        ctx.halt();
        handles.join_all();

        for queue in &ctx.queues {
            while queue.rx.try_recv().is_ok() {
                ctx.reqs_queued.fetch_sub(1, Ordering::Relaxed);
            }
        }

        // Every queued request was either completed or accounted.
        assert_eq!(ctx.reqs_queued.load(Ordering::Relaxed), 0);

        // Both transaction views saw the same successful reads, and the
        // per-device split sums to the global raw count.
        assert!(ctx.hist.raw_reads.len() > 0);
        assert_eq!(ctx.hist.raw_reads.len(), ctx.hist.reads.len());
        let per_device: u64 = ctx
            .devices
            .iter()
            .map(|dev| dev.raw_read_histogram.len())
            .sum();
        assert_eq!(per_device, ctx.hist.raw_reads.len());

        // Writes enabled, so both large-block streams ran.
        assert!(ctx.hist.large_block_reads.len() > 0);
        assert!(ctx.hist.large_block_writes.len() > 0);
    }

    #[test]
    fn test_no_large_block_threads_without_writes() {
        let cfg = Config::from_settings(settings("0")).unwrap();
        let (_files, devices) = file_devices(&cfg, 1);
        let ctx = RunContext::build(cfg, devices);

        let handles = spawn_workload(&ctx);
        assert_eq!(handles.num_large_block(), 0);

        std::thread::sleep(Duration::from_millis(150));
        ctx.halt();
        handles.join_all();

        assert_eq!(ctx.hist.large_block_reads.len(), 0);
        assert_eq!(ctx.hist.large_block_writes.len(), 0);
        assert!(ctx.hist.raw_reads.len() > 0);
    }

    #[test]
    fn test_sleep_while_running_wakes_on_halt() {
        let cfg = Config::from_settings(settings("0")).unwrap();
        let (_files, devices) = file_devices(&cfg, 1);
        let ctx = RunContext::build(cfg, devices);

        ctx.halt();

        let start = Instant::now();
        ctx.sleep_while_running_us(5_000_000);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_max_read_bytes_covers_largest_device() {
        let cfg = Config::from_settings(settings("0")).unwrap();
        let (_files, devices) = file_devices(&cfg, 2);
        let ctx = RunContext::build(cfg, devices);

        let expected = ctx
            .devices
            .iter()
            .map(|dev| dev.read_bytes as usize)
            .max()
            .unwrap();
        assert_eq!(ctx.max_read_bytes(), expected);
    }
}
