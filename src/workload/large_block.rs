//! Large-block rate loops
//!
//! Two loops per device, one per direction, modeling background
//! defragmentation reads and write-back writes. Each issues one
//! large-block operation per iteration at a cumulative-target pace: the
//! Nth op aims for `start + N * num_devices / aggregate_rate`, with the
//! residual slept off. Nominal starts are staggered per device and
//! between the two directions so the loops never peak in lockstep.
//!
//! A loop that falls behind its target by more than the configured lag
//! declares the device overloaded and stops the run.

use super::{RW_STAGGER_US, STAGGER_US};
use crate::coordinator::RunContext;
use crate::engine;
use crate::util::buffer::AlignedBuffer;
use crate::util::time;
use log::error;
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

pub fn run(ctx: &RunContext, dev_index: usize, direction: Direction) {
    let dev = &ctx.devices[dev_index];
    let block_bytes = ctx.cfg.large_block_bytes() as usize;

    let mut buf = AlignedBuffer::new(block_bytes);
    let mut rng = Xoshiro256PlusPlus::from_entropy();

    let hist = match direction {
        Direction::Read => &ctx.hist.large_block_reads,
        Direction::Write => &ctx.hist.large_block_writes,
    };

    let stagger_us = dev.index as u64 * STAGGER_US
        + match direction {
            Direction::Read => 0,
            Direction::Write => RW_STAGGER_US,
        };
    let start_us = ctx.run_start_us - stagger_us;

    let rate = ctx.cfg.large_block_ops_per_sec();
    let num_devices = ctx.devices.len() as u64;
    let max_lag_us = ctx.cfg.max_sleep_lag_us();

    let mut count: u64 = 0;

    while ctx.is_running() {
        let offset = rng.gen_range(0..dev.num_large_blocks) * block_bytes as u64;

        let timed = match direction {
            Direction::Read => {
                let start_ns = time::now_ns();
                engine::read(dev, offset, &mut buf.as_mut_slice()[..block_bytes])
                    .map(|stop_ns| (start_ns, stop_ns))
            }
            Direction::Write => {
                // Salt the block each time, outside the timed window, so
                // the device can't compress or dedup the stream.
                rng.fill_bytes(&mut buf.as_mut_slice()[..block_bytes]);

                let start_ns = time::now_ns();
                engine::write(dev, offset, &buf.as_slice()[..block_bytes])
                    .map(|stop_ns| (start_ns, stop_ns))
            }
        };

        if let Ok((start_ns, stop_ns)) = timed {
            hist.record_ns(time::safe_delta_ns(start_ns, stop_ns));
        }

        count += 1;

        let target_us = ((count * 1_000_000 * num_devices) as f64 / rate) as u64;
        let sleep_us = target_us as i64 - (time::now_us() - start_us) as i64;

        if sleep_us > 0 {
            ctx.sleep_while_running_us(sleep_us as u64);
        } else if sleep_us < -max_lag_us {
            error!("large block {}s can't keep up", tag(direction));
            error!("drive(s) can't keep up - test stopped");
            ctx.halt();
        }
    }
}

fn tag(direction: Direction) -> &'static str {
    match direction {
        Direction::Read => "read",
        Direction::Write => "write",
    }
}
