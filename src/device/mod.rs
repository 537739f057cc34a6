//! Device records and geometry discovery
//!
//! A [`Device`] is probed once at setup and immutable afterwards: byte
//! size via `BLKGETSIZE64`, minimum direct-I/O op size by attempting
//! direct reads from 512 up to 4096 bytes, and from those the counts of
//! valid large-block and small-read offsets. The descriptor pool and the
//! per-device latency histogram are the only interior-mutable parts.

pub mod fd_pool;
pub mod scheduler;

use crate::config::Config;
use crate::stats::{HistScale, LatencyHistogram};
use crate::util::buffer::AlignedBuffer;
use crate::Result;
use anyhow::{bail, Context};
use self::fd_pool::{FdPool, OpenFlags};
use log::info;
use std::fs::File;
use std::os::unix::io::AsRawFd;

// ioctl request code for the block-device byte size.
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

const LO_IO_MIN_BYTES: u32 = 512;
const HI_IO_MIN_BYTES: u32 = 4096;

/// Width of the device tag column in report output.
const TAG_WIDTH: usize = 18;

/// Offset-space counts derived from a device's size and block sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub size_bytes: u64,
    pub num_large_blocks: u64,
    pub num_min_op_blocks: u64,
    /// Valid starting positions for a small read, at min-op granularity.
    pub num_read_offsets: u64,
    /// Small-read size: record bytes rounded up to min-op blocks.
    pub read_bytes: u32,
}

/// One raw block device under test. Immutable after [`Device::setup`].
#[derive(Debug)]
pub struct Device {
    pub name: String,
    pub index: u32,
    pub size_bytes: u64,
    pub min_op_bytes: u32,
    pub num_large_blocks: u64,
    pub num_read_offsets: u64,
    pub read_bytes: u32,
    /// Name left-justified to the report tag column.
    pub tag: String,
    pub fd_pool: FdPool,
    pub raw_read_histogram: LatencyHistogram,
}

impl Device {
    /// Open, probe, and derive the offset space for one device.
    pub fn setup(
        name: &str,
        index: u32,
        cfg: &Config,
        flags: OpenFlags,
        scale: HistScale,
    ) -> Result<Device> {
        let fd_pool = FdPool::new(name, flags);

        let file = fd_pool.acquire()?;
        let size_bytes = query_size(&file, name)?;
        let min_op_bytes = discover_min_op_bytes(&file, name)?;
        fd_pool.release(file);

        if cfg.large_block_bytes() % min_op_bytes as u64 != 0 {
            bail!(
                "{}: large block size {} is not a multiple of the {}-byte minimum op",
                name,
                cfg.large_block_bytes(),
                min_op_bytes
            );
        }

        let geometry = derive_geometry(
            size_bytes,
            cfg.large_block_bytes(),
            cfg.record_bytes,
            min_op_bytes,
        )
        .with_context(|| format!("device {}", name))?;

        info!(
            "{} size = {} bytes, {} large blocks, {} {}-byte blocks, reads are {} bytes",
            name,
            size_bytes,
            geometry.num_large_blocks,
            geometry.num_min_op_blocks,
            min_op_bytes,
            geometry.read_bytes
        );

        Ok(Device {
            name: name.to_string(),
            index,
            size_bytes,
            min_op_bytes,
            num_large_blocks: geometry.num_large_blocks,
            num_read_offsets: geometry.num_read_offsets,
            read_bytes: geometry.read_bytes,
            tag: format!("{:<width$}", name, width = TAG_WIDTH),
            fd_pool,
            raw_read_histogram: LatencyHistogram::new(scale),
        })
    }
}

/// Compute the valid offset space for a device.
///
/// Fails when the device cannot hold even one large block, or when it is
/// too small to offer any valid small-read starting position.
pub fn derive_geometry(
    size_bytes: u64,
    large_block_bytes: u64,
    record_bytes: u32,
    min_op_bytes: u32,
) -> Result<Geometry> {
    let num_large_blocks = size_bytes / large_block_bytes;
    if num_large_blocks == 0 {
        bail!(
            "too small: {} bytes holds no {}-byte large block",
            size_bytes,
            large_block_bytes
        );
    }

    // The usable space is the whole large blocks, not the raw size.
    let num_min_op_blocks = num_large_blocks * large_block_bytes / min_op_bytes as u64;

    let read_req_blocks =
        (record_bytes as u64 + min_op_bytes as u64 - 1) / min_op_bytes as u64;
    let read_bytes = (read_req_blocks * min_op_bytes as u64) as u32;

    if num_min_op_blocks < read_req_blocks {
        bail!(
            "too small: no room for a {}-byte read",
            read_bytes
        );
    }

    Ok(Geometry {
        size_bytes,
        num_large_blocks,
        num_min_op_blocks,
        num_read_offsets: num_min_op_blocks - read_req_blocks + 1,
        read_bytes,
    })
}

/// Query the device byte size.
///
/// `BLKGETSIZE64` for true block devices; a regular file used as a
/// stand-in answers ENOTTY, in which case the file length is used.
fn query_size(file: &File, name: &str) -> Result<u64> {
    let mut size: u64 = 0;

    // SAFETY: the fd is valid for the lifetime of `file` and the out
    // pointer refers to a live u64.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };
    if rc == 0 && size != 0 {
        return Ok(size);
    }

    let len = file
        .metadata()
        .with_context(|| format!("can't stat {}", name))?
        .len();

    if len == 0 {
        bail!("{}: can't determine device size", name);
    }

    Ok(len)
}

/// Discover the minimum direct-I/O op size by reading from offset 0.
///
/// The first size in 512, 1024, 2048, 4096 that reads back fully is the
/// device minimum; direct I/O rejects anything smaller with an error.
fn discover_min_op_bytes(file: &File, name: &str) -> Result<u32> {
    let mut buf = AlignedBuffer::new(HI_IO_MIN_BYTES as usize);
    let fd = file.as_raw_fd();

    let mut read_sz = LO_IO_MIN_BYTES;

    while read_sz <= HI_IO_MIN_BYTES {
        // SAFETY: the buffer is live, 4096-aligned, and at least
        // HI_IO_MIN_BYTES long.
        let rc = unsafe {
            libc::pread(
                fd,
                buf.as_mut_slice().as_mut_ptr() as *mut libc::c_void,
                read_sz as usize,
                0,
            )
        };

        if rc == read_sz as isize {
            return Ok(read_sz);
        }

        read_sz <<= 1;
    }

    bail!(
        "{}: read failed at all sizes from {} to {} bytes",
        name,
        LO_IO_MIN_BYTES,
        HI_IO_MIN_BYTES
    );
}
