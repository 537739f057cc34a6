//! Direct-I/O engine
//!
//! One positioned operation per call over a borrowed pool descriptor,
//! timed from the caller's side: the returned stop timestamp is taken
//! after the transfer completes and before the descriptor goes back to
//! the pool. Positioned `pread`/`pwrite` leave the descriptor offset
//! untouched, so recycled descriptors carry no state between threads.
//!
//! Alignment (buffer address, offset, and length all multiples of the
//! device minimum op size) is the caller's contract; direct I/O fails the
//! syscall on violations and debug builds assert first.
//!
//! On any failure the descriptor is closed instead of pooled, the error
//! is logged with the OS error code, and the caller drops the sample.

use crate::device::Device;
use crate::util::time;
use crate::Result;
use anyhow::bail;
use log::error;
use std::fs::File;
use std::os::unix::io::AsRawFd;

/// Read exactly `buf.len()` bytes at `offset`; returns the stop time in
/// nanoseconds.
pub fn read(dev: &Device, offset: u64, buf: &mut [u8]) -> Result<u64> {
    debug_assert_eq!(offset % dev.min_op_bytes as u64, 0);
    debug_assert_eq!(buf.len() % dev.min_op_bytes as usize, 0);

    let file = acquire(dev)?;

    // SAFETY: `buf` outlives the call and the fd is owned by `file`.
    let rc = unsafe {
        libc::pread(
            file.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    };

    finish(dev, file, rc, buf.len(), offset, "read")
}

/// Write exactly `buf.len()` bytes at `offset`; returns the stop time in
/// nanoseconds.
pub fn write(dev: &Device, offset: u64, buf: &[u8]) -> Result<u64> {
    debug_assert_eq!(offset % dev.min_op_bytes as u64, 0);
    debug_assert_eq!(buf.len() % dev.min_op_bytes as usize, 0);

    let file = acquire(dev)?;

    // SAFETY: `buf` outlives the call and the fd is owned by `file`.
    let rc = unsafe {
        libc::pwrite(
            file.as_raw_fd(),
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    };

    finish(dev, file, rc, buf.len(), offset, "write")
}

fn acquire(dev: &Device) -> Result<File> {
    dev.fd_pool.acquire().map_err(|err| {
        error!("{:#}", err);
        err
    })
}

fn finish(
    dev: &Device,
    file: File,
    rc: isize,
    size: usize,
    offset: u64,
    op: &str,
) -> Result<u64> {
    if rc != size as isize {
        if rc < 0 {
            let os = std::io::Error::last_os_error();
            error!(
                "{} {} failed: offset={} size={} errno {} '{}'",
                dev.name,
                op,
                offset,
                size,
                os.raw_os_error().unwrap_or(0),
                os
            );
        } else {
            error!(
                "{} short {}: offset={} got {} of {} bytes",
                dev.name, op, offset, rc, size
            );
        }

        // Close rather than recycle a descriptor that just failed.
        drop(file);
        bail!("{} {} failed at offset {}", dev.name, op, offset);
    }

    let stop_ns = time::now_ns();
    dev.fd_pool.release(file);

    Ok(stop_ns)
}
