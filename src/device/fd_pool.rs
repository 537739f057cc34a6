//! Per-device file-descriptor recycling
//!
//! Descriptors are opened lazily with direct-I/O semantics and recycled
//! through an unbounded MPMC channel. A descriptor is owned by exactly one
//! thread between `acquire` and `release`; dropping a handle instead of
//! releasing it closes the descriptor, which is the error path's contract.

use crate::Result;
use anyhow::Context;
use crossbeam::channel::{self, Receiver, Sender};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;

/// How device descriptors are opened.
///
/// The workload always runs direct + read-write; `dsync` follows the
/// `disable-odsync` setting. File-backed tests drop `direct` so they can
/// run on filesystems without O_DIRECT support.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
    pub direct: bool,
    pub dsync: bool,
}

impl OpenFlags {
    /// Production flags: direct I/O, O_DSYNC unless disabled.
    pub fn direct_rw(disable_odsync: bool) -> Self {
        Self {
            direct: true,
            dsync: !disable_odsync,
        }
    }

    fn custom_bits(self) -> i32 {
        let mut bits = 0;
        if self.direct {
            bits |= libc::O_DIRECT;
        }
        if self.dsync {
            bits |= libc::O_DSYNC;
        }
        bits
    }
}

/// Pool of open descriptors for one device.
#[derive(Debug)]
pub struct FdPool {
    path: String,
    flags: OpenFlags,
    tx: Sender<File>,
    rx: Receiver<File>,
}

impl FdPool {
    pub fn new(path: &str, flags: OpenFlags) -> Self {
        let (tx, rx) = channel::unbounded();

        Self {
            path: path.to_string(),
            flags,
            tx,
            rx,
        }
    }

    /// Pop a pooled descriptor, opening a fresh one when the pool is empty.
    pub fn acquire(&self) -> Result<File> {
        match self.rx.try_recv() {
            Ok(file) => Ok(file),
            Err(_) => self.open_device(),
        }
    }

    /// Return a descriptor for reuse.
    pub fn release(&self, file: File) {
        // The paired receiver lives as long as self, so the send can't fail.
        let _ = self.tx.send(file);
    }

    /// Drain the pool, closing every descriptor.
    pub fn close_all(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Number of descriptors currently pooled.
    pub fn pooled(&self) -> usize {
        self.rx.len()
    }

    fn open_device(&self) -> Result<File> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);

        let bits = self.flags.custom_bits();
        if bits != 0 {
            options.custom_flags(bits);
        }

        options
            .open(&self.path)
            .with_context(|| format!("can't open device {}", self.path))
    }
}
