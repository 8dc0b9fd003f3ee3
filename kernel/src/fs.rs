//! Filesystem boundary.
//!
//! The process core only needs reference-counted handles it can
//! duplicate on fork and release on exit, plus a byte source for
//! program loading. The real filesystem lives behind these types; here
//! they are the seam, not the implementation.

use alloc::sync::Arc;

use lazy_static::lazy_static;

use crate::error::KernelError;

/// An on-disk object referenced by a process (its working directory,
/// or the backing of an open file).
#[derive(Debug)]
pub struct Inode {
    pub ino: u64,
}

/// An open file description, shared between processes after fork.
#[derive(Debug)]
pub struct File {
    pub inode: Arc<Inode>,
    pub readable: bool,
    pub writable: bool,
}

impl File {
    /// Duplicate the description; both handles refer to the same open
    /// file.
    pub fn dup(self: &Arc<Self>) -> Arc<Self> {
        Arc::clone(self)
    }
}

lazy_static! {
    static ref ROOT: Arc<Inode> = Arc::new(Inode { ino: 1 });
}

/// The root directory inode, working directory of the first process.
pub fn root_inode() -> Arc<Inode> {
    Arc::clone(&ROOT)
}

/// A readable source of program bytes for segment loading.
pub trait SegmentSource {
    /// Read up to `buf.len()` bytes starting at `offset`; returns the
    /// number of bytes actually read.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, KernelError>;
}

impl SegmentSource for [u8] {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        if offset >= self.len() {
            return Ok(0);
        }
        let n = usize::min(buf.len(), self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        Ok(n)
    }
}
