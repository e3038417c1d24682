//! The file-layer collaborators a process owns: open files and the current
//! directory. Implementations come from the file system above this crate.

use crate::kernel::Kernel;
use alloc::sync::Arc;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    NotReadable,
    NotWritable,
    /// A user buffer was not mapped
    BadAddress,
    /// The calling process was killed while blocked
    Killed,
}

/// An open file, as seen through a descriptor
pub trait File: Send + Sync {
    /// Reads up to `n` bytes into the current process's memory at `addr`
    ///
    /// # Errors
    /// Returns why nothing could be read.
    fn read(&self, kernel: &Kernel, addr: usize, n: usize) -> Result<usize, FileError>;

    /// Writes `n` bytes from the current process's memory at `addr`
    ///
    /// # Errors
    /// Returns why nothing could be written.
    fn write(&self, kernel: &Kernel, addr: usize, n: usize) -> Result<usize, FileError>;
}

/// A counted reference to an open file. Cloning is `filedup`, dropping is
/// `fileclose`.
#[derive(Clone)]
pub struct OpenFile(Arc<dyn File>);

impl OpenFile {
    #[must_use]
    pub fn new(file: Arc<dyn File>) -> Self {
        Self(file)
    }

    /// Another reference to the same file
    #[must_use]
    pub fn dup(&self) -> Self {
        self.clone()
    }

    pub fn close(self) {}

    /// References held across every descriptor table
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[must_use]
    pub fn file(&self) -> &dyn File {
        &*self.0
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}

/// An in-memory inode a process can hold as its working directory
pub trait Inode: Send + Sync {
    fn inum(&self) -> u32;
}

pub trait FileSystem: Send + Sync {
    /// Inode of `/`
    fn root(&self) -> Arc<dyn Inode>;

    /// Runs once, in the context of the first process, since it may sleep
    fn init(&self);
}
