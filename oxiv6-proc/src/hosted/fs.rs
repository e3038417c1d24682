use crate::file::{FileSystem, Inode};
use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ROOTINO: u32 = 1;

struct RootDir;

impl Inode for RootDir {
    fn inum(&self) -> u32 {
        ROOTINO
    }
}

/// A file system with nothing but `/`
pub struct HostFs {
    root: Arc<dyn Inode>,
    inits: AtomicUsize,
}

impl HostFs {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: Arc::new(RootDir),
            inits: AtomicUsize::new(0),
        })
    }

    /// Times [`FileSystem::init`] has run
    #[must_use]
    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::Relaxed)
    }
}

impl FileSystem for HostFs {
    fn root(&self) -> Arc<dyn Inode> {
        Arc::clone(&self.root)
    }

    fn init(&self) {
        self.inits.fetch_add(1, Ordering::Relaxed);
        info!("fs: root inode {ROOTINO}");
    }
}
