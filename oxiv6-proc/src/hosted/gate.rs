use crate::file::{File, FileError};
use crate::kernel::Kernel;
use crate::proc::Channel;
use crate::spinlock::SpinLock;

struct GateState {
    open: bool,
    written: Vec<u8>,
}

/// A file whose writers block until somebody reads it.
///
/// Reading opens the gate for good and returns no data. Writes that got
/// through are kept in order and can be inspected with [`Gate::written`].
pub struct Gate {
    state: SpinLock<GateState>,
    chan: Channel,
}

impl Gate {
    #[must_use]
    pub fn new(kernel: &Kernel) -> Self {
        Self {
            state: SpinLock::new(
                GateState {
                    open: false,
                    written: Vec::new(),
                },
                "gate",
                kernel.cpus(),
            ),
            chan: Channel::resource(),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Everything written so far
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }
}

impl File for Gate {
    fn read(&self, kernel: &Kernel, _addr: usize, _n: usize) -> Result<usize, FileError> {
        let mut state = self.state.lock();
        state.open = true;
        kernel.wakeup(self.chan);
        Ok(0)
    }

    fn write(&self, kernel: &Kernel, addr: usize, n: usize) -> Result<usize, FileError> {
        let p = kernel.curproc();
        let mut state = self.state.lock();
        while !state.open {
            if kernel.killed(p) {
                return Err(FileError::Killed);
            }
            state = kernel.sleep(self.chan, state);
        }

        let mut data = vec![0u8; n];
        kernel
            .copy_from_user(&mut data, addr)
            .map_err(|_| FileError::BadAddress)?;
        state.written.extend_from_slice(&data);
        Ok(n)
    }
}
