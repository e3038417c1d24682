use crate::println::{set_console, DebugPrint};
use std::io::Write;

/// Kernel console on the host's stderr
pub struct HostConsole;

impl HostConsole {
    /// Routes kernel output and `log` records at `level` or above to stderr
    pub fn install(level: log::LevelFilter) {
        set_console(&HostConsole, level);
    }
}

impl DebugPrint for HostConsole {
    fn print_byte(&self, byte: u8) -> core::fmt::Result {
        self.print_str(core::str::from_utf8(&[byte]).unwrap_or("?"))
    }

    fn print_str(&self, string: &str) -> core::fmt::Result {
        std::io::stderr()
            .write_all(string.as_bytes())
            .map_err(|_| core::fmt::Error)
    }
}
