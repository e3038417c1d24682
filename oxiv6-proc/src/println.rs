use core::fmt::Write;

static PRINT_IMPL: spin::once::Once<&'static dyn DebugPrint> = spin::once::Once::new();

#[allow(unused_macros)]
macro_rules! print {
    ($($arg:tt)*) => { use core::fmt::Write; core::write!($crate::println::DebugWriter, $($arg)*).expect("Unable to write!"); }
}

macro_rules! println {
    ($($arg:tt)*) => { use core::fmt::Write; core::writeln!($crate::println::DebugWriter, $($arg)*).expect("Unable to write!"); }
}

/// Installs `console` as the sink for `println!` and the `log` facade.
///
/// Only the first call takes effect; later consoles are ignored so that
/// several kernels in one address space share the first one installed.
pub fn set_console(console: &'static dyn DebugPrint, level: log::LevelFilter) {
    let mut installed = false;
    PRINT_IMPL.call_once(|| {
        installed = true;
        console
    });
    if installed && log::set_logger(&DebugWriter).is_ok() {
        log::set_max_level(level);
    }
}

/// A byte sink the kernel can print to
pub trait DebugPrint: Sync {
    fn print_byte(&self, byte: u8) -> core::fmt::Result;

    fn print_str(&self, string: &str) -> core::fmt::Result {
        for byte in string.bytes() {
            self.print_byte(byte)?;
        }
        Ok(())
    }
}

pub struct DebugWriter;

impl Write for DebugWriter {
    fn write_str(&mut self, string: &str) -> core::fmt::Result {
        match PRINT_IMPL.get() {
            Some(console) => console.print_str(string),
            // nowhere to print before a console exists
            None => Ok(()),
        }
    }
}

impl log::Log for DebugWriter {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let file = record.file().unwrap_or("");
            let line = record.line().unwrap_or(0);

            // a line is assembled first so concurrent harts don't interleave
            let mut buffer = LineBuffer::new();
            let _ = writeln!(
                buffer,
                "[{}] ({}:{}:{}): {}",
                record.level(),
                record.target(),
                file,
                line,
                record.args()
            );
            let _ = DebugWriter.write_str(buffer.as_str());
        }
    }

    fn flush(&self) {}
}

/// Fixed-size line assembly buffer; overlong lines are truncated
struct LineBuffer {
    bytes: [u8; 256],
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            bytes: [0; 256],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        match core::str::from_utf8(&self.bytes[..self.len]) {
            Ok(line) => line,
            Err(error) => {
                // cut at the last full character
                core::str::from_utf8(&self.bytes[..error.valid_up_to()]).unwrap_or("")
            }
        }
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, string: &str) -> core::fmt::Result {
        let room = self.bytes.len() - self.len;
        let take = core::cmp::min(room, string.len());
        self.bytes[self.len..self.len + take].copy_from_slice(&string.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

#[allow(unused_imports)]
pub(crate) use print;
pub(crate) use println;
