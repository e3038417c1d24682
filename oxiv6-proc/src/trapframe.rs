use crate::kalloc::Kmem;
use num_enum::IntoPrimitive;

/// Slots of the per-process trap frame page, in the order the trampoline
/// saves them. The first five are kernel bookkeeping for the trap path; the
/// rest are the user registers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
pub enum Register {
    /// kernel page table
    KernelSatp,
    /// top of process's kernel stack
    KernelSp,
    /// usertrap()
    KernelTrap,
    /// saved user program counter
    Epc,
    /// saved kernel tp
    KernelHartid,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5,
    T6,
}

impl Register {
    pub const COUNT: usize = 36;

    /// The six argument registers, in order
    pub const ARGS: [Register; 6] = [
        Register::A0,
        Register::A1,
        Register::A2,
        Register::A3,
        Register::A4,
        Register::A5,
    ];

    fn offset(self) -> usize {
        usize::from(u8::from(self)) * core::mem::size_of::<u64>()
    }
}

/// View of a trap frame page in physical memory
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame<'m> {
    kmem: &'m Kmem,
    pa: usize,
}

impl<'m> TrapFrame<'m> {
    #[must_use]
    pub fn new(kmem: &'m Kmem, pa: usize) -> Self {
        Self { kmem, pa }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn read(&self, register: Register) -> usize {
        self.kmem.read_word(self.pa + register.offset()) as usize
    }

    pub fn write(&self, register: Register, value: usize) {
        self.kmem
            .write_word(self.pa + register.offset(), value as u64);
    }

    /// Copies every slot of `other` into this frame
    pub fn copy_from(&self, other: &TrapFrame<'_>) {
        self.kmem.copy_page(self.pa, other.pa);
    }
}
