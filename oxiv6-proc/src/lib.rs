#![cfg_attr(not(any(test, feature = "hosted")), no_std)]

/*
   Copyright 2024 Claire Moore

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

//! Process management for the oxiv6 kernel: the process table, the per-hart
//! scheduler, sleep/wakeup, the fork/exit/wait lifecycle and the `ps`
//! introspection calls.
//!
//! Architecture primitives (the context switch, interrupt control, the hart
//! id) come in through [`platform::Platform`]; the `hosted` module provides
//! an implementation on native threads.

extern crate alloc;

pub mod println;

pub mod config;
pub mod cpu;
pub mod file;
pub mod kalloc;
pub mod kernel;
pub mod param;
pub mod platform;
pub mod proc;
pub mod ps;
mod sched;
pub mod spinlock;
pub mod syscall;
mod trap;
pub mod trapframe;
pub mod vm;

#[cfg(any(test, feature = "hosted"))]
pub mod hosted;

#[cfg(test)]
mod tests;

pub use kernel::Kernel;
pub use proc::{Channel, Pid, ProcError, ProcState};
pub use trap::TrapCause;
