//! Editors for the in-memory structures a test case installs: the GDT, the
//! IDT, the task-state segment and the two levels of 32-bit page tables.
//!
//! Every editor owns a fixed-capacity arena and a physical base address.
//! Edits are bounds checked against the arena and only reach memory on
//! `commit`.

pub mod gdt;
pub mod idt;
pub mod paging;
pub mod tss;

pub use gdt::{kernel_selector, DescriptorTable, GlobalDescriptorTable, DEFAULT_GDT_ENTRIES, GDT_CAPACITY};
pub use idt::{InterruptGate, InterruptTable, IDT_ENTRIES};
pub use paging::PageStructure;
pub use tss::{TaskStateSegment, TSS_SIZE};

use arch_core::MemError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("slot {index} is past the table capacity of {capacity}")]
    OutOfRange { index: usize, capacity: usize },
    #[error("table is full ({0} entries)")]
    Full(usize),
    #[error("table base {0:#x} is not suitably aligned")]
    Misaligned(u32),
    #[error(transparent)]
    Memory(#[from] MemError),
}
