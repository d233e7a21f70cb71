//! arch-core: x86 protected-mode state types and the narrow architecture interface
//! the test harness drives.
//!
//! The accessor traits in [`env`] are the only way harness code touches processor
//! state. A bare-metal backend implements them with inline assembly; the `sim`
//! crate implements them over a software machine.

pub mod control;
pub mod env;
pub mod exceptions;
pub mod memory;
pub mod ops;
pub mod segments;
pub mod types;

pub use control::{Cr0, Cr3, Cr4};
pub use env::{ActiveEnvironment, ArchCapability, ArchState};
pub use exceptions::{Exception, Vector};
pub use memory::{FlatMem, MemError, Memory};
pub use ops::{OpOutcome, PrivilegedOp};
pub use segments::{DescriptorFlags, DescriptorTableReg, SegReg, SegmentDescriptor, SegmentSelector, SystemType};
pub use types::Width;

/// Size of a 4 KiB page, the only page size the harness allocates.
pub const PAGE_SIZE: u32 = 4096;
