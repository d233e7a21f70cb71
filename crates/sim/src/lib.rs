//! sim: a small 32-bit protected-mode machine that the harness can drive
//! through the same accessor traits a bare-metal backend provides.
//!
//! It models what the built-in cases touch: descriptor-table registers and
//! segment loads with their protection checks, CR0/CR3/CR4 with a two-level
//! page walk and TLB, LSL, string output to the port bus, and 16550 UARTs
//! that capture what they transmit. Faults raised by register writes are
//! recorded on the machine instead of being returned.

pub mod machine;
pub mod segmentation;
pub mod string_io;

pub use machine::{RecordedFault, SimMachine};
pub use segmentation::SegmentCache;

use arch_core::MemError;
use devices_io::IoError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Bytes of physical memory.
    pub ram_size: usize,
    /// Map a UART on COM1 at boot, as firmware would.
    pub console: bool,
}

impl Default for SimConfig {
    fn default() -> Self { Self { ram_size: 8 << 20, console: true } }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("ram size {0:#x} cannot hold the boot tables")]
    RamTooSmall(usize),
    #[error(transparent)]
    Memory(#[from] MemError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("boot environment faulted: {0}")]
    Boot(#[from] arch_core::Exception),
}
