use arch_core::memory::Memory;
use arch_core::segments::SegmentSelector;
use serde::{Deserialize, Serialize};

use crate::TableError;

/// Size of a 32-bit TSS without an I/O permission bitmap.
pub const TSS_SIZE: u32 = 104;

const ESP0: usize = 4;
const SS0: usize = 8;
const IOMAP_BASE: usize = 102;

/// The parts of a 32-bit TSS the harness fills in: the ring-0 stack used on
/// privilege transitions, and an I/O map base past the segment limit so no
/// bitmap is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateSegment {
    pub esp0: u32,
    pub ss0: SegmentSelector,
    pub iomap_base: u16,
}

impl TaskStateSegment {
    pub fn new(esp0: u32, ss0: SegmentSelector) -> Self {
        Self { esp0, ss0, iomap_base: TSS_SIZE as u16 }
    }

    pub fn encode(&self) -> [u8; TSS_SIZE as usize] {
        let mut raw = [0u8; TSS_SIZE as usize];
        raw[ESP0..ESP0 + 4].copy_from_slice(&self.esp0.to_le_bytes());
        raw[SS0..SS0 + 2].copy_from_slice(&self.ss0.0.to_le_bytes());
        raw[IOMAP_BASE..IOMAP_BASE + 2].copy_from_slice(&self.iomap_base.to_le_bytes());
        raw
    }

    pub fn commit(&self, mem: &mut dyn Memory, addr: u32) -> Result<(), TableError> {
        mem.write(addr as u64, &self.encode())?;
        Ok(())
    }
}
