use arch_core::memory::Memory;
use arch_core::segments::{DescriptorTableReg, SegmentSelector, SystemType, DESCRIPTOR_SIZE};
use serde::{Deserialize, Serialize};

use crate::TableError;

pub const IDT_ENTRIES: usize = 256;

/// 32-bit interrupt gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptGate {
    pub offset: u32,
    pub selector: SegmentSelector,
    pub dpl: u8,
    pub present: bool,
}

impl InterruptGate {
    pub fn new(selector: SegmentSelector, offset: u32, dpl: u8) -> Self {
        Self { offset, selector, dpl: dpl & 0x3, present: true }
    }

    pub fn encode(&self) -> [u8; 8] {
        let access = SystemType::InterruptGate32.type_bits() | (self.dpl << 5) | ((self.present as u8) << 7);
        let [o0, o1, o2, o3] = self.offset.to_le_bytes();
        let [s0, s1] = self.selector.0.to_le_bytes();
        [o0, o1, s0, s1, 0, access, o2, o3]
    }
}

#[derive(Debug, Clone)]
pub struct InterruptTable {
    base: u32,
    gates: Vec<InterruptGate>,
}

impl InterruptTable {
    /// A full table whose vector `n` enters at `stubs + n * stride` through
    /// `selector`.
    pub fn with_stubs(base: u32, selector: SegmentSelector, stubs: u32, stride: u32) -> Result<Self, TableError> {
        if base % DESCRIPTOR_SIZE != 0 { return Err(TableError::Misaligned(base)); }
        let gates = (0..IDT_ENTRIES as u32)
            .map(|n| InterruptGate::new(selector, stubs.wrapping_add(n * stride), 0))
            .collect();
        Ok(Self { base, gates })
    }

    pub fn register(&self) -> DescriptorTableReg { DescriptorTableReg::for_entries(self.base, self.gates.len()) }

    pub fn commit(&self, mem: &mut dyn Memory) -> Result<(), TableError> {
        let raw: Vec<u8> = self.gates.iter().flat_map(|g| g.encode()).collect();
        mem.write(self.base as u64, &raw)?;
        log::debug!("idt committed at {:#x}", self.base);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arch_core::memory::FlatMem;

    #[test]
    fn gate_layout() {
        let g = InterruptGate::new(SegmentSelector(0x08), 0x1234_5678, 0);
        assert_eq!(g.encode(), [0x78, 0x56, 0x08, 0x00, 0x00, 0x8E, 0x34, 0x12]);
        let user = InterruptGate::new(SegmentSelector(0x08), 0, 3);
        assert_eq!(user.encode()[5], 0xEE);
    }

    #[test]
    fn full_table_register_and_commit() {
        let mut mem = FlatMem::new(0x2000);
        let idt = InterruptTable::with_stubs(0x800, SegmentSelector(0x08), 0x10_0000, 16).unwrap();
        idt.commit(&mut mem).unwrap();
        assert_eq!(idt.register().limit, 0x7FF);
        let mut raw = [0u8; 8];
        // vector 2 points 32 bytes into the stubs
        mem.read(0x800 + 2 * 8, &mut raw).unwrap();
        assert_eq!(raw, [0x20, 0x00, 0x08, 0x00, 0x00, 0x8E, 0x10, 0x00]);
        mem.read(0x800 + 0xFF * 8, &mut raw).unwrap();
        assert_eq!(raw[0..2], [0xF0, 0x0F]);
    }
}
