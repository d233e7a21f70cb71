use arch_core::memory::Memory;
use arch_core::segments::{DescriptorTableReg, SegmentDescriptor, SegmentSelector, DESCRIPTOR_SIZE};

use crate::TableError;

/// Slots in a case GDT: the default environment plus room for test descriptors.
pub const GDT_CAPACITY: usize = 10;

/// Slots owned by the default environment (null, ring-0 code/data, ring-3
/// code/data, TSS). Everything above belongs to the test.
pub const DEFAULT_GDT_ENTRIES: usize = 6;

pub const KERNEL_CODE_INDEX: u16 = 1;
pub const KERNEL_DATA_INDEX: u16 = 2;
pub const USER_CODE_INDEX: u16 = 3;
pub const USER_DATA_INDEX: u16 = 4;
pub const TSS_INDEX: u16 = 5;

/// Ring-0 GDT selector for `index`.
pub const fn kernel_selector(index: u16) -> SegmentSelector { SegmentSelector::gdt(index, 0) }

/// Descriptor table of `N` slots whose first `reserved` slots are only
/// writable through [`DescriptorTable::set_system`].
#[derive(Debug, Clone)]
pub struct DescriptorTable<const N: usize> {
    base: u32,
    reserved: usize,
    len: usize,
    slots: [SegmentDescriptor; N],
}

pub type GlobalDescriptorTable = DescriptorTable<GDT_CAPACITY>;

impl<const N: usize> DescriptorTable<N> {
    pub fn new(base: u32, reserved: usize) -> Result<Self, TableError> {
        if base % DESCRIPTOR_SIZE != 0 { return Err(TableError::Misaligned(base)); }
        if reserved > N { return Err(TableError::OutOfRange { index: reserved, capacity: N }); }
        Ok(Self { base, reserved, len: 1, slots: [SegmentDescriptor::NULL; N] })
    }

    pub fn base(&self) -> u32 { self.base }
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn capacity(&self) -> usize { N }

    /// Writes a slot in the reserved range.
    pub fn set_system(&mut self, index: u16, desc: SegmentDescriptor) -> Result<(), TableError> {
        let i = index as usize;
        if i >= self.reserved {
            return Err(TableError::OutOfRange { index: i, capacity: self.reserved });
        }
        self.slots[i] = desc;
        self.len = self.len.max(i + 1);
        Ok(())
    }

    /// Places `desc` in the first slot past both the reserved range and the
    /// current end of the table, returning its index.
    pub fn append(&mut self, desc: SegmentDescriptor) -> Result<u16, TableError> {
        let i = self.len.max(self.reserved);
        if i >= N { return Err(TableError::Full(N)); }
        self.slots[i] = desc;
        self.len = i + 1;
        Ok(i as u16)
    }

    pub fn get(&self, index: u16) -> Option<&SegmentDescriptor> {
        let i = index as usize;
        if i < self.len { self.slots.get(i) } else { None }
    }

    /// GDTR value covering the slots in use.
    pub fn register(&self) -> DescriptorTableReg { DescriptorTableReg::for_entries(self.base, self.len) }

    pub fn commit(&self, mem: &mut dyn Memory) -> Result<(), TableError> {
        for (i, desc) in self.slots[..self.len].iter().enumerate() {
            mem.write(self.base as u64 + i as u64 * DESCRIPTOR_SIZE as u64, &desc.encode())?;
        }
        log::debug!("gdt committed at {:#x}, {} entries", self.base, self.len);
        Ok(())
    }

    /// Writes only slot `index`, leaving bits the processor set in other
    /// slots (a busy TSS) alone.
    pub fn commit_entry(&self, mem: &mut dyn Memory, index: u16) -> Result<(), TableError> {
        let desc = self.get(index).ok_or(TableError::OutOfRange { index: index as usize, capacity: self.len })?;
        mem.write(self.base as u64 + index as u64 * DESCRIPTOR_SIZE as u64, &desc.encode())?;
        Ok(())
    }
}
