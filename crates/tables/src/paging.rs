use arch_core::memory::Memory;
use arch_core::PAGE_SIZE;
use mmu::paging::{PageTableEntry, PteFlags, ENTRIES_PER_TABLE};

use crate::TableError;

/// One 4 KiB page directory or page table, edited in an arena and written
/// out as a whole.
#[derive(Debug, Clone)]
pub struct PageStructure {
    base: u32,
    entries: Vec<PageTableEntry>,
}

impl PageStructure {
    pub fn new(base: u32) -> Result<Self, TableError> {
        if base % PAGE_SIZE != 0 { return Err(TableError::Misaligned(base)); }
        Ok(Self { base, entries: vec![PageTableEntry::EMPTY; ENTRIES_PER_TABLE] })
    }

    pub fn base(&self) -> u32 { self.base }

    /// Frame number of this structure, as a PDE pointing at it would hold.
    pub fn frame(&self) -> u32 { self.base >> 12 }

    pub fn entry(&self, index: usize) -> Option<PageTableEntry> { self.entries.get(index).copied() }

    pub fn set_entry(&mut self, index: usize, entry: PageTableEntry) -> Result<(), TableError> {
        let slot = self.entries.get_mut(index).ok_or(TableError::OutOfRange { index, capacity: ENTRIES_PER_TABLE })?;
        *slot = entry;
        Ok(())
    }

    /// Maps slot `index` to 4 KiB frame `frame`; present is implied.
    pub fn map(&mut self, index: usize, frame: u32, flags: PteFlags) -> Result<(), TableError> {
        self.set_entry(index, PageTableEntry::new(frame, flags))
    }

    pub fn commit(&self, mem: &mut dyn Memory) -> Result<(), TableError> {
        let raw: Vec<u8> = self.entries.iter().flat_map(|e| e.0.to_le_bytes()).collect();
        mem.write(self.base as u64, &raw)?;
        log::debug!("page structure committed at {:#x}", self.base);
        Ok(())
    }
}
