//! Physical layout of the private storage each case builds its tables in.

use arch_core::PAGE_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::CaseError;
use crate::workmem::span_end;

/// Words in the ring-3 stack a case prepares.
pub const USER_STACK_WORDS: u32 = 128;

/// Entry stubs the case IDT points at, 16 bytes apart.
pub const INTERRUPT_STUBS: u32 = 0x0000_9000;
pub const INTERRUPT_STUB_STRIDE: u32 = 16;

const GDT: u32 = 0x0000;
const TSS: u32 = 0x0800;
const IDT: u32 = 0x1000;
const KERNEL_STACK: u32 = 0x2000;
const USER_STACK: u32 = 0x3000;
const PAGE_DIRECTORY: u32 = 0x4000;
const PAGE_TABLE: u32 = 0x5000;

/// One case's slot. Everything a case writes outside the work pool lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStorage {
    base: u32,
}

impl CaseStorage {
    pub const SIZE: u32 = 8 * PAGE_SIZE;

    pub fn new(base: u32) -> Result<Self, CaseError> {
        if base % PAGE_SIZE != 0 { return Err(CaseError::Misaligned(base)); }
        span_end(base, Self::SIZE / PAGE_SIZE)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> u32 { self.base }
    pub fn gdt(&self) -> u32 { self.base + GDT }
    pub fn tss(&self) -> u32 { self.base + TSS }
    pub fn idt(&self) -> u32 { self.base + IDT }
    pub fn kernel_stack_top(&self) -> u32 { self.base + KERNEL_STACK + PAGE_SIZE }

    pub fn user_stack(&self) -> u32 { self.base + USER_STACK }

    /// Address of the last word of the user stack, the initial ring-3 ESP.
    pub fn user_stack_top(&self) -> u32 { self.base + USER_STACK + (USER_STACK_WORDS - 1) * 4 }

    pub fn page_directory(&self) -> u32 { self.base + PAGE_DIRECTORY }
    pub fn page_table(&self) -> u32 { self.base + PAGE_TABLE }
}

/// Consecutive storage slots handed out by registry position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageArena {
    base: u32,
    slots: usize,
}

impl StorageArena {
    pub fn new(base: u32, slots: usize) -> Result<Self, CaseError> {
        CaseStorage::new(base)?;
        let pages = u32::try_from(slots)
            .ok()
            .and_then(|n| n.checked_mul(CaseStorage::SIZE / PAGE_SIZE))
            .unwrap_or(u32::MAX);
        span_end(base, pages)?;
        Ok(Self { base, slots })
    }

    pub fn slot(&self, index: usize) -> Result<CaseStorage, CaseError> {
        if index >= self.slots { return Err(CaseError::NoStorageSlot(index)); }
        CaseStorage::new(self.base + index as u32 * CaseStorage::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_do_not_overlap() {
        let arena = StorageArena::new(0x10_0000, 4).unwrap();
        let a = arena.slot(0).unwrap();
        let b = arena.slot(1).unwrap();
        assert!(a.page_table() + PAGE_SIZE <= b.base());
        assert_eq!(arena.slot(4), Err(CaseError::NoStorageSlot(4)));
    }

    #[test]
    fn storage_past_4gib_is_refused() {
        assert!(matches!(CaseStorage::new(0xFFFF_C000), Err(CaseError::AddressOverflow { .. })));
        assert!(matches!(StorageArena::new(0xFFFC_0000, 16), Err(CaseError::AddressOverflow { .. })));
        assert!(StorageArena::new(0xFFFC_0000, 1).is_ok());
    }

    #[test]
    fn tables_are_page_aligned() {
        let s = CaseStorage::new(0x10_8000).unwrap();
        assert_eq!(s.page_directory() % PAGE_SIZE, 0);
        assert_eq!(s.page_table() % PAGE_SIZE, 0);
        assert_eq!(s.user_stack_top(), 0x10_8000 + 0x3000 + 127 * 4);
        assert_eq!(s.kernel_stack_top(), 0x10_B000);
    }
}
