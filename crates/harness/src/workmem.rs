//! The working-memory pool: a bump allocator over a fixed run of physical
//! pages. Pages are never returned, so the cursor only moves forward.

use arch_core::PAGE_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::CaseError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMemory {
    base: u32,
    total: u32,
    next_free: u32,
    free: u32,
    initialized: bool,
}

impl WorkMemory {
    /// Describes a pool of `pages` pages at `base`. Nothing can be reserved
    /// until [`WorkMemory::init`] runs.
    pub fn new(base: u32, pages: u32) -> Result<Self, CaseError> {
        if base % PAGE_SIZE != 0 { return Err(CaseError::Misaligned(base)); }
        span_end(base, pages)?;
        Ok(Self { base, total: pages, next_free: base, free: 0, initialized: false })
    }

    /// Opens the pool. Later calls leave the cursor where it is.
    pub fn init(&mut self) {
        if self.initialized {
            log::debug!("work memory already initialized, {} pages free at {:#x}", self.free, self.next_free);
            return;
        }
        self.next_free = self.base;
        self.free = self.total;
        self.initialized = true;
        log::debug!("work memory: {} pages at {:#x}", self.total, self.base);
    }

    pub fn is_initialized(&self) -> bool { self.initialized }

    /// Physical address the next reservation starts at.
    pub fn next_free_page(&self) -> u32 { self.next_free }

    pub fn free_pages(&self) -> u32 { self.free }

    /// Claims `count` pages. Fails without moving the cursor when fewer are free.
    pub fn reserve(&mut self, count: u32) -> Result<PageRun, CaseError> {
        if self.free < count {
            return Err(CaseError::NotEnoughMemory { needed: count, available: self.free });
        }
        let next = span_end(self.next_free, count)?;
        let run = PageRun { first: self.next_free };
        self.free -= count;
        self.next_free = next;
        log::debug!("reserved {count} pages at {:#x}, {} left", run.first, self.free);
        Ok(run)
    }
}

/// First address past `pages` pages at `base`, if it stays below 4 GiB.
pub(crate) fn span_end(base: u32, pages: u32) -> Result<u32, CaseError> {
    pages
        .checked_mul(PAGE_SIZE)
        .and_then(|len| base.checked_add(len))
        .ok_or(CaseError::AddressOverflow { base, pages })
}

/// Pages handed out by one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRun {
    first: u32,
}

impl PageRun {
    pub fn first(&self) -> u32 { self.first }
}
