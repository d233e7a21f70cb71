use arch_core::memory::Memory;
use serde::{Deserialize, Serialize};

/// Entries per page directory or page table in 32-bit paging.
pub const ENTRIES_PER_TABLE: usize = 1024;

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PteFlags: u32 {
        const P = 1<<0;   // Present
        const RW = 1<<1;  // Read/Write
        const US = 1<<2;  // User/Supervisor
        const PWT = 1<<3; // Write-through
        const PCD = 1<<4; // Cache-disable
        const A = 1<<5;   // Accessed
        const D = 1<<6;   // Dirty
        const PS = 1<<7;  // Page Size (PDE only)
        const G = 1<<8;   // Global
    }
}

/// Frame number of the 4 KiB page containing `addr`.
pub fn page_number(addr: u32) -> u32 { addr >> 12 }

pub fn directory_index(lin: u32) -> usize { ((lin >> 22) & 0x3FF) as usize }
pub fn table_index(lin: u32) -> usize { ((lin >> 12) & 0x3FF) as usize }

/// A 32-bit page directory or page table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTableEntry(pub u32);

impl PageTableEntry {
    pub const EMPTY: PageTableEntry = PageTableEntry(0);

    /// Present entry pointing at 4 KiB frame `frame`.
    pub fn new(frame: u32, flags: PteFlags) -> Self {
        Self((frame << 12) | (flags | PteFlags::P).bits())
    }

    /// Present 4 MiB page directory entry mapping `base` (4 MiB aligned).
    pub fn large(base: u32, flags: PteFlags) -> Self {
        Self((base & 0xFFC0_0000) | (flags | PteFlags::P | PteFlags::PS).bits())
    }

    pub fn flags(self) -> PteFlags { PteFlags::from_bits_truncate(self.0) }
    pub fn frame(self) -> u32 { self.0 >> 12 }
    pub fn address(self) -> u32 { self.0 & 0xFFFF_F000 }
    pub fn present(self) -> bool { self.flags().contains(PteFlags::P) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TranslateResult {
    pub phys: u32,
    pub flags: PteFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PageFaultKind {
    #[error("not present")] NotPresent,
    #[error("protection violation")] Protection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page fault: {kind} at lin={lin:#x}")]
pub struct PageFault { pub lin: u32, pub kind: PageFaultKind, pub code: u32 }

impl PageFault {
    fn new(lin: u32, kind: PageFaultKind, write: bool, user: bool) -> Self {
        let mut code = 0u32;
        if kind == PageFaultKind::Protection { code |= 1<<0; }
        if write { code |= 1<<1; }
        if user { code |= 1<<2; }
        Self { lin, kind, code }
    }
}

/// Access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub write: bool,
    pub user: bool,
}

/// Two-level 32-bit page walk over physical memory, setting A/D bits the way the
/// processor does.
pub struct Walker32<'a> {
    pub cr3: u32,
    pub pse: bool,
    pub mem: &'a mut dyn Memory,
}

impl<'a> Walker32<'a> {
    fn load(&self, pa: u32, lin: u32, access: Access) -> Result<PageTableEntry, PageFault> {
        self.mem
            .read_u32(pa as u64)
            .map(PageTableEntry)
            .map_err(|_| PageFault::new(lin, PageFaultKind::NotPresent, access.write, access.user))
    }

    fn mark(&mut self, pa: u32, entry: &mut PageTableEntry, bits: PteFlags, lin: u32, access: Access) -> Result<(), PageFault> {
        if entry.flags().contains(bits) { return Ok(()); }
        entry.0 |= bits.bits();
        self.mem
            .write_u32(pa as u64, entry.0)
            .map_err(|_| PageFault::new(lin, PageFaultKind::Protection, access.write, access.user))
    }

    pub fn translate(&mut self, lin: u32, access: Access) -> Result<TranslateResult, PageFault> {
        let fault = |kind| PageFault::new(lin, kind, access.write, access.user);

        let pde_pa = (self.cr3 & 0xFFFF_F000) + (directory_index(lin) as u32) * 4;
        let mut pde = self.load(pde_pa, lin, access)?;
        if !pde.present() { return Err(fault(PageFaultKind::NotPresent)); }

        if self.pse && pde.flags().contains(PteFlags::PS) {
            let flags = pde.flags();
            if access.write && !flags.contains(PteFlags::RW) { return Err(fault(PageFaultKind::Protection)); }
            if access.user && !flags.contains(PteFlags::US) { return Err(fault(PageFaultKind::Protection)); }
            let touched = if access.write { PteFlags::A | PteFlags::D } else { PteFlags::A };
            self.mark(pde_pa, &mut pde, touched, lin, access)?;
            let phys = (pde.0 & 0xFFC0_0000) | (lin & 0x003F_FFFF);
            return Ok(TranslateResult { phys, flags: pde.flags() & (PteFlags::P | PteFlags::RW | PteFlags::US) });
        }
        self.mark(pde_pa, &mut pde, PteFlags::A, lin, access)?;

        let pte_pa = pde.address() + (table_index(lin) as u32) * 4;
        let mut pte = self.load(pte_pa, lin, access)?;
        if !pte.present() { return Err(fault(PageFaultKind::NotPresent)); }

        // RW and US must be granted at both levels
        let granted = pde.flags() & pte.flags();
        if access.write && !granted.contains(PteFlags::RW) { return Err(fault(PageFaultKind::Protection)); }
        if access.user && !granted.contains(PteFlags::US) { return Err(fault(PageFaultKind::Protection)); }

        let touched = if access.write { PteFlags::A | PteFlags::D } else { PteFlags::A };
        self.mark(pte_pa, &mut pte, touched, lin, access)?;

        let phys = pte.address() | (lin & 0xFFF);
        Ok(TranslateResult { phys, flags: (granted & (PteFlags::RW | PteFlags::US)) | PteFlags::P })
    }
}
