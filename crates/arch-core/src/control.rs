use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Cr0: u32 {
        const PE = 1<<0;   // Protection Enable
        const MP = 1<<1;   // Monitor Coprocessor
        const EM = 1<<2;   // Emulation
        const TS = 1<<3;   // Task Switched
        const ET = 1<<4;   // Extension Type
        const NE = 1<<5;   // Numeric Error
        const WP = 1<<16;  // Write Protect
        const AM = 1<<18;  // Alignment Mask
        const NW = 1<<29;  // Not Write-through
        const CD = 1<<30;  // Cache Disable
        const PG = 1<<31;  // Paging
    }
}

/// CR3 in 32-bit (non-PAE) paging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cr3(pub u32);

impl Cr3 {
    pub fn from_page_directory(base: u32) -> Self { Self(base & 0xFFFF_F000) }
    pub fn page_directory(self) -> u32 { self.0 & 0xFFFF_F000 }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Cr4: u32 {
        const VME = 1<<0;
        const PVI = 1<<1;
        const TSD = 1<<2;
        const DE  = 1<<3;
        const PSE = 1<<4;
        const PAE = 1<<5;
        const MCE = 1<<6;
        const PGE = 1<<7;
        const PCE = 1<<8;
        const OSFXSR = 1<<9;
        const OSXMMEXCPT = 1<<10;
        const UMIP = 1<<11;
        const VMXE = 1<<13;
        const SMXE = 1<<14;
        const FSGSBASE = 1<<16;
        const PCIDE = 1<<17;
        const OSXSAVE = 1<<18;
        const SMEP = 1<<20;
        const SMAP = 1<<21;
        const PKE = 1<<22;
    }
}
