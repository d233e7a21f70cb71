//! Capture and restore of the ambient processor state a case overwrites.

use arch_core::control::{Cr3, Cr4};
use arch_core::env::ArchState;
use arch_core::segments::{DescriptorTableReg, SegReg, SegmentSelector};
use serde::{Deserialize, Serialize};

/// Registers read before a case touches anything. Restoring consumes the
/// snapshot, so a case cannot restore twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub gdtr: DescriptorTableReg,
    pub idtr: DescriptorTableReg,
    pub tr: SegmentSelector,
    pub cr3: Cr3,
    pub cr4: Cr4,
    pub paging: bool,
    pub ds: SegmentSelector,
    pub ss: SegmentSelector,
    pub cs: SegmentSelector,
}

impl MachineSnapshot {
    pub fn capture<A: ArchState + ?Sized>(arch: &A) -> Self {
        let snap = Self {
            gdtr: arch.gdtr(),
            idtr: arch.idtr(),
            tr: arch.task_register(),
            cr3: arch.cr3(),
            cr4: arch.cr4(),
            paging: arch.paging_enabled(),
            ds: arch.selector(SegReg::DS),
            ss: arch.selector(SegReg::SS),
            cs: arch.selector(SegReg::CS),
        };
        log::debug!("captured {snap:x?}");
        snap
    }

    /// Puts the captured state back.
    ///
    /// Paging goes off before CR3/CR4 change so nothing is fetched through a
    /// half-replaced mapping, and comes back on only if it was on when captured.
    /// The task register is left as the case set it: the ambient TSS
    /// descriptor is still marked busy, so reloading it would fault.
    pub fn restore<A: ArchState + ?Sized>(self, arch: &mut A) {
        arch.disable_paging();
        arch.set_cr3(self.cr3);
        arch.set_cr4(self.cr4);
        if self.paging {
            arch.enable_paging();
        }
        arch.set_gdtr(self.gdtr);
        arch.set_idtr(self.idtr);
        log::info!("task register left at {:#x}, ambient was {:#x}", arch.task_register(), self.tr);
        arch.set_selector(SegReg::DS, self.ds);
        arch.set_selector(SegReg::SS, self.ss);
        arch.set_selector(SegReg::CS, self.cs);
    }
}
