//! Architecture accessors.
//!
//! Every setter is a single register transfer and returns nothing: the harness
//! treats register restore as infallible once it holds a valid snapshot. An
//! implementation that can observe a fault on a setter (the simulator can)
//! records it on its own side.

use crate::control::{Cr0, Cr3, Cr4};
use crate::exceptions::Exception;
use crate::memory::Memory;
use crate::ops::{OpOutcome, PrivilegedOp};
use crate::segments::{DescriptorTableReg, SegReg, SegmentSelector};

pub trait ArchState {
    fn gdtr(&self) -> DescriptorTableReg;
    fn set_gdtr(&mut self, gdtr: DescriptorTableReg);

    fn idtr(&self) -> DescriptorTableReg;
    fn set_idtr(&mut self, idtr: DescriptorTableReg);

    fn task_register(&self) -> SegmentSelector;
    fn set_task_register(&mut self, sel: SegmentSelector);

    fn cr0(&self) -> Cr0;
    fn set_cr0(&mut self, cr0: Cr0);

    fn cr3(&self) -> Cr3;
    fn set_cr3(&mut self, cr3: Cr3);

    fn cr4(&self) -> Cr4;
    fn set_cr4(&mut self, cr4: Cr4);

    fn selector(&self, seg: SegReg) -> SegmentSelector;
    fn set_selector(&mut self, seg: SegReg, sel: SegmentSelector);

    fn paging_enabled(&self) -> bool { self.cr0().contains(Cr0::PG) }

    fn enable_paging(&mut self) {
        let cr0 = self.cr0();
        self.set_cr0(cr0 | Cr0::PG);
    }

    fn disable_paging(&mut self) {
        let cr0 = self.cr0();
        self.set_cr0(cr0 - Cr0::PG);
    }
}

pub trait ArchCapability {
    fn execute(&mut self, op: PrivilegedOp) -> Result<OpOutcome, Exception>;
}

/// The live machine a test case runs against.
pub trait ActiveEnvironment: ArchState + ArchCapability {
    /// Physical memory, addressed without translation.
    fn memory(&mut self) -> &mut dyn Memory;

    /// Brings up the UART at `port` so it can be the target of port I/O.
    fn init_serial(&mut self, port: u16);
}
