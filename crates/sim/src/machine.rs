use std::collections::BTreeMap;

use arch_core::control::{Cr0, Cr3, Cr4};
use arch_core::env::{ActiveEnvironment, ArchCapability, ArchState};
use arch_core::exceptions::{Exception, Vector};
use arch_core::memory::{FlatMem, Memory};
use arch_core::ops::{OpOutcome, PrivilegedOp};
use arch_core::segments::{DescriptorTableReg, SegReg, SegmentDescriptor, SegmentSelector};
use devices_io::serial::{init_sequence, UART_SPAN};
use devices_io::{ComPort, IoBus, SerialCapture, Uart16550};
use mmu::paging::Access;
use mmu::tlb::{translate_cached, Tlb};
use mmu::Walker32;
use serde::{Deserialize, Serialize};

use crate::segmentation::{SegState, SegmentCache};
use crate::{SimConfig, SimError};

/// Where the boot environment keeps its tables.
pub const BOOT_GDT: u32 = 0x0800;
pub const BOOT_IDT: u32 = 0x1000;
pub const BOOT_TSS: u32 = 0x1800;

pub const BOOT_CODE: SegmentSelector = SegmentSelector::gdt(1, 0);
pub const BOOT_DATA: SegmentSelector = SegmentSelector::gdt(2, 0);
pub const BOOT_TSS_SEL: SegmentSelector = SegmentSelector::gdt(3, 0);

/// A fault a register write raised. The accessor that caused it returned
/// normally; the register kept its previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFault {
    pub op: String,
    pub exception: Exception,
}

pub struct SimMachine {
    pub(crate) mem: FlatMem,
    pub(crate) bus: IoBus,
    serial: BTreeMap<u16, SerialCapture>,
    pub(crate) gdtr: DescriptorTableReg,
    idtr: DescriptorTableReg,
    pub(crate) tr: (SegmentSelector, SegmentCache),
    cr0: Cr0,
    cr3: Cr3,
    cr4: Cr4,
    pub(crate) segs: SegState,
    tlb: Tlb,
    faults: Vec<RecordedFault>,
}

impl SimMachine {
    /// Powers on in flat 32-bit protected mode, paging off: a four-entry GDT
    /// (null, ring-0 code, ring-0 data, TSS), an empty IDT and a loaded TR.
    pub fn boot(config: &SimConfig) -> Result<Self, SimError> {
        if config.ram_size < 0x10_000 { return Err(SimError::RamTooSmall(config.ram_size)); }
        let mut m = Self {
            mem: FlatMem::new(config.ram_size),
            bus: IoBus::new(),
            serial: BTreeMap::new(),
            gdtr: DescriptorTableReg::default(),
            idtr: DescriptorTableReg::default(),
            tr: Default::default(),
            cr0: Cr0::PE | Cr0::ET,
            cr3: Cr3::default(),
            cr4: Cr4::empty(),
            segs: SegState::default(),
            tlb: Tlb::new(),
            faults: Vec::new(),
        };

        let gdt = [
            SegmentDescriptor::NULL,
            SegmentDescriptor::code(0, 0xF_FFFF, 0, true).page_granular(),
            SegmentDescriptor::data(0, 0xF_FFFF, 0, true).page_granular(),
            SegmentDescriptor::tss32(BOOT_TSS, 103),
        ];
        for (i, desc) in gdt.iter().enumerate() {
            m.mem.write(BOOT_GDT as u64 + i as u64 * 8, &desc.encode())?;
        }
        m.gdtr = DescriptorTableReg::for_entries(BOOT_GDT, gdt.len());
        m.idtr = DescriptorTableReg::for_entries(BOOT_IDT, 256);

        // CS first so the data loads see CPL 0
        let boot_cs = SegmentDescriptor::code(0, 0xF_FFFF, 0, true).page_granular();
        m.segs.set(SegReg::CS, BOOT_CODE, SegmentCache { base: 0, limit: boot_cs.effective_limit(), flags: boot_cs.flags, valid: true });
        for seg in [SegReg::DS, SegReg::ES, SegReg::FS, SegReg::GS, SegReg::SS] {
            m.load_segment(seg, BOOT_DATA)?;
        }
        m.load_task_register(BOOT_TSS_SEL)?;

        if config.console {
            m.attach_uart(ComPort::Com1.base())?;
        }
        log::debug!("sim booted with {:#x} bytes of ram", config.ram_size);
        Ok(m)
    }

    fn attach_uart(&mut self, base: u16) -> Result<SerialCapture, SimError> {
        if let Some(capture) = self.serial.get(&base) {
            return Ok(capture.clone());
        }
        let capture = SerialCapture::new();
        self.bus.map(base, UART_SPAN, Box::new(Uart16550::new(capture.clone())))?;
        self.serial.insert(base, capture.clone());
        Ok(capture)
    }

    /// Bytes transmitted so far by the UART at `port`.
    pub fn serial_output(&self, port: u16) -> Vec<u8> {
        self.serial.get(&port).map(SerialCapture::contents).unwrap_or_default()
    }

    pub fn faults(&self) -> &[RecordedFault] { &self.faults }

    pub fn tlb_len(&self) -> usize { self.tlb.len() }

    pub fn phys(&self) -> &FlatMem { &self.mem }

    fn record(&mut self, op: &str, exception: Exception) {
        log::warn!("{op} faulted: {exception}");
        self.faults.push(RecordedFault { op: op.to_string(), exception });
    }

    fn translate(&mut self, lin: u32, access: Access) -> Result<u32, Exception> {
        if !self.cr0.contains(Cr0::PG) { return Ok(lin); }
        let mut walker = Walker32 { cr3: self.cr3.0, pse: self.cr4.contains(Cr4::PSE), mem: &mut self.mem };
        translate_cached(&mut self.tlb, &mut walker, lin, access)
            .map(|tr| tr.phys)
            .map_err(|pf| Exception::new(Vector::PF, Some(pf.code)))
    }

    /// Reads through segmentation-free linear addressing, honoring paging.
    /// Physical addresses past the end of RAM read as 0xFF.
    pub fn read_linear(&mut self, lin: u32, buf: &mut [u8], access: Access) -> Result<(), Exception> {
        for (i, byte) in buf.iter_mut().enumerate() {
            let pa = self.translate(lin.wrapping_add(i as u32), access)?;
            let mut one = [0xFF];
            if self.mem.read(pa as u64, &mut one).is_err() {
                log::trace!("read of unbacked physical address {pa:#x}");
            }
            *byte = one[0];
        }
        Ok(())
    }

    pub fn write_linear(&mut self, lin: u32, data: &[u8], access: Access) -> Result<(), Exception> {
        for (i, byte) in data.iter().enumerate() {
            let pa = self.translate(lin.wrapping_add(i as u32), access)?;
            if self.mem.write(pa as u64, &[*byte]).is_err() {
                log::trace!("write to unbacked physical address {pa:#x} dropped");
            }
        }
        Ok(())
    }
}

impl ArchState for SimMachine {
    fn gdtr(&self) -> DescriptorTableReg { self.gdtr }
    fn set_gdtr(&mut self, gdtr: DescriptorTableReg) {
        log::debug!("lgdt base={:#x} limit={:#x}", gdtr.base, gdtr.limit);
        self.gdtr = gdtr;
    }

    fn idtr(&self) -> DescriptorTableReg { self.idtr }
    fn set_idtr(&mut self, idtr: DescriptorTableReg) {
        log::debug!("lidt base={:#x} limit={:#x}", idtr.base, idtr.limit);
        self.idtr = idtr;
    }

    fn task_register(&self) -> SegmentSelector { self.tr.0 }
    fn set_task_register(&mut self, sel: SegmentSelector) {
        if let Err(e) = self.load_task_register(sel) {
            self.record("ltr", e);
        }
    }

    fn cr0(&self) -> Cr0 { self.cr0 }
    fn set_cr0(&mut self, cr0: Cr0) {
        if cr0.contains(Cr0::PG) && !cr0.contains(Cr0::PE) {
            self.record("mov cr0", Exception::gp(0));
            return;
        }
        if (cr0 ^ self.cr0).contains(Cr0::PG) {
            log::debug!("paging {}", if cr0.contains(Cr0::PG) { "on" } else { "off" });
        }
        self.cr0 = cr0;
        self.tlb.flush_all();
    }

    fn cr3(&self) -> Cr3 { self.cr3 }
    fn set_cr3(&mut self, cr3: Cr3) {
        self.cr3 = cr3;
        self.tlb.flush_all();
    }

    fn cr4(&self) -> Cr4 { self.cr4 }
    fn set_cr4(&mut self, cr4: Cr4) {
        self.cr4 = cr4;
        self.tlb.flush_all();
    }

    fn selector(&self, seg: SegReg) -> SegmentSelector { self.segs.get(seg).0 }
    fn set_selector(&mut self, seg: SegReg, sel: SegmentSelector) {
        let loaded = match seg {
            SegReg::CS => self.load_code_segment(sel),
            _ => self.load_segment(seg, sel),
        };
        if let Err(e) = loaded {
            self.record(&format!("load {seg:?} {sel:#x}"), e);
        }
    }
}

impl ArchCapability for SimMachine {
    fn execute(&mut self, op: PrivilegedOp) -> Result<OpOutcome, Exception> {
        match op {
            PrivilegedOp::ReadSegmentLimit { selector } => self.segment_limit(selector).map(OpOutcome::SegmentLimit),
            PrivilegedOp::RepeatedPortWrite { port, width, segment, offset, count } => {
                let transferred = self.rep_outs(port, width, segment, offset, count)?;
                Ok(OpOutcome::PortWrite { transferred })
            }
        }
    }
}

impl ActiveEnvironment for SimMachine {
    fn memory(&mut self) -> &mut dyn Memory { &mut self.mem }

    fn init_serial(&mut self, port: u16) {
        if let Err(e) = self.attach_uart(port) {
            log::warn!("no uart at {port:#x}: {e}");
            return;
        }
        for (p, val) in init_sequence(port) {
            if let Err(e) = self.bus.outb(p, val) {
                log::warn!("uart init write to {p:#x} lost: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arch_core::Width;
    use mmu::paging::{PageTableEntry, PteFlags};

    fn machine() -> SimMachine { SimMachine::boot(&SimConfig::default()).unwrap() }

    fn put_descriptor(m: &mut SimMachine, index: u16, desc: SegmentDescriptor) {
        m.mem.write(BOOT_GDT as u64 + index as u64 * 8, &desc.encode()).unwrap();
        let entries = m.gdtr.entries().max(index as usize + 1);
        m.set_gdtr(DescriptorTableReg::for_entries(BOOT_GDT, entries));
    }

    #[test]
    fn boots_flat_with_busy_tss() {
        let m = machine();
        assert_eq!(m.cr0(), Cr0::PE | Cr0::ET);
        assert!(!m.paging_enabled());
        assert_eq!(m.selector(SegReg::DS), BOOT_DATA);
        assert_eq!(m.selector(SegReg::CS), BOOT_CODE);
        assert_eq!(m.task_register(), BOOT_TSS_SEL);
        let mut raw = [0u8; 1];
        m.mem.read(BOOT_GDT as u64 + 3 * 8 + 5, &mut raw).unwrap();
        assert_eq!(raw[0], 0x8B);
        assert!(m.faults().is_empty());
    }

    #[test]
    fn reloading_busy_tss_is_recorded_not_applied() {
        let mut m = machine();
        m.set_task_register(BOOT_TSS_SEL);
        assert_eq!(m.faults().len(), 1);
        assert_eq!(m.faults()[0].exception, Exception::gp(0x18));
    }

    #[test]
    fn bad_segment_loads_leave_register_unchanged() {
        let mut m = machine();
        // past the table limit
        m.set_selector(SegReg::DS, SegmentSelector::gdt(9, 0));
        // SS needs writable data
        put_descriptor(&mut m, 4, SegmentDescriptor::data(0, 0xFFFF, 0, false));
        m.set_selector(SegReg::SS, SegmentSelector::gdt(4, 0));
        // not present
        let mut absent = SegmentDescriptor::data(0, 0xFFFF, 0, true);
        absent.flags.remove(arch_core::DescriptorFlags::PRESENT);
        put_descriptor(&mut m, 5, absent);
        m.set_selector(SegReg::ES, SegmentSelector::gdt(5, 0));

        let vectors: Vec<Vector> = m.faults().iter().map(|f| f.exception.vector).collect();
        assert_eq!(vectors, vec![Vector::GP, Vector::GP, Vector::NP]);
        assert_eq!(m.selector(SegReg::DS), BOOT_DATA);
        assert_eq!(m.selector(SegReg::SS), BOOT_DATA);
        assert_eq!(m.selector(SegReg::ES), BOOT_DATA);
        // read-only data is fine for DS
        m.set_selector(SegReg::DS, SegmentSelector::gdt(4, 0));
        assert_eq!(m.faults().len(), 3);
        assert_eq!(m.selector(SegReg::DS), SegmentSelector::gdt(4, 0));
    }

    #[test]
    fn lsl_reports_byte_limit_or_clears_zf() {
        let mut m = machine();
        put_descriptor(&mut m, 4, SegmentDescriptor::data(0x40_0FF0, 0, 0, false).page_granular());
        let lsl = |m: &mut SimMachine, sel| m.execute(PrivilegedOp::ReadSegmentLimit { selector: sel }).unwrap();
        assert_eq!(lsl(&mut m, SegmentSelector::gdt(4, 0)), OpOutcome::SegmentLimit(Some(0xFFF)));
        assert_eq!(lsl(&mut m, SegmentSelector::NULL), OpOutcome::SegmentLimit(None));
        assert_eq!(lsl(&mut m, SegmentSelector::gdt(30, 0)), OpOutcome::SegmentLimit(None));
        // RPL 3 cannot see a DPL 0 data segment
        assert_eq!(lsl(&mut m, SegmentSelector::gdt(4, 3)), OpOutcome::SegmentLimit(None));
        // the TSS is listed, a byte-granular 104-byte segment
        assert_eq!(lsl(&mut m, BOOT_TSS_SEL), OpOutcome::SegmentLimit(Some(103)));
    }

    #[test]
    fn rep_outs_stops_at_segment_limit() {
        let mut m = machine();
        m.init_serial(ComPort::Com3.base());
        m.mem.write(0x5000, b"0123456789").unwrap();
        put_descriptor(&mut m, 4, SegmentDescriptor::data(0x5000, 3, 0, false));
        m.set_selector(SegReg::DS, SegmentSelector::gdt(4, 0));
        assert_eq!(m.selector(SegReg::DS), SegmentSelector::gdt(4, 0));
        let op = PrivilegedOp::RepeatedPortWrite { port: 0x3E8, width: Width::W8, segment: SegReg::DS, offset: 0, count: 8 };
        assert_eq!(m.execute(op), Err(Exception::gp(0)));
        assert_eq!(m.serial_output(0x3E8), b"0123");
    }

    #[test]
    fn paged_reads_follow_page_table_and_cr3_flushes() {
        let mut m = machine();
        m.mem.write_u32(0x10_0000, PageTableEntry::large(0, PteFlags::RW).0).unwrap();
        m.mem.write_u32(0x10_0004, PageTableEntry::new(0x101, PteFlags::RW).0).unwrap();
        m.mem.write_u32(0x10_1000, PageTableEntry::new(0x301, PteFlags::RW).0).unwrap();
        m.mem.write_u32(0x10_1004, PageTableEntry::new(0x300, PteFlags::RW).0).unwrap();
        m.mem.fill(0x30_0000, 0x1000, b'A').unwrap();
        m.mem.fill(0x30_1000, 0x1000, b'B').unwrap();

        m.set_cr4(Cr4::PSE);
        m.set_cr3(Cr3::from_page_directory(0x10_0000));
        m.enable_paging();
        let mut buf = [0u8; 4];
        m.read_linear(0x40_0FFE, &mut buf, Access::default()).unwrap();
        assert_eq!(&buf, b"BBAA");
        assert!(m.tlb_len() >= 2);

        m.set_cr3(Cr3::from_page_directory(0x10_0000));
        assert_eq!(m.tlb_len(), 0);
        let err = m.read_linear(0x80_0000, &mut buf, Access::default()).unwrap_err();
        assert_eq!(err.vector, Vector::PF);
    }

    #[test]
    fn paging_without_protection_is_refused() {
        let mut m = machine();
        m.set_cr0(Cr0::PG);
        assert_eq!(m.cr0(), Cr0::PE | Cr0::ET);
        assert_eq!(m.faults().len(), 1);
    }
}
