//! Segment register loads and LSL with the protected-mode checks.
//!
//! Descriptors are fetched through the linear address space, so a GDT that
//! lives in paged memory is read the way the processor reads it.

use arch_core::exceptions::{Exception, Vector};
use arch_core::segments::{DescriptorFlags, SegReg, SegmentDescriptor, SegmentSelector, SystemType};
use mmu::paging::Access;
use serde::{Deserialize, Serialize};

use crate::machine::SimMachine;

/// Hidden part of a segment register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCache {
    pub base: u32,
    /// Byte limit, granularity already applied.
    pub limit: u32,
    pub flags: DescriptorFlags,
    pub valid: bool,
}

impl SegmentCache {
    fn from_descriptor(desc: &SegmentDescriptor) -> Self {
        Self { base: desc.base, limit: desc.effective_limit(), flags: desc.flags, valid: true }
    }

    /// Checks an access of `size` bytes at `offset`, returning the linear address.
    pub fn check(&self, seg: SegReg, offset: u32, size: u32, write: bool) -> Result<u32, Exception> {
        let fault = if seg == SegReg::SS { Exception::new(Vector::SS, Some(0)) } else { Exception::gp(0) };
        if !self.valid { return Err(fault); }
        let f = self.flags;
        if write && (f.is_code() || !f.contains(DescriptorFlags::RW)) { return Err(fault); }
        if !write && f.is_code() && !f.contains(DescriptorFlags::RW) { return Err(fault); }

        let end = (offset as u64) + size as u64 - 1;
        let expand_down = f.is_data() && f.contains(DescriptorFlags::DC);
        if expand_down {
            let upper = if f.contains(DescriptorFlags::DB) { 0xFFFF_FFFF } else { 0xFFFF };
            if (offset as u64) <= self.limit as u64 || end > upper { return Err(fault); }
        } else if end > self.limit as u64 {
            return Err(fault);
        }
        Ok(self.base.wrapping_add(offset))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegState {
    regs: [(SegmentSelector, SegmentCache); 6],
}

fn slot(seg: SegReg) -> usize {
    match seg {
        SegReg::CS => 0,
        SegReg::DS => 1,
        SegReg::ES => 2,
        SegReg::FS => 3,
        SegReg::GS => 4,
        SegReg::SS => 5,
    }
}

impl SegState {
    pub fn get(&self, seg: SegReg) -> (SegmentSelector, SegmentCache) { self.regs[slot(seg)] }
    pub fn set(&mut self, seg: SegReg, sel: SegmentSelector, cache: SegmentCache) { self.regs[slot(seg)] = (sel, cache); }
}

fn sel_fault(sel: SegmentSelector) -> Exception { Exception::gp((sel.0 & 0xFFFC) as u32) }

impl SimMachine {
    pub fn cpl(&self) -> u8 { self.segs.get(SegReg::CS).1.flags.dpl() }

    /// Linear address of the descriptor `sel` names, if the GDT covers it.
    /// LDT selectors are never covered: the machine has no LDT.
    fn descriptor_address(&self, sel: SegmentSelector) -> Option<u32> {
        (!sel.ti() && self.gdtr.covers(sel.index())).then(|| self.gdtr.slot_address(sel.index()))
    }

    fn fetch_descriptor(&mut self, lin: u32) -> Result<[u8; 8], Exception> {
        let mut raw = [0u8; 8];
        self.read_linear(lin, &mut raw, Access::default())?;
        Ok(raw)
    }

    fn read_descriptor(&mut self, sel: SegmentSelector) -> Result<SegmentDescriptor, Exception> {
        let lin = self.descriptor_address(sel).ok_or(sel_fault(sel))?;
        Ok(SegmentDescriptor::decode(self.fetch_descriptor(lin)?))
    }

    /// MOV to DS/ES/FS/GS/SS.
    pub(crate) fn load_segment(&mut self, seg: SegReg, sel: SegmentSelector) -> Result<(), Exception> {
        let cpl = self.cpl();
        if sel.is_null() {
            if seg == SegReg::SS { return Err(Exception::gp(0)); }
            self.segs.set(seg, sel, SegmentCache::default());
            return Ok(());
        }
        let desc = self.read_descriptor(sel)?;
        let f = desc.flags;
        if seg == SegReg::SS {
            if sel.rpl() != cpl || !f.is_data() || !f.contains(DescriptorFlags::RW) || f.dpl() != cpl {
                return Err(sel_fault(sel));
            }
            if !f.present() { return Err(Exception::new(Vector::SS, Some((sel.0 & 0xFFFC) as u32))); }
        } else {
            if f.is_system() { return Err(sel_fault(sel)); }
            if f.is_code() && !f.contains(DescriptorFlags::RW) { return Err(sel_fault(sel)); }
            let conforming_code = f.is_code() && f.contains(DescriptorFlags::DC);
            if !conforming_code && f.dpl() < cpl.max(sel.rpl()) { return Err(sel_fault(sel)); }
            if !f.present() { return Err(Exception::new(Vector::NP, Some((sel.0 & 0xFFFC) as u32))); }
        }
        self.segs.set(seg, sel, SegmentCache::from_descriptor(&desc));
        Ok(())
    }

    /// Far transfer to `sel` at the current privilege level.
    pub(crate) fn load_code_segment(&mut self, sel: SegmentSelector) -> Result<(), Exception> {
        if sel.is_null() { return Err(Exception::gp(0)); }
        let cpl = self.cpl();
        let desc = self.read_descriptor(sel)?;
        let f = desc.flags;
        if !f.is_code() { return Err(sel_fault(sel)); }
        let allowed = if f.contains(DescriptorFlags::DC) { f.dpl() <= cpl } else { f.dpl() == cpl && sel.rpl() <= cpl };
        if !allowed { return Err(sel_fault(sel)); }
        if !f.present() { return Err(Exception::new(Vector::NP, Some((sel.0 & 0xFFFC) as u32))); }
        // RPL of the loaded CS is the CPL
        let loaded = SegmentSelector((sel.0 & !0x3) | cpl as u16);
        let mut cache = SegmentCache::from_descriptor(&desc);
        cache.flags = cache.flags.with_dpl(cpl);
        self.segs.set(SegReg::CS, loaded, cache);
        Ok(())
    }

    /// LTR: the descriptor must be an available TSS, which is then marked busy.
    pub(crate) fn load_task_register(&mut self, sel: SegmentSelector) -> Result<(), Exception> {
        if sel.is_null() { return Err(Exception::gp(0)); }
        if self.cpl() != 0 { return Err(Exception::gp(0)); }
        let lin = self.descriptor_address(sel).ok_or(sel_fault(sel))?;
        let mut raw = self.fetch_descriptor(lin)?;
        let desc = SegmentDescriptor::decode(raw);
        match desc.system_type() {
            Some(t) if t.is_tss() && !t.is_busy_tss() => {}
            _ => return Err(sel_fault(sel)),
        }
        if !desc.present() { return Err(Exception::new(Vector::NP, Some((sel.0 & 0xFFFC) as u32))); }
        raw[5] |= 0b0010;
        self.write_linear(lin, &raw, Access { write: true, user: false })?;
        self.tr = (sel, SegmentCache::from_descriptor(&desc));
        Ok(())
    }

    /// LSL. `None` stands for ZF clear: the selector is null, outside the
    /// table, the wrong kind of descriptor, or not visible at this privilege.
    pub(crate) fn segment_limit(&mut self, sel: SegmentSelector) -> Result<Option<u32>, Exception> {
        if sel.is_null() { return Ok(None); }
        let Some(lin) = self.descriptor_address(sel) else { return Ok(None) };
        let desc = SegmentDescriptor::decode(self.fetch_descriptor(lin)?);
        let f = desc.flags;
        if f.is_system() {
            let listed = matches!(
                desc.system_type(),
                Some(SystemType::Ldt | SystemType::TssAvail16 | SystemType::TssBusy16 | SystemType::TssAvail32 | SystemType::TssBusy32)
            );
            if !listed { return Ok(None); }
        }
        let conforming_code = f.is_code() && f.contains(DescriptorFlags::DC);
        if !conforming_code && f.dpl() < self.cpl().max(sel.rpl()) { return Ok(None); }
        Ok(Some(desc.effective_limit()))
    }
}
