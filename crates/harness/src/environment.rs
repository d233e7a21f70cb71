//! Building blocks a case's setup uses to replace the ambient environment
//! with one it owns.

use arch_core::control::{Cr3, Cr4};
use arch_core::env::ActiveEnvironment;
use arch_core::segments::{SegReg, SegmentDescriptor};
use devices_io::ComPort;
use mmu::paging::{PageTableEntry, PteFlags};
use tables::gdt::{KERNEL_CODE_INDEX, KERNEL_DATA_INDEX, TSS_INDEX, USER_CODE_INDEX, USER_DATA_INDEX};
use tables::{kernel_selector, GlobalDescriptorTable, InterruptTable, PageStructure, TaskStateSegment, DEFAULT_GDT_ENTRIES, TSS_SIZE};

use crate::error::CaseError;
use crate::layout::{CaseStorage, INTERRUPT_STUBS, INTERRUPT_STUB_STRIDE, USER_STACK_WORDS};
use crate::workmem::WorkMemory;

/// Flat 4 GiB limit in page units.
const FLAT_LIMIT: u32 = 0xF_FFFF;

/// The segmentation a case installed: its GDT and the ring-3 stack pointer
/// prepared for it.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub gdt: GlobalDescriptorTable,
    pub r3_esp: u32,
}

/// The page table a case installed behind PDE 1. PDE 0 identity-maps the
/// first 4 MiB with a large page.
#[derive(Debug, Clone)]
pub struct Paging {
    pub table: PageStructure,
}

/// Builds a full IDT in case storage and loads it.
pub fn init_interrupts(env: &mut dyn ActiveEnvironment, storage: &CaseStorage) -> Result<InterruptTable, CaseError> {
    let idt = InterruptTable::with_stubs(storage.idt(), kernel_selector(KERNEL_CODE_INDEX), INTERRUPT_STUBS, INTERRUPT_STUB_STRIDE)?;
    idt.commit(env.memory())?;
    env.set_idtr(idt.register());
    Ok(idt)
}

pub fn init_work_mem(work: &mut WorkMemory) {
    work.init();
}

/// Installs the default six-entry GDT and a TSS, then reloads CS, DS, SS and
/// the task register from it.
pub fn init_segmentation(env: &mut dyn ActiveEnvironment, storage: &CaseStorage) -> Result<Segmentation, CaseError> {
    let mut gdt = GlobalDescriptorTable::new(storage.gdt(), DEFAULT_GDT_ENTRIES)?;
    gdt.set_system(KERNEL_CODE_INDEX, SegmentDescriptor::code(0, FLAT_LIMIT, 0, true).page_granular())?;
    gdt.set_system(KERNEL_DATA_INDEX, SegmentDescriptor::data(0, FLAT_LIMIT, 0, true).page_granular())?;
    gdt.set_system(USER_CODE_INDEX, SegmentDescriptor::code(0, FLAT_LIMIT, 3, true).page_granular())?;
    gdt.set_system(USER_DATA_INDEX, SegmentDescriptor::data(0, FLAT_LIMIT, 3, true).page_granular())?;
    gdt.set_system(TSS_INDEX, SegmentDescriptor::tss32(storage.tss(), TSS_SIZE - 1))?;

    let tss = TaskStateSegment::new(storage.kernel_stack_top(), kernel_selector(KERNEL_DATA_INDEX));
    tss.commit(env.memory(), storage.tss())?;
    env.memory().fill(storage.user_stack() as u64, (USER_STACK_WORDS * 4) as usize, 0)?;
    gdt.commit(env.memory())?;

    env.set_gdtr(gdt.register());
    env.set_selector(SegReg::CS, kernel_selector(KERNEL_CODE_INDEX));
    env.set_selector(SegReg::DS, kernel_selector(KERNEL_DATA_INDEX));
    env.set_selector(SegReg::SS, kernel_selector(KERNEL_DATA_INDEX));
    env.set_task_register(kernel_selector(TSS_INDEX));

    Ok(Segmentation { gdt, r3_esp: storage.user_stack_top() })
}

/// Builds the case page directory and an empty page table, keeps the ambient
/// CR4 features with PSE added, and turns paging on.
pub fn init_paging(env: &mut dyn ActiveEnvironment, storage: &CaseStorage, cr4: Cr4) -> Result<Paging, CaseError> {
    let mut directory = PageStructure::new(storage.page_directory())?;
    let table = PageStructure::new(storage.page_table())?;
    directory.set_entry(0, PageTableEntry::large(0, PteFlags::RW))?;
    directory.map(1, table.frame(), PteFlags::RW | PteFlags::US)?;
    table.commit(env.memory())?;
    directory.commit(env.memory())?;

    env.set_cr4(cr4 | Cr4::PSE);
    env.set_cr3(Cr3::from_page_directory(directory.base()));
    env.enable_paging();
    Ok(Paging { table })
}

pub fn init_serial(env: &mut dyn ActiveEnvironment, port: ComPort) {
    log::debug!("initializing {port} at {:#x}", port.base());
    env.init_serial(port.base());
}
