use arch_core::control::{Cr0, Cr3, Cr4};
use arch_core::env::{ActiveEnvironment, ArchCapability, ArchState};
use arch_core::memory::Memory;
use arch_core::ops::{OpOutcome, PrivilegedOp};
use arch_core::segments::{DescriptorTableReg, SegReg, SegmentSelector};
use arch_core::Exception;
use harness::cases::rep_outs::{self, BUFFER_BASE, TRANSFER_LEN};
use harness::{CaseError, CaseStorage, Context, HarnessConfig, Journal, MachineSnapshot, Observation, PhaseOutcome, Runner, WorkMemory};
use mmu::paging::Access;
use sim::{SimConfig, SimMachine};

const COM3: u16 = 0x3E8;

fn boot() -> SimMachine { SimMachine::boot(&SimConfig::default()).unwrap() }

fn expected_serial() -> Vec<u8> {
    let mut bytes = vec![b'B'; 16];
    bytes.extend(std::iter::repeat(b'A').take(16));
    bytes
}

#[test]
fn rep_outs_crosses_into_the_lower_frame() {
    let mut machine = boot();
    let report = Runner::new(&mut machine, &HarnessConfig::default()).unwrap().run_case(0, &rep_outs::CASE);

    assert!(report.passed(), "{report:?}");
    assert!(report.observations.contains(&Observation::SegmentLimit {
        selector: arch_core::SegmentSelector(0x30),
        limit: Some(0xFFF),
    }));
    assert!(report.observations.contains(&Observation::PortWrite { port: COM3, transferred: TRANSFER_LEN }));
    assert_eq!(machine.serial_output(COM3), expected_serial());
}

#[test]
fn round_trip_restores_everything_but_task_register() {
    let mut machine = boot();
    let before = MachineSnapshot::capture(&machine);
    let es = machine.selector(arch_core::SegReg::ES);

    Runner::new(&mut machine, &HarnessConfig::default()).unwrap().run_case(0, &rep_outs::CASE);

    let mut after = MachineSnapshot::capture(&machine);
    assert_ne!(after.tr, before.tr);
    after.tr = before.tr;
    assert_eq!(after, before);
    assert_eq!(machine.selector(arch_core::SegReg::ES), es);
    assert!(machine.faults().is_empty(), "{:?}", machine.faults());
}

#[test]
fn virtual_pages_are_backed_in_reverse() {
    let mut machine = boot();
    let storage = CaseStorage::new(0x10_0000).unwrap();
    let mut work = WorkMemory::new(0x20_0000, 16).unwrap();
    let mut journal = Journal::new("reverse");
    let mut phases = (rep_outs::CASE.instantiate)(storage);

    {
        let mut cx = Context { env: &mut machine, work: &mut work, journal: &mut journal };
        phases.setup(&mut cx).unwrap();
        phases.exercise(&mut cx).unwrap();
    }
    assert_eq!(work.free_pages(), 13);
    assert_eq!(work.next_free_page(), 0x20_3000);

    let mut page0 = [0u8; 1];
    let mut page1 = [0u8; 1];
    machine.read_linear(0x40_0000, &mut page0, Access::default()).unwrap();
    machine.read_linear(0x40_1000, &mut page1, Access::default()).unwrap();
    assert_eq!((page0[0], page1[0]), (b'B', b'A'));
    // the segment base is 16 bytes short of the page end
    assert_eq!(0x1000 - (BUFFER_BASE & 0xFFF), 16);
    // physically, 'A' sits below 'B'
    assert_eq!(machine.phys().read_u32(0x20_0000).unwrap(), u32::from_le_bytes(*b"AAAA"));
    assert_eq!(machine.phys().read_u32(0x20_1000).unwrap(), u32::from_le_bytes(*b"BBBB"));

    let mut cx = Context { env: &mut machine, work: &mut work, journal: &mut journal };
    phases.teardown(&mut cx).unwrap();
    assert_eq!(phases.teardown(&mut cx), Err(CaseError::MissingSnapshot));
}

#[test]
fn short_pool_fails_exercise_without_touching_tables() {
    let mut machine = boot();
    let config = HarnessConfig { work_pool_pages: 2, ..HarnessConfig::default() };
    let storage = CaseStorage::new(config.storage_base).unwrap();
    let before = MachineSnapshot::capture(&machine);
    let mut runner = Runner::new(&mut machine, &config).unwrap();
    let report = runner.run_case(0, &rep_outs::CASE);

    assert_eq!(report.setup, PhaseOutcome::Passed);
    assert_eq!(
        report.exercise,
        PhaseOutcome::Failed(CaseError::NotEnoughMemory { needed: 3, available: 2 }.to_string())
    );
    assert_eq!(report.teardown, PhaseOutcome::Passed);
    assert_eq!((runner.work().free_pages(), runner.work().next_free_page()), (2, config.work_pool_base));

    // no test descriptor, no page table entries, nothing sent
    let mem = machine.phys();
    let mut slot = [0u8; 8];
    mem.read(storage.gdt() as u64 + 6 * 8, &mut slot).unwrap();
    assert_eq!(slot, [0u8; 8]);
    assert_eq!(mem.read_u32(storage.page_table() as u64).unwrap(), 0);
    assert_eq!(mem.read_u32(storage.page_table() as u64 + 4).unwrap(), 0);
    assert!(machine.serial_output(COM3).is_empty());

    // teardown still put the machine back
    let mut after = MachineSnapshot::capture(&machine);
    after.tr = before.tr;
    assert_eq!(after, before);
    assert!(machine.faults().is_empty(), "{:?}", machine.faults());
}

#[test]
fn consecutive_runs_consume_the_pool_monotonically() {
    let mut machine = boot();
    let config = HarnessConfig::default();
    let mut runner = Runner::new(&mut machine, &config).unwrap();
    assert!(runner.run_case(0, &rep_outs::CASE).passed());
    assert!(runner.run_case(1, &rep_outs::CASE).passed());
    assert_eq!(runner.work().free_pages(), config.work_pool_pages - 6);
    assert_eq!(runner.work().next_free_page(), config.work_pool_base + 6 * 0x1000);

    let mut twice = expected_serial();
    twice.extend(expected_serial());
    assert_eq!(machine.serial_output(COM3), twice);
}

/// A machine that silently keeps DS when asked to load one selector.
struct KeepsDs {
    inner: SimMachine,
    refused: SegmentSelector,
}

impl ArchState for KeepsDs {
    fn gdtr(&self) -> DescriptorTableReg { self.inner.gdtr() }
    fn set_gdtr(&mut self, gdtr: DescriptorTableReg) { self.inner.set_gdtr(gdtr) }
    fn idtr(&self) -> DescriptorTableReg { self.inner.idtr() }
    fn set_idtr(&mut self, idtr: DescriptorTableReg) { self.inner.set_idtr(idtr) }
    fn task_register(&self) -> SegmentSelector { self.inner.task_register() }
    fn set_task_register(&mut self, sel: SegmentSelector) { self.inner.set_task_register(sel) }
    fn cr0(&self) -> Cr0 { self.inner.cr0() }
    fn set_cr0(&mut self, cr0: Cr0) { self.inner.set_cr0(cr0) }
    fn cr3(&self) -> Cr3 { self.inner.cr3() }
    fn set_cr3(&mut self, cr3: Cr3) { self.inner.set_cr3(cr3) }
    fn cr4(&self) -> Cr4 { self.inner.cr4() }
    fn set_cr4(&mut self, cr4: Cr4) { self.inner.set_cr4(cr4) }
    fn selector(&self, seg: SegReg) -> SegmentSelector { self.inner.selector(seg) }

    fn set_selector(&mut self, seg: SegReg, sel: SegmentSelector) {
        if seg == SegReg::DS && sel == self.refused { return; }
        self.inner.set_selector(seg, sel)
    }
}

impl ArchCapability for KeepsDs {
    fn execute(&mut self, op: PrivilegedOp) -> Result<OpOutcome, Exception> { self.inner.execute(op) }
}

impl ActiveEnvironment for KeepsDs {
    fn memory(&mut self) -> &mut dyn Memory { self.inner.memory() }
    fn init_serial(&mut self, port: u16) { self.inner.init_serial(port) }
}

#[test]
fn segment_limit_is_filed_under_the_selector_actually_loaded() {
    let test_sel = SegmentSelector(0x30);
    let mut env = KeepsDs { inner: boot(), refused: test_sel };
    let report = Runner::new(&mut env, &HarnessConfig::default()).unwrap().run_case(0, &rep_outs::CASE);
    assert!(report.passed(), "{report:?}");

    let limits: Vec<_> = report
        .observations
        .iter()
        .filter_map(|obs| match obs {
            Observation::SegmentLimit { selector, limit } => Some((*selector, *limit)),
            _ => None,
        })
        .collect();
    // the flat case data segment stayed in DS
    assert_eq!(limits, vec![(SegmentSelector(0x10), Some(0xFFFF_FFFF))]);
    assert!(report.observations.iter().any(|obs| matches!(obs, Observation::Note(text) if text.contains("refused"))));
}
