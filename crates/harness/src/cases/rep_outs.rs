//! REP OUTSB through a data segment whose bytes straddle two virtual pages
//! backed by physical frames in reverse order.
//!
//! The segment starts 16 bytes before the end of virtual page 0x400, which
//! maps to the `'B'` frame; the next virtual page maps to the `'A'` frame
//! sitting physically *below* it. A correct transfer emits 16 `'B'` then
//! 16 `'A'` on COM3.

use arch_core::env::ActiveEnvironment;
use arch_core::ops::{OpOutcome, PrivilegedOp};
use arch_core::segments::{SegReg, SegmentDescriptor, SegmentSelector};
use arch_core::{Width, PAGE_SIZE};
use devices_io::ComPort;
use mmu::paging::{page_number, PteFlags};
use tables::kernel_selector;

use crate::case::{Context, Phases, Status, TestCase};
use crate::environment::{init_interrupts, init_paging, init_segmentation, init_serial, init_work_mem, Paging, Segmentation};
use crate::error::CaseError;
use crate::journal::Observation;
use crate::layout::CaseStorage;
use crate::snapshot::MachineSnapshot;

pub const CASE: TestCase = TestCase {
    name: "test 01: reps out on non-consecutive physical pages",
    description: "Test behaviour of hypervisor when 'REP OUTS COM3' instruction is using a DS mapped on non consecutive physical pages.",
    instantiate,
};

pub const TEST_PORT: ComPort = ComPort::Com3;

/// Linear base of the test segment: 16 bytes before the end of the first
/// test page.
pub const BUFFER_BASE: u32 = 0x0040_0FF0;

/// Bytes REP OUTSB moves, enough to cross into the second page.
pub const TRANSFER_LEN: u32 = 0x20;

/// Two pages are used; the third keeps the next reservation apart.
pub const PAGES_RESERVED: u32 = 3;

fn instantiate(storage: CaseStorage) -> Box<dyn Phases> {
    Box::new(RepOutsNonContiguous { storage, snapshot: None, installed: None })
}

struct Installed {
    segmentation: Segmentation,
    paging: Paging,
}

struct RepOutsNonContiguous {
    storage: CaseStorage,
    snapshot: Option<MachineSnapshot>,
    installed: Option<Installed>,
}

impl RepOutsNonContiguous {
    /// Loads `sel` into DS, runs `op` against whatever DS then holds, and
    /// puts the previous DS back. Returns the selector `op` actually ran with.
    fn with_ds<F>(
        env: &mut dyn ActiveEnvironment,
        sel: SegmentSelector,
        op: F,
    ) -> (SegmentSelector, Result<OpOutcome, arch_core::Exception>)
    where
        F: FnOnce(SegmentSelector) -> PrivilegedOp,
    {
        let saved = env.selector(SegReg::DS);
        env.set_selector(SegReg::DS, sel);
        let current = env.selector(SegReg::DS);
        let outcome = env.execute(op(current));
        env.set_selector(SegReg::DS, saved);
        (current, outcome)
    }
}

impl Phases for RepOutsNonContiguous {
    fn setup(&mut self, cx: &mut Context<'_>) -> Status {
        let snapshot = MachineSnapshot::capture(&*cx.env);
        self.snapshot = Some(snapshot);

        init_interrupts(cx.env, &self.storage)?;
        init_work_mem(cx.work);
        let segmentation = init_segmentation(cx.env, &self.storage)?;
        log::debug!("ring-3 stack pointer {:#x}", segmentation.r3_esp);
        let paging = init_paging(cx.env, &self.storage, snapshot.cr4)?;
        init_serial(cx.env, TEST_PORT);

        self.installed = Some(Installed { segmentation, paging });
        cx.journal.note("end_init");
        Ok(())
    }

    fn exercise(&mut self, cx: &mut Context<'_>) -> Status {
        let installed = self.installed.as_mut().ok_or(CaseError::NotSetUp)?;

        let run = match cx.work.reserve(PAGES_RESERVED) {
            Ok(run) => run,
            Err(err) => {
                cx.journal.note("Error : Not enough physical memory available.");
                return Err(err);
            }
        };
        let page_a = run.first();
        let page_b = page_a + PAGE_SIZE;
        let mem = cx.env.memory();
        mem.fill(page_a as u64, PAGE_SIZE as usize, b'A')?;
        mem.fill(page_b as u64, PAGE_SIZE as usize, b'B')?;

        let table = &mut installed.paging.table;
        table.map(0, page_number(page_b), PteFlags::RW | PteFlags::US)?;
        table.map(1, page_number(page_a), PteFlags::RW | PteFlags::US)?;
        table.commit(mem)?;

        // read-only data, DPL 0, one page
        let gdt = &mut installed.segmentation.gdt;
        let desc = SegmentDescriptor::data(BUFFER_BASE, (PAGE_SIZE - 1) >> 12, 0, false).page_granular();
        let index = gdt.append(desc)?;
        gdt.commit_entry(mem, index)?;
        cx.env.set_gdtr(gdt.register());
        let test_sel = kernel_selector(index);

        let (selector, lsl) = Self::with_ds(cx.env, test_sel, |selector| PrivilegedOp::ReadSegmentLimit { selector });
        if selector != test_sel {
            cx.journal.note(format!("DS load of {test_sel:?} refused, still {selector:?}"));
        }
        match lsl {
            Ok(OpOutcome::SegmentLimit(limit)) => cx.journal.record(Observation::SegmentLimit { selector, limit }),
            Ok(other) => cx.journal.note(format!("unexpected LSL outcome {other:?}")),
            Err(exception) => cx.journal.record(Observation::Fault { op: "lsl".into(), exception }),
        }

        let port = TEST_PORT.base();
        let (_, outs) = Self::with_ds(cx.env, test_sel, |_| PrivilegedOp::RepeatedPortWrite {
            port,
            width: Width::W8,
            segment: SegReg::DS,
            offset: 0,
            count: TRANSFER_LEN,
        });
        match outs {
            Ok(OpOutcome::PortWrite { transferred }) => cx.journal.record(Observation::PortWrite { port, transferred }),
            Ok(other) => cx.journal.note(format!("unexpected REP OUTS outcome {other:?}")),
            Err(exception) => cx.journal.record(Observation::Fault { op: "rep outsb".into(), exception }),
        }
        cx.journal.note("rep outsb done");
        Ok(())
    }

    fn teardown(&mut self, cx: &mut Context<'_>) -> Status {
        let snapshot = self.snapshot.take().ok_or(CaseError::MissingSnapshot)?;
        snapshot.restore(&mut *cx.env);
        self.installed = None;
        Ok(())
    }
}
