use arch_core::env::ActiveEnvironment;

use crate::case::{Context, TestCase};
use crate::config::HarnessConfig;
use crate::error::CaseError;
use crate::journal::Journal;
use crate::layout::StorageArena;
use crate::registry::Registry;
use crate::report::{CaseReport, PhaseOutcome, SuiteReport};
use crate::workmem::WorkMemory;

/// Runs cases one after another against a single environment. The work pool
/// is shared by every case and never rewound.
pub struct Runner<'e> {
    env: &'e mut dyn ActiveEnvironment,
    work: WorkMemory,
    arena: StorageArena,
}

impl<'e> Runner<'e> {
    pub fn new(env: &'e mut dyn ActiveEnvironment, config: &HarnessConfig) -> Result<Self, CaseError> {
        Ok(Self {
            env,
            work: WorkMemory::new(config.work_pool_base, config.work_pool_pages)?,
            arena: StorageArena::new(config.storage_base, config.storage_slots)?,
        })
    }

    pub fn work(&self) -> &WorkMemory { &self.work }

    /// Runs `case` in storage slot `slot`. Exercise is skipped when setup
    /// fails; teardown runs whenever setup was attempted.
    pub fn run_case(&mut self, slot: usize, case: &TestCase) -> CaseReport {
        log::info!("running {}", case.name);
        let mut journal = Journal::new(case.name);
        let mut report = CaseReport {
            name: case.name.to_string(),
            description: case.description.to_string(),
            setup: PhaseOutcome::Skipped,
            exercise: PhaseOutcome::Skipped,
            teardown: PhaseOutcome::Skipped,
            observations: Vec::new(),
        };

        let storage = match self.arena.slot(slot) {
            Ok(storage) => storage,
            Err(err) => {
                log::error!("{}: {err}", case.name);
                report.setup = PhaseOutcome::Failed(err.to_string());
                return report;
            }
        };
        let mut phases = (case.instantiate)(storage);
        let mut cx = Context { env: &mut *self.env, work: &mut self.work, journal: &mut journal };

        let setup = phases.setup(&mut cx);
        report.setup = PhaseOutcome::from_status(&setup);
        if setup.is_ok() {
            report.exercise = PhaseOutcome::from_status(&phases.exercise(&mut cx));
        } else {
            log::warn!("{}: setup failed, exercise skipped", case.name);
        }
        report.teardown = PhaseOutcome::from_status(&phases.teardown(&mut cx));

        for (phase, outcome) in [("setup", &report.setup), ("exercise", &report.exercise), ("teardown", &report.teardown)] {
            if let PhaseOutcome::Failed(why) = outcome {
                log::error!("{} {phase}: {why}", case.name);
            }
        }
        report.observations = journal.into_entries();
        report
    }

    /// Runs every registered case, or only the one named by `only`.
    pub fn run_all(&mut self, registry: &Registry, only: Option<&str>) -> Result<SuiteReport, CaseError> {
        let mut suite = SuiteReport::default();
        match only {
            Some(name) => {
                let (slot, case) = registry.find(name).ok_or_else(|| CaseError::UnknownCase(name.to_string()))?;
                suite.cases.push(self.run_case(slot, case));
            }
            None => {
                for (slot, case) in registry.iter().enumerate() {
                    suite.cases.push(self.run_case(slot, case));
                }
            }
        }
        suite.free_pages_left = self.work.free_pages();
        Ok(suite)
    }
}
