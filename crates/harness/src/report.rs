use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::journal::Observation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    Passed,
    Failed(String),
    Skipped,
}

impl PhaseOutcome {
    pub fn from_status(status: &crate::case::Status) -> Self {
        match status {
            Ok(()) => PhaseOutcome::Passed,
            Err(err) => PhaseOutcome::Failed(err.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool { matches!(self, PhaseOutcome::Failed(_)) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub description: String,
    pub setup: PhaseOutcome,
    pub exercise: PhaseOutcome,
    pub teardown: PhaseOutcome,
    pub observations: Vec<Observation>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        !(self.setup.is_failure() || self.exercise.is_failure() || self.teardown.is_failure())
            && self.exercise == PhaseOutcome::Passed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    pub cases: Vec<CaseReport>,
    pub free_pages_left: u32,
}

impl SuiteReport {
    pub fn failures(&self) -> usize { self.cases.iter().filter(|c| !c.passed()).count() }

    pub fn print_summary(&self) {
        for case in &self.cases {
            let mark = if case.passed() { "ok" } else { "FAILED" };
            eprintln!("{mark:>6}  {}", case.name);
            for (phase, outcome) in [("setup", &case.setup), ("exercise", &case.exercise), ("teardown", &case.teardown)] {
                if let PhaseOutcome::Failed(why) = outcome {
                    eprintln!("        {phase}: {why}");
                }
            }
        }
        eprintln!(
            "hvprobe: {} cases, {} failures, {} work pages left",
            self.cases.len(),
            self.failures(),
            self.free_pages_left
        );
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, contents)
    }
}
