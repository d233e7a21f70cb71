//! What a case saw. Exercise phases characterize behavior rather than judge
//! it, so everything they learn is written here instead of asserted.

use std::fmt;

use arch_core::exceptions::Exception;
use arch_core::segments::SegmentSelector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    /// LSL result for `selector`; `None` when ZF came back clear.
    SegmentLimit { selector: SegmentSelector, limit: Option<u32> },
    PortWrite { port: u16, transferred: u32 },
    /// The instruction faulted instead of completing.
    Fault { op: String, exception: Exception },
    Note(String),
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::SegmentLimit { selector, limit: Some(limit) } => write!(f, "limit of {selector:#x}: {limit:#x}"),
            Observation::SegmentLimit { selector, limit: None } => write!(f, "limit of {selector:#x}: not accessible"),
            Observation::PortWrite { port, transferred } => write!(f, "{transferred} elements written to port {port:#x}"),
            Observation::Fault { op, exception } => write!(f, "{op} faulted: {exception}"),
            Observation::Note(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    case: String,
    entries: Vec<Observation>,
}

impl Journal {
    pub fn new(case: impl Into<String>) -> Self { Self { case: case.into(), entries: Vec::new() } }

    pub fn record(&mut self, obs: Observation) {
        log::info!("[{}] {obs}", self.case);
        self.entries.push(obs);
    }

    pub fn note(&mut self, text: impl Into<String>) { self.record(Observation::Note(text.into())); }

    pub fn entries(&self) -> &[Observation] { &self.entries }

    pub fn into_entries(self) -> Vec<Observation> { self.entries }
}
