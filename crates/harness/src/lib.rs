//! harness: the lifecycle that lets a hypervisor probe run without leaking
//! state into the next one.
//!
//! A case snapshots the ambient registers ([`snapshot`]), builds its own GDT,
//! IDT, TSS and paging in private storage ([`environment`], [`layout`]), runs
//! the instruction under study through [`arch_core::ArchCapability`], records
//! what happened in a [`journal::Journal`], and restores the snapshot.

pub mod case;
pub mod cases;
pub mod config;
pub mod environment;
pub mod error;
pub mod journal;
pub mod layout;
pub mod registry;
pub mod report;
pub mod runner;
pub mod snapshot;
pub mod workmem;

pub use case::{Context, Phases, Status, TestCase};
pub use config::HarnessConfig;
pub use error::CaseError;
pub use journal::{Journal, Observation};
pub use layout::{CaseStorage, StorageArena};
pub use registry::{Registry, BUILTIN_CASES};
pub use report::{CaseReport, PhaseOutcome, SuiteReport};
pub use runner::Runner;
pub use snapshot::MachineSnapshot;
pub use workmem::{PageRun, WorkMemory};
