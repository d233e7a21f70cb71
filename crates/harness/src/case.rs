use arch_core::env::ActiveEnvironment;

use crate::error::CaseError;
use crate::journal::Journal;
use crate::layout::CaseStorage;
use crate::workmem::WorkMemory;

pub type Status = Result<(), CaseError>;

/// Everything a phase may touch besides its own state.
pub struct Context<'a> {
    pub env: &'a mut dyn ActiveEnvironment,
    pub work: &'a mut WorkMemory,
    pub journal: &'a mut Journal,
}

/// The three phases of one case run. The runner calls `setup`, then
/// `exercise` only if setup succeeded, then `teardown` regardless.
pub trait Phases {
    fn setup(&mut self, cx: &mut Context<'_>) -> Status;
    fn exercise(&mut self, cx: &mut Context<'_>) -> Status;
    fn teardown(&mut self, cx: &mut Context<'_>) -> Status;
}

/// A registered case. The record is immutable; `instantiate` binds fresh
/// per-run state to the storage slot the runner hands out.
#[derive(Debug, Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub description: &'static str,
    pub instantiate: fn(CaseStorage) -> Box<dyn Phases>,
}
