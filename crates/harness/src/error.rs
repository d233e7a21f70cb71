use arch_core::MemError;
use tables::TableError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseError {
    #[error("not enough physical memory: {needed} pages needed, {available} free")]
    NotEnoughMemory { needed: u32, available: u32 },
    #[error("table edit failed: {0}")]
    Table(#[from] TableError),
    #[error("memory access failed: {0}")]
    Memory(#[from] MemError),
    #[error("teardown ran without a captured snapshot")]
    MissingSnapshot,
    #[error("phase ran before setup built the test environment")]
    NotSetUp,
    #[error("no storage slot for case #{0}")]
    NoStorageSlot(usize),
    #[error("{pages} pages at {base:#x} run past 4 GiB")]
    AddressOverflow { base: u32, pages: u32 },
    #[error("address {0:#x} is not page aligned")]
    Misaligned(u32),
    #[error("a case named {0:?} is already registered")]
    DuplicateName(String),
    #[error("no case named {0:?}")]
    UnknownCase(String),
}
