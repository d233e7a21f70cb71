use arch_core::env::ArchState;
use harness::{HarnessConfig, Registry, Runner};
use sim::{SimConfig, SimMachine};

#[test]
fn workspace_smoke_builtin_suite() {
    let mut machine = SimMachine::boot(&SimConfig::default()).unwrap();
    let registry = Registry::builtin().unwrap();
    let suite = Runner::new(&mut machine, &HarnessConfig::default()).unwrap().run_all(&registry, None).unwrap();
    assert_eq!(suite.cases.len(), registry.len());
    assert_eq!(suite.failures(), 0);
    assert!(!machine.paging_enabled());
    assert!(machine.faults().is_empty());
}
