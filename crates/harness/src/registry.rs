use crate::case::TestCase;
use crate::cases;
use crate::error::CaseError;

/// Cases compiled into the harness, in run order.
pub static BUILTIN_CASES: &[TestCase] = &[cases::rep_outs::CASE];

#[derive(Debug, Clone, Default)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn builtin() -> Result<Self, CaseError> {
        let mut reg = Self::new();
        for case in BUILTIN_CASES {
            reg.register(*case)?;
        }
        Ok(reg)
    }

    pub fn register(&mut self, case: TestCase) -> Result<(), CaseError> {
        if self.find(case.name).is_some() {
            return Err(CaseError::DuplicateName(case.name.to_string()));
        }
        self.cases.push(case);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<(usize, &TestCase)> {
        self.cases.iter().enumerate().find(|(_, c)| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> { self.cases.iter() }
    pub fn len(&self) -> usize { self.cases.len() }
    pub fn is_empty(&self) -> bool { self.cases.is_empty() }
}
