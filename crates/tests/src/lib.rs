//! Workspace-level scenarios: built-in cases driven end to end on the
//! simulator, checked from outside the case.

#[cfg(test)]
mod lifecycle;
#[cfg(test)]
mod smoke;
