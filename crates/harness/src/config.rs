use serde::{Deserialize, Serialize};

/// Where the harness puts its memory. Loaded from JSON; missing fields keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Physical base of the work pool, page aligned.
    pub work_pool_base: u32,
    pub work_pool_pages: u32,
    /// Physical base of the per-case storage slots.
    pub storage_base: u32,
    pub storage_slots: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            work_pool_base: 0x0020_0000,
            work_pool_pages: 512,
            storage_base: 0x0010_0000,
            storage_slots: 16,
        }
    }
}

impl HarnessConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = HarnessConfig::from_json(r#"{ "work_pool_pages": 2 }"#).unwrap();
        assert_eq!(cfg.work_pool_pages, 2);
        assert_eq!(cfg.storage_slots, HarnessConfig::default().storage_slots);
    }
}
