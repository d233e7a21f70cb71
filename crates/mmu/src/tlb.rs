use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::paging::{Access, PageFault, PageFaultKind, PteFlags, TranslateResult, Walker32};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TlbEntry { pub phys_page: u32, pub flags: PteFlags }

/// Linear-page to frame cache. Entries are only inserted after a successful
/// walk, so a not-present entry is never cached.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Tlb { map: HashMap<u32, TlbEntry> }

impl Tlb {
    pub fn new() -> Self { Self { map: HashMap::new() } }
    pub fn lookup(&self, page: u32) -> Option<TlbEntry> { self.map.get(&page).copied() }
    pub fn insert(&mut self, page: u32, val: TlbEntry) { self.map.insert(page, val); }
    pub fn flush_all(&mut self) { self.map.clear(); }
    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
}

pub fn translate_cached(tlb: &mut Tlb, walker: &mut Walker32<'_>, lin: u32, access: Access) -> Result<TranslateResult, PageFault> {
    if let Some(ent) = tlb.lookup(lin >> 12) {
        // a cached read-only translation still has to fault on write
        let denied = (access.write && !ent.flags.contains(PteFlags::RW)) || (access.user && !ent.flags.contains(PteFlags::US));
        if !denied {
            return Ok(TranslateResult { phys: (ent.phys_page << 12) | (lin & 0xFFF), flags: ent.flags });
        }
        let mut code = 1u32;
        if access.write { code |= 1<<1; }
        if access.user { code |= 1<<2; }
        return Err(PageFault { lin, kind: PageFaultKind::Protection, code });
    }
    let tr = walker.translate(lin, access)?;
    tlb.insert(lin >> 12, TlbEntry { phys_page: tr.phys >> 12, flags: tr.flags });
    Ok(tr)
}
