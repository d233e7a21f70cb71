pub mod paging;
pub mod tlb;

pub use paging::*;
pub use tlb::*;

#[cfg(test)]
mod tests {
    use super::*;
    use arch_core::memory::{FlatMem, Memory};

    const READ: Access = Access { write: false, user: true };
    const WRITE: Access = Access { write: true, user: true };

    #[test]
    fn walk_32bit_4k_ad_bits() {
        // CR3 = 0x1000 page_dir; PDE[0]=pt at 0x2000; PTE[0]=page at 0x3000, all P/RW/US
        let mut mem = FlatMem::new(0x10000);
        mem.write_u32(0x1000, PageTableEntry::new(0x2, PteFlags::RW | PteFlags::US).0).unwrap();
        mem.write_u32(0x2000, PageTableEntry::new(0x3, PteFlags::RW | PteFlags::US).0).unwrap();

        let mut w = Walker32 { cr3: 0x1000, pse: false, mem: &mut mem };
        let tr = w.translate(0x0000_0004, READ).unwrap();
        assert_eq!(tr.phys, 0x3000 + 4);
        let pde = PageTableEntry(w.mem.read_u32(0x1000).unwrap());
        let pte = PageTableEntry(w.mem.read_u32(0x2000).unwrap());
        assert!(pde.flags().contains(PteFlags::A));
        assert!(pte.flags().contains(PteFlags::A));
        assert!(!pte.flags().contains(PteFlags::D));

        w.translate(0x0000_0008, WRITE).unwrap();
        let pte = PageTableEntry(w.mem.read_u32(0x2000).unwrap());
        assert!(pte.flags().contains(PteFlags::D));
    }

    #[test]
    fn walk_32bit_4mb() {
        let mut mem = FlatMem::new(0x10000);
        mem.write_u32(0x1000 + 4, PageTableEntry::large(0x0040_0000, PteFlags::RW | PteFlags::US).0).unwrap();
        let mut w = Walker32 { cr3: 0x1000, pse: true, mem: &mut mem };
        let tr = w.translate(0x0040_1000, READ).unwrap();
        assert_eq!(tr.phys, 0x0040_1000);
    }

    #[test]
    fn adjacent_pages_resolve_to_their_own_frames() {
        let mut mem = FlatMem::new(0x10000);
        mem.write_u32(0x1000, PageTableEntry::new(0x2, PteFlags::RW | PteFlags::US).0).unwrap();
        mem.write_u32(0x2000, PageTableEntry::new(0x5, PteFlags::RW).0).unwrap();
        mem.write_u32(0x2004, PageTableEntry::new(0x4, PteFlags::RW).0).unwrap();
        let mut w = Walker32 { cr3: 0x1000, pse: false, mem: &mut mem };
        let supervisor = Access { write: false, user: false };
        assert_eq!(w.translate(0x0FFF, supervisor).unwrap().phys, 0x5FFF);
        assert_eq!(w.translate(0x1000, supervisor).unwrap().phys, 0x4000);
        // the PTEs are supervisor-only
        let err = w.translate(0x1000, READ).unwrap_err();
        assert_eq!(err.kind, PageFaultKind::Protection);
        assert_eq!(err.code, 0b101);
    }

    #[test]
    fn not_present_faults_and_is_not_cached() {
        let mut mem = FlatMem::new(0x10000);
        mem.write_u32(0x1000, PageTableEntry::new(0x2, PteFlags::RW).0).unwrap();
        let mut tlb = Tlb::new();
        let mut w = Walker32 { cr3: 0x1000, pse: false, mem: &mut mem };
        let err = translate_cached(&mut tlb, &mut w, 0x1234, Access::default()).unwrap_err();
        assert_eq!(err.kind, PageFaultKind::NotPresent);
        assert!(tlb.is_empty());
    }

    #[test]
    fn cached_translation_survives_until_flushed() {
        let mut mem = FlatMem::new(0x10000);
        mem.write_u32(0x1000, PageTableEntry::new(0x2, PteFlags::RW).0).unwrap();
        mem.write_u32(0x2000, PageTableEntry::new(0x3, PteFlags::empty()).0).unwrap();
        let mut tlb = Tlb::new();
        {
            let mut w = Walker32 { cr3: 0x1000, pse: false, mem: &mut mem };
            assert_eq!(translate_cached(&mut tlb, &mut w, 0x10, Access::default()).unwrap().phys, 0x3010);
            // read-only mapping faults on write even from the cache
            assert!(translate_cached(&mut tlb, &mut w, 0x10, Access { write: true, user: false }).is_err());
        }
        mem.write_u32(0x2000, PageTableEntry::new(0x7, PteFlags::RW).0).unwrap();
        let mut w = Walker32 { cr3: 0x1000, pse: false, mem: &mut mem };
        assert_eq!(translate_cached(&mut tlb, &mut w, 0x10, Access::default()).unwrap().phys, 0x3010);
        tlb.flush_all();
        assert_eq!(translate_cached(&mut tlb, &mut w, 0x10, Access::default()).unwrap().phys, 0x7010);
    }
}
