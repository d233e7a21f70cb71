use serde::{Deserialize, Serialize};

/// Size in bytes of one GDT/LDT/IDT slot.
pub const DESCRIPTOR_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentSelector(pub u16);

impl SegmentSelector {
    pub const NULL: SegmentSelector = SegmentSelector(0);

    pub const fn new(index: u16, ti: bool, rpl: u8) -> Self {
        Self((index << 3) | ((ti as u16) << 2) | (rpl as u16 & 0x3))
    }

    /// Selector for GDT slot `index` with the given requested privilege level.
    pub const fn gdt(index: u16, rpl: u8) -> Self { Self::new(index, false, rpl) }

    pub fn index(self) -> u16 { (self.0 >> 3) & 0x1FFF }
    pub fn ti(self) -> bool { (self.0 & 0x4) != 0 }
    pub fn rpl(self) -> u8 { (self.0 & 0x3) as u8 }
    pub fn is_null(self) -> bool { self.index() == 0 && !self.ti() }
}

impl std::fmt::LowerHex for SegmentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SegReg { CS, DS, ES, FS, GS, SS }

/// GDTR/IDTR contents: linear base and byte limit (size - 1).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorTableReg {
    pub base: u32,
    pub limit: u16,
}

impl DescriptorTableReg {
    /// Register value covering exactly `entries` 8-byte slots at `base`.
    pub fn for_entries(base: u32, entries: usize) -> Self {
        let bytes = (entries as u32 * DESCRIPTOR_SIZE).max(1);
        Self { base, limit: (bytes - 1) as u16 }
    }

    pub fn entries(&self) -> usize { (self.limit as usize + 1) / DESCRIPTOR_SIZE as usize }

    /// True when the whole 8-byte slot `index` lies within the limit.
    pub fn covers(&self, index: u16) -> bool {
        (index as u32) * DESCRIPTOR_SIZE + (DESCRIPTOR_SIZE - 1) <= self.limit as u32
    }

    pub fn slot_address(&self, index: u16) -> u32 {
        self.base.wrapping_add(index as u32 * DESCRIPTOR_SIZE)
    }
}

bitflags::bitflags! {
    /// Access-rights word in the layout LAR reports: access byte in bits 0..8,
    /// descriptor flags nibble in bits 12..16.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DescriptorFlags: u32 {
        const A = 1<<0;      // Accessed
        const RW = 1<<1;     // Readable (code) / Writable (data)
        const DC = 1<<2;     // Direction (data) / Conforming (code)
        const EXEC = 1<<3;   // Executable
        const TYPE = 1<<4;   // Descriptor type (1=code/data)
        const DPL0 = 1<<5;   // DPL low bit
        const DPL1 = 1<<6;   // DPL high bit
        const PRESENT = 1<<7;// Present
        const AVL = 1<<12;   // Available for system software
        const L = 1<<13;     // 64-bit code segment
        const DB = 1<<14;    // Default operation size (0=16,1=32)
        const G = 1<<15;     // Granularity (0=byte,1=4KiB)
    }
}

impl DescriptorFlags {
    const DPL_MASK: u32 = 0b11 << 5;

    pub fn dpl(&self) -> u8 { ((self.bits() >> 5) & 0x3) as u8 }

    pub fn with_dpl(self, dpl: u8) -> Self {
        Self::from_bits_retain((self.bits() & !Self::DPL_MASK) | ((dpl as u32 & 0x3) << 5))
    }

    pub fn present(&self) -> bool { self.contains(DescriptorFlags::PRESENT) }
    pub fn is_system(&self) -> bool { !self.contains(DescriptorFlags::TYPE) }
    pub fn is_code(&self) -> bool { !self.is_system() && self.contains(DescriptorFlags::EXEC) }
    pub fn is_data(&self) -> bool { !self.is_system() && !self.contains(DescriptorFlags::EXEC) }
    pub fn type_nibble(&self) -> u8 { (self.bits() & 0xF) as u8 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemType {
    TssAvail16,
    Ldt,
    TssBusy16,
    CallGate16,
    TaskGate,
    InterruptGate16,
    TrapGate16,
    TssAvail32,
    TssBusy32,
    CallGate32,
    InterruptGate32,
    TrapGate32,
}

impl SystemType {
    pub fn from_type(typ: u8) -> Option<Self> {
        Some(match typ & 0xF {
            0b0001 => SystemType::TssAvail16,
            0b0010 => SystemType::Ldt,
            0b0011 => SystemType::TssBusy16,
            0b0100 => SystemType::CallGate16,
            0b0101 => SystemType::TaskGate,
            0b0110 => SystemType::InterruptGate16,
            0b0111 => SystemType::TrapGate16,
            0b1001 => SystemType::TssAvail32,
            0b1011 => SystemType::TssBusy32,
            0b1100 => SystemType::CallGate32,
            0b1110 => SystemType::InterruptGate32,
            0b1111 => SystemType::TrapGate32,
            _ => return None,
        })
    }

    pub fn type_bits(self) -> u8 {
        match self {
            SystemType::TssAvail16 => 0b0001,
            SystemType::Ldt => 0b0010,
            SystemType::TssBusy16 => 0b0011,
            SystemType::CallGate16 => 0b0100,
            SystemType::TaskGate => 0b0101,
            SystemType::InterruptGate16 => 0b0110,
            SystemType::TrapGate16 => 0b0111,
            SystemType::TssAvail32 => 0b1001,
            SystemType::TssBusy32 => 0b1011,
            SystemType::CallGate32 => 0b1100,
            SystemType::InterruptGate32 => 0b1110,
            SystemType::TrapGate32 => 0b1111,
        }
    }

    pub fn is_tss(self) -> bool {
        matches!(self, SystemType::TssAvail16 | SystemType::TssBusy16 | SystemType::TssAvail32 | SystemType::TssBusy32)
    }

    pub fn is_busy_tss(self) -> bool {
        matches!(self, SystemType::TssBusy16 | SystemType::TssBusy32)
    }
}

/// One legacy (8-byte) segment descriptor.
///
/// `limit` is the raw 20-bit field; with [`DescriptorFlags::G`] it counts 4 KiB
/// units. Use [`SegmentDescriptor::effective_limit`] for the byte limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub base: u32,
    pub limit: u32,
    pub flags: DescriptorFlags,
}

impl SegmentDescriptor {
    pub const NULL: SegmentDescriptor = SegmentDescriptor { base: 0, limit: 0, flags: DescriptorFlags::empty() };

    pub fn new(base: u32, limit: u32, flags: DescriptorFlags) -> Self {
        Self { base, limit: limit & 0xF_FFFF, flags }
    }

    /// 32-bit code segment; `readable` sets the R bit.
    pub fn code(base: u32, limit: u32, dpl: u8, readable: bool) -> Self {
        let mut flags = DescriptorFlags::TYPE | DescriptorFlags::EXEC | DescriptorFlags::PRESENT | DescriptorFlags::DB;
        flags.set(DescriptorFlags::RW, readable);
        Self::new(base, limit, flags.with_dpl(dpl))
    }

    /// 32-bit expand-up data segment; `writable` clear makes it read-only.
    pub fn data(base: u32, limit: u32, dpl: u8, writable: bool) -> Self {
        let mut flags = DescriptorFlags::TYPE | DescriptorFlags::PRESENT | DescriptorFlags::DB;
        flags.set(DescriptorFlags::RW, writable);
        Self::new(base, limit, flags.with_dpl(dpl))
    }

    /// Available 32-bit TSS descriptor, DPL 0.
    pub fn tss32(base: u32, limit: u32) -> Self {
        let flags = DescriptorFlags::from_bits_retain(SystemType::TssAvail32.type_bits() as u32) | DescriptorFlags::PRESENT;
        Self::new(base, limit, flags)
    }

    pub fn page_granular(mut self) -> Self {
        self.flags.insert(DescriptorFlags::G);
        self
    }

    pub fn dpl(&self) -> u8 { self.flags.dpl() }
    pub fn present(&self) -> bool { self.flags.present() }

    pub fn system_type(&self) -> Option<SystemType> {
        if self.flags.is_system() { SystemType::from_type(self.flags.type_nibble()) } else { None }
    }

    /// Byte limit after applying granularity.
    pub fn effective_limit(&self) -> u32 {
        if self.flags.contains(DescriptorFlags::G) { (self.limit << 12) | 0xFFF } else { self.limit }
    }

    pub fn encode(&self) -> [u8; 8] {
        let mut raw = [0u8; 8];
        raw[0] = (self.limit & 0xFF) as u8;
        raw[1] = ((self.limit >> 8) & 0xFF) as u8;
        raw[2] = (self.base & 0xFF) as u8;
        raw[3] = ((self.base >> 8) & 0xFF) as u8;
        raw[4] = ((self.base >> 16) & 0xFF) as u8;
        raw[5] = (self.flags.bits() & 0xFF) as u8;
        raw[6] = ((((self.flags.bits() >> 12) & 0xF) as u8) << 4) | ((self.limit >> 16) & 0xF) as u8;
        raw[7] = ((self.base >> 24) & 0xFF) as u8;
        raw
    }

    pub fn decode(raw: [u8; 8]) -> Self {
        let limit = (raw[0] as u32) | ((raw[1] as u32) << 8) | (((raw[6] & 0x0F) as u32) << 16);
        let base = (raw[2] as u32) | ((raw[3] as u32) << 8) | ((raw[4] as u32) << 16) | ((raw[7] as u32) << 24);
        let bits = (raw[5] as u32) | ((((raw[6] & 0xF0) >> 4) as u32) << 12);
        Self { base, limit, flags: DescriptorFlags::from_bits_retain(bits) }
    }
}
