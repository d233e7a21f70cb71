use std::collections::BTreeMap;

pub mod serial;

pub use serial::{ComPort, SerialCapture, Uart16550};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("io port {0:#x} not mapped")] Unmapped(u16),
    #[error("io port range {base:#x}+{span} overlaps an existing device")] Overlap { base: u16, span: u16 },
}

/// A device decoding a contiguous range of ports. `offset` is relative to the
/// base the device was mapped at.
pub trait IoDevice: Send {
    fn read(&mut self, offset: u16) -> u8;
    fn write(&mut self, offset: u16, val: u8);
}

struct Mapping {
    span: u16,
    dev: Box<dyn IoDevice>,
}

#[derive(Default)]
pub struct IoBus { map: BTreeMap<u16, Mapping> }

impl IoBus {
    pub fn new() -> Self { Self { map: BTreeMap::new() } }

    pub fn map(&mut self, base: u16, span: u16, dev: Box<dyn IoDevice>) -> Result<(), IoError> {
        let end = base as u32 + span as u32;
        let overlaps = self.map.iter().any(|(&b, m)| (b as u32) < end && (base as u32) < b as u32 + m.span as u32);
        if overlaps { return Err(IoError::Overlap { base, span }); }
        self.map.insert(base, Mapping { span, dev });
        Ok(())
    }

    pub fn is_mapped(&self, port: u16) -> bool { self.lookup(port).is_some() }

    fn lookup(&self, port: u16) -> Option<u16> {
        let (&base, m) = self.map.range(..=port).next_back()?;
        ((port as u32) < base as u32 + m.span as u32).then_some(base)
    }

    fn device(&mut self, port: u16) -> Result<(&mut Box<dyn IoDevice>, u16), IoError> {
        let base = self.lookup(port).ok_or(IoError::Unmapped(port))?;
        let m = self.map.get_mut(&base).ok_or(IoError::Unmapped(port))?;
        Ok((&mut m.dev, port - base))
    }

    pub fn inb(&mut self, port: u16) -> Result<u8, IoError> {
        let (dev, off) = self.device(port)?;
        Ok(dev.read(off))
    }

    pub fn outb(&mut self, port: u16, val: u8) -> Result<(), IoError> {
        let (dev, off) = self.device(port)?;
        dev.write(off, val);
        Ok(())
    }

    /// Word and dword writes decompose into byte writes at consecutive ports,
    /// which is how an 8-bit device behind the bus sees them.
    pub fn outw(&mut self, port: u16, val: u16) -> Result<(), IoError> {
        for (i, b) in val.to_le_bytes().into_iter().enumerate() {
            self.outb(port.wrapping_add(i as u16), b)?;
        }
        Ok(())
    }

    pub fn outl(&mut self, port: u16, val: u32) -> Result<(), IoError> {
        for (i, b) in val.to_le_bytes().into_iter().enumerate() {
            self.outb(port.wrapping_add(i as u16), b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Latch(u8);
    impl IoDevice for Latch {
        fn read(&mut self, offset: u16) -> u8 { self.0.wrapping_add(offset as u8) }
        fn write(&mut self, _offset: u16, val: u8) { self.0 = val; }
    }

    #[test]
    fn routes_by_range_and_rejects_unmapped() {
        let mut bus = IoBus::new();
        bus.map(0x3E8, 8, Box::new(Latch(0))).unwrap();
        bus.outb(0x3E8, 0x40).unwrap();
        assert_eq!(bus.inb(0x3EA).unwrap(), 0x42);
        assert!(bus.is_mapped(0x3EF) && !bus.is_mapped(0x3F0));
        assert_eq!(bus.inb(0x3F0), Err(IoError::Unmapped(0x3F0)));
        assert_eq!(bus.outb(0x3E7, 0), Err(IoError::Unmapped(0x3E7)));
    }

    #[test]
    fn overlapping_maps_are_refused() {
        let mut bus = IoBus::new();
        bus.map(0x3F8, 8, Box::new(Latch(0))).unwrap();
        assert!(bus.map(0x3FC, 8, Box::new(Latch(0))).is_err());
        assert!(bus.map(0x3F0, 8, Box::new(Latch(0))).is_ok());
    }
}
