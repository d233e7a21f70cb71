//! REP OUTS.

use arch_core::exceptions::Exception;
use arch_core::segments::SegReg;
use arch_core::Width;
use mmu::paging::Access;

use crate::machine::SimMachine;

impl SimMachine {
    /// Moves `count` elements from `segment:offset` to `port`, one element
    /// per iteration with ESI advancing by the element size (DF clear).
    ///
    /// Each element is checked against the segment limit and translated
    /// byte by byte, so an element may straddle a page boundary. A fault
    /// stops the transfer after the elements already written.
    pub(crate) fn rep_outs(&mut self, port: u16, width: Width, segment: SegReg, offset: u32, count: u32) -> Result<u32, Exception> {
        let size = width.bytes();
        let (_, cache) = self.segs.get(segment);
        let access = Access { write: false, user: self.cpl() == 3 };
        for i in 0..count {
            let esi = offset.wrapping_add(i * size);
            let lin = cache.check(segment, esi, size, false).inspect_err(|e| {
                log::warn!("rep outs stopped after {i} elements: {e}");
            })?;
            let mut buf = [0u8; 4];
            self.read_linear(lin, &mut buf[..size as usize], access)?;
            let written = match width {
                Width::W8 => self.bus.outb(port, buf[0]),
                Width::W16 => self.bus.outw(port, u16::from_le_bytes([buf[0], buf[1]])),
                Width::W32 => self.bus.outl(port, u32::from_le_bytes(buf)),
            };
            if let Err(err) = written {
                // nothing decodes the port; the write is lost as on real hardware
                log::trace!("{err}");
            }
        }
        Ok(count)
    }
}
