//! 16550-compatible UART model that records every transmitted byte.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::IoDevice;

/// Number of ports a UART decodes.
pub const UART_SPAN: u16 = 8;

const THR: u16 = 0; // transmit holding / divisor latch low
const IER: u16 = 1; // interrupt enable / divisor latch high
const FCR: u16 = 2; // FIFO control (write), IIR (read)
const LCR: u16 = 3;
const MCR: u16 = 4;
const LSR: u16 = 5;
const MSR: u16 = 6;
const SCR: u16 = 7;

const LCR_DLAB: u8 = 1 << 7;
const MCR_LOOP: u8 = 1 << 4;
const LSR_THRE: u8 = 1 << 5;
const LSR_TEMT: u8 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComPort { Com1, Com2, Com3, Com4 }

impl ComPort {
    pub fn base(self) -> u16 {
        match self {
            ComPort::Com1 => 0x3F8,
            ComPort::Com2 => 0x2F8,
            ComPort::Com3 => 0x3E8,
            ComPort::Com4 => 0x2E8,
        }
    }
}

impl std::fmt::Display for ComPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = match self { ComPort::Com1 => 1, ComPort::Com2 => 2, ComPort::Com3 => 3, ComPort::Com4 => 4 };
        write!(f, "COM{n}")
    }
}

/// Register writes that bring a UART up at 38400 baud, 8N1, FIFOs enabled.
pub fn init_sequence(base: u16) -> [(u16, u8); 7] {
    [
        (base + IER, 0x00),
        (base + LCR, LCR_DLAB),
        (base + THR, 0x03),
        (base + IER, 0x00),
        (base + LCR, 0x03),
        (base + FCR, 0xC7),
        (base + MCR, 0x0B),
    ]
}

/// Shared view of the bytes a UART has transmitted.
#[derive(Debug, Clone, Default)]
pub struct SerialCapture(Arc<Mutex<Vec<u8>>>);

impl SerialCapture {
    pub fn new() -> Self { Self::default() }

    fn push(&self, byte: u8) {
        if let Ok(mut buf) = self.0.lock() { buf.push(byte); }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|buf| buf.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct Uart16550 {
    ier: u8,
    lcr: u8,
    mcr: u8,
    scr: u8,
    fcr: u8,
    divisor: u16,
    loopback_rx: Option<u8>,
    capture: SerialCapture,
}

impl Uart16550 {
    pub fn new(capture: SerialCapture) -> Self { Self { capture, ..Self::default() } }

    fn dlab(&self) -> bool { self.lcr & LCR_DLAB != 0 }
}

impl IoDevice for Uart16550 {
    fn read(&mut self, offset: u16) -> u8 {
        match offset {
            THR if self.dlab() => (self.divisor & 0xFF) as u8,
            THR => self.loopback_rx.take().unwrap_or(0),
            IER if self.dlab() => (self.divisor >> 8) as u8,
            IER => self.ier,
            FCR => 0x01 | if self.fcr & 1 != 0 { 0xC0 } else { 0 },
            LCR => self.lcr,
            MCR => self.mcr,
            LSR => LSR_THRE | LSR_TEMT | self.loopback_rx.is_some() as u8,
            MSR => 0,
            SCR => self.scr,
            _ => 0xFF,
        }
    }

    fn write(&mut self, offset: u16, val: u8) {
        match offset {
            THR if self.dlab() => self.divisor = (self.divisor & 0xFF00) | val as u16,
            THR if self.mcr & MCR_LOOP != 0 => self.loopback_rx = Some(val),
            THR => {
                log::trace!("uart tx {val:#04x}");
                self.capture.push(val);
            }
            IER if self.dlab() => self.divisor = (self.divisor & 0x00FF) | ((val as u16) << 8),
            IER => self.ier = val & 0x0F,
            FCR => self.fcr = val,
            LCR => self.lcr = val,
            MCR => self.mcr = val & 0x1F,
            SCR => self.scr = val,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IoBus;

    #[test]
    fn init_sequence_programs_divisor_and_line() {
        let capture = SerialCapture::new();
        let mut bus = IoBus::new();
        bus.map(ComPort::Com3.base(), UART_SPAN, Box::new(Uart16550::new(capture.clone()))).unwrap();
        for (port, val) in init_sequence(ComPort::Com3.base()) {
            bus.outb(port, val).unwrap();
        }
        assert_eq!(bus.inb(0x3EB).unwrap(), 0x03);
        // divisor writes went to the latch, not the transmitter
        assert!(capture.contents().is_empty());
        bus.outb(0x3E8, b'x').unwrap();
        assert_eq!(capture.contents(), b"x");
        assert_ne!(bus.inb(0x3ED).unwrap() & LSR_THRE, 0);
    }

    #[test]
    fn loopback_does_not_transmit() {
        let capture = SerialCapture::new();
        let mut uart = Uart16550::new(capture.clone());
        uart.write(MCR, MCR_LOOP);
        uart.write(THR, 0x55);
        assert_eq!(uart.read(LSR) & 1, 1);
        assert_eq!(uart.read(THR), 0x55);
        assert!(capture.contents().is_empty());
    }

    #[test]
    fn com_port_numbering() {
        assert_eq!(ComPort::Com3.base(), 0x3E8);
        assert_eq!(ComPort::Com2.base(), 0x2F8);
        assert_eq!(ComPort::Com4.to_string(), "COM4");
    }
}
