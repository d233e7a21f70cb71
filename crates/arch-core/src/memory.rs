use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemError {
    #[error("address {0:#x} out of range")] OutOfRange(u64),
}

/// Physical memory as seen by table editors and the simulator.
pub trait Memory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError>;
    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError>;

    fn read_u32(&self, addr: u64) -> Result<u32, MemError> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32(&mut self, addr: u64, val: u32) -> Result<(), MemError> {
        self.write(addr, &val.to_le_bytes())
    }

    /// Sets `len` bytes starting at `addr` to `byte`.
    fn fill(&mut self, addr: u64, len: usize, byte: u8) -> Result<(), MemError> {
        self.write(addr, &vec![byte; len])
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FlatMem {
    data: Vec<u8>,
}

impl FlatMem {
    pub fn new(size: usize) -> Self { Self { data: vec![0u8; size] } }
    pub fn size(&self) -> usize { self.data.len() }
}

impl std::fmt::Debug for FlatMem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatMem").field("size", &self.data.len()).finish()
    }
}

impl Memory for FlatMem {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError> {
        let a = usize::try_from(addr).map_err(|_| MemError::OutOfRange(addr))?;
        let end = a.checked_add(buf.len()).ok_or(MemError::OutOfRange(addr))?;
        let src = self.data.get(a..end).ok_or(MemError::OutOfRange(addr))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError> {
        let a = usize::try_from(addr).map_err(|_| MemError::OutOfRange(addr))?;
        let end = a.checked_add(data.len()).ok_or(MemError::OutOfRange(addr))?;
        let slice = self.data.get_mut(a..end).ok_or(MemError::OutOfRange(addr))?;
        slice.copy_from_slice(data);
        Ok(())
    }

    fn fill(&mut self, addr: u64, len: usize, byte: u8) -> Result<(), MemError> {
        let a = usize::try_from(addr).map_err(|_| MemError::OutOfRange(addr))?;
        let end = a.checked_add(len).ok_or(MemError::OutOfRange(addr))?;
        self.data.get_mut(a..end).ok_or(MemError::OutOfRange(addr))?.fill(byte);
        Ok(())
    }
}
