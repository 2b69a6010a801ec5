//! DMA transfer layer: guest memory access, descriptor fetch/write-back and scatter-gather lists.

use crate::error::MemoryError;
use crate::upiu::{RequestUpiu, ResponseUpiu, UpiuHeader, UPIU_HEADER_SIZE};
use crate::utrd::{PrdEntry, TransferRequestDescriptor, PRD_ENTRY_SIZE, UTRD_SIZE};

/// Guest physical memory access used for DMA.
pub trait MemoryBus {
    fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MemoryError>;
    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> Result<(), MemoryError>;
}

fn above_4gib(addr: u64) -> bool {
    addr >> 32 != 0
}

/// The controller's view of guest memory, restricted by the `CAP.64AS` capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWindow {
    addressing_64bit: bool,
}

impl DmaWindow {
    pub fn new(addressing_64bit: bool) -> Self {
        Self { addressing_64bit }
    }

    /// Without 64-bit addressing only the start address must fit in 32 bits; the access itself
    /// may still run past 4 GiB.
    pub fn check(&self, addr: u64, len: usize) -> Result<(), MemoryError> {
        addr.checked_add(len as u64)
            .ok_or(MemoryError::AddressOverflow { addr, len })?;
        if !self.addressing_64bit && above_4gib(addr) {
            return Err(MemoryError::AddressWidth { addr });
        }
        Ok(())
    }

    pub fn read(&self, mem: &dyn MemoryBus, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check(addr, buf.len())?;
        mem.read_physical(addr, buf)
    }

    pub fn write(&self, mem: &mut dyn MemoryBus, addr: u64, buf: &[u8]) -> Result<(), MemoryError> {
        self.check(addr, buf.len())?;
        mem.write_physical(addr, buf)
    }

    pub fn utrd_addr(utrl_base: u64, slot: usize) -> u64 {
        utrl_base.wrapping_add((slot * UTRD_SIZE) as u64)
    }

    pub fn read_utrd(
        &self,
        mem: &dyn MemoryBus,
        utrl_base: u64,
        slot: usize,
    ) -> Result<TransferRequestDescriptor, MemoryError> {
        let mut raw = [0u8; UTRD_SIZE];
        self.read(mem, Self::utrd_addr(utrl_base, slot), &mut raw)?;
        Ok(TransferRequestDescriptor::parse(&raw))
    }

    /// Fetches the header first, then the whole UPIU bounded by its declared data segment length.
    pub fn read_request_upiu(
        &self,
        mem: &dyn MemoryBus,
        utrd: &TransferRequestDescriptor,
    ) -> Result<RequestUpiu, MemoryError> {
        let base = utrd.command_desc_base();
        let mut raw_header = [0u8; UPIU_HEADER_SIZE];
        self.read(mem, base, &mut raw_header)?;
        let header = UpiuHeader::parse(&raw_header);

        let mut raw = vec![0u8; header.bounded_len()];
        self.read(mem, base, &mut raw)?;
        Ok(RequestUpiu::parse(&raw))
    }

    /// Expands the PRD table into a scatter-gather list. An empty table yields `None`.
    pub fn read_prdt(
        &self,
        mem: &dyn MemoryBus,
        utrd: &TransferRequestDescriptor,
    ) -> Result<Option<SgList>, MemoryError> {
        let count = usize::from(utrd.prdt_length);
        if count == 0 {
            return Ok(None);
        }
        let mut raw = vec![0u8; count * PRD_ENTRY_SIZE];
        self.read(mem, utrd.prdt_addr(), &mut raw)?;

        let mut entries = Vec::with_capacity(count);
        for chunk in raw.chunks_exact(PRD_ENTRY_SIZE) {
            let mut bytes = [0u8; PRD_ENTRY_SIZE];
            bytes.copy_from_slice(chunk);
            let prd = PrdEntry::parse(&bytes);
            let len = prd.byte_count();
            prd.addr
                .checked_add(len)
                .ok_or(MemoryError::AddressOverflow {
                    addr: prd.addr,
                    len: len as usize,
                })?;
            if !self.addressing_64bit && above_4gib(prd.addr) {
                return Err(MemoryError::AddressWidth { addr: prd.addr });
            }
            entries.push(SgEntry {
                addr: prd.addr,
                len,
            });
        }
        Ok(Some(SgList { entries }))
    }

    /// Writes the response UPIU, truncated to the space the descriptor reserves for it.
    pub fn write_response_upiu(
        &self,
        mem: &mut dyn MemoryBus,
        utrd: &TransferRequestDescriptor,
        response: &ResponseUpiu,
    ) -> Result<(), MemoryError> {
        let encoded = response.encode();
        let len = encoded.len().min(utrd.response_upiu_len());
        if len == 0 {
            return Ok(());
        }
        self.write(mem, utrd.response_upiu_addr(), &encoded[..len])
    }

    pub fn write_utrd(
        &self,
        mem: &mut dyn MemoryBus,
        utrl_base: u64,
        slot: usize,
        utrd: &TransferRequestDescriptor,
    ) -> Result<(), MemoryError> {
        self.write(mem, Self::utrd_addr(utrl_base, slot), &utrd.to_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgEntry {
    pub addr: u64,
    pub len: u64,
}

/// Scatter-gather list built from a PRD table. Owned by its request slot while outstanding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SgList {
    entries: Vec<SgEntry>,
}

impl SgList {
    pub fn entries(&self) -> &[SgEntry] {
        &self.entries
    }

    pub fn total_len(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.len))
    }

    /// Scatters `data` into the regions in order. Returns the number of bytes written, which is
    /// less than `data.len()` when the list is shorter.
    pub fn copy_to_guest(&self, mem: &mut dyn MemoryBus, data: &[u8]) -> Result<usize, MemoryError> {
        let mut done = 0usize;
        for entry in &self.entries {
            if done == data.len() {
                break;
            }
            let chunk = usize::try_from(entry.len)
                .unwrap_or(usize::MAX)
                .min(data.len() - done);
            mem.write_physical(entry.addr, &data[done..done + chunk])?;
            done += chunk;
        }
        Ok(done)
    }

    /// Gathers the regions in order into `buf`. Returns the number of bytes read.
    pub fn copy_from_guest(&self, mem: &dyn MemoryBus, buf: &mut [u8]) -> Result<usize, MemoryError> {
        let mut done = 0usize;
        for entry in &self.entries {
            if done == buf.len() {
                break;
            }
            let chunk = usize::try_from(entry.len)
                .unwrap_or(usize::MAX)
                .min(buf.len() - done);
            mem.read_physical(entry.addr, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(done)
    }
}

/// Flat guest memory for unit tests. Reads can be made to fail.
#[cfg(test)]
pub(crate) struct TestMem {
    pub(crate) buf: Vec<u8>,
    pub(crate) fail_reads: bool,
}

#[cfg(test)]
impl TestMem {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size],
            fail_reads: false,
        }
    }

    fn range(&self, paddr: u64, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let oob = MemoryError::OutOfBounds { addr: paddr, len };
        let start = usize::try_from(paddr).map_err(|_| oob.clone())?;
        match start.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(start..end),
            _ => Err(oob),
        }
    }
}

#[cfg(test)]
impl MemoryBus for TestMem {
    fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        if self.fail_reads {
            return Err(MemoryError::OutOfBounds {
                addr: paddr,
                len: buf.len(),
            });
        }
        let range = self.range(paddr, buf.len())?;
        buf.copy_from_slice(&self.buf[range]);
        Ok(())
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(paddr, buf.len())?;
        self.buf[range].copy_from_slice(buf);
        Ok(())
    }
}
