//! UTP Transfer Request Descriptor (UTRD) and PRD table entries.
//!
//! Both structures are little-endian. Offsets and lengths of the response UPIU and the PRD table
//! are expressed in dwords relative to the command descriptor base.

pub const UTRD_SIZE: usize = 32;
pub const PRD_ENTRY_SIZE: usize = 16;

const DW0_COMMAND_TYPE_SHIFT: u32 = 28;
const DW0_DATA_DIRECTION_SHIFT: u32 = 25;
const DW0_DATA_DIRECTION_MASK: u32 = 0x3;
pub const UTRD_INTERRUPT: u32 = 1 << 24;

/// Overall Command Status written to UTRD dword 2.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum OverallCommandStatus {
    Success = 0x0,
    InvalidCommandTableAttributes = 0x1,
    InvalidPrdtAttributes = 0x2,
    MismatchDataBufferSize = 0x3,
    MismatchResponseUpiuSize = 0x4,
    PeerCommunicationFailure = 0x5,
    Aborted = 0x6,
    FatalError = 0x7,
    DeviceFatalError = 0x8,
    InvalidCryptoConfig = 0x9,
    GeneralCryptoError = 0xa,
    Invalid = 0xf,
}

impl OverallCommandStatus {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0xf {
            0x0 => Self::Success,
            0x1 => Self::InvalidCommandTableAttributes,
            0x2 => Self::InvalidPrdtAttributes,
            0x3 => Self::MismatchDataBufferSize,
            0x4 => Self::MismatchResponseUpiuSize,
            0x5 => Self::PeerCommunicationFailure,
            0x6 => Self::Aborted,
            0x7 => Self::FatalError,
            0x8 => Self::DeviceFatalError,
            0x9 => Self::InvalidCryptoConfig,
            0xa => Self::GeneralCryptoError,
            _ => Self::Invalid,
        }
    }
}

/// Data direction field (dword 0 bits 26:25).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataDirection {
    None,
    /// Host to device (write).
    ToDevice,
    /// Device to host (read).
    FromDevice,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferRequestDescriptor {
    pub dword0: u32,
    pub dword1: u32,
    /// Overall command status (low byte) on completion.
    pub dword2: u32,
    pub dword3: u32,
    pub command_desc_base_lo: u32,
    pub command_desc_base_hi: u32,
    /// Response UPIU length in dwords.
    pub response_upiu_length: u16,
    /// Response UPIU offset in dwords.
    pub response_upiu_offset: u16,
    /// PRD table length in entries.
    pub prdt_length: u16,
    /// PRD table offset in dwords.
    pub prdt_offset: u16,
}

impl TransferRequestDescriptor {
    pub fn parse(bytes: &[u8; UTRD_SIZE]) -> Self {
        let dw = |off: usize| {
            u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        let hw = |off: usize| u16::from_le_bytes([bytes[off], bytes[off + 1]]);
        Self {
            dword0: dw(0x00),
            dword1: dw(0x04),
            dword2: dw(0x08),
            dword3: dw(0x0c),
            command_desc_base_lo: dw(0x10),
            command_desc_base_hi: dw(0x14),
            response_upiu_length: hw(0x18),
            response_upiu_offset: hw(0x1a),
            prdt_length: hw(0x1c),
            prdt_offset: hw(0x1e),
        }
    }

    pub fn to_bytes(&self) -> [u8; UTRD_SIZE] {
        let mut out = [0u8; UTRD_SIZE];
        out[0x00..0x04].copy_from_slice(&self.dword0.to_le_bytes());
        out[0x04..0x08].copy_from_slice(&self.dword1.to_le_bytes());
        out[0x08..0x0c].copy_from_slice(&self.dword2.to_le_bytes());
        out[0x0c..0x10].copy_from_slice(&self.dword3.to_le_bytes());
        out[0x10..0x14].copy_from_slice(&self.command_desc_base_lo.to_le_bytes());
        out[0x14..0x18].copy_from_slice(&self.command_desc_base_hi.to_le_bytes());
        out[0x18..0x1a].copy_from_slice(&self.response_upiu_length.to_le_bytes());
        out[0x1a..0x1c].copy_from_slice(&self.response_upiu_offset.to_le_bytes());
        out[0x1c..0x1e].copy_from_slice(&self.prdt_length.to_le_bytes());
        out[0x1e..0x20].copy_from_slice(&self.prdt_offset.to_le_bytes());
        out
    }

    pub fn command_type(&self) -> u8 {
        (self.dword0 >> DW0_COMMAND_TYPE_SHIFT) as u8
    }

    pub fn data_direction(&self) -> DataDirection {
        match (self.dword0 >> DW0_DATA_DIRECTION_SHIFT) & DW0_DATA_DIRECTION_MASK {
            1 => DataDirection::ToDevice,
            2 => DataDirection::FromDevice,
            _ => DataDirection::None,
        }
    }

    pub fn interrupt_on_completion(&self) -> bool {
        self.dword0 & UTRD_INTERRUPT != 0
    }

    pub fn ocs(&self) -> OverallCommandStatus {
        OverallCommandStatus::from_bits(self.dword2 as u8)
    }

    pub fn set_ocs(&mut self, ocs: OverallCommandStatus) {
        self.dword2 = (self.dword2 & !0xff) | ocs as u32;
    }

    pub fn command_desc_base(&self) -> u64 {
        (u64::from(self.command_desc_base_hi) << 32) | u64::from(self.command_desc_base_lo)
    }

    /// Guest address of the response UPIU.
    pub fn response_upiu_addr(&self) -> u64 {
        self.command_desc_base()
            .wrapping_add(u64::from(self.response_upiu_offset) * 4)
    }

    /// Space reserved for the response UPIU, in bytes.
    pub fn response_upiu_len(&self) -> usize {
        usize::from(self.response_upiu_length) * 4
    }

    pub fn prdt_addr(&self) -> u64 {
        self.command_desc_base()
            .wrapping_add(u64::from(self.prdt_offset) * 4)
    }
}

/// Physical region description entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrdEntry {
    pub addr: u64,
    pub reserved: u32,
    /// Byte count minus one.
    pub size: u32,
}

impl PrdEntry {
    pub fn parse(bytes: &[u8; PRD_ENTRY_SIZE]) -> Self {
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&bytes[0..8]);
        Self {
            addr: u64::from_le_bytes(addr),
            reserved: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            size: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; PRD_ENTRY_SIZE] {
        let mut out = [0u8; PRD_ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.addr.to_le_bytes());
        out[8..12].copy_from_slice(&self.reserved.to_le_bytes());
        out[12..16].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn byte_count(&self) -> u64 {
        u64::from(self.size) + 1
    }
}
