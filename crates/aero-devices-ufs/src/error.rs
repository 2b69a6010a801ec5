use thiserror::Error;

/// Errors returned when the controller cannot access guest memory for DMA.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("guest memory access out of bounds: addr={addr:#x} len={len}")]
    OutOfBounds { addr: u64, len: usize },

    #[error("guest address overflow: addr={addr:#x} len={len}")]
    AddressOverflow { addr: u64, len: usize },

    /// The address needs more than 32 bits but the controller advertises 32-bit addressing.
    #[error("address {addr:#x} exceeds the 32-bit DMA window")]
    AddressWidth { addr: u64 },
}

/// Construction-time configuration errors. These are the only errors that can make
/// [`crate::UfsController`] creation fail; guest-controlled input never produces one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("nutrs must be in 1..=32 (got {0})")]
    InvalidTransferSlots(u32),

    #[error("nutmrs must be in 1..=8 (got {0})")]
    InvalidTaskManagementSlots(u32),

    #[error("logical unit index {0} is out of range")]
    LunOutOfRange(u8),

    #[error("logical unit {0:#x} is already attached")]
    LunAlreadyAttached(u8),

    #[error("{field} is too long for a string descriptor ({len} UTF-16 units)")]
    StringTooLong { field: &'static str, len: usize },

    #[error("invalid logical block size shift {0}")]
    InvalidBlockSize(u8),
}

/// Register-level access failures. These are logged by the MMIO surface and never
/// reach the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("invalid register offset {offset:#x}")]
    InvalidOffset { offset: u64 },

    #[error("unaligned register access at {offset:#x} (size {size})")]
    UnalignedAccess { offset: u64, size: usize },

    #[error("register {offset:#x} is read-only")]
    ReadOnly { offset: u64 },

    #[error("register {offset:#x} is not supported")]
    Unsupported { offset: u64 },
}
