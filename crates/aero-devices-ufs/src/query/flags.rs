//! Device flags (`QUERY_FLAG_IDN_*`).

use bitflags::bitflags;

use super::QueryResponseCode;

/// Number of flag ids known to the device; ids at or above this are `INVALID_IDN`.
pub const FLAG_COUNT: usize = 0x13;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FlagPermissions: u8 {
        const READ = 1 << 0;
        const SET = 1 << 1;
        const CLEAR = 1 << 2;
        const TOGGLE = 1 << 3;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlagIdn {
    DeviceInit,
    PermanentWpe,
    PowerOnWpe,
    BkopsEnable,
    LifeSpanModeEnable,
    PurgeEnable,
    RefreshEnable,
    PhyResourceRemoval,
    BusyRtc,
    PermanentlyDisableFwUpdate,
    WriteBoosterEnable,
    WriteBoosterBufferFlushEnable,
    WriteBoosterFlushDuringHibernate,
    HpbReset,
    HpbEnable,
    /// Ids inside the table that the standard leaves unassigned.
    Reserved(u8),
}

impl FlagIdn {
    pub fn from_idn(idn: u8) -> Option<Self> {
        Some(match idn {
            0x01 => Self::DeviceInit,
            0x02 => Self::PermanentWpe,
            0x03 => Self::PowerOnWpe,
            0x04 => Self::BkopsEnable,
            0x05 => Self::LifeSpanModeEnable,
            0x06 => Self::PurgeEnable,
            0x07 => Self::RefreshEnable,
            0x08 => Self::PhyResourceRemoval,
            0x09 => Self::BusyRtc,
            0x0b => Self::PermanentlyDisableFwUpdate,
            0x0e => Self::WriteBoosterEnable,
            0x0f => Self::WriteBoosterBufferFlushEnable,
            0x10 => Self::WriteBoosterFlushDuringHibernate,
            0x11 => Self::HpbReset,
            0x12 => Self::HpbEnable,
            idn if usize::from(idn) < FLAG_COUNT => Self::Reserved(idn),
            _ => return None,
        })
    }

    pub fn idn(self) -> u8 {
        match self {
            Self::DeviceInit => 0x01,
            Self::PermanentWpe => 0x02,
            Self::PowerOnWpe => 0x03,
            Self::BkopsEnable => 0x04,
            Self::LifeSpanModeEnable => 0x05,
            Self::PurgeEnable => 0x06,
            Self::RefreshEnable => 0x07,
            Self::PhyResourceRemoval => 0x08,
            Self::BusyRtc => 0x09,
            Self::PermanentlyDisableFwUpdate => 0x0b,
            Self::WriteBoosterEnable => 0x0e,
            Self::WriteBoosterBufferFlushEnable => 0x0f,
            Self::WriteBoosterFlushDuringHibernate => 0x10,
            Self::HpbReset => 0x11,
            Self::HpbEnable => 0x12,
            Self::Reserved(idn) => idn,
        }
    }

    pub fn permissions(self) -> FlagPermissions {
        let rw = FlagPermissions::READ
            | FlagPermissions::SET
            | FlagPermissions::CLEAR
            | FlagPermissions::TOGGLE;
        match self {
            Self::DeviceInit => FlagPermissions::READ | FlagPermissions::SET,
            Self::BkopsEnable | Self::LifeSpanModeEnable => rw,
            Self::PermanentWpe
            | Self::PowerOnWpe
            | Self::PhyResourceRemoval
            | Self::BusyRtc
            | Self::PermanentlyDisableFwUpdate
            | Self::WriteBoosterEnable
            | Self::WriteBoosterBufferFlushEnable
            | Self::WriteBoosterFlushDuringHibernate => FlagPermissions::READ,
            Self::PurgeEnable
            | Self::RefreshEnable
            | Self::HpbReset
            | Self::HpbEnable
            | Self::Reserved(_) => FlagPermissions::empty(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlagOp {
    Read,
    Set,
    Clear,
    Toggle,
}

impl FlagOp {
    fn required(self) -> FlagPermissions {
        match self {
            Self::Read => FlagPermissions::READ,
            Self::Set => FlagPermissions::SET,
            Self::Clear => FlagPermissions::CLEAR,
            Self::Toggle => FlagPermissions::TOGGLE,
        }
    }
}

/// One byte per flag id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    values: [u8; FLAG_COUNT],
}

impl Default for Flags {
    fn default() -> Self {
        let mut values = [0u8; FLAG_COUNT];
        values[usize::from(FlagIdn::PermanentlyDisableFwUpdate.idn())] = 1;
        Self { values }
    }
}

impl Flags {
    pub fn get(&self, flag: FlagIdn) -> u8 {
        self.values[usize::from(flag.idn())]
    }

    /// Applies `op` to the flag `idn` and returns the resulting value.
    pub fn apply(&mut self, idn: u8, op: FlagOp) -> Result<u8, QueryResponseCode> {
        let flag = FlagIdn::from_idn(idn).ok_or(QueryResponseCode::InvalidIdn)?;
        if !flag.permissions().contains(op.required()) {
            return Err(match op {
                FlagOp::Read => QueryResponseCode::NotReadable,
                _ => QueryResponseCode::NotWriteable,
            });
        }

        let slot = &mut self.values[usize::from(flag.idn())];
        let value = match (flag, op) {
            // Device initialization completes immediately.
            (FlagIdn::DeviceInit, _) => 0,
            (_, FlagOp::Read) => *slot,
            (_, FlagOp::Set) => 1,
            (_, FlagOp::Clear) => 0,
            (_, FlagOp::Toggle) => u8::from(*slot == 0),
        };
        *slot = value;
        Ok(value)
    }
}
