//! UFSHCI register file.
//!
//! Offsets and bit positions follow the UFSHCI 3.0 layout. The file is stored as typed fields;
//! side effects of guest writes (doorbells, HCE, UIC commands) are applied by the controller,
//! which then re-evaluates the interrupt line.

use bitflags::bitflags;

use crate::error::RegisterError;

pub const REG_CAP: u64 = 0x00;
pub const REG_VER: u64 = 0x08;
pub const REG_HCPID: u64 = 0x10;
pub const REG_HCMID: u64 = 0x14;
pub const REG_AHIT: u64 = 0x18;
pub const REG_IS: u64 = 0x20;
pub const REG_IE: u64 = 0x24;
pub const REG_HCSEXT: u64 = 0x2c;
pub const REG_HCS: u64 = 0x30;
pub const REG_HCE: u64 = 0x34;
pub const REG_UECPA: u64 = 0x38;
pub const REG_UECDL: u64 = 0x3c;
pub const REG_UECN: u64 = 0x40;
pub const REG_UECT: u64 = 0x44;
pub const REG_UECDME: u64 = 0x48;
pub const REG_UTRIACR: u64 = 0x4c;
pub const REG_UTRLBA: u64 = 0x50;
pub const REG_UTRLBAU: u64 = 0x54;
pub const REG_UTRLDBR: u64 = 0x58;
pub const REG_UTRLCLR: u64 = 0x5c;
pub const REG_UTRLRSR: u64 = 0x60;
pub const REG_UTRLCNR: u64 = 0x64;
pub const REG_UTMRLBA: u64 = 0x70;
pub const REG_UTMRLBAU: u64 = 0x74;
pub const REG_UTMRLDBR: u64 = 0x78;
pub const REG_UTMRLCLR: u64 = 0x7c;
pub const REG_UTMRLRSR: u64 = 0x80;
pub const REG_UICCMD: u64 = 0x90;
pub const REG_UCMDARG1: u64 = 0x94;
pub const REG_UCMDARG2: u64 = 0x98;
pub const REG_UCMDARG3: u64 = 0x9c;

/// Size of the backing register block.
pub const REG_FILE_SIZE: u64 = 0xa0;
/// Size of the MMIO window (next power of two of [`REG_FILE_SIZE`]).
pub const MMIO_SIZE: u64 = 0x100;

/// UFSHCI version reported in `VER` (3.0).
pub const UFSHCI_VERSION: u32 = 0x0300;
pub const HC_PRODUCT_ID: u32 = 0x0001;
pub const HC_MANUFACTURER_ID: u32 = 0x1d1d;

/// Transfer/task list base registers are 1 KiB aligned.
pub const LIST_BASE_MASK: u32 = 0xffff_fc00;

/// Interrupt sources that can raise the interrupt line.
pub const UFS_INTR_MASK: u32 = 0x0007_1fff;

bitflags! {
    /// `IS` / `IE` bits.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct InterruptStatus: u32 {
        const UTRCS = 1 << 0;
        const UDEPRI = 1 << 1;
        const UE = 1 << 2;
        const UTMS = 1 << 3;
        const UPMS = 1 << 4;
        const UHXS = 1 << 5;
        const UHES = 1 << 6;
        const ULLS = 1 << 7;
        const ULSS = 1 << 8;
        const UTMRCS = 1 << 9;
        const UCCS = 1 << 10;
        const DFES = 1 << 11;
        const UTPES = 1 << 12;
        const HCFES = 1 << 16;
        const SBFES = 1 << 17;
        const CEFES = 1 << 18;
    }
}

bitflags! {
    /// `HCS` bits. `UPMCRS` is the 3-bit power mode change request status field.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct HostControllerStatus: u32 {
        const DP = 1 << 0;
        const UTRLRDY = 1 << 1;
        const UTMRLRDY = 1 << 2;
        const UCRDY = 1 << 3;
        const UPMCRS = 0x7 << 8;
    }
}

bitflags! {
    /// `HCE` bits.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct HostControllerEnable: u32 {
        const HCE = 1 << 0;
        const CGE = 1 << 1;
    }
}

/// Values of the `HCS.UPMCRS` field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerModeStatus {
    Ok = 0,
    Local = 1,
    Remote = 2,
    Busy = 3,
    ErrorCap = 4,
    FatalError = 5,
}

impl PowerModeStatus {
    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0 => Self::Ok,
            1 => Self::Local,
            2 => Self::Remote,
            3 => Self::Busy,
            4 => Self::ErrorCap,
            5 => Self::FatalError,
            _ => return None,
        })
    }
}

const UPMCRS_SHIFT: u32 = 8;

impl HostControllerStatus {
    pub fn power_mode_status(self) -> Option<PowerModeStatus> {
        PowerModeStatus::from_bits(((self.bits() & Self::UPMCRS.bits()) >> UPMCRS_SHIFT) as u8)
    }

    pub fn set_power_mode_status(&mut self, status: PowerModeStatus) {
        self.remove(Self::UPMCRS);
        *self |= Self::from_bits_retain((status as u32) << UPMCRS_SHIFT);
    }
}

/// Outstanding ready-to-transfer requests per logical unit, advertised in `CAP.NORTT` and
/// `bMaxNumOfRTT`.
pub const MAX_OUTSTANDING_RTT: u8 = 2;

/// The `CAP` register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities(u32);

impl Capabilities {
    const NUTRS_MASK: u32 = 0x1f;
    const NORTT_SHIFT: u32 = 8;
    const NORTT_MASK: u32 = 0xff;
    const NUTMRS_SHIFT: u32 = 16;
    const NUTMRS_MASK: u32 = 0x7;
    pub const AUTOH8: u32 = 1 << 23;
    pub const AS64: u32 = 1 << 24;
    pub const OODDS: u32 = 1 << 25;
    pub const UICDMETMS: u32 = 1 << 26;
    pub const CS: u32 = 1 << 28;

    /// `nutrs`/`nutmrs` must already be validated (`1..=32` and `1..=8`).
    pub fn new(nutrs: u32, nutmrs: u32, addressing_64bit: bool) -> Self {
        let mut raw = (nutrs.wrapping_sub(1) & Self::NUTRS_MASK)
            | ((u32::from(MAX_OUTSTANDING_RTT) - 1) << Self::NORTT_SHIFT)
            | ((nutmrs.wrapping_sub(1) & Self::NUTMRS_MASK) << Self::NUTMRS_SHIFT);
        if addressing_64bit {
            raw |= Self::AS64;
        }
        Self(raw)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Number of transfer request slots (one-based).
    pub fn nutrs(self) -> u32 {
        (self.0 & Self::NUTRS_MASK) + 1
    }

    /// Number of outstanding ready-to-transfer requests supported (one-based).
    pub fn nortt(self) -> u32 {
        ((self.0 >> Self::NORTT_SHIFT) & Self::NORTT_MASK) + 1
    }

    /// Number of task management slots (one-based).
    pub fn nutmrs(self) -> u32 {
        ((self.0 >> Self::NUTMRS_SHIFT) & Self::NUTMRS_MASK) + 1
    }

    pub fn supports_64bit_addressing(self) -> bool {
        self.0 & Self::AS64 != 0
    }

    /// Mask covering every implemented transfer request slot.
    pub fn slot_mask(self) -> u32 {
        match self.nutrs() {
            32 => u32::MAX,
            n => (1u32 << n) - 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterFile {
    pub cap: Capabilities,
    pub ver: u32,
    pub hcpid: u32,
    pub hcmid: u32,
    pub ahit: u32,
    pub is: InterruptStatus,
    pub ie: InterruptStatus,
    pub hcsext: u32,
    pub hcs: HostControllerStatus,
    pub hce: HostControllerEnable,
    pub uecpa: u32,
    pub uecdl: u32,
    pub uecn: u32,
    pub uect: u32,
    pub uecdme: u32,
    pub utriacr: u32,
    pub utrlba: u32,
    pub utrlbau: u32,
    pub utrldbr: u32,
    pub utrlrsr: u32,
    pub utrlcnr: u32,
    pub utmrlba: u32,
    pub utmrlbau: u32,
    pub uiccmd: u32,
    pub ucmdarg1: u32,
    pub ucmdarg2: u32,
    pub ucmdarg3: u32,
}

impl RegisterFile {
    pub fn new(cap: Capabilities) -> Self {
        Self {
            cap,
            ver: UFSHCI_VERSION,
            hcpid: HC_PRODUCT_ID,
            hcmid: HC_MANUFACTURER_ID,
            ahit: 0,
            is: InterruptStatus::empty(),
            ie: InterruptStatus::empty(),
            hcsext: 0,
            hcs: HostControllerStatus::empty(),
            hce: HostControllerEnable::empty(),
            uecpa: 0,
            uecdl: 0,
            uecn: 0,
            uect: 0,
            uecdme: 0,
            utriacr: 0,
            utrlba: 0,
            utrlbau: 0,
            utrldbr: 0,
            utrlrsr: 0,
            utrlcnr: 0,
            utmrlba: 0,
            utmrlbau: 0,
            uiccmd: 0,
            ucmdarg1: 0,
            ucmdarg2: 0,
            ucmdarg3: 0,
        }
    }

    /// Base address of the UTP transfer request list.
    pub fn utrl_base(&self) -> u64 {
        (u64::from(self.utrlbau) << 32) | u64::from(self.utrlba)
    }

    /// `(IS & IE & UFS_INTR_MASK) != 0`.
    pub fn interrupt_pending(&self) -> bool {
        self.is.bits() & self.ie.bits() & UFS_INTR_MASK != 0
    }

    /// Reads the dword register at `offset` (must be 4-byte aligned). Reserved offsets inside the
    /// register block read as zero.
    pub fn read(&self, offset: u64) -> Result<u32, RegisterError> {
        if offset >= REG_FILE_SIZE {
            return Err(RegisterError::InvalidOffset { offset });
        }
        if offset % 4 != 0 {
            return Err(RegisterError::UnalignedAccess { offset, size: 4 });
        }
        Ok(match offset {
            REG_CAP => self.cap.bits(),
            REG_VER => self.ver,
            REG_HCPID => self.hcpid,
            REG_HCMID => self.hcmid,
            REG_AHIT => self.ahit,
            REG_IS => self.is.bits(),
            REG_IE => self.ie.bits(),
            REG_HCSEXT => self.hcsext,
            REG_HCS => self.hcs.bits(),
            REG_HCE => self.hce.bits(),
            REG_UECPA => self.uecpa,
            REG_UECDL => self.uecdl,
            REG_UECN => self.uecn,
            REG_UECT => self.uect,
            REG_UECDME => self.uecdme,
            REG_UTRIACR => self.utriacr,
            REG_UTRLBA => self.utrlba,
            REG_UTRLBAU => self.utrlbau,
            REG_UTRLDBR => self.utrldbr,
            REG_UTRLRSR => self.utrlrsr,
            REG_UTRLCNR => self.utrlcnr,
            REG_UTMRLBA => self.utmrlba,
            REG_UTMRLBAU => self.utmrlbau,
            REG_UICCMD => self.uiccmd,
            REG_UCMDARG1 => self.ucmdarg1,
            REG_UCMDARG2 => self.ucmdarg2,
            REG_UCMDARG3 => self.ucmdarg3,
            _ => 0,
        })
    }

    /// Stores `value` into a register without side effects.
    ///
    /// Registers with side effects (`IS`, `IE`, `HCE`, `UTRLDBR`, `UTRLCNR`, `UICCMD`) are
    /// handled by the controller before reaching this point.
    pub fn store(&mut self, offset: u64, value: u32) -> Result<(), RegisterError> {
        if offset >= REG_FILE_SIZE {
            return Err(RegisterError::InvalidOffset { offset });
        }
        if offset % 4 != 0 {
            return Err(RegisterError::UnalignedAccess { offset, size: 4 });
        }
        match offset {
            REG_CAP | REG_VER | REG_HCPID | REG_HCMID | REG_HCSEXT | REG_HCS | REG_UECPA
            | REG_UECDL | REG_UECN | REG_UECT | REG_UECDME => {
                return Err(RegisterError::ReadOnly { offset })
            }
            REG_UTRLCLR | REG_UTMRLDBR | REG_UTMRLCLR | REG_UTMRLRSR => {
                return Err(RegisterError::Unsupported { offset })
            }
            REG_AHIT => self.ahit = value,
            REG_IS => self.is = InterruptStatus::from_bits_retain(value),
            REG_IE => self.ie = InterruptStatus::from_bits_retain(value),
            REG_HCE => self.hce = HostControllerEnable::from_bits_retain(value),
            REG_UTRIACR => self.utriacr = value,
            REG_UTRLBA => self.utrlba = value & LIST_BASE_MASK,
            REG_UTRLBAU => self.utrlbau = value,
            REG_UTRLDBR => self.utrldbr = value,
            REG_UTRLRSR => self.utrlrsr = value,
            REG_UTRLCNR => self.utrlcnr = value,
            REG_UTMRLBA => self.utmrlba = value & LIST_BASE_MASK,
            REG_UTMRLBAU => self.utmrlbau = value,
            REG_UICCMD => self.uiccmd = value,
            REG_UCMDARG1 => self.ucmdarg1 = value,
            REG_UCMDARG2 => self.ucmdarg2 = value,
            REG_UCMDARG3 => self.ucmdarg3 = value,
            // Reserved holes in the block.
            _ => {}
        }
        Ok(())
    }
}
