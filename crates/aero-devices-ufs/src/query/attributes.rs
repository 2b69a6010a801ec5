//! Device attributes (`QUERY_ATTR_IDN_*`).

use bitflags::bitflags;

use super::QueryResponseCode;
use crate::regs::MAX_OUTSTANDING_RTT;

/// Number of attribute ids known to the device; ids at or above this are `INVALID_IDN`.
pub const ATTR_COUNT: usize = 0x2f;

const MAX_ACTIVE_ICC_LEVEL: u32 = 0x0f;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AttrPermissions: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttrWidth {
    U8,
    U16,
    U32,
}

impl AttrWidth {
    fn max(self) -> u32 {
        match self {
            Self::U8 => u32::from(u8::MAX),
            Self::U16 => u32::from(u16::MAX),
            Self::U32 => u32::MAX,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttrIdn {
    BootLunEnable,
    MaxHpbSingleCmd,
    PowerMode,
    ActiveIccLevel,
    OutOfOrderDataEnable,
    BackgroundOpStatus,
    PurgeStatus,
    MaxDataInSize,
    MaxDataOutSize,
    DynCapNeeded,
    RefClkFreq,
    ConfigDescrLock,
    MaxNumOfRtt,
    ExceptionEventControl,
    ExceptionEventStatus,
    SecondsPassed,
    ContextConf,
    CorrPrgBlkNum,
    FfuStatus,
    PsaState,
    PsaDataSize,
    RefClkGatingWaitTime,
    CaseRoughTemperature,
    HighTempBound,
    LowTempBound,
    ThrottlingStatus,
    WriteBoosterFlushStatus,
    AvailableWriteBoosterBufferSize,
    WriteBoosterBufferLifeTimeEst,
    CurrentWriteBoosterBufferSize,
    RefreshStatus,
    RefreshFreq,
    RefreshUnit,
    /// Ids inside the table that the standard leaves unassigned.
    Reserved(u8),
}

impl AttrIdn {
    pub fn from_idn(idn: u8) -> Option<Self> {
        Some(match idn {
            0x00 => Self::BootLunEnable,
            0x01 => Self::MaxHpbSingleCmd,
            0x02 => Self::PowerMode,
            0x03 => Self::ActiveIccLevel,
            0x04 => Self::OutOfOrderDataEnable,
            0x05 => Self::BackgroundOpStatus,
            0x06 => Self::PurgeStatus,
            0x07 => Self::MaxDataInSize,
            0x08 => Self::MaxDataOutSize,
            0x09 => Self::DynCapNeeded,
            0x0a => Self::RefClkFreq,
            0x0b => Self::ConfigDescrLock,
            0x0c => Self::MaxNumOfRtt,
            0x0d => Self::ExceptionEventControl,
            0x0e => Self::ExceptionEventStatus,
            0x0f => Self::SecondsPassed,
            0x10 => Self::ContextConf,
            0x11 => Self::CorrPrgBlkNum,
            0x14 => Self::FfuStatus,
            0x15 => Self::PsaState,
            0x16 => Self::PsaDataSize,
            0x17 => Self::RefClkGatingWaitTime,
            0x18 => Self::CaseRoughTemperature,
            0x19 => Self::HighTempBound,
            0x1a => Self::LowTempBound,
            0x1b => Self::ThrottlingStatus,
            0x1c => Self::WriteBoosterFlushStatus,
            0x1d => Self::AvailableWriteBoosterBufferSize,
            0x1e => Self::WriteBoosterBufferLifeTimeEst,
            0x1f => Self::CurrentWriteBoosterBufferSize,
            0x2c => Self::RefreshStatus,
            0x2d => Self::RefreshFreq,
            0x2e => Self::RefreshUnit,
            idn if usize::from(idn) < ATTR_COUNT => Self::Reserved(idn),
            _ => return None,
        })
    }

    pub fn idn(self) -> u8 {
        match self {
            Self::BootLunEnable => 0x00,
            Self::MaxHpbSingleCmd => 0x01,
            Self::PowerMode => 0x02,
            Self::ActiveIccLevel => 0x03,
            Self::OutOfOrderDataEnable => 0x04,
            Self::BackgroundOpStatus => 0x05,
            Self::PurgeStatus => 0x06,
            Self::MaxDataInSize => 0x07,
            Self::MaxDataOutSize => 0x08,
            Self::DynCapNeeded => 0x09,
            Self::RefClkFreq => 0x0a,
            Self::ConfigDescrLock => 0x0b,
            Self::MaxNumOfRtt => 0x0c,
            Self::ExceptionEventControl => 0x0d,
            Self::ExceptionEventStatus => 0x0e,
            Self::SecondsPassed => 0x0f,
            Self::ContextConf => 0x10,
            Self::CorrPrgBlkNum => 0x11,
            Self::FfuStatus => 0x14,
            Self::PsaState => 0x15,
            Self::PsaDataSize => 0x16,
            Self::RefClkGatingWaitTime => 0x17,
            Self::CaseRoughTemperature => 0x18,
            Self::HighTempBound => 0x19,
            Self::LowTempBound => 0x1a,
            Self::ThrottlingStatus => 0x1b,
            Self::WriteBoosterFlushStatus => 0x1c,
            Self::AvailableWriteBoosterBufferSize => 0x1d,
            Self::WriteBoosterBufferLifeTimeEst => 0x1e,
            Self::CurrentWriteBoosterBufferSize => 0x1f,
            Self::RefreshStatus => 0x2c,
            Self::RefreshFreq => 0x2d,
            Self::RefreshUnit => 0x2e,
            Self::Reserved(idn) => idn,
        }
    }

    pub fn permissions(self) -> AttrPermissions {
        let rw = AttrPermissions::READ | AttrPermissions::WRITE;
        match self {
            Self::ActiveIccLevel
            | Self::MaxDataInSize
            | Self::MaxDataOutSize
            | Self::RefClkFreq
            | Self::MaxNumOfRtt
            | Self::ExceptionEventControl
            | Self::PsaState
            | Self::PsaDataSize => rw,
            Self::SecondsPassed => AttrPermissions::WRITE,
            Self::MaxHpbSingleCmd | Self::CorrPrgBlkNum | Self::Reserved(_) => {
                AttrPermissions::empty()
            }
            Self::BootLunEnable
            | Self::PowerMode
            | Self::OutOfOrderDataEnable
            | Self::BackgroundOpStatus
            | Self::PurgeStatus
            | Self::DynCapNeeded
            | Self::ConfigDescrLock
            | Self::ExceptionEventStatus
            | Self::ContextConf
            | Self::FfuStatus
            | Self::RefClkGatingWaitTime
            | Self::CaseRoughTemperature
            | Self::HighTempBound
            | Self::LowTempBound
            | Self::ThrottlingStatus
            | Self::WriteBoosterFlushStatus
            | Self::AvailableWriteBoosterBufferSize
            | Self::WriteBoosterBufferLifeTimeEst
            | Self::CurrentWriteBoosterBufferSize
            | Self::RefreshStatus
            | Self::RefreshFreq
            | Self::RefreshUnit => AttrPermissions::READ,
        }
    }

    pub fn width(self) -> AttrWidth {
        match self {
            Self::DynCapNeeded
            | Self::SecondsPassed
            | Self::CorrPrgBlkNum
            | Self::PsaDataSize
            | Self::CurrentWriteBoosterBufferSize => AttrWidth::U32,
            Self::ExceptionEventControl | Self::ExceptionEventStatus | Self::ContextConf => {
                AttrWidth::U16
            }
            _ => AttrWidth::U8,
        }
    }

    /// Largest value a write may store.
    pub fn max_value(self) -> u32 {
        match self {
            Self::ActiveIccLevel => MAX_ACTIVE_ICC_LEVEL,
            _ => self.width().max(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttrOp {
    Read,
    Write(u32),
}

/// One field per attribute id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub boot_lun_en: u8,
    pub max_hpb_single_cmd: u8,
    pub current_power_mode: u8,
    pub active_icc_level: u8,
    pub out_of_order_data_en: u8,
    pub background_op_status: u8,
    pub purge_status: u8,
    pub max_data_in_size: u8,
    pub max_data_out_size: u8,
    pub dyn_cap_needed: u32,
    pub ref_clk_freq: u8,
    pub config_descr_lock: u8,
    pub max_num_of_rtt: u8,
    pub exception_event_control: u16,
    pub exception_event_status: u16,
    pub seconds_passed: u32,
    pub context_conf: u16,
    pub corr_prg_blk_num: u32,
    pub device_ffu_status: u8,
    pub psa_state: u8,
    pub psa_data_size: u32,
    pub ref_clk_gating_wait_time: u8,
    pub device_case_rough_temperature: u8,
    pub device_too_high_temp_boundary: u8,
    pub device_too_low_temp_boundary: u8,
    pub throttling_status: u8,
    pub wb_buffer_flush_status: u8,
    pub available_wb_buffer_size: u8,
    pub wb_buffer_life_time_est: u8,
    pub current_wb_buffer_size: u32,
    pub refresh_status: u8,
    pub refresh_freq: u8,
    pub refresh_unit: u8,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            boot_lun_en: 0,
            max_hpb_single_cmd: 0,
            // Active power mode.
            current_power_mode: 0x11,
            active_icc_level: 0x0f,
            out_of_order_data_en: 0,
            background_op_status: 0,
            purge_status: 0,
            max_data_in_size: 0x08,
            max_data_out_size: 0x08,
            dyn_cap_needed: 0,
            ref_clk_freq: 0x01,
            config_descr_lock: 0x01,
            max_num_of_rtt: MAX_OUTSTANDING_RTT,
            exception_event_control: 0,
            exception_event_status: 0,
            seconds_passed: 0,
            context_conf: 0,
            corr_prg_blk_num: 0,
            device_ffu_status: 0,
            psa_state: 0,
            psa_data_size: 0,
            ref_clk_gating_wait_time: 0,
            device_case_rough_temperature: 0,
            device_too_high_temp_boundary: 0,
            device_too_low_temp_boundary: 0,
            throttling_status: 0,
            wb_buffer_flush_status: 0,
            available_wb_buffer_size: 0,
            wb_buffer_life_time_est: 0,
            current_wb_buffer_size: 0,
            refresh_status: 0,
            refresh_freq: 0,
            refresh_unit: 0,
        }
    }
}

impl Attributes {
    pub fn get(&self, attr: AttrIdn) -> u32 {
        match attr {
            AttrIdn::BootLunEnable => self.boot_lun_en.into(),
            AttrIdn::MaxHpbSingleCmd => self.max_hpb_single_cmd.into(),
            AttrIdn::PowerMode => self.current_power_mode.into(),
            AttrIdn::ActiveIccLevel => self.active_icc_level.into(),
            AttrIdn::OutOfOrderDataEnable => self.out_of_order_data_en.into(),
            AttrIdn::BackgroundOpStatus => self.background_op_status.into(),
            AttrIdn::PurgeStatus => self.purge_status.into(),
            AttrIdn::MaxDataInSize => self.max_data_in_size.into(),
            AttrIdn::MaxDataOutSize => self.max_data_out_size.into(),
            AttrIdn::DynCapNeeded => self.dyn_cap_needed,
            AttrIdn::RefClkFreq => self.ref_clk_freq.into(),
            AttrIdn::ConfigDescrLock => self.config_descr_lock.into(),
            AttrIdn::MaxNumOfRtt => self.max_num_of_rtt.into(),
            AttrIdn::ExceptionEventControl => self.exception_event_control.into(),
            AttrIdn::ExceptionEventStatus => self.exception_event_status.into(),
            AttrIdn::SecondsPassed => self.seconds_passed,
            AttrIdn::ContextConf => self.context_conf.into(),
            AttrIdn::CorrPrgBlkNum => self.corr_prg_blk_num,
            AttrIdn::FfuStatus => self.device_ffu_status.into(),
            AttrIdn::PsaState => self.psa_state.into(),
            AttrIdn::PsaDataSize => self.psa_data_size,
            AttrIdn::RefClkGatingWaitTime => self.ref_clk_gating_wait_time.into(),
            AttrIdn::CaseRoughTemperature => self.device_case_rough_temperature.into(),
            AttrIdn::HighTempBound => self.device_too_high_temp_boundary.into(),
            AttrIdn::LowTempBound => self.device_too_low_temp_boundary.into(),
            AttrIdn::ThrottlingStatus => self.throttling_status.into(),
            AttrIdn::WriteBoosterFlushStatus => self.wb_buffer_flush_status.into(),
            AttrIdn::AvailableWriteBoosterBufferSize => self.available_wb_buffer_size.into(),
            AttrIdn::WriteBoosterBufferLifeTimeEst => self.wb_buffer_life_time_est.into(),
            AttrIdn::CurrentWriteBoosterBufferSize => self.current_wb_buffer_size,
            AttrIdn::RefreshStatus => self.refresh_status.into(),
            AttrIdn::RefreshFreq => self.refresh_freq.into(),
            AttrIdn::RefreshUnit => self.refresh_unit.into(),
            AttrIdn::Reserved(_) => 0,
        }
    }

    /// Stores `value`, truncated to the field width. Callers range-check first.
    fn set(&mut self, attr: AttrIdn, value: u32) {
        let b = value as u8;
        let w = value as u16;
        match attr {
            AttrIdn::BootLunEnable => self.boot_lun_en = b,
            AttrIdn::MaxHpbSingleCmd => self.max_hpb_single_cmd = b,
            AttrIdn::PowerMode => self.current_power_mode = b,
            AttrIdn::ActiveIccLevel => self.active_icc_level = b,
            AttrIdn::OutOfOrderDataEnable => self.out_of_order_data_en = b,
            AttrIdn::BackgroundOpStatus => self.background_op_status = b,
            AttrIdn::PurgeStatus => self.purge_status = b,
            AttrIdn::MaxDataInSize => self.max_data_in_size = b,
            AttrIdn::MaxDataOutSize => self.max_data_out_size = b,
            AttrIdn::DynCapNeeded => self.dyn_cap_needed = value,
            AttrIdn::RefClkFreq => self.ref_clk_freq = b,
            AttrIdn::ConfigDescrLock => self.config_descr_lock = b,
            AttrIdn::MaxNumOfRtt => self.max_num_of_rtt = b,
            AttrIdn::ExceptionEventControl => self.exception_event_control = w,
            AttrIdn::ExceptionEventStatus => self.exception_event_status = w,
            AttrIdn::SecondsPassed => self.seconds_passed = value,
            AttrIdn::ContextConf => self.context_conf = w,
            AttrIdn::CorrPrgBlkNum => self.corr_prg_blk_num = value,
            AttrIdn::FfuStatus => self.device_ffu_status = b,
            AttrIdn::PsaState => self.psa_state = b,
            AttrIdn::PsaDataSize => self.psa_data_size = value,
            AttrIdn::RefClkGatingWaitTime => self.ref_clk_gating_wait_time = b,
            AttrIdn::CaseRoughTemperature => self.device_case_rough_temperature = b,
            AttrIdn::HighTempBound => self.device_too_high_temp_boundary = b,
            AttrIdn::LowTempBound => self.device_too_low_temp_boundary = b,
            AttrIdn::ThrottlingStatus => self.throttling_status = b,
            AttrIdn::WriteBoosterFlushStatus => self.wb_buffer_flush_status = b,
            AttrIdn::AvailableWriteBoosterBufferSize => self.available_wb_buffer_size = b,
            AttrIdn::WriteBoosterBufferLifeTimeEst => self.wb_buffer_life_time_est = b,
            AttrIdn::CurrentWriteBoosterBufferSize => self.current_wb_buffer_size = value,
            AttrIdn::RefreshStatus => self.refresh_status = b,
            AttrIdn::RefreshFreq => self.refresh_freq = b,
            AttrIdn::RefreshUnit => self.refresh_unit = b,
            AttrIdn::Reserved(_) => {}
        }
    }

    /// Reads or writes the attribute `idn`, returning the value carried by the response.
    pub fn apply(&mut self, idn: u8, op: AttrOp) -> Result<u32, QueryResponseCode> {
        let attr = AttrIdn::from_idn(idn).ok_or(QueryResponseCode::InvalidIdn)?;
        let perms = attr.permissions();
        match op {
            AttrOp::Read => {
                if !perms.contains(AttrPermissions::READ) {
                    return Err(QueryResponseCode::NotReadable);
                }
                Ok(self.get(attr))
            }
            AttrOp::Write(value) => {
                if !perms.contains(AttrPermissions::WRITE) {
                    return Err(QueryResponseCode::NotWriteable);
                }
                if value > attr.max_value() {
                    return Err(QueryResponseCode::InvalidValue);
                }
                self.set(attr, value);
                Ok(value)
            }
        }
    }
}
