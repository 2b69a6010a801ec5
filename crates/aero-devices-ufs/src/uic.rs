//! UIC (UniPro) command processing.
//!
//! Commands execute synchronously when the guest writes `UICCMD`. Only link startup,
//! hibernate enter/exit and local DME attribute access are modelled; everything else reports
//! failure in `UCMDARG2`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::regs::{HostControllerStatus, InterruptStatus, PowerModeStatus, RegisterFile};

pub const UIC_CMD_DME_GET: u8 = 0x01;
pub const UIC_CMD_DME_SET: u8 = 0x02;
pub const UIC_CMD_DME_PEER_GET: u8 = 0x03;
pub const UIC_CMD_DME_PEER_SET: u8 = 0x04;
pub const UIC_CMD_DME_POWERON: u8 = 0x10;
pub const UIC_CMD_DME_POWEROFF: u8 = 0x11;
pub const UIC_CMD_DME_ENABLE: u8 = 0x12;
pub const UIC_CMD_DME_RESET: u8 = 0x14;
pub const UIC_CMD_DME_END_PT_RST: u8 = 0x15;
pub const UIC_CMD_DME_LINK_STARTUP: u8 = 0x16;
pub const UIC_CMD_DME_HIBER_ENTER: u8 = 0x17;
pub const UIC_CMD_DME_HIBER_EXIT: u8 = 0x18;
pub const UIC_CMD_DME_TEST_MODE: u8 = 0x1a;

pub const UIC_CMD_RESULT_SUCCESS: u32 = 0x00;
pub const UIC_CMD_RESULT_FAILURE: u32 = 0x01;

// PHY adapter / PA layer attributes.
pub const PA_AVAIL_TX_DATA_LANES: u16 = 0x1520;
pub const PA_AVAIL_RX_DATA_LANES: u16 = 0x1540;
pub const PA_ACTIVE_TX_DATA_LANES: u16 = 0x1560;
pub const PA_CONNECTED_TX_DATA_LANES: u16 = 0x1561;
pub const PA_TX_GEAR: u16 = 0x1568;
pub const PA_HS_SERIES: u16 = 0x156a;
pub const PA_PWR_MODE: u16 = 0x1571;
pub const PA_ACTIVE_RX_DATA_LANES: u16 = 0x1580;
pub const PA_CONNECTED_RX_DATA_LANES: u16 = 0x1581;
pub const PA_RX_GEAR: u16 = 0x1583;
pub const PA_MAX_RX_HS_GEAR: u16 = 0x1587;
pub const PA_TACTIVATE: u16 = 0x15a8;

/// Local DME attribute store, keyed by attribute id (selector ignored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmeAttributes {
    values: BTreeMap<u16, u32>,
}

impl Default for DmeAttributes {
    fn default() -> Self {
        let values = [
            (PA_AVAIL_TX_DATA_LANES, 2),
            (PA_AVAIL_RX_DATA_LANES, 2),
            (PA_ACTIVE_TX_DATA_LANES, 2),
            (PA_CONNECTED_TX_DATA_LANES, 2),
            (PA_ACTIVE_RX_DATA_LANES, 2),
            (PA_CONNECTED_RX_DATA_LANES, 2),
            (PA_MAX_RX_HS_GEAR, 4),
            (PA_TX_GEAR, 1),
            (PA_RX_GEAR, 1),
            (PA_PWR_MODE, 0x11),
            (PA_HS_SERIES, 1),
            (PA_TACTIVATE, 1),
        ]
        .into_iter()
        .collect();
        Self { values }
    }
}

impl DmeAttributes {
    pub fn get(&self, attr: u16) -> Option<u32> {
        self.values.get(&attr).copied()
    }

    /// Only attributes the store already knows can be written.
    pub fn set(&mut self, attr: u16, value: u32) -> bool {
        match self.values.get_mut(&attr) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UicProcessor {
    dme: DmeAttributes,
}

impl UicProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dme(&self) -> &DmeAttributes {
        &self.dme
    }

    pub fn reset(&mut self) {
        self.dme = DmeAttributes::default();
    }

    /// Executes the command latched in `UICCMD`, writes the result to `UCMDARG2` and raises
    /// `IS.UCCS`. The caller re-evaluates the interrupt line.
    pub fn execute(&mut self, regs: &mut RegisterFile) {
        let cmd = (regs.uiccmd & 0xff) as u8;
        let attr = (regs.ucmdarg1 >> 16) as u16;

        let result = match cmd {
            UIC_CMD_DME_LINK_STARTUP => {
                regs.hcs |= HostControllerStatus::DP
                    | HostControllerStatus::UTRLRDY
                    | HostControllerStatus::UTMRLRDY;
                UIC_CMD_RESULT_SUCCESS
            }
            UIC_CMD_DME_HIBER_ENTER => {
                regs.is |= InterruptStatus::UHES;
                regs.hcs.set_power_mode_status(PowerModeStatus::Local);
                UIC_CMD_RESULT_SUCCESS
            }
            UIC_CMD_DME_HIBER_EXIT => {
                regs.is |= InterruptStatus::UHXS;
                regs.hcs.set_power_mode_status(PowerModeStatus::Local);
                UIC_CMD_RESULT_SUCCESS
            }
            UIC_CMD_DME_GET => match self.dme.get(attr) {
                Some(value) => {
                    regs.ucmdarg3 = value;
                    UIC_CMD_RESULT_SUCCESS
                }
                None => UIC_CMD_RESULT_FAILURE,
            },
            UIC_CMD_DME_SET => {
                if self.dme.set(attr, regs.ucmdarg3) {
                    UIC_CMD_RESULT_SUCCESS
                } else {
                    UIC_CMD_RESULT_FAILURE
                }
            }
            _ => UIC_CMD_RESULT_FAILURE,
        };

        debug!(cmd, attr, result, "uic command");
        regs.ucmdarg2 = result;
        regs.is |= InterruptStatus::UCCS;
    }
}
