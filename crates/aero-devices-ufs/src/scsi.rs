//! SCSI command bridging to logical units.
//!
//! Command UPIUs are routed by LUN either to one of up to [`MAX_LUS`] ordinary logical units or
//! to one of the four well-known logical units. Logical units complete asynchronously: every
//! submission carries a [`CompletionToken`] that must be handed back exactly once, either through
//! [`ScsiLogicalUnit::poll_completion`] or [`crate::UfsController::complete_scsi`].

use crate::dma::{MemoryBus, SgList};
use crate::error::ConfigError;
use crate::upiu::{
    ResponseBody, ResponseUpiu, ScsiResponse, TransactionType, UpiuHeader, RESPONSE_FAIL,
    RESPONSE_SUCCESS, SENSE_DATA_MAX_LEN, UPIU_FLAG_OVERFLOW, UPIU_FLAG_UNDERFLOW,
};
use crate::utrd::DataDirection;

pub const MAX_LUS: usize = 32;

/// LUN bit marking a well-known logical unit.
pub const UFS_UPIU_WLUN_ID: u8 = 0x80;

pub const SCSI_STATUS_GOOD: u8 = 0x00;
pub const SCSI_STATUS_CHECK_CONDITION: u8 = 0x02;

pub const SENSE_KEY_ILLEGAL_REQUEST: u8 = 0x05;
/// LOGICAL UNIT NOT SUPPORTED.
pub const ASC_LOGICAL_UNIT_NOT_SUPPORTED: u8 = 0x25;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WellKnownLun {
    ReportLuns,
    UfsDevice,
    Boot,
    Rpmb,
}

impl WellKnownLun {
    pub const ALL: [WellKnownLun; 4] = [
        WellKnownLun::ReportLuns,
        WellKnownLun::UfsDevice,
        WellKnownLun::Boot,
        WellKnownLun::Rpmb,
    ];

    pub fn lun(self) -> u8 {
        match self {
            Self::ReportLuns => 0x81,
            Self::UfsDevice => 0xd0,
            Self::Boot => 0xb0,
            Self::Rpmb => 0xc4,
        }
    }

    pub fn from_lun(lun: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.lun() == lun)
    }

    fn index(self) -> usize {
        match self {
            Self::ReportLuns => 0,
            Self::UfsDevice => 1,
            Self::Boot => 2,
            Self::Rpmb => 3,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LunTarget {
    Unit(u8),
    WellKnown(WellKnownLun),
}

impl LunTarget {
    /// Decodes the LUN field of a UPIU. LUNs outside the addressable range yield `None`.
    pub fn decode(lun: u8) -> Option<Self> {
        if lun & UFS_UPIU_WLUN_ID != 0 {
            return WellKnownLun::from_lun(lun).map(Self::WellKnown);
        }
        (usize::from(lun) < MAX_LUS).then_some(Self::Unit(lun))
    }
}

/// Identifies the request a logical unit is working on. It is deliberately not `Clone`: each
/// submission completes at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct CompletionToken {
    slot: usize,
    task_tag: u8,
    generation: u32,
}

impl CompletionToken {
    pub(crate) fn new(slot: usize, task_tag: u8, generation: u32) -> Self {
        Self {
            slot,
            task_tag,
            generation,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn task_tag(&self) -> u8 {
        self.task_tag
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
pub struct ScsiCommand<'a> {
    pub lun: u8,
    pub task_tag: u8,
    pub cdb: [u8; 16],
    pub expected_data_transfer_len: u32,
    pub direction: DataDirection,
    /// Data buffer described by the PRD table, if any.
    pub sg_list: Option<&'a SgList>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScsiCompletion {
    pub status: u8,
    pub sense: Vec<u8>,
    pub bytes_transferred: u64,
}

impl ScsiCompletion {
    pub fn good(bytes_transferred: u64) -> Self {
        Self {
            status: SCSI_STATUS_GOOD,
            sense: Vec::new(),
            bytes_transferred,
        }
    }

    pub fn check_condition(sense: Vec<u8>) -> Self {
        Self {
            status: SCSI_STATUS_CHECK_CONDITION,
            sense,
            bytes_transferred: 0,
        }
    }
}

/// Backing logical unit.
///
/// `submit` may move data through `sg_list` using `mem` while it runs. Completion is always
/// reported later, never from inside `submit`.
pub trait ScsiLogicalUnit {
    fn submit(&mut self, command: ScsiCommand<'_>, token: CompletionToken, mem: &mut dyn MemoryBus);

    /// Returns a finished command, if any. Units completed by the host instead hand their tokens
    /// to [`crate::UfsController::complete_scsi`] and keep the default.
    fn poll_completion(&mut self) -> Option<(CompletionToken, ScsiCompletion)> {
        None
    }
}

/// 18-byte fixed format sense data.
pub fn fixed_sense(key: u8, asc: u8, ascq: u8) -> Vec<u8> {
    let mut sense = vec![0u8; SENSE_DATA_MAX_LEN];
    sense[0] = 0x70;
    sense[2] = key & 0x0f;
    sense[7] = (SENSE_DATA_MAX_LEN - 8) as u8;
    sense[12] = asc;
    sense[13] = ascq;
    sense
}

/// Builds the Response UPIU for a finished SCSI command.
pub fn build_response(
    request: &UpiuHeader,
    expected_len: u32,
    completion: &ScsiCompletion,
) -> ResponseUpiu {
    let mut header = UpiuHeader::response_to(request, TransactionType::Response);
    header.scsi_status = completion.status;

    let expected = u64::from(expected_len);
    let residual = if completion.bytes_transferred < expected {
        header.flags |= UPIU_FLAG_UNDERFLOW;
        expected - completion.bytes_transferred
    } else if completion.bytes_transferred > expected {
        header.flags |= UPIU_FLAG_OVERFLOW;
        completion.bytes_transferred - expected
    } else {
        0
    };

    let mut body = ScsiResponse {
        residual_transfer_count: u32::try_from(residual).unwrap_or(u32::MAX),
        sense: Vec::new(),
    };
    if completion.status == SCSI_STATUS_GOOD {
        header.response = RESPONSE_SUCCESS;
    } else {
        header.response = RESPONSE_FAIL;
        let len = completion.sense.len().min(SENSE_DATA_MAX_LEN);
        body.sense = completion.sense[..len].to_vec();
        header.data_segment_len = (len + 2) as u16;
    }

    ResponseUpiu {
        header,
        body: ResponseBody::Scsi(body),
    }
}

/// Response for a command addressed to a LUN with nothing behind it.
pub fn invalid_lun_response(request: &UpiuHeader) -> ResponseUpiu {
    let completion = ScsiCompletion::check_condition(fixed_sense(
        SENSE_KEY_ILLEGAL_REQUEST,
        ASC_LOGICAL_UNIT_NOT_SUPPORTED,
        0,
    ));
    build_response(request, 0, &completion)
}

/// Owns the attached logical units.
pub struct LuRouter {
    units: [Option<Box<dyn ScsiLogicalUnit>>; MAX_LUS],
    well_known: [Option<Box<dyn ScsiLogicalUnit>>; 4],
}

impl Default for LuRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LuRouter {
    pub fn new() -> Self {
        Self {
            units: std::array::from_fn(|_| None),
            well_known: std::array::from_fn(|_| None),
        }
    }

    pub fn attach(&mut self, index: u8, unit: Box<dyn ScsiLogicalUnit>) -> Result<(), ConfigError> {
        let slot = self
            .units
            .get_mut(usize::from(index))
            .ok_or(ConfigError::LunOutOfRange(index))?;
        if slot.is_some() {
            return Err(ConfigError::LunAlreadyAttached(index));
        }
        *slot = Some(unit);
        Ok(())
    }

    pub fn attach_well_known(
        &mut self,
        wlun: WellKnownLun,
        unit: Box<dyn ScsiLogicalUnit>,
    ) -> Result<(), ConfigError> {
        let slot = &mut self.well_known[wlun.index()];
        if slot.is_some() {
            return Err(ConfigError::LunAlreadyAttached(wlun.lun()));
        }
        *slot = Some(unit);
        Ok(())
    }

    pub fn is_attached(&self, target: LunTarget) -> bool {
        match target {
            LunTarget::Unit(index) => self
                .units
                .get(usize::from(index))
                .map_or(false, Option::is_some),
            LunTarget::WellKnown(wlun) => self.well_known[wlun.index()].is_some(),
        }
    }

    /// The logical unit addressed by the UPIU LUN field, if one is attached.
    pub fn route(&mut self, lun: u8) -> Option<&mut (dyn ScsiLogicalUnit + 'static)> {
        let slot = match LunTarget::decode(lun)? {
            LunTarget::Unit(index) => self.units.get_mut(usize::from(index))?,
            LunTarget::WellKnown(wlun) => &mut self.well_known[wlun.index()],
        };
        slot.as_deref_mut()
    }

    /// Drains every completion the attached units have queued.
    pub fn poll_completions(&mut self) -> Vec<(CompletionToken, ScsiCompletion)> {
        let mut done = Vec::new();
        for unit in self
            .units
            .iter_mut()
            .chain(self.well_known.iter_mut())
            .flatten()
        {
            while let Some(completion) = unit.poll_completion() {
                done.push(completion);
            }
        }
        done
    }
}
