//! Query request processing: flags, attributes and descriptors.

pub mod attributes;
pub mod descriptors;
pub mod flags;

use tracing::debug;

use crate::config::{UfsConfig, UnitConfig};
use crate::scsi::MAX_LUS;
use crate::upiu::{
    QueryRequestUpiu, QueryResponse, QUERY_FUNC_STANDARD_READ, QUERY_FUNC_STANDARD_WRITE,
};

use self::attributes::{AttrOp, Attributes};
use self::descriptors::DescriptorSource;
use self::flags::{FlagOp, Flags};

/// Query response codes (`QUERY_RESULT_*`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryResponseCode {
    Success = 0x00,
    NotReadable = 0xf6,
    NotWriteable = 0xf7,
    AlreadyWritten = 0xf8,
    InvalidLength = 0xf9,
    InvalidValue = 0xfa,
    InvalidSelector = 0xfb,
    InvalidIndex = 0xfc,
    InvalidIdn = 0xfd,
    InvalidOpcode = 0xfe,
    GeneralFailure = 0xff,
}

impl QueryResponseCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueryOpcode {
    Nop,
    ReadDescriptor,
    WriteDescriptor,
    ReadAttribute,
    WriteAttribute,
    ReadFlag,
    SetFlag,
    ClearFlag,
    ToggleFlag,
}

impl QueryOpcode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x0 => Self::Nop,
            0x1 => Self::ReadDescriptor,
            0x2 => Self::WriteDescriptor,
            0x3 => Self::ReadAttribute,
            0x4 => Self::WriteAttribute,
            0x5 => Self::ReadFlag,
            0x6 => Self::SetFlag,
            0x7 => Self::ClearFlag,
            0x8 => Self::ToggleFlag,
            _ => return None,
        })
    }

    fn is_read(self) -> bool {
        matches!(
            self,
            Self::Nop | Self::ReadDescriptor | Self::ReadAttribute | Self::ReadFlag
        )
    }

    fn is_write(self) -> bool {
        matches!(
            self,
            Self::Nop
                | Self::WriteDescriptor
                | Self::WriteAttribute
                | Self::SetFlag
                | Self::ClearFlag
                | Self::ToggleFlag
        )
    }
}

/// Result of a query: the response code plus the transaction fields of the Query Response UPIU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub code: QueryResponseCode,
    pub response: QueryResponse,
}

/// Device-side state reachable through query requests.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    config: UfsConfig,
    units: [Option<UnitConfig>; MAX_LUS],
    flags: Flags,
    attributes: Attributes,
}

impl QueryEngine {
    pub fn new(config: UfsConfig) -> Self {
        Self {
            config,
            units: [None; MAX_LUS],
            flags: Flags::default(),
            attributes: Attributes::default(),
        }
    }

    pub fn config(&self) -> &UfsConfig {
        &self.config
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Publishes (or withdraws) the geometry of logical unit `index` in the descriptors.
    pub fn set_unit(&mut self, index: usize, unit: Option<UnitConfig>) {
        if let Some(entry) = self.units.get_mut(index) {
            *entry = unit;
        }
    }

    /// Restores flags and attributes to their power-on values. Attached units are kept.
    pub fn reset(&mut self) {
        self.flags = Flags::default();
        self.attributes = Attributes::default();
    }

    pub fn execute(&mut self, req: &QueryRequestUpiu<'_>) -> QueryOutcome {
        let mut response = QueryResponse {
            opcode: req.opcode,
            idn: req.idn,
            index: req.index,
            selector: req.selector,
            ..QueryResponse::default()
        };
        let result = self.dispatch(req, &mut response);
        let code = match result {
            Ok(()) => QueryResponseCode::Success,
            Err(code) => {
                debug!(
                    opcode = req.opcode,
                    idn = req.idn,
                    index = req.index,
                    ?code,
                    "query request failed"
                );
                code
            }
        };
        QueryOutcome { code, response }
    }

    fn dispatch(
        &mut self,
        req: &QueryRequestUpiu<'_>,
        response: &mut QueryResponse,
    ) -> Result<(), QueryResponseCode> {
        let opcode = QueryOpcode::from_code(req.opcode).ok_or(QueryResponseCode::InvalidOpcode)?;
        let allowed = match req.function {
            QUERY_FUNC_STANDARD_READ => opcode.is_read(),
            QUERY_FUNC_STANDARD_WRITE => opcode.is_write(),
            _ => return Err(QueryResponseCode::GeneralFailure),
        };
        if !allowed {
            return Err(QueryResponseCode::InvalidOpcode);
        }

        match opcode {
            QueryOpcode::Nop => {}
            QueryOpcode::ReadDescriptor => {
                let data = self.read_descriptor(req.idn, req.index, req.length)?;
                response.length = data.len() as u16;
                response.data = data;
            }
            QueryOpcode::WriteDescriptor => return Err(QueryResponseCode::NotWriteable),
            QueryOpcode::ReadAttribute => {
                response.value = self.attributes.apply(req.idn, AttrOp::Read)?;
            }
            QueryOpcode::WriteAttribute => {
                response.value = self.attributes.apply(req.idn, AttrOp::Write(req.value))?;
            }
            QueryOpcode::ReadFlag => {
                response.value = self.flags.apply(req.idn, FlagOp::Read)?.into();
            }
            QueryOpcode::SetFlag => {
                response.value = self.flags.apply(req.idn, FlagOp::Set)?.into();
            }
            QueryOpcode::ClearFlag => {
                response.value = self.flags.apply(req.idn, FlagOp::Clear)?.into();
            }
            QueryOpcode::ToggleFlag => {
                response.value = self.flags.apply(req.idn, FlagOp::Toggle)?.into();
            }
        }
        Ok(())
    }

    /// Reads descriptor `idn`, clamped to `min(max_len, descriptor length byte)`.
    pub fn read_descriptor(
        &self,
        idn: u8,
        index: u8,
        max_len: u16,
    ) -> Result<Vec<u8>, QueryResponseCode> {
        let source = DescriptorSource {
            config: &self.config,
            units: &self.units,
        };
        let mut desc = source.read(idn, index)?;
        let declared = desc.first().copied().map_or(0, usize::from);
        desc.truncate(declared.min(usize::from(max_len)));
        Ok(desc)
    }
}
