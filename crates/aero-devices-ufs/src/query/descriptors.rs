//! Descriptor contents (`QUERY_DESC_IDN_*`).
//!
//! Device, geometry, unit and string descriptors are generated from the configuration. The
//! configuration, power and health descriptors are fixed mocked payloads carrying only their
//! length and id.

use super::QueryResponseCode;
use crate::config::{UfsConfig, UnitConfig};
use crate::scsi::{WellKnownLun, MAX_LUS};

pub const DEVICE_DESC_LEN: usize = 0x59;
pub const CONFIGURATION_DESC_LEN: usize = 0xe6;
pub const UNIT_DESC_LEN: usize = 0x2d;
pub const RPMB_UNIT_DESC_LEN: usize = 0x23;
pub const INTERCONNECT_DESC_LEN: usize = 0x06;
pub const GEOMETRY_DESC_LEN: usize = 0x57;
pub const POWER_DESC_LEN: usize = 0x62;
pub const HEALTH_DESC_LEN: usize = 0x25;

/// String descriptor indices advertised by the device descriptor.
pub const STRING_INDEX_MANUFACTURER: u8 = 0;
pub const STRING_INDEX_PRODUCT: u8 = 1;
pub const STRING_INDEX_SERIAL: u8 = 2;
pub const STRING_INDEX_OEM: u8 = 3;
pub const STRING_INDEX_PRODUCT_REVISION: u8 = 4;

const NUMBER_WLU: u8 = 4;
const RPMB_MEMORY_TYPE: u8 = 0x0f;
/// 256-byte RPMB frames.
const RPMB_BLOCK_SIZE_SHIFT: u8 = 8;
const RPMB_BLOCK_COUNT: u64 = 0x200;
const EXTENDED_FEATURES: u32 = (1 << 4) | (1 << 5);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DescriptorIdn {
    Device,
    Configuration,
    Unit,
    Interconnect,
    String,
    Geometry,
    Power,
    Health,
}

impl DescriptorIdn {
    pub fn from_idn(idn: u8) -> Option<Self> {
        Some(match idn {
            0x00 => Self::Device,
            0x01 => Self::Configuration,
            0x02 => Self::Unit,
            0x04 => Self::Interconnect,
            0x05 => Self::String,
            0x07 => Self::Geometry,
            0x08 => Self::Power,
            0x09 => Self::Health,
            _ => return None,
        })
    }

    pub fn idn(self) -> u8 {
        match self {
            Self::Device => 0x00,
            Self::Configuration => 0x01,
            Self::Unit => 0x02,
            Self::Interconnect => 0x04,
            Self::String => 0x05,
            Self::Geometry => 0x07,
            Self::Power => 0x08,
            Self::Health => 0x09,
        }
    }
}

/// Read-only view over everything the descriptors are derived from.
pub struct DescriptorSource<'a> {
    pub config: &'a UfsConfig,
    pub units: &'a [Option<UnitConfig>; MAX_LUS],
}

impl DescriptorSource<'_> {
    /// Returns the full descriptor; callers clamp it to the requested length.
    pub fn read(&self, idn: u8, index: u8) -> Result<Vec<u8>, QueryResponseCode> {
        let desc = DescriptorIdn::from_idn(idn).ok_or(QueryResponseCode::InvalidIdn)?;
        Ok(match desc {
            DescriptorIdn::Device => self.device(),
            DescriptorIdn::Geometry => self.geometry(),
            DescriptorIdn::Unit => self.unit(index)?,
            DescriptorIdn::String => self.string(index),
            DescriptorIdn::Interconnect => interconnect(),
            DescriptorIdn::Configuration => mocked(desc, CONFIGURATION_DESC_LEN),
            DescriptorIdn::Power => mocked(desc, POWER_DESC_LEN),
            DescriptorIdn::Health => mocked(desc, HEALTH_DESC_LEN),
        })
    }

    fn attached_count(&self) -> usize {
        self.units.iter().flatten().count()
    }

    fn raw_capacity_bytes(&self) -> u64 {
        self.units
            .iter()
            .flatten()
            .fold(0u64, |acc, u| acc.saturating_add(u.capacity_bytes()))
    }

    pub fn device(&self) -> Vec<u8> {
        let mut d = vec![0u8; DEVICE_DESC_LEN];
        d[0x00] = DEVICE_DESC_LEN as u8;
        d[0x01] = DescriptorIdn::Device.idn();
        // bDeviceSubClass: embedded, non-bootable.
        d[0x04] = 0x01;
        d[0x06] = self.attached_count() as u8;
        d[0x07] = NUMBER_WLU;
        // bInitPowerMode: active.
        d[0x0a] = 0x01;
        d[0x0b] = 0x7f;
        d[0x10..0x12].copy_from_slice(&self.config.spec_version.to_be_bytes());
        d[0x14] = STRING_INDEX_MANUFACTURER;
        d[0x15] = STRING_INDEX_PRODUCT;
        d[0x16] = STRING_INDEX_SERIAL;
        d[0x17] = STRING_INDEX_OEM;
        d[0x1a] = 0x16;
        d[0x1b] = 0x1a;
        d[0x1c] = 0x02;
        d[0x21] = self.config.nutrs as u8;
        d[0x2a] = STRING_INDEX_PRODUCT_REVISION;
        d[0x4f..0x53].copy_from_slice(&EXTENDED_FEATURES.to_be_bytes());
        d
    }

    pub fn geometry(&self) -> Vec<u8> {
        let raw_sectors = self.raw_capacity_bytes() >> 9;
        let mut d = vec![0u8; GEOMETRY_DESC_LEN];
        d[0x00] = GEOMETRY_DESC_LEN as u8;
        d[0x01] = DescriptorIdn::Geometry.idn();
        d[0x04..0x0c].copy_from_slice(&raw_sectors.to_be_bytes());
        // bMaxNumberLU: 32 logical units.
        d[0x0c] = 0x01;
        d[0x0d..0x11].copy_from_slice(&0x2000u32.to_be_bytes());
        d[0x11] = 0x01;
        d[0x12] = 0x08;
        d[0x15] = 0x08;
        d[0x16] = 0x08;
        d[0x17] = 0x40;
        d[0x19] = 0x00;
        d[0x1a] = 0x05;
        d[0x1e..0x20].copy_from_slice(&0x8001u16.to_be_bytes());
        d
    }

    pub fn unit(&self, index: u8) -> Result<Vec<u8>, QueryResponseCode> {
        if index == WellKnownLun::Rpmb.lun() {
            return Ok(rpmb_unit());
        }
        let unit = self
            .units
            .get(usize::from(index))
            .copied()
            .flatten()
            .ok_or(QueryResponseCode::InvalidIndex)?;
        let mut d = vec![0u8; UNIT_DESC_LEN];
        d[0x00] = UNIT_DESC_LEN as u8;
        d[0x01] = DescriptorIdn::Unit.idn();
        d[0x02] = index;
        d[0x03] = 0x01;
        d[0x0a] = unit.block_size_shift;
        d[0x0b..0x13].copy_from_slice(&unit.block_count.to_be_bytes());
        d[0x18..0x20].copy_from_slice(&unit.block_count.to_be_bytes());
        Ok(d)
    }

    /// UTF-16BE string descriptor; unassigned indices yield an empty string.
    pub fn string(&self, index: u8) -> Vec<u8> {
        let text = match index {
            STRING_INDEX_MANUFACTURER => self.config.manufacturer_name.as_str(),
            STRING_INDEX_PRODUCT => self.config.product_name.as_str(),
            STRING_INDEX_SERIAL => self.config.serial_number.as_str(),
            STRING_INDEX_OEM => self.config.oem_id.as_str(),
            STRING_INDEX_PRODUCT_REVISION => self.config.product_revision.as_str(),
            _ => "",
        };
        let mut d = vec![0u8, DescriptorIdn::String.idn()];
        for unit in text.encode_utf16().take(crate::config::MAX_STRING_UNITS) {
            d.extend_from_slice(&unit.to_be_bytes());
        }
        d[0] = d.len() as u8;
        d
    }
}

fn rpmb_unit() -> Vec<u8> {
    let mut d = vec![0u8; RPMB_UNIT_DESC_LEN];
    d[0x00] = RPMB_UNIT_DESC_LEN as u8;
    d[0x01] = DescriptorIdn::Unit.idn();
    d[0x02] = WellKnownLun::Rpmb.lun();
    d[0x03] = 0x01;
    d[0x08] = RPMB_MEMORY_TYPE;
    d[0x0a] = RPMB_BLOCK_SIZE_SHIFT;
    d[0x0b..0x13].copy_from_slice(&RPMB_BLOCK_COUNT.to_be_bytes());
    d[0x18..0x20].copy_from_slice(&RPMB_BLOCK_COUNT.to_be_bytes());
    d
}

fn interconnect() -> Vec<u8> {
    // UniPro 1.8, M-PHY 4.1.
    vec![
        INTERCONNECT_DESC_LEN as u8,
        DescriptorIdn::Interconnect.idn(),
        0x01,
        0x80,
        0x04,
        0x10,
    ]
}

fn mocked(desc: DescriptorIdn, len: usize) -> Vec<u8> {
    let mut d = vec![0u8; len];
    d[0] = len as u8;
    d[1] = desc.idn();
    d
}
