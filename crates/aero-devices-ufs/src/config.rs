//! Controller and logical unit configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest string a string descriptor can carry (its length byte covers `2 + 2 * units`).
pub const MAX_STRING_UNITS: usize = 126;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UfsConfig {
    /// Number of UTP transfer request slots (1..=32).
    pub nutrs: u32,
    /// Number of UTP task management request slots (1..=8).
    pub nutmrs: u32,
    /// Advertise 64-bit DMA addressing (`CAP.64AS`).
    pub addressing_64bit: bool,
    pub manufacturer_name: String,
    pub product_name: String,
    pub serial_number: String,
    pub oem_id: String,
    pub product_revision: String,
    /// `wSpecVersion` of the device descriptor (BCD).
    pub spec_version: u16,
}

impl Default for UfsConfig {
    fn default() -> Self {
        Self {
            nutrs: 32,
            nutmrs: 8,
            addressing_64bit: true,
            manufacturer_name: "AERO".to_string(),
            product_name: "AERO UFS DEVICE".to_string(),
            serial_number: "0000000000000001".to_string(),
            oem_id: "AERO".to_string(),
            product_revision: "0001".to_string(),
            spec_version: 0x0310,
        }
    }
}

impl UfsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=32).contains(&self.nutrs) {
            return Err(ConfigError::InvalidTransferSlots(self.nutrs));
        }
        if !(1..=8).contains(&self.nutmrs) {
            return Err(ConfigError::InvalidTaskManagementSlots(self.nutmrs));
        }
        for (field, value) in [
            ("manufacturer_name", &self.manufacturer_name),
            ("product_name", &self.product_name),
            ("serial_number", &self.serial_number),
            ("oem_id", &self.oem_id),
            ("product_revision", &self.product_revision),
        ] {
            let len = value.encode_utf16().count();
            if len > MAX_STRING_UNITS {
                return Err(ConfigError::StringTooLong { field, len });
            }
        }
        Ok(())
    }
}

/// Geometry of an attached logical unit, as reported by its unit descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub block_count: u64,
    /// `log2` of the logical block size.
    pub block_size_shift: u8,
}

impl UnitConfig {
    pub const MIN_BLOCK_SIZE_SHIFT: u8 = 9;
    pub const MAX_BLOCK_SIZE_SHIFT: u8 = 16;

    pub fn new(block_count: u64, block_size_shift: u8) -> Self {
        Self {
            block_count,
            block_size_shift,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(Self::MIN_BLOCK_SIZE_SHIFT..=Self::MAX_BLOCK_SIZE_SHIFT).contains(&self.block_size_shift)
        {
            return Err(ConfigError::InvalidBlockSize(self.block_size_shift));
        }
        Ok(())
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.block_count
            .saturating_mul(1u64 << self.block_size_shift.min(63))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(UfsConfig::default().validate(), Ok(()));
    }

    #[test]
    fn slot_counts_are_range_checked() {
        let cfg = UfsConfig {
            nutrs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidTransferSlots(0)));
        let cfg = UfsConfig {
            nutrs: 33,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidTransferSlots(33)));
        let cfg = UfsConfig {
            nutmrs: 9,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidTaskManagementSlots(9))
        );
    }

    #[test]
    fn long_strings_are_rejected() {
        let cfg = UfsConfig {
            product_name: "x".repeat(MAX_STRING_UNITS + 1),
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::StringTooLong {
                field: "product_name",
                len: MAX_STRING_UNITS + 1
            })
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: UfsConfig =
            serde_json::from_str(r#"{ "nutrs": 8, "product_name": "TEST" }"#).unwrap();
        assert_eq!(cfg.nutrs, 8);
        assert_eq!(cfg.nutmrs, 8);
        assert_eq!(cfg.product_name, "TEST");
        assert_eq!(cfg.spec_version, 0x0310);
        assert!(cfg.addressing_64bit);
    }

    #[test]
    fn unit_capacity_and_block_size() {
        let unit = UnitConfig::new(1024, 12);
        assert_eq!(unit.capacity_bytes(), 4 * 1024 * 1024);
        assert_eq!(unit.validate(), Ok(()));
        assert_eq!(
            UnitConfig::new(1, 3).validate(),
            Err(ConfigError::InvalidBlockSize(3))
        );
    }
}
