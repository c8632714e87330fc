//! Device information and usage table discovered from `u31`.

use heapless::Vec;

use crate::registers::{DeviceInfoHeader, UsageEntry};

/// Maximum number of usage table entries kept by the driver.
pub const MAX_USAGES: usize = 64;

/// Identification fields read from the `u31` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    /// Device identifier.
    pub device_id: u16,
    /// Runtime firmware is executing (as opposed to the bootloader).
    pub runtime: bool,
    /// Firmware major revision.
    pub fw_major: u8,
    /// Firmware minor revision.
    pub fw_minor: u8,
    /// Firmware variant.
    pub fw_variant: u8,
    /// JEDEC identifier of the silicon.
    pub jedec_id: u16,
    /// Number of entries in the usage table.
    pub num_usages: u8,
    /// Silicon revision.
    pub silicon_revision: u8,
}

impl From<DeviceInfoHeader> for DeviceInfo {
    fn from(header: DeviceInfoHeader) -> Self {
        Self {
            device_id: header.device_id(),
            runtime: header.runtime(),
            fw_major: header.fw_major(),
            fw_minor: header.fw_minor(),
            fw_variant: header.fw_variant(),
            jedec_id: header.jedec_id(),
            num_usages: header.num_usages(),
            silicon_revision: header.silicon_revision(),
        }
    }
}

/// Location of one register-group usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Usage {
    /// Usage number (`uXX`).
    pub number: u8,
    /// Register address of the first byte.
    pub address: u16,
    /// Length in bytes.
    pub length: u16,
    /// Usage revision.
    pub revision: u8,
}

/// Usage table of a running device.
#[derive(Debug, Clone, Default)]
pub struct UsageTable {
    usages: Vec<Usage, MAX_USAGES>,
}

impl UsageTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self { usages: Vec::new() }
    }

    /// Records an entry read from the device. Report-only usages are skipped
    /// since they have no register address. Returns `false` once the table is full.
    pub fn insert(&mut self, entry: UsageEntry) -> bool {
        if entry.is_report() {
            return true;
        }

        self.usages
            .push(Usage {
                number: entry.usage(),
                address: entry.address(),
                length: entry.length(),
                revision: entry.usage_revision(),
            })
            .is_ok()
    }

    /// Looks up a usage by number.
    pub fn get(&self, number: u8) -> Option<Usage> {
        self.usages.iter().copied().find(|usage| usage.number == number)
    }

    /// Number of register-group usages recorded.
    pub fn len(&self) -> usize {
        self.usages.len()
    }

    /// Returns `true` when no usage was recorded.
    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    /// Iterates the recorded usages in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Usage> {
        self.usages.iter()
    }
}
