//! Device inventories.

use super::smi::SmiTool;
use super::traits::DeviceInventory;
use crate::config::{Config, InventorySource};
use crate::error::Result;
use tracing::warn;

/// A fixed set of devices `0..count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInventory {
    pub count: u32,
}

impl FixedInventory {
    pub fn new(count: u32) -> Self {
        Self { count }
    }
}

impl DeviceInventory for FixedInventory {
    fn device_ids(&self) -> Result<Vec<u32>> {
        Ok((0..self.count).collect())
    }
}

/// An explicit list of devices.
impl DeviceInventory for Vec<u32> {
    fn device_ids(&self) -> Result<Vec<u32>> {
        Ok(self.clone())
    }
}

/// The host's inventory: `nvidia-smi` when available, otherwise a fixed count.
#[derive(Debug, Clone)]
pub struct SystemInventory {
    smi: Option<SmiTool>,
    fallback: FixedInventory,
}

impl SystemInventory {
    pub fn from_config(config: &Config) -> Self {
        let smi = match config.inventory {
            InventorySource::Auto => Some(SmiTool::from_config(config)),
            InventorySource::Fixed => None,
        };
        Self {
            smi,
            fallback: FixedInventory::new(config.system_gpus),
        }
    }
}

impl DeviceInventory for SystemInventory {
    fn device_ids(&self) -> Result<Vec<u32>> {
        if let Some(smi) = &self.smi {
            match smi.device_ids() {
                Ok(ids) => return Ok(ids),
                Err(e) => warn!(
                    error = %e,
                    count = self.fallback.count,
                    "GPU inventory query failed; assuming the configured GPU count"
                ),
            }
        }
        self.fallback.device_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_inventory() {
        assert_eq!(FixedInventory::new(3).device_ids().unwrap(), vec![0, 1, 2]);
        assert!(FixedInventory::new(0).device_ids().unwrap().is_empty());
    }

    #[test]
    fn test_list_inventory() {
        assert_eq!(vec![4, 1].device_ids().unwrap(), vec![4, 1]);
    }

    #[test]
    fn test_system_inventory_fixed_source() {
        let config = Config {
            inventory: InventorySource::Fixed,
            system_gpus: 2,
            ..Config::default()
        };
        let inventory = SystemInventory::from_config(&config);
        assert_eq!(inventory.device_ids().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_system_inventory_falls_back_when_tool_missing() {
        let config = Config {
            inventory: InventorySource::Auto,
            smi_command: "/nonexistent/nvidia-smi".to_string(),
            system_gpus: 4,
            ..Config::default()
        };
        let inventory = SystemInventory::from_config(&config);
        assert_eq!(inventory.device_ids().unwrap(), vec![0, 1, 2, 3]);
    }
}
