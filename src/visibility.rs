//! Restricting a child process to the GPUs it holds.
//!
//! CUDA enumerates devices in its own order unless told to use PCI bus
//! order, which is the order `nvidia-smi` reports indices in. Both variables
//! are set on the child command only; the current process environment is
//! never modified.

use std::process::Command;

/// Environment variable selecting CUDA's device enumeration order.
pub const CUDA_DEVICE_ORDER: &str = "CUDA_DEVICE_ORDER";

/// Environment variable listing the devices a CUDA process may see.
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Device order matching `nvidia-smi` indices.
pub const PCI_BUS_ID: &str = "PCI_BUS_ID";

/// Join device ids for `CUDA_VISIBLE_DEVICES`.
pub fn visible_devices_value(device_ids: &[u32]) -> String {
    device_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Configure `cmd` so the child only sees `device_ids`.
pub fn configure_command(cmd: &mut Command, device_ids: &[u32]) {
    cmd.env(CUDA_DEVICE_ORDER, PCI_BUS_ID)
        .env(CUDA_VISIBLE_DEVICES, visible_devices_value(device_ids));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_visible_devices_value() {
        assert_eq!(visible_devices_value(&[]), "");
        assert_eq!(visible_devices_value(&[3]), "3");
        assert_eq!(visible_devices_value(&[0, 2, 5]), "0,2,5");
    }

    #[test]
    fn test_configure_command_sets_both_variables() {
        let mut cmd = Command::new("true");
        configure_command(&mut cmd, &[1, 4]);

        let envs: Vec<(&OsStr, Option<&OsStr>)> = cmd.get_envs().collect();
        assert!(envs.contains(&(OsStr::new(CUDA_DEVICE_ORDER), Some(OsStr::new(PCI_BUS_ID)))));
        assert!(envs.contains(&(OsStr::new(CUDA_VISIBLE_DEVICES), Some(OsStr::new("1,4")))));
    }
}
