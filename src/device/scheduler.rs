//! Kernel I/O scheduler configuration
//!
//! Writes the configured scheduler mode to each device's sysfs queue
//! entry. Strictly best-effort: nested devices, non-Linux platforms, and
//! permission failures are logged and the run continues.

use crate::config::Config;
use log::error;
use std::fs;
use std::path::PathBuf;

/// Apply the configured scheduler mode to every device, best-effort.
pub fn set_schedulers(cfg: &Config) {
    let mode = cfg.scheduler_mode.as_str();

    for name in &cfg.device_names {
        let path = scheduler_sysfs_path(name);

        if let Err(err) = fs::write(&path, mode) {
            error!("couldn't write '{}' to {}: {}", mode, path.display(), err);
        }
    }
}

/// Sysfs scheduler path for a device: the trailing path segment keys
/// `/sys/block`.
fn scheduler_sysfs_path(device_name: &str) -> PathBuf {
    let tag = device_name.rsplit('/').next().unwrap_or(device_name);
    PathBuf::from(format!("/sys/block/{}/queue/scheduler", tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_sysfs_path_from_device_path() {
        assert_eq!(
            scheduler_sysfs_path("/dev/sda"),
            PathBuf::from("/sys/block/sda/queue/scheduler")
        );
        assert_eq!(
            scheduler_sysfs_path("/dev/disk/by-id/nvme-x"),
            PathBuf::from("/sys/block/nvme-x/queue/scheduler")
        );
    }

    #[test]
    fn test_sysfs_path_bare_name() {
        assert_eq!(
            scheduler_sysfs_path("sdb"),
            PathBuf::from("/sys/block/sdb/queue/scheduler")
        );
    }

    #[test]
    fn test_set_schedulers_failure_is_non_fatal() {
        let cfg = Config::from_settings([
            (
                "device-names".to_string(),
                "/dev/no-such-device-xyz".to_string(),
            ),
            ("test-duration-sec".to_string(), "1".to_string()),
            ("read-reqs-per-sec".to_string(), "100".to_string()),
            ("write-reqs-per-sec".to_string(), "0".to_string()),
            ("scheduler-mode".to_string(), "deadline".to_string()),
        ])
        .unwrap();

        // Must log and return, never panic or abort.
        set_schedulers(&cfg);
    }
}
