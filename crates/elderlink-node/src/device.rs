use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI16, Ordering};

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Live device readings the daemon reports to guardians.
pub trait DeviceStatus: Send + Sync {
    /// Battery charge in percent, or `None` when it cannot be read.
    fn battery_level(&self) -> Option<u8>;
}

/// Reads the kernel's power-supply class.
pub struct SysfsBattery {
    capacity_path: Option<PathBuf>,
}

impl SysfsBattery {
    /// Use the first power supply whose `type` is `Battery`.
    pub fn discover() -> Self {
        Self::discover_in(Path::new(POWER_SUPPLY_DIR))
    }

    pub fn discover_in(root: &Path) -> Self {
        let capacity_path = std::fs::read_dir(root).ok().and_then(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| {
                    std::fs::read_to_string(p.join("type"))
                        .map(|t| t.trim() == "Battery")
                        .unwrap_or(false)
                })
                .map(|p| p.join("capacity"))
        });
        if capacity_path.is_none() {
            tracing::info!(root = %root.display(), "no battery found, level will be reported as unknown");
        }
        Self { capacity_path }
    }
}

impl DeviceStatus for SysfsBattery {
    fn battery_level(&self) -> Option<u8> {
        let path = self.capacity_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        raw.trim().parse::<u8>().ok().map(|v| v.min(100))
    }
}

/// A battery level set by hand. Negative means unknown.
pub struct ManualBattery {
    level: AtomicI16,
}

impl ManualBattery {
    pub fn new(level: Option<u8>) -> Self {
        Self {
            level: AtomicI16::new(level.map_or(-1, i16::from)),
        }
    }

    pub fn set(&self, level: Option<u8>) {
        self.level.store(level.map_or(-1, i16::from), Ordering::Relaxed);
    }
}

impl DeviceStatus for ManualBattery {
    fn battery_level(&self) -> Option<u8> {
        u8::try_from(self.level.load(Ordering::Relaxed)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysfs_reads_first_battery() {
        let dir = tempfile::tempdir().unwrap();
        let ac = dir.path().join("AC");
        let bat = dir.path().join("BAT0");
        std::fs::create_dir_all(&ac).unwrap();
        std::fs::create_dir_all(&bat).unwrap();
        std::fs::write(ac.join("type"), "Mains\n").unwrap();
        std::fs::write(bat.join("type"), "Battery\n").unwrap();
        std::fs::write(bat.join("capacity"), "42\n").unwrap();

        let battery = SysfsBattery::discover_in(dir.path());
        assert_eq!(battery.battery_level(), Some(42));
    }

    #[test]
    fn sysfs_without_battery_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(SysfsBattery::discover_in(dir.path()).battery_level(), None);
    }

    #[test]
    fn manual_battery_can_change() {
        let battery = ManualBattery::new(Some(80));
        assert_eq!(battery.battery_level(), Some(80));
        battery.set(Some(15));
        assert_eq!(battery.battery_level(), Some(15));
        battery.set(None);
        assert_eq!(battery.battery_level(), None);
    }
}
