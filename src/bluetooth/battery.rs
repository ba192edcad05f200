// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Battery level sources for the Battery service.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Provides the battery percentage reported over BLE.
pub trait BatterySource: Send + Sync {
    /// Current level, 0 to 100.
    fn level(&self) -> u8;
}

/// A battery that never drains.
#[derive(Debug, Clone, Copy)]
pub struct FixedBattery(pub u8);

impl BatterySource for FixedBattery {
    fn level(&self) -> u8 {
        self.0.min(100)
    }
}

/// Reads the first battery under `/sys/class/power_supply`.
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    root: PathBuf,
}

impl Default for SysfsBattery {
    fn default() -> Self {
        Self::with_root("/sys/class/power_supply")
    }
}

impl SysfsBattery {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_capacity(root: &Path) -> Option<u8> {
        let mut supplies: Vec<PathBuf> = std::fs::read_dir(root)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        supplies.sort();

        supplies.iter().find_map(|supply| {
            let kind = std::fs::read_to_string(supply.join("type")).ok()?;
            if kind.trim() != "Battery" {
                return None;
            }
            let capacity = std::fs::read_to_string(supply.join("capacity")).ok()?;
            capacity.trim().parse::<u32>().ok().map(|c| c.min(100) as u8)
        })
    }
}

impl BatterySource for SysfsBattery {
    fn level(&self) -> u8 {
        match Self::read_capacity(&self.root) {
            Some(level) => level,
            None => {
                debug!("No battery found under {:?}, reporting full", self.root);
                100
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_supply(root: &Path, name: &str, kind: &str, capacity: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("type"), kind).unwrap();
        std::fs::write(dir.join("capacity"), capacity).unwrap();
    }

    #[test]
    fn test_fixed_battery_clamps() {
        assert_eq!(FixedBattery(42).level(), 42);
        assert_eq!(FixedBattery(250).level(), 100);
    }

    #[test]
    fn test_sysfs_battery() {
        let dir = tempdir().unwrap();
        write_supply(dir.path(), "AC", "Mains\n", "0\n");
        write_supply(dir.path(), "BAT0", "Battery\n", "87\n");

        assert_eq!(SysfsBattery::with_root(dir.path()).level(), 87);
    }

    #[test]
    fn test_sysfs_without_battery() {
        let dir = tempdir().unwrap();
        write_supply(dir.path(), "AC", "Mains\n", "1\n");

        assert_eq!(SysfsBattery::with_root(dir.path()).level(), 100);
        assert_eq!(SysfsBattery::with_root(dir.path().join("missing")).level(), 100);
    }
}
