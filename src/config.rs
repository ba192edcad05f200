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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::{advertised_services, device_info, timing, ADVERTISED_NAME};
use crate::bluetooth::{AdvertisingMode, AdvertisingSession, BleResult, TxPower};

const APP_DIR: &str = "led-remote";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LED side settings.
    pub peripheral: PeripheralConfig,

    /// Remote control side settings.
    pub central: CentralConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Name advertised over Bluetooth (ASCII, at most 20 bytes).
    pub advertised_name: String,

    /// Device Information model number.
    pub model_number: String,

    /// Device Information serial number.
    pub serial_number: String,

    pub advertising_mode: AdvertisingMode,

    pub tx_power: TxPower,

    /// How often the battery level is refreshed, in milliseconds.
    pub battery_interval_ms: u64,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            advertised_name: ADVERTISED_NAME.to_string(),
            model_number: device_info::MODEL_NUMBER.to_string(),
            serial_number: device_info::SERIAL_NUMBER.to_string(),
            advertising_mode: AdvertisingMode::default(),
            tx_power: TxPower::default(),
            battery_interval_ms: timing::BATTERY_CHECK_INTERVAL_MS,
        }
    }
}

impl PeripheralConfig {
    /// Validated advertising session for these settings.
    pub fn advertising_session(&self) -> BleResult<AdvertisingSession> {
        AdvertisingSession::new(
            self.advertised_name.clone(),
            self.advertising_mode,
            self.tx_power,
            advertised_services(),
        )
    }

    pub fn battery_interval(&self) -> Duration {
        Duration::from_millis(self.battery_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    /// Advertised name of the peripheral to connect to.
    pub peer_name: String,

    /// Delay before subscribing to response notifications, in milliseconds.
    pub subscribe_delay_ms: u64,

    /// Give up scanning after this many seconds; 0 scans until found.
    pub scan_timeout_secs: u64,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            peer_name: ADVERTISED_NAME.to_string(),
            subscribe_delay_ms: timing::SUBSCRIBE_DELAY_MS,
            scan_timeout_secs: 0,
        }
    }
}

impl CentralConfig {
    pub fn subscribe_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_delay_ms)
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from the default file or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            return Ok(toml::from_str(&content)?);
        }

        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Save configuration to the default file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }
}
