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

//! Advertising session parameters.

use bluer::adv::{Advertisement, Type};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use super::ble_constants::MAX_ADVERTISED_NAME_LEN;
use super::error::{BleError, BleResult};

/// Advertising interval preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvertisingMode {
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

impl AdvertisingMode {
    pub fn interval(&self) -> Duration {
        match self {
            Self::LowPower => Duration::from_millis(1000),
            Self::Balanced => Duration::from_millis(250),
            Self::LowLatency => Duration::from_millis(100),
        }
    }
}

/// Transmit power preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxPower {
    UltraLow,
    Low,
    Medium,
    #[default]
    High,
}

impl TxPower {
    pub fn dbm(&self) -> i16 {
        match self {
            Self::UltraLow => -21,
            Self::Low => -15,
            Self::Medium => -7,
            Self::High => 1,
        }
    }
}

/// What the peripheral broadcasts while waiting for a central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingSession {
    name: String,
    mode: AdvertisingMode,
    tx_power: TxPower,
    services: BTreeSet<Uuid>,
}

impl AdvertisingSession {
    /// Create a session, rejecting names that do not fit the payload.
    pub fn new(
        name: impl Into<String>,
        mode: AdvertisingMode,
        tx_power: TxPower,
        services: impl IntoIterator<Item = Uuid>,
    ) -> BleResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        Ok(Self {
            name,
            mode,
            tx_power,
            services: services.into_iter().collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> AdvertisingMode {
        self.mode
    }

    pub fn tx_power(&self) -> TxPower {
        self.tx_power
    }

    pub fn services(&self) -> &BTreeSet<Uuid> {
        &self.services
    }

    /// BlueZ advertisement for this session.
    pub fn to_advertisement(&self) -> Advertisement {
        let interval = self.mode.interval();
        Advertisement {
            advertisement_type: Type::Peripheral,
            service_uuids: self.services.clone(),
            discoverable: Some(true),
            local_name: Some(self.name.clone()),
            tx_power: Some(self.tx_power.dbm()),
            min_interval: Some(interval),
            max_interval: Some(interval),
            ..Default::default()
        }
    }
}

fn validate_name(name: &str) -> BleResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if !name.is_ascii() {
        "name must be ASCII"
    } else if name.len() > MAX_ADVERTISED_NAME_LEN {
        "name is longer than 20 bytes"
    } else {
        return Ok(());
    };

    Err(BleError::InvalidAdvertisingName {
        name: name.to_string(),
        reason,
    })
}
