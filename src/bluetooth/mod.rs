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

//! Bluetooth communication module.
//!
//! Both BLE roles of the LED remote: the peripheral that owns the LED and
//! the central that commands it. Each role is split into a synchronous state
//! machine (`peripheral`, `central`) and a BlueZ driver (`gatt_server`,
//! `gatt_client`) that feeds it stack events.

mod adapter;
mod advertising;
mod battery;
pub mod ble_constants;
mod callbacks;
mod central;
mod error;
mod gatt_client;
mod gatt_server;
mod peripheral;
pub mod protocol;

pub use advertising::{AdvertisingMode, AdvertisingSession, TxPower};
pub use battery::{BatterySource, FixedBattery, SysfsBattery};
pub use callbacks::{PeripheralCallback, RemoteLedCallback};
pub use central::{matches_advertised_name, CentralSession, CentralState, ServiceBindings};
pub use error::{BleError, BleResult};
pub use gatt_client::{CacheRefresh, GattClient};
pub use gatt_server::GattServer;
pub use peripheral::{PeripheralSession, PeripheralState};
pub use protocol::{LedCommand, LedState};
