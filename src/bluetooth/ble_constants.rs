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

//! BLE service and characteristic UUIDs for the LED remote profile.

use uuid::Uuid;

/// Name the peripheral advertises and the central looks for.
pub const ADVERTISED_NAME: &str = "LedRemote";

/// Advertised names longer than this do not fit the advertising payload.
pub const MAX_ADVERTISED_NAME_LEN: usize = 20;

/// Automation IO service UUID.
pub const AUTOMATION_IO_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001815_0000_1000_8000_00805f9b34fb);

/// Command characteristic UUID (central writes LED commands here).
/// Properties: Write
pub const COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a56_0000_1000_8000_00805f9b34fb);

/// Response characteristic UUID (peripheral confirms the LED state here).
/// Properties: Read, Notify
pub const RESPONSE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a57_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration descriptor.
pub const NOTIFY_DESCRIPTOR_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Device Information service UUID.
pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);

/// Device Name characteristic UUID, carrying the advertised name.
/// Properties: Read
pub const DEVICE_NAME_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

/// Model Number String characteristic UUID.
/// Properties: Read
pub const MODEL_NUMBER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);

/// Serial Number String characteristic UUID.
/// Properties: Read
pub const SERIAL_NUMBER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a25_0000_1000_8000_00805f9b34fb);

/// Battery service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Battery Level characteristic UUID.
/// Properties: Read, Notify
pub const BATTERY_LEVEL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Default device information values.
pub mod device_info {
    pub const MODEL_NUMBER: &str = "1AB2";
    pub const SERIAL_NUMBER: &str = "1234";
}

/// Timing constants.
pub mod timing {
    /// How often the battery level is refreshed and pushed to the central.
    pub const BATTERY_CHECK_INTERVAL_MS: u64 = 5 * 50 * 1000;

    /// Pause between enabling notifications locally and subscribing on the
    /// remote descriptor. Some stacks drop the subscription when the two
    /// happen back to back.
    pub const SUBSCRIBE_DELAY_MS: u64 = 10;
}

/// Services exposed in the advertising payload, in registration order.
pub fn advertised_services() -> Vec<Uuid> {
    vec![
        AUTOMATION_IO_SERVICE_UUID,
        DEVICE_INFORMATION_SERVICE_UUID,
        BATTERY_SERVICE_UUID,
    ]
}

/// Human readable name of a known characteristic, for logs.
pub fn characteristic_name(uuid: &Uuid) -> &'static str {
    match *uuid {
        COMMAND_CHARACTERISTIC_UUID => "command",
        RESPONSE_CHARACTERISTIC_UUID => "response",
        DEVICE_NAME_CHARACTERISTIC_UUID => "device name",
        MODEL_NUMBER_CHARACTERISTIC_UUID => "model number",
        SERIAL_NUMBER_CHARACTERISTIC_UUID => "serial number",
        BATTERY_LEVEL_CHARACTERISTIC_UUID => "battery level",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        // 16-bit SIG UUIDs expand onto the Bluetooth base UUID
        assert_eq!(
            AUTOMATION_IO_SERVICE_UUID.to_string(),
            "00001815-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            COMMAND_CHARACTERISTIC_UUID.to_string(),
            "00002a56-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            RESPONSE_CHARACTERISTIC_UUID.to_string(),
            "00002a57-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            NOTIFY_DESCRIPTOR_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_advertised_name_fits() {
        assert!(ADVERTISED_NAME.is_ascii());
        assert!(ADVERTISED_NAME.len() <= MAX_ADVERTISED_NAME_LEN);
    }

    #[test]
    fn test_advertised_services() {
        let services = advertised_services();
        assert_eq!(services.len(), 3);
        assert_eq!(services[0], AUTOMATION_IO_SERVICE_UUID);
    }

    #[test]
    fn test_characteristic_names() {
        assert_eq!(characteristic_name(&COMMAND_CHARACTERISTIC_UUID), "command");
        assert_eq!(characteristic_name(&BATTERY_LEVEL_CHARACTERISTIC_UUID), "battery level");
        assert_eq!(characteristic_name(&DEVICE_NAME_CHARACTERISTIC_UUID), "device name");
        assert_eq!(characteristic_name(&AUTOMATION_IO_SERVICE_UUID), "unknown");
    }
}
