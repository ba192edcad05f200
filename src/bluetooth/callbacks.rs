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

//! Callback interfaces between the BLE roles and their front end.
//!
//! All methods are one-way notifications. They are invoked from whichever
//! tokio task the Bluetooth stack event arrived on; implementations that need
//! a specific execution context must redispatch themselves (see
//! [`crate::events`] for channel based adapters).

use bluer::Address;
use uuid::Uuid;

use super::protocol::LedState;

/// Notifications from the central (remote control) role.
pub trait RemoteLedCallback: Send + Sync {
    /// Discovery could not be started or stopped unexpectedly.
    fn scan_failed(&self, reason: &str);

    /// Services were resolved on the peripheral.
    fn connected(&self);

    /// The link to the peripheral is gone.
    fn disconnected(&self);

    /// A connection attempt could not be started.
    fn connection_failed(&self, reason: &str);

    /// The command characteristic write was acknowledged by the stack.
    fn command_written(&self);

    /// The peripheral confirmed a new LED state.
    fn led_state_changed(&self, state: LedState);

    /// The peripheral sent a response that is not a valid confirmation.
    fn led_error(&self);
}

/// Notifications from the peripheral (LED) role.
pub trait PeripheralCallback: Send + Sync {
    fn advertising_started(&self);

    fn advertising_failed(&self, reason: &str);

    fn advertising_stopped(&self);

    fn central_connected(&self, central: Address);

    fn central_disconnected(&self, central: Address);

    /// A command was accepted on `characteristic`.
    fn characteristic_written(&self, characteristic: Uuid, value: &[u8]);

    fn characteristic_subscribed(&self, characteristic: Uuid);

    fn characteristic_unsubscribed(&self, characteristic: Uuid);

    fn led_turned_on(&self);

    fn led_turned_off(&self);
}
