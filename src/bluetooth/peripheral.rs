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

//! Peripheral role state machine.
//!
//! `Idle -> Advertising -> Connected -> Idle -> Advertising ...`
//!
//! The session owns the current central, the subscriptions and the
//! characteristic values. It never touches the radio: every method reports
//! what the driver has to do next through its return value, and fires the
//! front end callbacks after the state lock is released.

use bluer::Address;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ble_constants::{BATTERY_LEVEL_CHARACTERISTIC_UUID, COMMAND_CHARACTERISTIC_UUID, RESPONSE_CHARACTERISTIC_UUID};
use super::callbacks::PeripheralCallback;
use super::protocol::{
    classify_command, encode_response, to_hex, CommandFrame, LedCommand, LedState,
    TRANSMISSION_LENGTH,
};

/// State of the peripheral role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    /// Not advertising and no central connected.
    Idle,
    /// Broadcasting and waiting for a central.
    Advertising,
    /// A central is connected; advertising is off.
    Connected,
}

impl PeripheralState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Advertising => "advertising",
            Self::Connected => "connected",
        }
    }
}

struct Inner {
    state: PeripheralState,
    central: Option<Address>,
    subscriptions: HashSet<Uuid>,
    response_value: [u8; TRANSMISSION_LENGTH],
    battery_level: u8,
    led: Option<LedState>,
}

/// Shared peripheral state, safe to drive from any stack task.
pub struct PeripheralSession {
    inner: Mutex<Inner>,
    callback: Arc<dyn PeripheralCallback>,
}

impl PeripheralSession {
    pub fn new(callback: Arc<dyn PeripheralCallback>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: PeripheralState::Idle,
                central: None,
                subscriptions: HashSet::new(),
                response_value: [0; TRANSMISSION_LENGTH],
                battery_level: 100,
                led: None,
            }),
            callback,
        }
    }

    pub fn state(&self) -> PeripheralState {
        self.inner.lock().state
    }

    pub fn connected_central(&self) -> Option<Address> {
        self.inner.lock().central
    }

    pub fn led(&self) -> Option<LedState> {
        self.inner.lock().led
    }

    pub fn is_subscribed(&self, characteristic: Uuid) -> bool {
        self.inner.lock().subscriptions.contains(&characteristic)
    }

    /// Current value of the response characteristic.
    pub fn response_value(&self) -> [u8; TRANSMISSION_LENGTH] {
        self.inner.lock().response_value
    }

    /// Last battery level stored by [`Self::battery_level_changed`].
    pub fn battery_level(&self) -> u8 {
        self.inner.lock().battery_level
    }

    /// The stack accepted the advertisement.
    ///
    /// Returns `false` when a central connected in the meantime; the caller
    /// must withdraw the advertisement again.
    pub fn advertising_started(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == PeripheralState::Connected {
                warn!("Advertising started while a central is connected");
                return false;
            }
            inner.state = PeripheralState::Advertising;
        }

        info!("Advertising started");
        self.callback.advertising_started();
        true
    }

    /// The stack refused to advertise.
    pub fn advertising_failed(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.state == PeripheralState::Advertising {
                inner.state = PeripheralState::Idle;
            }
        }

        warn!("Advertising failed: {}", reason);
        self.callback.advertising_failed(reason);
    }

    /// The advertisement was withdrawn.
    pub fn advertising_stopped(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == PeripheralState::Advertising {
                inner.state = PeripheralState::Idle;
            }
        }

        info!("Advertising stopped");
        self.callback.advertising_stopped();
    }

    /// A device opened a link to the adapter.
    ///
    /// Only a link that comes up while advertising is accepted as the
    /// central. Returns `true` when this central is now the current
    /// connection and advertising must stop.
    pub fn central_connected(&self, central: Address) -> bool {
        {
            let mut inner = self.inner.lock();
            match inner.central {
                Some(current) if current == central => return false,
                Some(current) => {
                    warn!(
                        "Ignoring central {} while {} is connected",
                        central, current
                    );
                    return false;
                }
                None if inner.state != PeripheralState::Advertising => {
                    debug!(
                        "Ignoring link from {} while {}",
                        central,
                        inner.state.as_str()
                    );
                    return false;
                }
                None => {
                    inner.central = Some(central);
                    inner.state = PeripheralState::Connected;
                }
            }
        }

        info!("Central connected: {}", central);
        self.callback.central_connected(central);
        true
    }

    /// A central disconnected.
    ///
    /// Returns `true` when it was the current connection and advertising must
    /// resume.
    pub fn central_disconnected(&self, central: Address) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.central != Some(central) {
                debug!("Ignoring disconnect of unknown central {}", central);
                return false;
            }
            inner.central = None;
            inner.subscriptions.clear();
            inner.state = PeripheralState::Idle;
        }

        info!("Central disconnected: {}", central);
        self.callback.central_disconnected(central);
        true
    }

    /// Handle a write to the command characteristic.
    ///
    /// Returns the response to notify, if the write was a known command from
    /// the current central and the response characteristic has a subscriber.
    /// Malformed frames, unknown codes and writes from any other device are
    /// dropped without a callback or a response.
    pub fn command_written(&self, from: Address, data: &[u8]) -> Option<[u8; TRANSMISSION_LENGTH]> {
        debug!("Command write from {}: {}", from, to_hex(data));

        let command = match classify_command(data) {
            CommandFrame::Command(command) => command,
            CommandFrame::UnknownCode(code) => {
                warn!("Unknown incoming command: {}", code);
                return None;
            }
            CommandFrame::NotACommand => {
                debug!("Dropping write without command footer");
                return None;
            }
        };

        let state = command.resulting_state();
        let response = encode_response(state);
        let subscribed = {
            let mut inner = self.inner.lock();
            if inner.central != Some(from) {
                warn!("Dropping command from {}, not the connected central", from);
                return None;
            }
            inner.led = Some(state);
            inner.response_value = response;
            inner.subscriptions.contains(&RESPONSE_CHARACTERISTIC_UUID)
        };

        info!("Command to turn LED {}", state);
        self.callback
            .characteristic_written(COMMAND_CHARACTERISTIC_UUID, data);
        match command {
            LedCommand::On => self.callback.led_turned_on(),
            LedCommand::Off => self.callback.led_turned_off(),
        }

        if subscribed {
            debug!("Sending response: {}", to_hex(&response));
            Some(response)
        } else {
            debug!("Response not sent, no subscriber");
            None
        }
    }

    /// A peer enabled notifications on `characteristic`.
    pub fn subscribed(&self, characteristic: Uuid) {
        if !self.inner.lock().subscriptions.insert(characteristic) {
            return;
        }

        info!("Characteristic subscribed: {}", characteristic);
        self.callback.characteristic_subscribed(characteristic);
    }

    /// A peer disabled notifications on `characteristic`.
    pub fn unsubscribed(&self, characteristic: Uuid) {
        if !self.inner.lock().subscriptions.remove(&characteristic) {
            return;
        }

        info!("Characteristic unsubscribed: {}", characteristic);
        self.callback.characteristic_unsubscribed(characteristic);
    }

    /// Store a fresh battery reading.
    ///
    /// Returns the value to notify while a central is connected and
    /// subscribed to the battery level.
    pub fn battery_level_changed(&self, level: u8) -> Option<u8> {
        let mut inner = self.inner.lock();
        inner.battery_level = level.min(100);

        let notify = inner.central.is_some()
            && inner.subscriptions.contains(&BATTERY_LEVEL_CHARACTERISTIC_UUID);
        notify.then_some(inner.battery_level)
    }
}
