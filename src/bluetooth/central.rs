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

//! Central role state machine.
//!
//! `Idle -> Scanning -> Connecting -> Connected -> Idle`
//!
//! There is no automatic reconnect: after a disconnect the front end has to
//! start scanning again.

use bluer::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::callbacks::RemoteLedCallback;
use super::error::{BleError, BleResult};
use super::protocol::{decode_response, encode_command, to_hex, LedCommand, ResponseDecode, TRANSMISSION_LENGTH};

/// State of the central role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralState {
    Idle,
    Scanning,
    Connecting,
    Connected,
}

impl CentralState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Which remote characteristics were found after service discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceBindings {
    pub command: bool,
    pub response: bool,
}

impl ServiceBindings {
    /// The expected service was not found.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Scan filter: the advertised name must match exactly.
pub fn matches_advertised_name(name: Option<&str>, expected: &str) -> bool {
    name.is_some_and(|name| name == expected)
}

struct Inner {
    state: CentralState,
    peer: Option<Address>,
    bindings: ServiceBindings,
}

/// Shared central state, safe to drive from any stack task.
pub struct CentralSession {
    expected_name: String,
    inner: Mutex<Inner>,
    callback: Arc<dyn RemoteLedCallback>,
}

impl CentralSession {
    pub fn new(expected_name: impl Into<String>, callback: Arc<dyn RemoteLedCallback>) -> Self {
        Self {
            expected_name: expected_name.into(),
            inner: Mutex::new(Inner {
                state: CentralState::Idle,
                peer: None,
                bindings: ServiceBindings::none(),
            }),
            callback,
        }
    }

    pub fn expected_name(&self) -> &str {
        &self.expected_name
    }

    pub fn state(&self) -> CentralState {
        self.inner.lock().state
    }

    pub fn peer(&self) -> Option<Address> {
        self.inner.lock().peer
    }

    pub fn bindings(&self) -> ServiceBindings {
        self.inner.lock().bindings
    }

    /// Begin discovery. Only allowed from `Idle`.
    pub fn start_scan(&self) -> BleResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != CentralState::Idle {
            return Err(BleError::InvalidState(inner.state.as_str()));
        }
        inner.state = CentralState::Scanning;
        info!("Scanning for '{}'", self.expected_name);
        Ok(())
    }

    /// Discovery could not be started or broke down.
    pub fn scan_failed(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.state != CentralState::Scanning {
                return;
            }
            inner.state = CentralState::Idle;
        }

        warn!("Scan failed: {}", reason);
        self.callback.scan_failed(reason);
    }

    /// Stop discovery. Returns `true` if a scan was running.
    pub fn stop_scan(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != CentralState::Scanning {
            return false;
        }
        inner.state = CentralState::Idle;
        info!("Scan stopped");
        true
    }

    /// A device showed up during discovery.
    ///
    /// Returns `true` for the first device whose advertised name equals the
    /// expected name; the caller must stop scanning and connect to it.
    pub fn device_discovered(&self, address: Address, name: Option<&str>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != CentralState::Scanning {
            return false;
        }

        debug!("Discovered peripheral {} ({:?})", address, name);
        if !matches_advertised_name(name, &self.expected_name) {
            return false;
        }

        inner.state = CentralState::Connecting;
        inner.peer = Some(address);
        info!("Found '{}' at {}", self.expected_name, address);
        true
    }

    /// Begin connecting to `peer`.
    pub fn connect(&self, peer: Option<Address>) -> BleResult<Address> {
        let Some(peer) = peer else {
            let err = BleError::NoPeer;
            self.callback.connection_failed(&err.to_string());
            return Err(err);
        };

        let mut inner = self.inner.lock();
        match inner.state {
            CentralState::Idle | CentralState::Scanning => {}
            CentralState::Connecting if inner.peer == Some(peer) => {}
            state => return Err(BleError::InvalidState(state.as_str())),
        }
        inner.state = CentralState::Connecting;
        inner.peer = Some(peer);
        inner.bindings = ServiceBindings::none();
        info!("Connecting to {}", peer);
        Ok(peer)
    }

    /// The link could not be opened.
    pub fn connect_failed(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.state != CentralState::Connecting {
                return;
            }
            inner.state = CentralState::Idle;
            inner.peer = None;
        }

        warn!("Error connecting to device: {}", reason);
        self.callback.connection_failed(reason);
    }

    /// Service discovery finished.
    ///
    /// Returns `false` when the link went away during discovery.
    pub fn services_resolved(&self, bindings: ServiceBindings) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state != CentralState::Connecting {
                debug!("Services resolved after the link went away");
                return false;
            }
            inner.state = CentralState::Connected;
            inner.bindings = bindings;
        }

        if !bindings.command {
            warn!("Command characteristic not found, commands will fail");
        }
        info!("Connected");
        self.callback.connected();
        true
    }

    /// Encode `command` for the command characteristic.
    pub fn prepare_command(&self, command: LedCommand) -> BleResult<[u8; TRANSMISSION_LENGTH]> {
        let inner = self.inner.lock();
        if inner.state != CentralState::Connected {
            return Err(BleError::NotConnected);
        }
        if !inner.bindings.command {
            return Err(BleError::CharacteristicNotBound("command"));
        }

        let packet = encode_command(command);
        debug!("Writing message: {}", to_hex(&packet));
        Ok(packet)
    }

    /// The stack acknowledged the command write.
    pub fn command_written(&self) {
        debug!("Command written");
        self.callback.command_written();
    }

    /// A notification arrived on the response characteristic.
    pub fn response_received(&self, data: &[u8]) {
        debug!("Message received: {}", to_hex(data));
        match decode_response(data) {
            ResponseDecode::State(state) => {
                info!("LED is {}", state);
                self.callback.led_state_changed(state);
            }
            ResponseDecode::Error => {
                warn!("Peripheral reported an LED error");
                self.callback.led_error();
            }
        }
    }

    /// The link is gone. Returns `false` if there was no link.
    pub fn disconnected(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if !matches!(
                inner.state,
                CentralState::Connecting | CentralState::Connected
            ) {
                return false;
            }
            inner.state = CentralState::Idle;
            inner.peer = None;
            inner.bindings = ServiceBindings::none();
        }

        info!("Disconnected from device");
        self.callback.disconnected();
        true
    }
}
