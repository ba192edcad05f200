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

//! Application state management.

use bluer::Address;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::LedState;

/// Link status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Advertising,
    Scanning,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Advertising => "Advertising...",
            ConnectionStatus::Scanning => "Scanning...",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Current connection status.
    pub connection_status: RwLock<ConnectionStatus>,

    /// Address of the device on the other end of the link.
    pub peer: RwLock<Option<Address>>,

    /// Last known LED state.
    pub led: RwLock<Option<LedState>>,

    /// Last error reported by the Bluetooth layer.
    pub last_error: RwLock<Option<String>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connection_status: RwLock::new(ConnectionStatus::Disconnected),
            peer: RwLock::new(None),
            led: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.connection_status.write() = status;
    }

    pub fn set_connected(&self, peer: Option<Address>) {
        *self.connection_status.write() = ConnectionStatus::Connected;
        *self.peer.write() = peer;
        *self.last_error.write() = None;
    }

    pub fn set_disconnected(&self) {
        *self.connection_status.write() = ConnectionStatus::Disconnected;
        *self.peer.write() = None;
    }

    pub fn set_error(&self, reason: impl Into<String>) {
        *self.connection_status.write() = ConnectionStatus::Error;
        *self.last_error.write() = Some(reason.into());
    }

    pub fn set_led(&self, state: LedState) {
        *self.led.write() = Some(state);
    }

    pub fn get_status(&self) -> ConnectionStatus {
        *self.connection_status.read()
    }

    pub fn get_peer(&self) -> Option<Address> {
        *self.peer.read()
    }

    pub fn get_led(&self) -> Option<LedState> {
        *self.led.read()
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// One line summary for the command prompt.
    pub fn summary(&self) -> String {
        let led = self.get_led().map(|s| s.as_str()).unwrap_or("unknown");
        match self.get_peer() {
            Some(peer) => format!("{} to {}, LED {}", self.get_status().as_str(), peer, led),
            None => format!("{}, LED {}", self.get_status().as_str(), led),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: Address = Address([0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22]);

    #[test]
    fn test_connection_lifecycle() {
        let state = AppState::new();
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);

        state.set_error("adapter busy");
        assert_eq!(state.get_status(), ConnectionStatus::Error);
        assert_eq!(state.get_last_error().as_deref(), Some("adapter busy"));

        state.set_connected(Some(PEER));
        assert_eq!(state.get_status(), ConnectionStatus::Connected);
        assert_eq!(state.get_peer(), Some(PEER));
        assert_eq!(state.get_last_error(), None);

        state.set_disconnected();
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);
        assert_eq!(state.get_peer(), None);
    }

    #[test]
    fn test_summary() {
        let state = AppState::new();
        assert_eq!(state.summary(), "Disconnected, LED unknown");

        state.set_connected(Some(PEER));
        state.set_led(LedState::On);
        assert_eq!(state.summary(), "Connected to AA:BB:CC:00:11:22, LED on");
    }
}
