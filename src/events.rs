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

//! Event processing and dispatch.
//!
//! Role callbacks fire on Bluetooth stack tasks. [`ChannelCallback`] turns
//! them into messages so the main loop can handle them on its own task, and
//! [`EventProcessor`] applies them to the shared [`AppState`].

use bluer::Address;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bluetooth::ble_constants::characteristic_name;
use crate::bluetooth::protocol::to_hex;
use crate::bluetooth::{CentralSession, LedState, PeripheralCallback, RemoteLedCallback};
use crate::state::{AppState, ConnectionStatus};

/// Events from the peripheral role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    AdvertisingStarted,
    AdvertisingFailed(String),
    AdvertisingStopped,
    CentralConnected(Address),
    CentralDisconnected(Address),
    CharacteristicWritten { characteristic: Uuid, value: Vec<u8> },
    Subscribed(Uuid),
    Unsubscribed(Uuid),
    LedTurnedOn,
    LedTurnedOff,
}

/// Events from the central role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    ScanFailed(String),
    Connected,
    Disconnected,
    ConnectionFailed(String),
    CommandWritten,
    LedStateChanged(LedState),
    LedError,
}

/// Forwards role callbacks into an unbounded channel.
pub struct ChannelCallback<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> ChannelCallback<E> {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: E) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl PeripheralCallback for ChannelCallback<PeripheralEvent> {
    fn advertising_started(&self) {
        self.send(PeripheralEvent::AdvertisingStarted);
    }

    fn advertising_failed(&self, reason: &str) {
        self.send(PeripheralEvent::AdvertisingFailed(reason.to_string()));
    }

    fn advertising_stopped(&self) {
        self.send(PeripheralEvent::AdvertisingStopped);
    }

    fn central_connected(&self, central: Address) {
        self.send(PeripheralEvent::CentralConnected(central));
    }

    fn central_disconnected(&self, central: Address) {
        self.send(PeripheralEvent::CentralDisconnected(central));
    }

    fn characteristic_written(&self, characteristic: Uuid, value: &[u8]) {
        self.send(PeripheralEvent::CharacteristicWritten {
            characteristic,
            value: value.to_vec(),
        });
    }

    fn characteristic_subscribed(&self, characteristic: Uuid) {
        self.send(PeripheralEvent::Subscribed(characteristic));
    }

    fn characteristic_unsubscribed(&self, characteristic: Uuid) {
        self.send(PeripheralEvent::Unsubscribed(characteristic));
    }

    fn led_turned_on(&self) {
        self.send(PeripheralEvent::LedTurnedOn);
    }

    fn led_turned_off(&self) {
        self.send(PeripheralEvent::LedTurnedOff);
    }
}

impl RemoteLedCallback for ChannelCallback<CentralEvent> {
    fn scan_failed(&self, reason: &str) {
        self.send(CentralEvent::ScanFailed(reason.to_string()));
    }

    fn connected(&self) {
        self.send(CentralEvent::Connected);
    }

    fn disconnected(&self) {
        self.send(CentralEvent::Disconnected);
    }

    fn connection_failed(&self, reason: &str) {
        self.send(CentralEvent::ConnectionFailed(reason.to_string()));
    }

    fn command_written(&self) {
        self.send(CentralEvent::CommandWritten);
    }

    fn led_state_changed(&self, state: LedState) {
        self.send(CentralEvent::LedStateChanged(state));
    }

    fn led_error(&self) {
        self.send(CentralEvent::LedError);
    }
}

/// Applies role events to the application state.
pub struct EventProcessor {
    state: Arc<AppState>,
    central: Option<Arc<CentralSession>>,
}

impl EventProcessor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            central: None,
        }
    }

    /// Processor for the central role; the peer address is taken from
    /// `session` when a link comes up.
    pub fn with_central(state: Arc<AppState>, session: Arc<CentralSession>) -> Self {
        Self {
            state,
            central: Some(session),
        }
    }

    /// Process a single peripheral event.
    pub fn process_peripheral(&self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::AdvertisingStarted => {
                info!("Advertising");
                self.state.set_status(ConnectionStatus::Advertising);
            }
            PeripheralEvent::AdvertisingFailed(reason) => {
                error!("Advertising failed: {}", reason);
                self.state.set_error(reason);
            }
            PeripheralEvent::AdvertisingStopped => {
                debug!("Advertising stopped");
                if self.state.get_status() == ConnectionStatus::Advertising {
                    self.state.set_status(ConnectionStatus::Disconnected);
                }
            }
            PeripheralEvent::CentralConnected(central) => {
                info!("Central connected: {}", central);
                self.state.set_connected(Some(central));
            }
            PeripheralEvent::CentralDisconnected(central) => {
                info!("Central disconnected: {}", central);
                self.state.set_disconnected();
            }
            PeripheralEvent::CharacteristicWritten {
                characteristic,
                value,
            } => {
                debug!(
                    "{} written: {}",
                    characteristic_name(&characteristic),
                    to_hex(&value)
                );
            }
            PeripheralEvent::Subscribed(characteristic) => {
                info!("Central subscribed to {}", characteristic_name(&characteristic));
            }
            PeripheralEvent::Unsubscribed(characteristic) => {
                info!(
                    "Central unsubscribed from {}",
                    characteristic_name(&characteristic)
                );
            }
            PeripheralEvent::LedTurnedOn => {
                info!("LED turned ON");
                self.state.set_led(LedState::On);
            }
            PeripheralEvent::LedTurnedOff => {
                info!("LED turned OFF");
                self.state.set_led(LedState::Off);
            }
        }
    }

    /// Process a single central event.
    pub fn process_central(&self, event: CentralEvent) {
        match event {
            CentralEvent::ScanFailed(reason) => {
                error!("Scan failed: {}", reason);
                self.state.set_error(reason);
            }
            CentralEvent::Connected => {
                let peer = self.central.as_ref().and_then(|session| session.peer());
                info!("Connected to LED peripheral");
                self.state.set_connected(peer);
            }
            CentralEvent::Disconnected => {
                info!("Disconnected from LED peripheral");
                self.state.set_disconnected();
            }
            CentralEvent::ConnectionFailed(reason) => {
                error!("Connection failed: {}", reason);
                self.state.set_error(reason);
            }
            CentralEvent::CommandWritten => {
                debug!("Command delivered");
            }
            CentralEvent::LedStateChanged(led) => {
                info!("LED is {}", led);
                self.state.set_led(led);
            }
            CentralEvent::LedError => {
                warn!("LED reported an error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::COMMAND_CHARACTERISTIC_UUID;

    const PEER: Address = Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

    #[tokio::test]
    async fn test_peripheral_events_forwarded() {
        let (callback, mut rx) = ChannelCallback::<PeripheralEvent>::new();

        callback.central_connected(PEER);
        callback.characteristic_written(COMMAND_CHARACTERISTIC_UUID, &[1, 1]);
        callback.led_turned_on();

        assert_eq!(rx.recv().await, Some(PeripheralEvent::CentralConnected(PEER)));
        assert_eq!(
            rx.recv().await,
            Some(PeripheralEvent::CharacteristicWritten {
                characteristic: COMMAND_CHARACTERISTIC_UUID,
                value: vec![1, 1],
            })
        );
        assert_eq!(rx.recv().await, Some(PeripheralEvent::LedTurnedOn));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (callback, rx) = ChannelCallback::<CentralEvent>::new();
        drop(rx);
        callback.connected();
    }

    #[tokio::test]
    async fn test_peripheral_processing() {
        let state = AppState::new();
        let processor = EventProcessor::new(state.clone());
        let (callback, mut rx) = ChannelCallback::<PeripheralEvent>::new();

        callback.advertising_started();
        processor.process_peripheral(rx.recv().await.unwrap());
        assert_eq!(state.get_status(), ConnectionStatus::Advertising);

        callback.central_connected(PEER);
        callback.advertising_stopped();
        callback.led_turned_off();
        for _ in 0..3 {
            processor.process_peripheral(rx.recv().await.unwrap());
        }
        assert_eq!(state.get_status(), ConnectionStatus::Connected);
        assert_eq!(state.get_peer(), Some(PEER));
        assert_eq!(state.get_led(), Some(LedState::Off));

        callback.central_disconnected(PEER);
        processor.process_peripheral(rx.recv().await.unwrap());
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_central_processing() {
        let state = AppState::new();
        let processor = EventProcessor::new(state.clone());
        let (callback, mut rx) = ChannelCallback::<CentralEvent>::new();

        callback.connection_failed("no bluetooth device provided");
        processor.process_central(rx.recv().await.unwrap());
        assert_eq!(state.get_status(), ConnectionStatus::Error);

        callback.connected();
        callback.led_state_changed(LedState::On);
        callback.led_error();
        for _ in 0..3 {
            processor.process_central(rx.recv().await.unwrap());
        }
        assert_eq!(state.get_status(), ConnectionStatus::Connected);
        assert_eq!(state.get_led(), Some(LedState::On));
    }
}
