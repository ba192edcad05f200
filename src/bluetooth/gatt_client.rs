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

//! BLE GATT client for the remote control.

use anyhow::{bail, Result};
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty};
use futures::{pin_mut, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::adapter::open_default_adapter;
use super::ble_constants::*;
use super::callbacks::RemoteLedCallback;
use super::central::{CentralSession, ServiceBindings};
use super::error::BleError;
use super::protocol::LedCommand;
use crate::config::CentralConfig;

/// How often service resolution is polled after connecting.
const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of the GATT cache refresh hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRefresh {
    Refreshed,
    Unsupported,
}

/// The open link to the peripheral.
struct Link {
    device: Device,
    command: Option<Characteristic>,
    tasks: Vec<JoinHandle<()>>,
}

/// Scans for, connects to and commands the LED peripheral.
pub struct GattClient {
    adapter: Adapter,
    central: Arc<CentralSession>,
    subscribe_delay: Duration,
    link: Mutex<Option<Link>>,
    scan_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl GattClient {
    /// Open the default adapter.
    pub async fn new(
        config: &CentralConfig,
        callback: Arc<dyn RemoteLedCallback>,
    ) -> Result<Arc<Self>> {
        info!("Initializing BLE GATT client...");

        let adapter = open_default_adapter().await?;

        Ok(Arc::new(Self {
            adapter,
            central: Arc::new(CentralSession::new(config.peer_name.clone(), callback)),
            subscribe_delay: config.subscribe_delay(),
            link: Mutex::new(None),
            scan_task: parking_lot::Mutex::new(None),
        }))
    }

    /// Protocol state shared with the stack callbacks.
    pub fn session(&self) -> &Arc<CentralSession> {
        &self.central
    }

    /// Scan until a device advertising the expected name shows up, then
    /// connect to it.
    pub async fn start_scan(self: &Arc<Self>) -> Result<()> {
        self.central.start_scan()?;

        let events = match self.adapter.discover_devices().await {
            Ok(events) => events,
            Err(e) => {
                self.central.scan_failed(&e.to_string());
                return Err(e.into());
            }
        };

        let client = self.clone();
        let task = tokio::spawn(async move {
            let mut events = Box::pin(events);
            let (recheck_tx, mut recheck_rx) = mpsc::unbounded_channel();
            let mut watchers = JoinSet::new();

            let found = loop {
                let address = tokio::select! {
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            watchers.spawn(watch_advertiser(
                                client.adapter.clone(),
                                address,
                                recheck_tx.clone(),
                            ));
                            address
                        }
                        Some(_) => continue,
                        None => break None,
                    },
                    Some(address) = recheck_rx.recv() => address,
                };

                let Some(name) = client.advertised_name(address).await else {
                    continue;
                };
                if client.central.device_discovered(address, Some(&name)) {
                    break Some(address);
                }
            };

            // Dropping the stream ends discovery
            watchers.abort_all();
            drop(events);

            match found {
                Some(address) => {
                    if let Err(e) = client.connect(Some(address)).await {
                        error!("Error connecting to device: {}", e);
                    }
                }
                None => client.central.scan_failed("discovery ended"),
            }
        });

        *self.scan_task.lock() = Some(task);
        Ok(())
    }

    /// Abort a running scan.
    pub fn stop_scan(&self) {
        if self.central.stop_scan() {
            if let Some(task) = self.scan_task.lock().take() {
                task.abort();
            }
        }
    }

    /// Name of a device heard during this scan.
    async fn advertised_name(&self, address: Address) -> Option<String> {
        let device = self.adapter.device(address).ok()?;
        let name = device.name().await.ok().flatten();
        let rssi = device.rssi().await.ok().flatten();
        live_advertised_name(name, rssi)
    }

    /// Connect to `peer`, resolve the LED service and subscribe to responses.
    pub async fn connect(self: &Arc<Self>, peer: Option<Address>) -> Result<()> {
        let address = self.central.connect(peer)?;

        if let Err(e) = self.open_link(address).await {
            self.central.connect_failed(&e.to_string());
            return Err(e);
        }
        Ok(())
    }

    async fn open_link(self: &Arc<Self>, address: Address) -> Result<()> {
        let device = self.adapter.device(address)?;
        let mut tasks = Vec::new();

        let (command, subscribed) = match self.establish(&device, &mut tasks).await {
            Ok(bound) => bound,
            Err(e) => {
                for task in tasks {
                    task.abort();
                }
                if let Err(disconnect_err) = device.disconnect().await {
                    warn!("Failed to drop half open link to {}: {}", address, disconnect_err);
                }
                return Err(e);
            }
        };

        let found = ServiceBindings {
            command: command.is_some(),
            response: subscribed,
        };

        *self.link.lock().await = Some(Link {
            device,
            command,
            tasks,
        });

        if !self.central.services_resolved(found) {
            self.release_link(address).await;
        }
        Ok(())
    }

    /// Open the link and bind characteristics. Spawned tasks are pushed to
    /// `tasks` so the caller can abort them on failure.
    async fn establish(
        self: &Arc<Self>,
        device: &Device,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> Result<(Option<Characteristic>, bool)> {
        let address = device.address();

        // Watch before connecting so the disconnect is never missed
        let events = device.events().await?;
        let client = self.clone();
        tasks.push(tokio::spawn(async move {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                    break;
                }
            }
            client.release_link(address).await;
        }));

        if !device.is_connected().await? {
            device.connect().await?;
        }
        info!("Connected to {}, discovering services", address);

        if self.refresh_device_cache() == CacheRefresh::Unsupported {
            debug!("Using cached GATT database for {}", address);
        }

        while !device.is_services_resolved().await? {
            if !device.is_connected().await? {
                bail!("disconnected during service discovery");
            }
            tokio::time::sleep(SERVICE_POLL_INTERVAL).await;
        }

        let (command, response) = find_characteristics(device).await?;

        let mut subscribed = false;
        if let Some(response) = response {
            if response.flags().await?.notify {
                // Give the stack time between local setup and the remote
                // descriptor write
                tokio::time::sleep(self.subscribe_delay).await;
                let notifications = response.notify().await?;
                subscribed = true;

                let client = self.clone();
                tasks.push(tokio::spawn(async move {
                    pin_mut!(notifications);
                    while let Some(value) = notifications.next().await {
                        client.central.response_received(&value);
                    }
                    debug!("Response notifications ended");
                }));
            } else {
                warn!("Response characteristic does not notify");
            }
        }

        Ok((command, subscribed))
    }

    /// Write `command` to the peripheral.
    ///
    /// Completion is reported through `command_written`; the LED state
    /// arrives separately as a response notification.
    pub async fn send_command(&self, command: LedCommand) -> Result<()> {
        let packet = self.central.prepare_command(command)?;

        let characteristic = {
            let link = self.link.lock().await;
            link.as_ref()
                .and_then(|link| link.command.clone())
                .ok_or(BleError::CharacteristicNotBound("command"))?
        };

        match characteristic.write(&packet).await {
            Ok(()) => {
                self.central.command_written();
                Ok(())
            }
            Err(e) => {
                error!("Problem writing characteristic: {}", e);
                Err(e.into())
            }
        }
    }

    /// Tear down the link to the peripheral.
    pub async fn disconnect(&self) -> Result<()> {
        let device = {
            let link = self.link.lock().await;
            link.as_ref().map(|link| link.device.clone())
        };
        let Some(device) = device else {
            return Err(BleError::NotConnected.into());
        };

        device.disconnect().await?;
        self.release_link(device.address()).await;
        Ok(())
    }

    /// Platform hook for dropping the remote GATT cache before discovery.
    ///
    /// BlueZ keeps its cache per device and offers no per-connection refresh.
    pub fn refresh_device_cache(&self) -> CacheRefresh {
        CacheRefresh::Unsupported
    }

    /// Forget the link to `address` and report the disconnect once.
    async fn release_link(&self, address: Address) {
        let link = {
            let mut guard = self.link.lock().await;
            match guard.as_ref() {
                Some(link) if link.device.address() == address => guard.take(),
                _ => None,
            }
        };

        if self.central.peer() == Some(address) {
            self.central.disconnected();
        }

        // May abort the calling watcher, so this comes last
        if let Some(link) = link {
            for task in link.tasks {
                task.abort();
            }
        }
    }
}

/// Ask for a recheck whenever the name or signal of `address` changes.
///
/// BlueZ often learns the name from the scan response, after the device
/// object was added.
async fn watch_advertiser(
    adapter: Adapter,
    address: Address,
    recheck: mpsc::UnboundedSender<Address>,
) {
    let Ok(device) = adapter.device(address) else {
        return;
    };
    let events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            debug!("Cannot watch device {}: {}", address, e);
            return;
        }
    };
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Name(_) | DeviceProperty::Rssi(_)) =
            event
        {
            if recheck.send(address).is_err() {
                break;
            }
        }
    }
}

/// A cached device object keeps its name but has no RSSI until it is heard
/// again, so only devices with a current RSSI count as advertising.
fn live_advertised_name(name: Option<String>, rssi: Option<i16>) -> Option<String> {
    match (name, rssi) {
        (Some(name), Some(_)) => Some(name),
        _ => None,
    }
}

async fn find_characteristics(
    device: &Device,
) -> Result<(Option<Characteristic>, Option<Characteristic>)> {
    for service in device.services().await? {
        let uuid = service.uuid().await?;
        debug!("Service: {}", uuid);
        if uuid != AUTOMATION_IO_SERVICE_UUID {
            continue;
        }

        let mut command = None;
        let mut response = None;
        for characteristic in service.characteristics().await? {
            match characteristic.uuid().await? {
                COMMAND_CHARACTERISTIC_UUID => command = Some(characteristic),
                RESPONSE_CHARACTERISTIC_UUID => response = Some(characteristic),
                other => debug!("Characteristic: {}", other),
            }
        }
        return Ok((command, response));
    }

    warn!("{}", BleError::ServiceNotFound(AUTOMATION_IO_SERVICE_UUID));
    Ok((None, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_device_objects_skipped() {
        assert_eq!(live_advertised_name(Some("LedRemote".into()), None), None);
        assert_eq!(live_advertised_name(None, Some(-60)), None);
        assert_eq!(
            live_advertised_name(Some("LedRemote".into()), Some(-60)).as_deref(),
            Some("LedRemote")
        );
    }
}
