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

//! BLE GATT server for the LED peripheral.

use anyhow::Result;
use bluer::adv::AdvertisementHandle;
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest, Service,
};
use bluer::{Adapter, AdapterEvent, Address, AddressType, Device, DeviceEvent, DeviceProperty};
use futures::{pin_mut, FutureExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::adapter::open_default_adapter;
use super::advertising::AdvertisingSession;
use super::battery::BatterySource;
use super::ble_constants::*;
use super::callbacks::PeripheralCallback;
use super::peripheral::PeripheralSession;
use super::protocol::to_hex;
use crate::config::PeripheralConfig;

type NotifyQueue = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

/// Owns the advertisement and reacts to link changes.
struct AdvertisingControl {
    adapter: Adapter,
    session: AdvertisingSession,
    peripheral: Arc<PeripheralSession>,
    handle: Mutex<Option<AdvertisementHandle>>,
}

impl AdvertisingControl {
    async fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            debug!("Already advertising");
            return Ok(());
        }

        match self.adapter.advertise(self.session.to_advertisement()).await {
            Ok(adv) => {
                if self.peripheral.advertising_started() {
                    *handle = Some(adv);
                }
                Ok(())
            }
            Err(e) => {
                self.peripheral.advertising_failed(&e.to_string());
                Err(e.into())
            }
        }
    }

    async fn stop(&self) {
        // Dropping the handle unregisters the advertisement
        if self.handle.lock().await.take().is_some() {
            self.peripheral.advertising_stopped();
        }
    }

    async fn link_up(&self, central: Address) {
        if self.peripheral.central_connected(central) {
            self.stop().await;
        }
    }

    async fn link_down(&self, central: Address) {
        if self.peripheral.central_disconnected(central) {
            if let Err(e) = self.start().await {
                error!("Error restarting advertising: {}", e);
            }
        }
    }
}

/// GATT server and advertiser for the LED peripheral.
pub struct GattServer {
    adapter: Adapter,
    peripheral: Arc<PeripheralSession>,
    advertising: Arc<AdvertisingControl>,
    model_number: String,
    serial_number: String,
    battery: Arc<dyn BatterySource>,
    battery_interval: Duration,
    response_tx: mpsc::Sender<Vec<u8>>,
    response_rx: NotifyQueue,
    battery_tx: mpsc::Sender<Vec<u8>>,
    battery_rx: NotifyQueue,
    app_handle: Option<ApplicationHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl GattServer {
    /// Open the default adapter and prepare the server.
    ///
    /// Fails when Bluetooth is unavailable or the advertised name is invalid.
    pub async fn new(
        config: &PeripheralConfig,
        callback: Arc<dyn PeripheralCallback>,
        battery: Arc<dyn BatterySource>,
    ) -> Result<Self> {
        info!("Initializing BLE GATT server...");

        let session = config.advertising_session()?;
        let adapter = open_default_adapter().await?;
        let peripheral = Arc::new(PeripheralSession::new(callback));

        let advertising = Arc::new(AdvertisingControl {
            adapter: adapter.clone(),
            session,
            peripheral: peripheral.clone(),
            handle: Mutex::new(None),
        });

        let (response_tx, response_rx) = mpsc::channel::<Vec<u8>>(32);
        let (battery_tx, battery_rx) = mpsc::channel::<Vec<u8>>(32);

        Ok(Self {
            adapter,
            peripheral,
            advertising,
            model_number: config.model_number.clone(),
            serial_number: config.serial_number.clone(),
            battery,
            battery_interval: config.battery_interval(),
            response_tx,
            response_rx: Arc::new(Mutex::new(response_rx)),
            battery_tx,
            battery_rx: Arc::new(Mutex::new(battery_rx)),
            app_handle: None,
            tasks: Vec::new(),
        })
    }

    /// Protocol state shared with the stack callbacks.
    pub fn session(&self) -> &Arc<PeripheralSession> {
        &self.peripheral
    }

    /// Get the adapter address.
    pub async fn address(&self) -> Result<Address> {
        Ok(self.adapter.address().await?)
    }

    /// Register the GATT application, watch for centrals and start advertising.
    ///
    /// An advertising failure is reported through the callback and leaves the
    /// server idle; it does not fail this call.
    pub async fn start(&mut self) -> Result<()> {
        let name = self.advertising.session.name().to_string();
        self.adapter.set_alias(name.clone()).await?;
        info!("Bluetooth name set to: {}", name);

        self.register_gatt_application().await?;

        self.tasks.push(tokio::spawn(monitor_connections(
            self.adapter.clone(),
            self.advertising.clone(),
        )));
        self.tasks.push(tokio::spawn(refresh_battery(
            self.battery.clone(),
            self.peripheral.clone(),
            self.battery_tx.clone(),
            self.battery_interval,
        )));

        if let Err(e) = self.advertising.start().await {
            warn!("Peripheral is idle, advertising did not start: {}", e);
        }

        info!("GATT server started successfully");
        Ok(())
    }

    /// Start BLE advertising.
    pub async fn start_advertising(&self) -> Result<()> {
        self.advertising.start().await
    }

    /// Stop BLE advertising.
    pub async fn stop_advertising(&self) {
        self.advertising.stop().await
    }

    /// Stop advertising, background tasks and unregister the application.
    pub async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.advertising.stop().await;
        if self.app_handle.take().is_some() {
            info!("GATT application unregistered");
        }
    }

    /// Register the GATT services with BlueZ.
    async fn register_gatt_application(&mut self) -> Result<()> {
        let app = Application {
            services: vec![
                self.automation_io_service(),
                device_information_service(
                    self.advertising.session.name(),
                    &self.model_number,
                    &self.serial_number,
                ),
                self.battery_service(),
            ],
            ..Default::default()
        };

        self.app_handle = Some(self.adapter.serve_gatt_application(app).await?);
        info!("GATT services registered");
        Ok(())
    }

    fn automation_io_service(&self) -> Service {
        // Build Command characteristic (write)
        let command_char = {
            let peripheral = self.peripheral.clone();
            let response_tx = self.response_tx.clone();

            Characteristic {
                uuid: COMMAND_CHARACTERISTIC_UUID,
                write: Some(CharacteristicWrite {
                    write: true,
                    method: CharacteristicWriteMethod::Fun(Box::new(
                        move |data: Vec<u8>, req: CharacteristicWriteRequest| {
                            let peripheral = peripheral.clone();
                            let response_tx = response_tx.clone();

                            async move {
                                if let Some(response) =
                                    peripheral.command_written(req.device_address, &data)
                                {
                                    queue_notification(&response_tx, response.to_vec(), "response");
                                }
                                Ok(())
                            }
                            .boxed()
                        },
                    )),
                    ..Default::default()
                }),
                ..Default::default()
            }
        };

        // Build Response characteristic (read + notify)
        let response_char = {
            let peripheral = self.peripheral.clone();

            Characteristic {
                uuid: RESPONSE_CHARACTERISTIC_UUID,
                read: Some(CharacteristicRead {
                    read: true,
                    fun: Box::new(move |_req: CharacteristicReadRequest| {
                        let peripheral = peripheral.clone();
                        async move { Ok(peripheral.response_value().to_vec()) }.boxed()
                    }),
                    ..Default::default()
                }),
                notify: Some(CharacteristicNotify {
                    notify: true,
                    method: notify_method(
                        RESPONSE_CHARACTERISTIC_UUID,
                        self.response_rx.clone(),
                        self.peripheral.clone(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            }
        };

        Service {
            uuid: AUTOMATION_IO_SERVICE_UUID,
            primary: true,
            characteristics: vec![command_char, response_char],
            ..Default::default()
        }
    }

    fn battery_service(&self) -> Service {
        let peripheral = self.peripheral.clone();

        let level_char = Characteristic {
            uuid: BATTERY_LEVEL_CHARACTERISTIC_UUID,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |_req: CharacteristicReadRequest| {
                    let peripheral = peripheral.clone();
                    async move { Ok(vec![peripheral.battery_level()]) }.boxed()
                }),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: notify_method(
                    BATTERY_LEVEL_CHARACTERISTIC_UUID,
                    self.battery_rx.clone(),
                    self.peripheral.clone(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };

        Service {
            uuid: BATTERY_SERVICE_UUID,
            primary: true,
            characteristics: vec![level_char],
            ..Default::default()
        }
    }
}

fn device_information_service(name: &str, model_number: &str, serial_number: &str) -> Service {
    let read_only = |uuid: Uuid, value: &str| Characteristic {
        uuid,
        read: Some(read_static(value.as_bytes().to_vec())),
        ..Default::default()
    };

    Service {
        uuid: DEVICE_INFORMATION_SERVICE_UUID,
        primary: true,
        characteristics: vec![
            read_only(DEVICE_NAME_CHARACTERISTIC_UUID, name),
            read_only(MODEL_NUMBER_CHARACTERISTIC_UUID, model_number),
            read_only(SERIAL_NUMBER_CHARACTERISTIC_UUID, serial_number),
        ],
        ..Default::default()
    }
}

fn read_static(value: Vec<u8>) -> CharacteristicRead {
    CharacteristicRead {
        read: true,
        fun: Box::new(move |_req: CharacteristicReadRequest| {
            let value = value.clone();
            async move { Ok(value) }.boxed()
        }),
        ..Default::default()
    }
}

/// A notify session lasts as long as the peer stays subscribed.
fn notify_method(
    characteristic: Uuid,
    queue: NotifyQueue,
    peripheral: Arc<PeripheralSession>,
) -> CharacteristicNotifyMethod {
    CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
        let queue = queue.clone();
        let peripheral = peripheral.clone();

        run_notify_session(characteristic, notifier, queue, peripheral).boxed()
    }))
}

async fn run_notify_session(
    characteristic: Uuid,
    mut notifier: CharacteristicNotifier,
    queue: NotifyQueue,
    peripheral: Arc<PeripheralSession>,
) {
    let name = characteristic_name(&characteristic);
    debug!("{} notification loop started", name);

    // Values queued for an earlier subscriber are stale
    {
        let mut rx = queue.lock().await;
        while rx.try_recv().is_ok() {}
    }
    peripheral.subscribed(characteristic);

    loop {
        let data = {
            let mut rx = queue.lock().await;
            tokio::select! {
                data = rx.recv() => data,
                _ = notifier.stopped() => None,
            }
        };

        let Some(data) = data else {
            break;
        };

        debug!("Sending {} notification: {}", name, to_hex(&data));
        if let Err(e) = notifier.notify(data).await {
            error!("Failed to send {} notification: {}", name, e);
            break;
        }
    }

    peripheral.unsubscribed(characteristic);
    debug!("{} notification loop exited", name);
}

fn queue_notification(tx: &mpsc::Sender<Vec<u8>>, data: Vec<u8>, name: &str) {
    match tx.try_send(data) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!("Dropping {} notification, queue full", name),
        Err(TrySendError::Closed(_)) => debug!("{} notification queue closed", name),
    }
}

/// Follow BlueZ device objects and turn link changes into session events.
async fn monitor_connections(adapter: Adapter, advertising: Arc<AdvertisingControl>) {
    let events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            error!("Cannot watch adapter events: {}", e);
            return;
        }
    };
    pin_mut!(events);

    let mut watched = HashSet::new();
    let mut watchers = JoinSet::new();

    // Links that already exist belong to someone else; known devices are
    // only promoted when they connect again later
    match adapter.device_addresses().await {
        Ok(addresses) => {
            for address in addresses {
                watched.insert(address);
                watchers.spawn(watch_device(
                    adapter.clone(),
                    address,
                    advertising.clone(),
                    false,
                ));
            }
        }
        Err(e) => warn!("Cannot list known devices: {}", e),
    }

    while let Some(event) = events.next().await {
        match event {
            AdapterEvent::DeviceAdded(address) => {
                if watched.insert(address) {
                    watchers.spawn(watch_device(
                        adapter.clone(),
                        address,
                        advertising.clone(),
                        true,
                    ));
                }
            }
            AdapterEvent::DeviceRemoved(address) => {
                watched.remove(&address);
                advertising.link_down(address).await;
            }
            _ => {}
        }
    }
}

/// Follow one device object. `check_initial` promotes a link that is
/// already up when watching starts, for devices that appeared just now.
async fn watch_device(
    adapter: Adapter,
    address: Address,
    advertising: Arc<AdvertisingControl>,
    check_initial: bool,
) {
    let device = match adapter.device(address) {
        Ok(device) => device,
        Err(e) => {
            debug!("Device {} vanished: {}", address, e);
            return;
        }
    };

    // Subscribe before the first check so no transition is missed
    let events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            debug!("Cannot watch device {}: {}", address, e);
            return;
        }
    };
    pin_mut!(events);

    if check_initial
        && device.is_connected().await.unwrap_or(false)
        && is_le_device(&device).await
    {
        advertising.link_up(address).await;
    }

    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event {
            if !connected {
                advertising.link_down(address).await;
            } else if is_le_device(&device).await {
                advertising.link_up(address).await;
            } else {
                debug!("Ignoring BR/EDR link from {}", address);
            }
        }
    }
}

async fn is_le_device(device: &Device) -> bool {
    match device.address_type().await {
        Ok(address_type) => is_le_address(address_type),
        Err(e) => {
            debug!("Cannot read address type of {}: {}", device.address(), e);
            false
        }
    }
}

/// Only LE links can be centrals of the GATT server.
fn is_le_address(address_type: AddressType) -> bool {
    matches!(address_type, AddressType::LePublic | AddressType::LeRandom)
}

/// Refresh the battery level and push it to a subscribed central.
async fn refresh_battery(
    battery: Arc<dyn BatterySource>,
    peripheral: Arc<PeripheralSession>,
    battery_tx: mpsc::Sender<Vec<u8>>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;

        // Sources may read from disk
        let source = battery.clone();
        let level = match tokio::task::spawn_blocking(move || source.level()).await {
            Ok(level) => level,
            Err(e) => {
                warn!("Battery read failed: {}", e);
                continue;
            }
        };
        debug!("Battery level: {}%", level);
        if let Some(level) = peripheral.battery_level_changed(level) {
            queue_notification(&battery_tx, vec![level], "battery level");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_le_links_accepted() {
        assert!(is_le_address(AddressType::LePublic));
        assert!(is_le_address(AddressType::LeRandom));
        assert!(!is_le_address(AddressType::BrEdr));
    }

    #[test]
    fn test_device_information_characteristics() {
        let service = device_information_service("LedRemote", "1AB2", "1234");
        assert_eq!(service.uuid, DEVICE_INFORMATION_SERVICE_UUID);

        let uuids: Vec<Uuid> = service.characteristics.iter().map(|c| c.uuid).collect();
        assert_eq!(
            uuids,
            vec![
                DEVICE_NAME_CHARACTERISTIC_UUID,
                MODEL_NUMBER_CHARACTERISTIC_UUID,
                SERIAL_NUMBER_CHARACTERISTIC_UUID,
            ]
        );
        assert!(service
            .characteristics
            .iter()
            .all(|c| c.read.is_some() && c.write.is_none() && c.notify.is_none()));
    }
}
