//! Integration tests for the full command/response flow.
//!
//! Both role cores are wired back to back through an in-memory link that
//! plays the part of the Bluetooth stack.

use bluer::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use led_remote::bluetooth::ble_constants::{
    BATTERY_LEVEL_CHARACTERISTIC_UUID, COMMAND_CHARACTERISTIC_UUID, RESPONSE_CHARACTERISTIC_UUID,
};
use led_remote::bluetooth::protocol::encode_command;
use led_remote::bluetooth::{
    CentralSession, CentralState, LedCommand, LedState, PeripheralCallback, PeripheralSession,
    PeripheralState, RemoteLedCallback, ServiceBindings,
};
use led_remote::events::{CentralEvent, ChannelCallback, EventProcessor};
use led_remote::state::{AppState, ConnectionStatus};

const PERIPHERAL_ADDR: Address = Address([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]);
const CENTRAL_ADDR: Address = Address([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x02]);
const OTHER_ADDR: Address = Address([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x03]);

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl RemoteLedCallback for Recorder {
    fn scan_failed(&self, reason: &str) {
        self.push(format!("scan_failed:{}", reason));
    }
    fn connected(&self) {
        self.push("connected");
    }
    fn disconnected(&self) {
        self.push("disconnected");
    }
    fn connection_failed(&self, reason: &str) {
        self.push(format!("connection_failed:{}", reason));
    }
    fn command_written(&self) {
        self.push("command_written");
    }
    fn led_state_changed(&self, state: LedState) {
        self.push(format!("led:{}", state));
    }
    fn led_error(&self) {
        self.push("led_error");
    }
}

impl PeripheralCallback for Recorder {
    fn advertising_started(&self) {
        self.push("advertising_started");
    }
    fn advertising_failed(&self, reason: &str) {
        self.push(format!("advertising_failed:{}", reason));
    }
    fn advertising_stopped(&self) {
        self.push("advertising_stopped");
    }
    fn central_connected(&self, central: Address) {
        self.push(format!("central_connected:{}", central));
    }
    fn central_disconnected(&self, central: Address) {
        self.push(format!("central_disconnected:{}", central));
    }
    fn characteristic_written(&self, characteristic: Uuid, value: &[u8]) {
        assert_eq!(characteristic, COMMAND_CHARACTERISTIC_UUID);
        self.push(format!("written:{:?}", value));
    }
    fn characteristic_subscribed(&self, _characteristic: Uuid) {
        self.push("subscribed");
    }
    fn characteristic_unsubscribed(&self, _characteristic: Uuid) {
        self.push("unsubscribed");
    }
    fn led_turned_on(&self) {
        self.push("led_on");
    }
    fn led_turned_off(&self) {
        self.push("led_off");
    }
}

/// Plays the stack between the two cores.
struct Link {
    peripheral: PeripheralSession,
    central: CentralSession,
    peripheral_events: Arc<Recorder>,
    central_events: Arc<Recorder>,
    notifications: usize,
}

impl Link {
    fn new() -> Self {
        let peripheral_events = Arc::new(Recorder::default());
        let central_events = Arc::new(Recorder::default());
        Self {
            peripheral: PeripheralSession::new(peripheral_events.clone()),
            central: CentralSession::new("LedRemote", central_events.clone()),
            peripheral_events,
            central_events,
            notifications: 0,
        }
    }

    /// Advertise, scan, connect and subscribe to responses.
    fn establish(&mut self) {
        assert!(self.peripheral.advertising_started());
        self.central.start_scan().unwrap();
        assert!(self.central.device_discovered(PERIPHERAL_ADDR, Some("LedRemote")));
        self.central.connect(Some(PERIPHERAL_ADDR)).unwrap();

        if self.peripheral.central_connected(CENTRAL_ADDR) {
            self.peripheral.advertising_stopped();
        }
        self.peripheral.subscribed(RESPONSE_CHARACTERISTIC_UUID);
        assert!(self.central.services_resolved(ServiceBindings {
            command: true,
            response: true,
        }));

        self.peripheral_events.take();
        self.central_events.take();
    }

    /// Connect when the peripheral is already advertising.
    fn establish_from_advertising(&mut self) {
        self.central.start_scan().unwrap();
        assert!(self.central.device_discovered(PERIPHERAL_ADDR, Some("LedRemote")));
        self.central.connect(Some(PERIPHERAL_ADDR)).unwrap();

        assert!(self.peripheral.central_connected(CENTRAL_ADDR));
        self.peripheral.advertising_stopped();
        assert!(self.central.services_resolved(ServiceBindings {
            command: true,
            response: true,
        }));

        assert_eq!(
            self.peripheral_events.take(),
            vec![
                "advertising_started".to_string(),
                format!("central_connected:{}", CENTRAL_ADDR),
                "advertising_stopped".to_string(),
            ]
        );
        self.central_events.take();
    }

    /// Deliver a raw write to the command characteristic and any resulting
    /// notification back to the central.
    fn write(&mut self, packet: &[u8]) {
        let response = self.peripheral.command_written(CENTRAL_ADDR, packet);
        self.central.command_written();
        if let Some(response) = response {
            self.notifications += 1;
            self.central.response_received(&response);
        }
    }

    fn drop_link(&mut self) {
        if self.peripheral.central_disconnected(CENTRAL_ADDR) {
            assert!(self.peripheral.advertising_started());
        }
        self.central.disconnected();
    }
}

#[test]
fn test_led_on_round_trip() {
    let mut link = Link::new();
    link.establish();

    let packet = link.central.prepare_command(LedCommand::On).unwrap();
    assert_eq!(packet, [1, 1]);
    link.write(&packet);

    assert_eq!(link.peripheral_events.take(), vec!["written:[1, 1]", "led_on"]);
    assert_eq!(link.peripheral.response_value(), [1, 1]);
    assert_eq!(link.central_events.take(), vec!["command_written", "led:on"]);
    assert_eq!(link.notifications, 1);
}

#[test]
fn test_led_off_round_trip() {
    let mut link = Link::new();
    link.establish();

    let packet = link.central.prepare_command(LedCommand::Off).unwrap();
    assert_eq!(packet, [2, 1]);
    link.write(&packet);

    assert_eq!(link.peripheral_events.take(), vec!["written:[2, 1]", "led_off"]);
    assert_eq!(link.peripheral.response_value(), [2, 1]);
    assert_eq!(link.peripheral.led(), Some(LedState::Off));
    assert_eq!(link.central_events.take(), vec!["command_written", "led:off"]);
}

#[test]
fn test_unknown_command_gets_no_response() {
    let mut link = Link::new();
    link.establish();

    link.write(&[9, 1]);

    assert!(link.peripheral_events.take().is_empty());
    assert_eq!(link.central_events.take(), vec!["command_written"]);
    assert_eq!(link.notifications, 0);
    assert_eq!(link.peripheral.led(), None);
}

#[test]
fn test_missing_footer_dropped() {
    let mut link = Link::new();
    link.establish();

    link.write(&[1, 0]);

    assert!(link.peripheral_events.take().is_empty());
    assert_eq!(link.central_events.take(), vec!["command_written"]);
    assert_eq!(link.notifications, 0);
}

#[test]
fn test_no_notification_without_subscription() {
    let mut link = Link::new();
    link.establish();
    link.peripheral.unsubscribed(RESPONSE_CHARACTERISTIC_UUID);
    link.peripheral_events.take();

    link.write(&encode_command(LedCommand::On));

    // The value is still updated for reads
    assert_eq!(link.peripheral.response_value(), [1, 1]);
    assert_eq!(link.peripheral_events.take(), vec!["written:[1, 1]", "led_on"]);
    assert_eq!(link.central_events.take(), vec!["command_written"]);
    assert_eq!(link.notifications, 0);
}

#[test]
fn test_advertising_follows_connection() {
    let mut link = Link::new();
    assert!(link.peripheral.advertising_started());
    assert_eq!(link.peripheral.state(), PeripheralState::Advertising);

    link.establish_from_advertising();
    assert_eq!(link.peripheral.state(), PeripheralState::Connected);

    link.drop_link();
    assert_eq!(link.peripheral.state(), PeripheralState::Advertising);
    assert_eq!(link.central.state(), CentralState::Idle);
    assert_eq!(
        link.peripheral_events.take(),
        vec![
            format!("central_disconnected:{}", CENTRAL_ADDR),
            "advertising_started".to_string(),
        ]
    );
    assert_eq!(link.central_events.take(), vec!["disconnected"]);

    // Central does not reconnect on its own
    assert!(!link.central.device_discovered(PERIPHERAL_ADDR, Some("LedRemote")));
    assert_eq!(link.central.state(), CentralState::Idle);
}

#[test]
fn test_second_central_ignored() {
    let mut link = Link::new();
    link.establish();

    assert!(!link.peripheral.central_connected(OTHER_ADDR));
    assert_eq!(link.peripheral.command_written(OTHER_ADDR, &[1, 1]), None);
    assert!(!link.peripheral.central_disconnected(OTHER_ADDR));
    assert_eq!(link.peripheral.connected_central(), Some(CENTRAL_ADDR));
    assert_eq!(link.peripheral.led(), None);
    assert!(link.peripheral_events.take().is_empty());
}

#[test]
fn test_existing_link_does_not_block_advertising() {
    let link = Link::new();

    // Some other device was already linked before the peripheral started
    assert!(!link.peripheral.central_connected(OTHER_ADDR));
    assert!(link.peripheral.advertising_started());
    assert_eq!(link.peripheral.state(), PeripheralState::Advertising);
    assert_eq!(link.peripheral_events.take(), vec!["advertising_started"]);
}

#[test]
fn test_scan_ignores_other_devices() {
    let link = Link::new();
    link.central.start_scan().unwrap();

    assert!(!link.central.device_discovered(OTHER_ADDR, None));
    assert!(!link.central.device_discovered(OTHER_ADDR, Some("Headphones")));
    assert!(!link.central.device_discovered(OTHER_ADDR, Some("LedRemote ")));
    assert_eq!(link.central.state(), CentralState::Scanning);

    assert!(link.central.device_discovered(PERIPHERAL_ADDR, Some("LedRemote")));
    assert!(!link.central.device_discovered(OTHER_ADDR, Some("LedRemote")));
    assert_eq!(link.central.peer(), Some(PERIPHERAL_ADDR));
}

#[test]
fn test_battery_notifications_need_subscription() {
    let mut link = Link::new();
    assert_eq!(link.peripheral.battery_level_changed(80), None);

    link.establish();
    assert_eq!(link.peripheral.battery_level_changed(70), None);

    link.peripheral.subscribed(BATTERY_LEVEL_CHARACTERISTIC_UUID);
    assert_eq!(link.peripheral.battery_level_changed(60), Some(60));
    assert_eq!(link.peripheral.battery_level(), 60);

    link.drop_link();
    assert_eq!(link.peripheral.battery_level_changed(50), None);
}

#[tokio::test]
async fn test_central_events_reach_app_state() {
    let state = AppState::new();
    let (callback, mut rx) = ChannelCallback::<CentralEvent>::new();
    let central = Arc::new(CentralSession::new("LedRemote", callback));
    let processor = EventProcessor::with_central(state.clone(), central.clone());

    let peripheral = PeripheralSession::new(Arc::new(Recorder::default()));
    assert!(peripheral.advertising_started());
    assert!(peripheral.central_connected(CENTRAL_ADDR));
    peripheral.subscribed(RESPONSE_CHARACTERISTIC_UUID);

    central.connect(Some(PERIPHERAL_ADDR)).unwrap();
    central.services_resolved(ServiceBindings {
        command: true,
        response: true,
    });

    let packet = central.prepare_command(LedCommand::On).unwrap();
    let response = peripheral.command_written(CENTRAL_ADDR, &packet).unwrap();
    central.response_received(&response);

    for _ in 0..2 {
        processor.process_central(rx.recv().await.unwrap());
    }
    assert_eq!(state.get_status(), ConnectionStatus::Connected);
    assert_eq!(state.get_peer(), Some(PERIPHERAL_ADDR));
    assert_eq!(state.get_led(), Some(LedState::On));
}
