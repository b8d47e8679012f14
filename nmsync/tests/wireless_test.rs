//! Wireless facet lifecycle: creation, access point swaps and device type changes.

mod common;

use std::sync::Arc;

use nmsync::{DeviceType, NetworkInterface, WifiMode};
use zvariant::Value;

use common::*;

const OTHER_AP: &str = "/org/freedesktop/NetworkManager/AccessPoint/44";

async fn connected_wireless() -> (Arc<MockBus>, Arc<NetworkInterface>) {
    let bus = MockBus::new();
    wireless(&bus);
    let iface = NetworkInterface::new(path(WLAN0));
    iface.connect(bus.handle()).await.unwrap();
    (bus, iface)
}

#[tokio::test]
async fn test_network_interface_wireless() {
    let (bus, iface) = connected_wireless().await;

    assert_eq!(iface.name(), "wlan0");
    assert_eq!(iface.device_type(), DeviceType::Wifi);
    assert!(iface.sync_properties());
    assert!(iface.connection().is_none());

    let wifi = iface.wireless().expect("wireless facet");
    assert!(wifi.is_connected());
    assert_eq!(wifi.mode(), WifiMode::Infrastructure);
    assert_eq!(wifi.bitrate(), 144_400);
    assert_eq!(wifi.ssid().as_deref(), Some("UPC4814466"));
    assert_eq!(wifi.strength(), Some(47));

    let ap = wifi.access_point().unwrap();
    assert_eq!(ap.frequency, 2462);
    assert_eq!(ap.hw_address, "E4:57:40:A9:D7:DE");
    assert_eq!(bus.live_subscribers(WLAN0, WIRELESS), 1);
}

#[tokio::test]
async fn test_wireless_settings_absent_without_connection() {
    let (_bus, iface) = connected_wireless().await;
    assert_eq!(iface.settings().await.unwrap(), None);
}

#[tokio::test]
async fn test_type_change_away_from_wireless() {
    let (bus, iface) = connected_wireless().await;
    let wifi = iface.wireless().unwrap();

    bus.emit_changed(WLAN0, DEVICE, vec![("DeviceType", Value::from(1u32))]);
    eventually("wireless released", || iface.wireless().is_none()).await;

    assert_eq!(iface.device_type(), DeviceType::Ethernet);
    assert!(!wifi.is_connected());
    assert_eq!(wifi.ssid().as_deref(), Some("UPC4814466"));
    assert_eq!(wifi.strength(), Some(47));
    eventually("wireless unsubscribed", || {
        bus.live_subscribers(WLAN0, WIRELESS) == 0 && bus.live_subscribers(WLAN0_AP, ACCESS_POINT) == 0
    })
    .await;
}

#[tokio::test]
async fn test_type_change_into_wireless() {
    let bus = MockBus::new();
    ethernet(&bus);
    bus.set(
        ETH0,
        WIRELESS,
        vec![
            ("Mode", Value::from(3u32)),
            ("Bitrate", Value::from(0u32)),
            ("ActiveAccessPoint", object("/")),
        ],
    );
    let iface = NetworkInterface::new(path(ETH0));
    iface.connect(bus.handle()).await.unwrap();
    assert!(iface.wireless().is_none());

    bus.emit_changed(ETH0, DEVICE, vec![("DeviceType", Value::from(2u32))]);
    eventually("wireless facet", || iface.wireless().is_some()).await;

    let wifi = iface.wireless().unwrap();
    assert!(wifi.is_connected());
    assert_eq!(wifi.mode(), WifiMode::AccessPoint);
    assert_eq!(wifi.access_point(), None);
    assert_eq!(wifi.ssid(), None);
    assert!(iface.connection().is_some_and(|c| c.is_connected()));

    bus.emit_changed(ETH0, DEVICE, vec![("DeviceType", Value::from(1u32))]);
    eventually("wireless released", || iface.wireless().is_none()).await;
    assert!(!wifi.is_connected());

    bus.emit_changed(ETH0, DEVICE, vec![("DeviceType", Value::from(2u32))]);
    eventually("fresh wireless facet", || iface.wireless().is_some()).await;
    let again = iface.wireless().unwrap();
    assert!(!Arc::ptr_eq(&wifi, &again));
    assert!(again.is_connected());
    assert!(!wifi.is_connected());
}

#[tokio::test]
async fn test_access_point_swap() {
    let (bus, iface) = connected_wireless().await;
    bus.set(
        OTHER_AP,
        ACCESS_POINT,
        vec![
            ("Ssid", Value::from(b"Cafe\xff".to_vec())),
            ("Strength", Value::from(80u8)),
            ("Frequency", Value::from(5180u32)),
            ("HwAddress", Value::from("00:11:22:33:44:55")),
            ("Mode", Value::from(2u32)),
        ],
    );
    let wifi = iface.wireless().unwrap();

    bus.emit_changed(WLAN0, WIRELESS, vec![("ActiveAccessPoint", object(OTHER_AP))]);
    eventually("new access point", || wifi.strength() == Some(80)).await;

    assert_eq!(wifi.ssid().as_deref(), Some("Cafe\u{fffd}"));
    assert_eq!(wifi.access_point().unwrap().frequency, 5180);
    assert!(wifi.is_connected());
    eventually("old access point unsubscribed", || {
        bus.live_subscribers(WLAN0_AP, ACCESS_POINT) == 0
    })
    .await;

    bus.emit_changed(WLAN0, WIRELESS, vec![("ActiveAccessPoint", object("/"))]);
    eventually("no access point", || wifi.access_point().is_none()).await;
    assert_eq!(wifi.active_access_point(), None);
}

#[tokio::test]
async fn test_signal_strength_updates() {
    let (bus, iface) = connected_wireless().await;
    let wifi = iface.wireless().unwrap();
    let mut rx = wifi.watch();
    rx.borrow_and_update();

    bus.emit_changed(WLAN0_AP, ACCESS_POINT, vec![("Strength", Value::from(12u8))]);
    eventually("strength", || wifi.strength() == Some(12)).await;

    bus.emit_changed(WLAN0, WIRELESS, vec![("Bitrate", Value::from(65_000u32))]);
    eventually("bitrate", || wifi.bitrate() == 65_000).await;
    assert!(rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_vanished_access_point_is_dropped() {
    let (bus, iface) = connected_wireless().await;
    let wifi = iface.wireless().unwrap();

    bus.vanish(WLAN0_AP);
    eventually("access point dropped", || wifi.access_point().is_none()).await;
    assert!(wifi.is_connected());
    assert!(iface.wireless().is_some_and(|w| Arc::ptr_eq(&w, &wifi)));
}

#[tokio::test]
async fn test_reconnect_builds_fresh_wireless_facet() {
    let (bus, iface) = connected_wireless().await;
    let wifi = iface.wireless().unwrap();

    iface.disconnect();
    assert!(!wifi.is_connected());
    assert!(iface.wireless().is_none());

    iface.connect(bus.handle()).await.unwrap();
    let again = iface.wireless().expect("reconnected facet");
    assert!(again.is_connected());
    assert!(!Arc::ptr_eq(&wifi, &again));
}
