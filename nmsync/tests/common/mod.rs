//! In-memory stand-in for the NetworkManager D-Bus service.
//!
//! Holds property maps per (path, interface), hands out subscription streams,
//! and lets tests fire `PropertiesChanged` batches, fail reads, and make
//! objects vanish.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use nmsync::dbus::{PropertyStream, SettingsMap};
use nmsync::{Bus, BusHandle, MirrorError, PropertiesChanged, PropertyMap, Result};

pub const DEVICE: &str = "org.freedesktop.NetworkManager.Device";
pub const WIRELESS: &str = "org.freedesktop.NetworkManager.Device.Wireless";
pub const ACTIVE: &str = "org.freedesktop.NetworkManager.Connection.Active";
pub const IP4: &str = "org.freedesktop.NetworkManager.IP4Config";
pub const IP6: &str = "org.freedesktop.NetworkManager.IP6Config";
pub const ACCESS_POINT: &str = "org.freedesktop.NetworkManager.AccessPoint";

pub const ETH0: &str = "/org/freedesktop/NetworkManager/Devices/1";
pub const WLAN0: &str = "/org/freedesktop/NetworkManager/Devices/3";
pub const VETH: &str = "/org/freedesktop/NetworkManager/Devices/35";
pub const ETH0_CONNECTION: &str = "/org/freedesktop/NetworkManager/ActiveConnection/1";
pub const ETH0_SETTINGS: &str = "/org/freedesktop/NetworkManager/Settings/1";
pub const ETH0_IP4: &str = "/org/freedesktop/NetworkManager/IP4Config/1";
pub const ETH0_IP6: &str = "/org/freedesktop/NetworkManager/IP6Config/1";
pub const WLAN0_AP: &str = "/org/freedesktop/NetworkManager/AccessPoint/43";
pub const ETH0_UUID: &str = "0c23631e-2118-355c-bbb0-8943229cb0d6";

type Key = (String, String);

#[derive(Default)]
pub struct MockBus {
    objects: Mutex<HashMap<Key, PropertyMap>>,
    settings: Mutex<HashMap<String, SettingsMap>>,
    subscribers: Mutex<HashMap<Key, Vec<mpsc::UnboundedSender<PropertiesChanged>>>>,
    failing: Mutex<HashSet<String>>,
    subscribe_calls: Mutex<HashMap<String, usize>>,
    reads: AtomicUsize,
}

fn key(path: &str, interface: &str) -> Key {
    (path.to_string(), interface.to_string())
}

pub fn path(p: &str) -> OwnedObjectPath {
    OwnedObjectPath::try_from(p).unwrap()
}

pub fn object(p: &'static str) -> Value<'static> {
    Value::from(ObjectPath::try_from(p).unwrap())
}

pub fn props(entries: Vec<(&str, Value<'static>)>) -> PropertyMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), OwnedValue::try_from(v).unwrap()))
        .collect()
}

fn copy(map: &PropertyMap) -> PropertyMap {
    map.iter()
        .map(|(k, v)| (k.clone(), v.try_clone().unwrap()))
        .collect()
}

pub fn address(address: &str, prefix: u32) -> HashMap<&'static str, Value<'static>> {
    HashMap::from([
        ("address", Value::from(address.to_string())),
        ("prefix", Value::from(prefix)),
    ])
}

pub fn nameserver(address: &str) -> HashMap<&'static str, Value<'static>> {
    HashMap::from([("address", Value::from(address.to_string()))])
}

pub fn ipv6_bytes(addr: &str) -> Vec<u8> {
    addr.parse::<std::net::Ipv6Addr>().unwrap().octets().to_vec()
}

impl MockBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handle(self: &Arc<Self>) -> BusHandle {
        self.clone()
    }

    /// Stores (or merges into) the properties of an object without notifying.
    pub fn set(&self, path: &str, interface: &str, entries: Vec<(&str, Value<'static>)>) {
        let mut objects = self.objects.lock().unwrap();
        objects
            .entry(key(path, interface))
            .or_default()
            .extend(props(entries));
    }

    pub fn set_settings(&self, path: &str, settings: SettingsMap) {
        self.settings
            .lock()
            .unwrap()
            .insert(path.to_string(), settings);
    }

    /// Updates stored values and sends them as changed properties.
    pub fn emit_changed(&self, path: &str, interface: &str, entries: Vec<(&str, Value<'static>)>) {
        let changed = props(entries);
        {
            let mut objects = self.objects.lock().unwrap();
            let stored = objects.entry(key(path, interface)).or_default();
            stored.extend(copy(&changed));
        }
        self.send(path, interface, || PropertiesChanged::changed(copy(&changed)));
    }

    /// Sends invalidated names; current stored values are what a re-read returns.
    pub fn emit_invalidated(&self, path: &str, interface: &str, names: &[&str]) {
        self.send(path, interface, || {
            PropertiesChanged::invalidated(names.iter().copied())
        });
    }

    fn send(&self, path: &str, interface: &str, batch: impl Fn() -> PropertiesChanged) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(senders) = subscribers.get_mut(&key(path, interface)) {
            senders.retain(|tx| tx.unbounded_send(batch()).is_ok());
        }
    }

    /// Makes reads of `path` fail until [`heal`](Self::heal) is called.
    pub fn fail_reads(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    /// Removes the object and ends every subscription on it.
    pub fn vanish(&self, path: &str) {
        self.objects.lock().unwrap().retain(|(p, _), _| p != path);
        self.subscribers.lock().unwrap().retain(|(p, _), _| p != path);
        self.fail_reads(path);
    }

    pub fn subscriptions(&self, path: &str) -> usize {
        self.subscribe_calls
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn live_subscribers(&self, path: &str, interface: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&key(path, interface))
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self, path: &ObjectPath<'_>) -> Result<()> {
        if self.failing.lock().unwrap().contains(path.as_str()) {
            return Err(MirrorError::RemoteRead {
                path: path.to_string(),
                reason: "object does not exist".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for MockBus {
    async fn get_all_properties(
        &self,
        path: &ObjectPath<'_>,
        interface: &str,
    ) -> Result<PropertyMap> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check(path)?;
        let objects = self.objects.lock().unwrap();
        objects
            .get(&key(path.as_str(), interface))
            .map(copy)
            .ok_or_else(|| MirrorError::RemoteRead {
                path: path.to_string(),
                reason: format!("no interface {interface}"),
            })
    }

    async fn subscribe(&self, path: &ObjectPath<'_>, interface: &str) -> Result<PropertyStream> {
        self.check(path)?;
        *self
            .subscribe_calls
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;
        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap()
            .entry(key(path.as_str(), interface))
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }

    async fn get_settings(&self, path: &ObjectPath<'_>) -> Result<SettingsMap> {
        self.check(path)?;
        let settings = self.settings.lock().unwrap();
        settings
            .get(path.as_str())
            .map(|sections| {
                sections
                    .iter()
                    .map(|(name, section)| (name.clone(), copy(section)))
                    .collect()
            })
            .ok_or_else(|| MirrorError::RemoteRead {
                path: path.to_string(),
                reason: "no settings".into(),
            })
    }
}

/// Polls `cond` until it holds, yielding to the monitor tasks in between.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// The wired device with an activated connection and full IP configuration.
pub fn ethernet(bus: &MockBus) {
    bus.set(
        ETH0,
        DEVICE,
        vec![
            ("Interface", Value::from("eth0")),
            ("DeviceType", Value::from(1u32)),
            ("Managed", Value::from(true)),
            ("Driver", Value::from("e1000e")),
            ("State", Value::from(100u32)),
            ("HwAddress", Value::from("AA:BB:CC:DD:EE:FF")),
            ("ActiveConnection", object(ETH0_CONNECTION)),
            ("Autoconnect", Value::from(true)),
        ],
    );
    bus.set(
        ETH0_CONNECTION,
        ACTIVE,
        vec![
            ("Id", Value::from("Wired connection 1")),
            ("Uuid", Value::from(ETH0_UUID)),
            ("Type", Value::from("802-3-ethernet")),
            ("State", Value::from(2u32)),
            ("Connection", object(ETH0_SETTINGS)),
            ("Default", Value::from(true)),
            ("Default6", Value::from(false)),
            ("Ip4Config", object(ETH0_IP4)),
            ("Ip6Config", object(ETH0_IP6)),
        ],
    );
    bus.set(
        ETH0_IP4,
        IP4,
        vec![
            (
                "AddressData",
                Value::from(vec![address("192.168.2.148", 24)]),
            ),
            ("Gateway", Value::from("192.168.2.1")),
            ("NameserverData", Value::from(vec![nameserver("192.168.2.2")])),
        ],
    );
    bus.set(
        ETH0_IP6,
        IP6,
        vec![
            (
                "AddressData",
                Value::from(vec![
                    address("2a03:169:3df5:0:6be9:2588:b26a:a679", 64),
                    address("fd14:949b:c9cc:0:522b:8108:8ff8:cca3", 64),
                    address("2a03:169:3df5::2f1", 128),
                    address("fd14:949b:c9cc::2f1", 128),
                    address("fe80::ffe3:319e:c630:9f51", 64),
                ]),
            ),
            ("Gateway", Value::from("fe80::da58:d7ff:fe00:9c69")),
            (
                "Nameservers",
                Value::from(vec![
                    ipv6_bytes("2001:1620:2777:1::10"),
                    ipv6_bytes("2001:1620:2777:2::20"),
                ]),
            ),
        ],
    );

    let section = |entries: Vec<(&str, Value<'static>)>| props(entries);
    let mut settings = SettingsMap::new();
    settings.insert(
        "connection".into(),
        section(vec![
            ("id", Value::from("Wired connection 1")),
            ("uuid", Value::from(ETH0_UUID)),
            ("type", Value::from("802-3-ethernet")),
        ]),
    );
    settings.insert("ipv4".into(), section(vec![("method", Value::from("auto"))]));
    settings.insert("ipv6".into(), section(vec![("method", Value::from("auto"))]));
    bus.set_settings(ETH0_SETTINGS, settings);
}

/// A Wi-Fi device associated with one access point and no active connection.
pub fn wireless(bus: &MockBus) {
    bus.set(
        WLAN0,
        DEVICE,
        vec![
            ("Interface", Value::from("wlan0")),
            ("DeviceType", Value::from(2u32)),
            ("Managed", Value::from(true)),
            ("Driver", Value::from("iwlwifi")),
            ("State", Value::from(30u32)),
            ("HwAddress", Value::from("11:22:33:44:55:66")),
            ("ActiveConnection", object("/")),
        ],
    );
    bus.set(
        WLAN0,
        WIRELESS,
        vec![
            ("Mode", Value::from(2u32)),
            ("Bitrate", Value::from(144_400u32)),
            ("ActiveAccessPoint", object(WLAN0_AP)),
        ],
    );
    bus.set(
        WLAN0_AP,
        ACCESS_POINT,
        vec![
            ("Ssid", Value::from(b"UPC4814466".to_vec())),
            ("Strength", Value::from(47u8)),
            ("Frequency", Value::from(2462u32)),
            ("HwAddress", Value::from("E4:57:40:A9:D7:DE")),
            ("Mode", Value::from(2u32)),
        ],
    );
}

/// An unmanaged veth device.
pub fn unmanaged(bus: &MockBus) {
    bus.set(
        VETH,
        DEVICE,
        vec![
            ("Interface", Value::from("veth87bee57")),
            ("DeviceType", Value::from(20u32)),
            ("Managed", Value::from(false)),
            ("Driver", Value::from("veth")),
            ("State", Value::from(10u32)),
            ("ActiveConnection", object("/")),
        ],
    );
}
