//! Value types and errors.
//!
//! Decoded snapshots of the mirrored objects, the NetworkManager code enums
//! they use, and [`MirrorError`].

use ipnetwork::IpNetwork;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use thiserror::Error;
use zvariant::OwnedObjectPath;

use crate::types::constants::{device_type, wifi_mode};

/// NetworkManager active connection state.
///
/// These values represent the lifecycle states of an active connection
/// as reported by the NM D-Bus API. Codes without a named variant are
/// carried through unchanged in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ActiveConnectionState {
    /// Connection state is unknown.
    #[default]
    Unknown,
    /// Connection is activating (connecting).
    Activating,
    /// Connection is fully activated (connected).
    Activated,
    /// Connection is deactivating (disconnecting).
    Deactivating,
    /// Connection is fully deactivated (disconnected).
    Deactivated,
    /// Unknown state code not mapped to a specific variant.
    Other(u32),
}

impl ActiveConnectionState {
    /// Returns the raw NetworkManager state code.
    pub fn to_code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Activating => 1,
            Self::Activated => 2,
            Self::Deactivating => 3,
            Self::Deactivated => 4,
            Self::Other(v) => v,
        }
    }
}

impl From<u32> for ActiveConnectionState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Activating,
            2 => Self::Activated,
            3 => Self::Deactivating,
            4 => Self::Deactivated,
            v => Self::Other(v),
        }
    }
}

impl Display for ActiveConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Deactivating => write!(f, "deactivating"),
            Self::Deactivated => write!(f, "deactivated"),
            Self::Other(v) => write!(f, "unknown state ({v})"),
        }
    }
}

/// NetworkManager device types.
///
/// Represents the type of network hardware behind a device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeviceType {
    /// Wired Ethernet device.
    Ethernet,
    /// Wi-Fi (802.11) wireless device.
    Wifi,
    /// Bluetooth
    Bluetooth,
    /// Bonded interface.
    Bond,
    /// 802.1Q VLAN interface.
    Vlan,
    /// Bridge interface.
    Bridge,
    /// TUN or TAP interface.
    Tun,
    /// Virtual ethernet pair.
    Veth,
    /// WireGuard interface.
    WireGuard,
    /// Wi-Fi P2P (peer-to-peer) device.
    WifiP2P,
    /// Loopback device (localhost).
    Loopback,
    /// Type reported as "unknown" by NetworkManager.
    #[default]
    Unknown,
    /// Unsupported device type with raw code.
    Other(u32),
}

impl DeviceType {
    /// Returns the raw NetworkManager type code for this device.
    pub fn to_code(self) -> u32 {
        match self {
            Self::Ethernet => device_type::ETHERNET,
            Self::Wifi => device_type::WIFI,
            Self::Bluetooth => device_type::BLUETOOTH,
            Self::Bond => device_type::BOND,
            Self::Vlan => device_type::VLAN,
            Self::Bridge => device_type::BRIDGE,
            Self::Tun => device_type::TUN,
            Self::Veth => device_type::VETH,
            Self::WireGuard => device_type::WIREGUARD,
            Self::WifiP2P => device_type::WIFI_P2P,
            Self::Loopback => device_type::LOOPBACK,
            Self::Unknown => 0,
            Self::Other(code) => code,
        }
    }

    /// Returns `true` for Wi-Fi devices, the only type that owns a wireless facet.
    pub fn is_wireless(self) -> bool {
        matches!(self, Self::Wifi)
    }
}

impl From<u32> for DeviceType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Unknown,
            device_type::ETHERNET => Self::Ethernet,
            device_type::WIFI => Self::Wifi,
            device_type::BLUETOOTH => Self::Bluetooth,
            device_type::BOND => Self::Bond,
            device_type::VLAN => Self::Vlan,
            device_type::BRIDGE => Self::Bridge,
            device_type::TUN => Self::Tun,
            device_type::VETH => Self::Veth,
            device_type::WIREGUARD => Self::WireGuard,
            device_type::WIFI_P2P => Self::WifiP2P,
            device_type::LOOPBACK => Self::Loopback,
            v => Self::Other(v),
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ethernet => write!(f, "Ethernet"),
            Self::Wifi => write!(f, "Wi-Fi"),
            Self::Bluetooth => write!(f, "Bluetooth"),
            Self::Bond => write!(f, "Bond"),
            Self::Vlan => write!(f, "VLAN"),
            Self::Bridge => write!(f, "Bridge"),
            Self::Tun => write!(f, "TUN"),
            Self::Veth => write!(f, "Veth"),
            Self::WireGuard => write!(f, "WireGuard"),
            Self::WifiP2P => write!(f, "Wi-Fi P2P"),
            Self::Loopback => write!(f, "Loopback"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Other(v) => write!(f, "Other({v})"),
        }
    }
}

/// NetworkManager device states.
///
/// Represents the current operational state of a network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeviceState {
    /// State has not been reported yet.
    #[default]
    Unknown,
    /// Device is not managed by NetworkManager.
    Unmanaged,
    /// Device is managed but not yet available (e.g., Wi-Fi disabled).
    Unavailable,
    /// Device is available but not connected.
    Disconnected,
    /// Device is preparing to connect.
    Prepare,
    /// Device is being configured (IP, etc.).
    Config,
    /// Device is fully connected and operational.
    Activated,
    /// Device is disconnecting.
    Deactivating,
    /// Device connection failed.
    Failed,
    /// Unknown or unsupported state with raw code.
    Other(u32),
}

impl From<u32> for DeviceState {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Unknown,
            10 => Self::Unmanaged,
            20 => Self::Unavailable,
            30 => Self::Disconnected,
            40 => Self::Prepare,
            50 => Self::Config,
            100 => Self::Activated,
            110 => Self::Deactivating,
            120 => Self::Failed,
            v => Self::Other(v),
        }
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Unmanaged => write!(f, "Unmanaged"),
            Self::Unavailable => write!(f, "Unavailable"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Prepare => write!(f, "Preparing"),
            Self::Config => write!(f, "Configuring"),
            Self::Activated => write!(f, "Activated"),
            Self::Deactivating => write!(f, "Deactivating"),
            Self::Failed => write!(f, "Failed"),
            Self::Other(v) => write!(f, "Other({v})"),
        }
    }
}

/// Operating mode of a wireless device or access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WifiMode {
    /// Mode not known or not yet reported.
    #[default]
    Unknown,
    /// Ad-hoc (IBSS) network.
    Adhoc,
    /// Infrastructure mode, connected to an access point.
    Infrastructure,
    /// The device itself is acting as an access point (hotspot).
    AccessPoint,
    /// 802.11s mesh point.
    Mesh,
    /// Unrecognized mode code.
    Other(u32),
}

impl From<u32> for WifiMode {
    fn from(value: u32) -> Self {
        match value {
            wifi_mode::UNKNOWN => Self::Unknown,
            wifi_mode::ADHOC => Self::Adhoc,
            wifi_mode::INFRA => Self::Infrastructure,
            wifi_mode::AP => Self::AccessPoint,
            wifi_mode::MESH => Self::Mesh,
            v => Self::Other(v),
        }
    }
}

impl WifiMode {
    /// Parses the mode string used in connection settings (`802-11-wireless.mode`).
    pub fn from_setting(value: &str) -> Self {
        match value {
            "adhoc" => Self::Adhoc,
            "infrastructure" => Self::Infrastructure,
            "ap" => Self::AccessPoint,
            "mesh" => Self::Mesh,
            _ => Self::Unknown,
        }
    }
}

impl Display for WifiMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Adhoc => write!(f, "Adhoc"),
            Self::Infrastructure => write!(f, "Infra"),
            Self::AccessPoint => write!(f, "AP"),
            Self::Mesh => write!(f, "Mesh"),
            Self::Other(v) => write!(f, "Other({v})"),
        }
    }
}

/// IP configuration method of a connection profile, per address family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InterfaceMethod {
    /// Addresses obtained automatically (DHCP, SLAAC).
    Auto,
    /// Statically configured addresses.
    Manual,
    /// The address family is disabled on this connection.
    Disabled,
    /// Only a link-local address is configured.
    LinkLocal,
    /// The connection shares its uplink with other hosts.
    Shared,
    /// A method string this crate does not know, passed through as received.
    Other(String),
}

impl From<&str> for InterfaceMethod {
    fn from(value: &str) -> Self {
        match value {
            "auto" => Self::Auto,
            "manual" => Self::Manual,
            "disabled" => Self::Disabled,
            "link-local" => Self::LinkLocal,
            "shared" => Self::Shared,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for InterfaceMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::Disabled => write!(f, "disabled"),
            Self::LinkLocal => write!(f, "link-local"),
            Self::Shared => write!(f, "shared"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Addressing of one address family on an active connection.
///
/// Each field is replaced as a whole when the remote object reports a change;
/// the sequences are never patched element by element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IpConfiguration {
    /// Configured addresses with their prefix length, in the order reported.
    pub address: Vec<IpNetwork>,
    /// Default gateway, if any.
    pub gateway: Option<IpAddr>,
    /// DNS servers, in priority order.
    pub nameservers: Vec<IpAddr>,
}

/// Snapshot of the access point a wireless device is associated with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AccessPointInfo {
    /// Network name. Non UTF-8 bytes are replaced.
    pub ssid: String,
    /// Signal quality in percent (0-100).
    pub strength: u8,
    /// Radio frequency in MHz.
    pub frequency: u32,
    /// BSSID of the access point.
    pub hw_address: String,
    /// Mode the access point operates in.
    pub mode: WifiMode,
}

/// Mirrored properties of a NetworkManager device.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeviceProperties {
    /// Kernel interface name, e.g. `eth0`.
    pub name: String,
    /// Kind of device.
    pub device_type: DeviceType,
    /// Whether NetworkManager manages the device.
    pub managed: bool,
    /// Kernel driver name.
    pub driver: String,
    /// Device state.
    pub state: DeviceState,
    /// Hardware (MAC) address.
    pub hw_address: String,
    /// Active connection on the device, if any.
    pub active_connection: Option<OwnedObjectPath>,
}

/// Mirrored properties of an active connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ActiveConnectionProperties {
    /// Profile name.
    pub id: String,
    /// Profile UUID.
    pub uuid: String,
    /// Profile type, e.g. `802-3-ethernet`.
    pub connection_type: String,
    /// Activation state.
    pub state: ActiveConnectionState,
    /// Settings connection the profile was activated from.
    pub settings_path: Option<OwnedObjectPath>,
    /// Whether this connection owns the IPv4 default route.
    pub default4: bool,
    /// Whether this connection owns the IPv6 default route.
    pub default6: bool,
    /// IPv4 configuration object, if any.
    pub ip4_config: Option<OwnedObjectPath>,
    /// IPv6 configuration object, if any.
    pub ip6_config: Option<OwnedObjectPath>,
}

/// Mirrored properties of a wireless device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WirelessProperties {
    /// Operating mode of the device.
    pub mode: WifiMode,
    /// Current bitrate in kbit/s.
    pub bitrate: u32,
    /// Access point the device is associated with, if any.
    pub active_access_point: Option<OwnedObjectPath>,
}

/// Synchronization lifecycle of a [`NetworkInterface`](crate::NetworkInterface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// `connect` has not been called yet.
    #[default]
    Unsubscribed,
    /// Managed device found; subscription and facets are being set up.
    Subscribing,
    /// Property changes are being applied as they arrive.
    Synced,
    /// Device is not managed by NetworkManager. Nothing is synchronized.
    Unmanaged,
}

impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::Subscribing => write!(f, "subscribing"),
            Self::Synced => write!(f, "synced"),
            Self::Unmanaged => write!(f, "unmanaged"),
        }
    }
}

/// A single property value that could not be decoded.
///
/// Decode errors never abort a batch: the field keeps its previous value
/// and the error is logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The value had a different D-Bus type than the property expects.
    #[error("property {property}: expected {expected}")]
    TypeMismatch {
        /// Property name.
        property: &'static str,
        /// Human readable description of the expected type.
        expected: &'static str,
    },

    /// The value had the right type but is not a valid address.
    #[error("property {property}: invalid address '{value}'")]
    InvalidAddress {
        /// Property name.
        property: &'static str,
        /// The offending text or byte representation.
        value: String,
    },

    /// A prefix length out of range for the address family.
    #[error("property {property}: invalid prefix length {prefix}")]
    InvalidPrefix {
        /// Property name.
        property: &'static str,
        /// The offending prefix.
        prefix: u32,
    },
}

/// Errors that can occur while mirroring NetworkManager objects.
///
/// None of these are fatal to the process; each one degrades to a single
/// stale or absent field or facet.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A value or object path was not valid D-Bus data.
    #[error("invalid D-Bus value: {0}")]
    Variant(#[from] zvariant::Error),

    /// A one-shot read failed because the remote object vanished or the
    /// transport errored.
    #[error("failed to read {path}: {reason}")]
    RemoteRead {
        /// Object path that was read.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The remote object no longer exists; its notification stream ended.
    #[error("subscription lost for {0}")]
    SubscriptionLost(String),

    /// A property batch was offered to an object that does not synchronize:
    /// an unmanaged interface, one not yet connected, or a released facet.
    #[error("{0} does not synchronize properties")]
    NotSynchronized(String),

    /// A property value could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A transport call did not complete in time.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_connection_state_from_u32() {
        assert_eq!(ActiveConnectionState::from(0), ActiveConnectionState::Unknown);
        assert_eq!(ActiveConnectionState::from(2), ActiveConnectionState::Activated);
        assert_eq!(ActiveConnectionState::from(4), ActiveConnectionState::Deactivated);
        assert_eq!(ActiveConnectionState::from(9), ActiveConnectionState::Other(9));
    }

    #[test]
    fn active_connection_state_code_passthrough() {
        for code in [0, 1, 2, 3, 4, 17, 999] {
            assert_eq!(ActiveConnectionState::from(code).to_code(), code);
        }
    }

    #[test]
    fn device_type_from_u32_all_variants() {
        assert_eq!(DeviceType::from(1), DeviceType::Ethernet);
        assert_eq!(DeviceType::from(2), DeviceType::Wifi);
        assert_eq!(DeviceType::from(20), DeviceType::Veth);
        assert_eq!(DeviceType::from(30), DeviceType::WifiP2P);
        assert_eq!(DeviceType::from(32), DeviceType::Loopback);
        assert_eq!(DeviceType::from(0), DeviceType::Unknown);
        assert_eq!(DeviceType::from(999), DeviceType::Other(999));
    }

    #[test]
    fn device_type_only_wifi_is_wireless() {
        assert!(DeviceType::Wifi.is_wireless());
        assert!(!DeviceType::WifiP2P.is_wireless());
        assert!(!DeviceType::Ethernet.is_wireless());
        assert!(!DeviceType::Other(2000).is_wireless());
    }

    #[test]
    fn device_type_display() {
        assert_eq!(format!("{}", DeviceType::Ethernet), "Ethernet");
        assert_eq!(format!("{}", DeviceType::Wifi), "Wi-Fi");
        assert_eq!(format!("{}", DeviceType::Other(42)), "Other(42)");
    }

    #[test]
    fn device_state_from_u32() {
        assert_eq!(DeviceState::from(10), DeviceState::Unmanaged);
        assert_eq!(DeviceState::from(100), DeviceState::Activated);
        assert_eq!(DeviceState::from(120), DeviceState::Failed);
        assert_eq!(DeviceState::from(7), DeviceState::Other(7));
    }

    #[test]
    fn wifi_mode_from_code_and_setting() {
        assert_eq!(WifiMode::from(2), WifiMode::Infrastructure);
        assert_eq!(WifiMode::from(3), WifiMode::AccessPoint);
        assert_eq!(WifiMode::from(8), WifiMode::Other(8));
        assert_eq!(WifiMode::from_setting("ap"), WifiMode::AccessPoint);
        assert_eq!(WifiMode::from_setting("bogus"), WifiMode::Unknown);
    }

    #[test]
    fn interface_method_parsing() {
        assert_eq!(InterfaceMethod::from("auto"), InterfaceMethod::Auto);
        assert_eq!(InterfaceMethod::from("manual"), InterfaceMethod::Manual);
        assert_eq!(InterfaceMethod::from("disabled"), InterfaceMethod::Disabled);
        assert_eq!(InterfaceMethod::from("link-local"), InterfaceMethod::LinkLocal);
        assert_eq!(InterfaceMethod::from("shared"), InterfaceMethod::Shared);
        assert_eq!(
            InterfaceMethod::from("ignore"),
            InterfaceMethod::Other("ignore".into())
        );
        assert_eq!(InterfaceMethod::Other("ignore".into()).to_string(), "ignore");
    }

    #[test]
    fn error_display() {
        assert_eq!(
            MirrorError::NotSynchronized("/dev/35".into()).to_string(),
            "/dev/35 does not synchronize properties"
        );
        assert_eq!(
            DecodeError::TypeMismatch {
                property: "State",
                expected: "u32"
            }
            .to_string(),
            "property State: expected u32"
        );
    }
}
