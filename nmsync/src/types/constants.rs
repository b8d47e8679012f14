//! Constants for NetworkManager D-Bus names and interface values.
//!
//! These constants correspond to the bus names, interface names, property
//! names and numeric codes used by NetworkManager's D-Bus API.

/// Well-known bus name of the NetworkManager service.
pub const NM_SERVICE: &str = "org.freedesktop.NetworkManager";

/// Object path NetworkManager uses for "no object".
pub const NULL_PATH: &str = "/";

/// D-Bus interface names mirrored by this crate.
pub mod interface {
    pub const DEVICE: &str = "org.freedesktop.NetworkManager.Device";
    pub const DEVICE_WIRELESS: &str = "org.freedesktop.NetworkManager.Device.Wireless";
    pub const ACTIVE_CONNECTION: &str = "org.freedesktop.NetworkManager.Connection.Active";
    pub const IP4_CONFIG: &str = "org.freedesktop.NetworkManager.IP4Config";
    pub const IP6_CONFIG: &str = "org.freedesktop.NetworkManager.IP6Config";
    pub const ACCESS_POINT: &str = "org.freedesktop.NetworkManager.AccessPoint";
    pub const SETTINGS_CONNECTION: &str = "org.freedesktop.NetworkManager.Settings.Connection";
    pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";
}

/// D-Bus property names.
pub mod property {
    // Device
    pub const INTERFACE: &str = "Interface";
    pub const DEVICE_TYPE: &str = "DeviceType";
    pub const MANAGED: &str = "Managed";
    pub const DRIVER: &str = "Driver";
    pub const STATE: &str = "State";
    pub const HW_ADDRESS: &str = "HwAddress";
    pub const ACTIVE_CONNECTION: &str = "ActiveConnection";

    // Connection.Active
    pub const ID: &str = "Id";
    pub const UUID: &str = "Uuid";
    pub const TYPE: &str = "Type";
    pub const CONNECTION: &str = "Connection";
    pub const DEFAULT: &str = "Default";
    pub const DEFAULT6: &str = "Default6";
    pub const IP4_CONFIG: &str = "Ip4Config";
    pub const IP6_CONFIG: &str = "Ip6Config";

    // IP4Config / IP6Config
    pub const ADDRESS_DATA: &str = "AddressData";
    pub const GATEWAY: &str = "Gateway";
    pub const NAMESERVER_DATA: &str = "NameserverData";
    pub const NAMESERVERS: &str = "Nameservers";

    // Device.Wireless
    pub const MODE: &str = "Mode";
    pub const BITRATE: &str = "Bitrate";
    pub const ACTIVE_ACCESS_POINT: &str = "ActiveAccessPoint";

    // AccessPoint
    pub const SSID: &str = "Ssid";
    pub const STRENGTH: &str = "Strength";
    pub const FREQUENCY: &str = "Frequency";
}

/// Signal and method names.
pub mod member {
    pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";
    pub const GET_ALL: &str = "GetAll";
    pub const GET_SETTINGS: &str = "GetSettings";
}

/// NetworkManager device type constants.
pub mod device_type {
    pub const ETHERNET: u32 = 1;
    pub const WIFI: u32 = 2;
    pub const BLUETOOTH: u32 = 5;
    pub const BOND: u32 = 10;
    pub const VLAN: u32 = 11;
    pub const BRIDGE: u32 = 13;
    pub const TUN: u32 = 16;
    pub const VETH: u32 = 20;
    pub const WIREGUARD: u32 = 29;
    pub const WIFI_P2P: u32 = 30;
    pub const LOOPBACK: u32 = 32;
}

/// WiFi mode constants
pub mod wifi_mode {
    pub const UNKNOWN: u32 = 0;
    pub const ADHOC: u32 = 1;
    pub const INFRA: u32 = 2;
    pub const AP: u32 = 3;
    pub const MESH: u32 = 4;
}

/// Timeout constants for transport calls.
///
/// Every read and subscription is raced against one of these so that no
/// operation on a mirrored object can block forever on a silent bus.
pub mod timeouts {
    use std::time::Duration;

    /// Maximum time to wait for a property read or method call (5 seconds).
    const READ_TIMEOUT_SECS: u64 = 5;

    /// Maximum time to wait for a signal subscription to be set up (5 seconds).
    const SUBSCRIBE_TIMEOUT_SECS: u64 = 5;

    /// Returns the default read timeout.
    pub fn read_timeout() -> Duration {
        Duration::from_secs(READ_TIMEOUT_SECS)
    }

    /// Returns the default subscribe timeout.
    pub fn subscribe_timeout() -> Duration {
        Duration::from_secs(SUBSCRIBE_TIMEOUT_SECS)
    }
}
