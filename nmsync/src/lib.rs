//! A live, in-process mirror of NetworkManager device state.
//!
//! `nmsync` keeps local copies of NetworkManager's D-Bus objects up to date
//! purely from `PropertiesChanged` notifications, without polling:
//!
//! - [`NetworkInterface`] mirrors one device and decides, once, whether it is
//!   synchronized at all (only managed devices are)
//! - [`ConnectionFacet`] mirrors the device's active connection, including its
//!   IPv4 and IPv6 addressing
//! - [`WirelessFacet`] mirrors the Wi-Fi side of a wireless device
//! - [`SettingsSnapshot`] is a one-shot read of a saved connection profile
//!
//! Facets are owned by their interface and swapped as NetworkManager replaces
//! them. Code holding an old facet keeps a valid object whose
//! `is_connected()` has turned `false`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nmsync::{NetworkInterface, ZbusTransport};
//!
//! # async fn example() -> nmsync::Result<()> {
//! let bus = Arc::new(ZbusTransport::new().await?);
//! let iface = NetworkInterface::new("/org/freedesktop/NetworkManager/Devices/3".try_into()?);
//! iface.connect(bus).await?;
//!
//! println!("{} ({}) managed={}", iface.name(), iface.device_type(), iface.managed());
//!
//! if let Some(wifi) = iface.wireless() {
//!     println!("SSID {:?} at {:?}%", wifi.ssid(), wifi.strength());
//! }
//!
//! // React to changes instead of polling.
//! let mut changes = iface.watch();
//! while changes.changed().await.is_ok() {
//!     println!("state is now {}", iface.state());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Operations return `Result<T, MirrorError>`. Nothing in this crate is fatal
//! to the process: an undecodable value leaves its field at the previous
//! value, a failed read leaves a facet absent, and a vanished object releases
//! whatever depended on it.
//!
//! # Runtime
//!
//! Each subscribed object is serviced by its own task spawned with
//! `tokio::spawn`, so [`NetworkInterface::connect`] must run inside a Tokio
//! runtime.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`. For example:
//!
//! ```no_run,ignore
//! env_logger::init();
//! // ...
//! ```

// Internal implementation modules
mod core;
mod types;
mod util;

// Public API modules
pub mod api;
pub mod dbus;

// Re-exported public API
pub use api::config::TimeoutConfig;
pub use api::models::{
    AccessPointInfo, ActiveConnectionProperties, ActiveConnectionState, DecodeError,
    DeviceProperties, DeviceState, DeviceType, InterfaceMethod, IpConfiguration, MirrorError,
    SyncState, WifiMode, WirelessProperties,
};
pub use crate::core::connection::ConnectionFacet;
pub use crate::core::interface::NetworkInterface;
pub use crate::core::settings::{ConnectionSettings, IpSettings, SettingsSnapshot, WirelessSettings};
pub use crate::core::wireless::WirelessFacet;
pub use dbus::{Bus, BusHandle, PropertiesChanged, PropertyMap, ZbusTransport};

/// A specialized `Result` type for mirroring operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
