//! One-shot reads of saved connection profiles.
//!
//! Unlike the facets, a [`SettingsSnapshot`] is not kept live: it is read once
//! with `GetSettings` and describes the profile as it was at that moment.

use ipnetwork::IpNetwork;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use zvariant::{ObjectPath, OwnedValue};

use crate::Result;
use crate::api::models::{DecodeError, InterfaceMethod, MirrorError, WifiMode};
use crate::dbus::{Bus, SettingsMap};
use crate::util::decode::{self, Family};

type Section = HashMap<String, OwnedValue>;

/// The `connection` section of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionSettings {
    /// Profile name, e.g. "Wired connection 1".
    pub id: String,
    /// Profile UUID.
    pub uuid: String,
    /// Profile type, e.g. `802-3-ethernet`.
    pub connection_type: String,
    /// Interface the profile is bound to, if any.
    pub interface_name: Option<String>,
}

/// The `ipv4` or `ipv6` section of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpSettings {
    /// How addresses are obtained.
    pub method: InterfaceMethod,
    /// Statically configured addresses.
    pub addresses: Vec<IpNetwork>,
    /// Statically configured gateway.
    pub gateway: Option<IpAddr>,
    /// Statically configured DNS servers.
    pub dns: Vec<IpAddr>,
}

/// The `802-11-wireless` section of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WirelessSettings {
    /// Network name.
    pub ssid: String,
    /// Mode the profile connects in.
    pub mode: WifiMode,
}

/// A saved connection profile as read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    /// General profile information.
    pub connection: ConnectionSettings,
    /// IPv4 configuration, if the profile has one.
    pub ipv4: Option<IpSettings>,
    /// IPv6 configuration, if the profile has one.
    pub ipv6: Option<IpSettings>,
    /// Wireless configuration, for Wi-Fi profiles.
    pub wireless: Option<WirelessSettings>,
}

impl SettingsSnapshot {
    /// Reads the profile at `path`.
    ///
    /// Fails with [`MirrorError::RemoteRead`] if the object is gone or its
    /// settings cannot be parsed. Nothing is retried.
    pub async fn fetch(bus: &dyn Bus, path: &ObjectPath<'_>) -> Result<Self> {
        let settings = bus.get_settings(path).await?;
        let snapshot = Self::parse(&settings).map_err(|reason| MirrorError::RemoteRead {
            path: path.to_string(),
            reason,
        })?;
        debug!(
            "Read settings '{}' from {path}",
            snapshot.connection.id
        );
        Ok(snapshot)
    }

    /// Builds a snapshot from a `GetSettings` reply.
    pub(crate) fn parse(settings: &SettingsMap) -> std::result::Result<Self, String> {
        let connection = settings
            .get("connection")
            .ok_or_else(|| "missing connection section".to_string())?;

        Self::from_sections(connection, settings).map_err(|e| e.to_string())
    }

    fn from_sections(
        connection: &Section,
        settings: &SettingsMap,
    ) -> std::result::Result<Self, DecodeError> {
        Ok(Self {
            connection: connection_section(connection)?,
            ipv4: settings
                .get("ipv4")
                .map(|s| ip_section(s, Family::V4))
                .transpose()?,
            ipv6: settings
                .get("ipv6")
                .map(|s| ip_section(s, Family::V6))
                .transpose()?,
            wireless: settings
                .get("802-11-wireless")
                .map(wireless_section)
                .transpose()?,
        })
    }
}

fn optional_string(
    section: &Section,
    key: &'static str,
) -> std::result::Result<Option<String>, DecodeError> {
    section
        .get(key)
        .map(|v| decode::as_string(key, v))
        .transpose()
}

fn connection_section(section: &Section) -> std::result::Result<ConnectionSettings, DecodeError> {
    Ok(ConnectionSettings {
        id: optional_string(section, "id")?.unwrap_or_default(),
        uuid: optional_string(section, "uuid")?.unwrap_or_default(),
        connection_type: optional_string(section, "type")?.unwrap_or_default(),
        interface_name: optional_string(section, "interface-name")?,
    })
}

fn ip_section(section: &Section, family: Family) -> std::result::Result<IpSettings, DecodeError> {
    let method = optional_string(section, "method")?
        .map(|m| InterfaceMethod::from(m.as_str()))
        .unwrap_or(InterfaceMethod::Auto);

    let addresses = match section.get("address-data") {
        Some(v) => decode::address_data("address-data", v, family)?,
        None => Vec::new(),
    };
    let gateway = match section.get("gateway") {
        Some(v) => decode::gateway("gateway", v, family)?,
        None => None,
    };
    let dns = match (section.get("dns"), family) {
        (Some(v), Family::V4) => decode::packed_ipv4("dns", v)?,
        (Some(v), Family::V6) => decode::byte_addresses("dns", v, Family::V6)?,
        (None, _) => Vec::new(),
    };

    Ok(IpSettings {
        method,
        addresses,
        gateway,
        dns,
    })
}

fn wireless_section(section: &Section) -> std::result::Result<WirelessSettings, DecodeError> {
    let ssid = match section.get("ssid") {
        Some(v) => String::from_utf8_lossy(&decode::as_bytes("ssid", v)?).into_owned(),
        None => String::new(),
    };
    let mode = optional_string(section, "mode")?
        .map(|m| WifiMode::from_setting(&m))
        .unwrap_or_default();
    Ok(WirelessSettings { ssid, mode })
}
