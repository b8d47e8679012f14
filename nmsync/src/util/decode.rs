//! Typed decoders for property values.
//!
//! Each decoder takes the D-Bus property name (for error reporting) and the
//! received [`Value`], and either returns the fully parsed value or a
//! [`DecodeError`]. Nothing is assigned on failure, which is what lets the
//! mirror keep the previous value of a field whose update is unparseable.

use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use zvariant::{OwnedObjectPath, Value};

use crate::api::models::DecodeError;
use crate::types::constants::NULL_PATH;

/// Address family a decoder is parsing for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    V4,
    V6,
}

impl Family {
    fn max_prefix(self) -> u8 {
        match self {
            Self::V4 => 32,
            Self::V6 => 128,
        }
    }
}

/// Strips variant wrappers (`v` inside `a{sv}` and similar).
fn peel<'v, 'a>(value: &'v Value<'a>) -> &'v Value<'a> {
    match value {
        Value::Value(inner) => peel(inner),
        other => other,
    }
}

pub(crate) fn as_string(property: &'static str, value: &Value<'_>) -> Result<String, DecodeError> {
    match peel(value) {
        Value::Str(s) => Ok(s.as_str().to_string()),
        _ => Err(DecodeError::TypeMismatch {
            property,
            expected: "string",
        }),
    }
}

pub(crate) fn as_u32(property: &'static str, value: &Value<'_>) -> Result<u32, DecodeError> {
    match peel(value) {
        Value::U32(v) => Ok(*v),
        _ => Err(DecodeError::TypeMismatch {
            property,
            expected: "u32",
        }),
    }
}

pub(crate) fn as_u8(property: &'static str, value: &Value<'_>) -> Result<u8, DecodeError> {
    match peel(value) {
        Value::U8(v) => Ok(*v),
        _ => Err(DecodeError::TypeMismatch {
            property,
            expected: "byte",
        }),
    }
}

pub(crate) fn as_bool(property: &'static str, value: &Value<'_>) -> Result<bool, DecodeError> {
    match peel(value) {
        Value::Bool(v) => Ok(*v),
        _ => Err(DecodeError::TypeMismatch {
            property,
            expected: "boolean",
        }),
    }
}

/// Decodes an object path reference. The null path `/` means "no object".
pub(crate) fn object_path(
    property: &'static str,
    value: &Value<'_>,
) -> Result<Option<OwnedObjectPath>, DecodeError> {
    match peel(value) {
        Value::ObjectPath(p) if p.as_str() == NULL_PATH => Ok(None),
        Value::ObjectPath(p) => Ok(Some(OwnedObjectPath::from(p.clone()))),
        _ => Err(DecodeError::TypeMismatch {
            property,
            expected: "object path",
        }),
    }
}

/// Decodes a byte array (`ay`).
pub(crate) fn as_bytes(property: &'static str, value: &Value<'_>) -> Result<Vec<u8>, DecodeError> {
    let Value::Array(arr) = peel(value) else {
        return Err(DecodeError::TypeMismatch {
            property,
            expected: "byte array",
        });
    };

    arr.iter().map(|v| as_u8(property, v)).collect()
}

fn parse_ip(property: &'static str, text: &str, family: Family) -> Result<IpAddr, DecodeError> {
    let parsed = match family {
        Family::V4 => text.parse::<Ipv4Addr>().map(IpAddr::V4).ok(),
        Family::V6 => text.parse::<Ipv6Addr>().map(IpAddr::V6).ok(),
    };
    parsed.ok_or_else(|| DecodeError::InvalidAddress {
        property,
        value: text.to_string(),
    })
}

/// Decodes a textual gateway. NetworkManager reports "no gateway" as an empty string.
pub(crate) fn gateway(
    property: &'static str,
    value: &Value<'_>,
    family: Family,
) -> Result<Option<IpAddr>, DecodeError> {
    let text = as_string(property, value)?;
    if text.is_empty() {
        return Ok(None);
    }
    parse_ip(property, &text, family).map(Some)
}

/// Walks an `aa{sv}` value, calling `entry` with the `address` and optional
/// `prefix` of each element.
fn each_address_entry<T>(
    property: &'static str,
    value: &Value<'_>,
    mut entry: impl FnMut(&str, Option<u32>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let mismatch = || DecodeError::TypeMismatch {
        property,
        expected: "array of address dictionaries",
    };
    let Value::Array(arr) = peel(value) else {
        return Err(mismatch());
    };

    let mut out = Vec::new();
    for element in arr.iter() {
        let Value::Dict(dict) = peel(element) else {
            return Err(mismatch());
        };

        let mut address = None;
        let mut prefix = None;
        for (key, field) in dict.iter() {
            let Value::Str(key) = peel(key) else {
                continue;
            };
            match key.as_str() {
                "address" => address = Some(as_string(property, field)?),
                "prefix" => prefix = Some(as_u32(property, field)?),
                _ => {}
            }
        }

        let Some(address) = address else {
            return Err(mismatch());
        };
        out.push(entry(&address, prefix)?);
    }
    Ok(out)
}

/// Decodes `AddressData`: an ordered list of address/prefix pairs.
pub(crate) fn address_data(
    property: &'static str,
    value: &Value<'_>,
    family: Family,
) -> Result<Vec<IpNetwork>, DecodeError> {
    each_address_entry(property, value, |address, prefix| {
        let ip = parse_ip(property, address, family)?;
        let prefix = prefix.unwrap_or(u32::from(family.max_prefix()));
        let bits = u8::try_from(prefix)
            .ok()
            .filter(|bits| *bits <= family.max_prefix())
            .ok_or(DecodeError::InvalidPrefix { property, prefix })?;
        IpNetwork::new(ip, bits).map_err(|_| DecodeError::InvalidPrefix { property, prefix })
    })
}

/// Decodes `NameserverData`: an ordered list of dictionaries with an `address` key.
pub(crate) fn nameserver_data(
    property: &'static str,
    value: &Value<'_>,
    family: Family,
) -> Result<Vec<IpAddr>, DecodeError> {
    each_address_entry(property, value, |address, _| {
        parse_ip(property, address, family)
    })
}

/// Decodes an `aay` list of raw addresses (4 or 16 bytes each).
pub(crate) fn byte_addresses(
    property: &'static str,
    value: &Value<'_>,
    family: Family,
) -> Result<Vec<IpAddr>, DecodeError> {
    let Value::Array(arr) = peel(value) else {
        return Err(DecodeError::TypeMismatch {
            property,
            expected: "array of byte arrays",
        });
    };

    arr.iter()
        .map(|raw| {
            let raw = as_bytes(property, raw)?;
            match (family, raw.len()) {
                (Family::V4, 4) => Ok(IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))),
                (Family::V6, 16) => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(&raw);
                    Ok(IpAddr::V6(Ipv6Addr::from(octets)))
                }
                _ => Err(DecodeError::InvalidAddress {
                    property,
                    value: format!("{raw:?}"),
                }),
            }
        })
        .collect()
}

/// Decodes an `au` list of IPv4 addresses stored in network byte order.
pub(crate) fn packed_ipv4(property: &'static str, value: &Value<'_>) -> Result<Vec<IpAddr>, DecodeError> {
    let Value::Array(arr) = peel(value) else {
        return Err(DecodeError::TypeMismatch {
            property,
            expected: "array of u32",
        });
    };

    arr.iter()
        .map(|raw| {
            let raw = as_u32(property, raw)?;
            Ok(IpAddr::V4(Ipv4Addr::from(u32::from_be(raw))))
        })
        .collect()
}
