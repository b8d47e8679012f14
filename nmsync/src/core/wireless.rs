//! Wireless device mirroring.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::{AccessPointInfo, WifiMode, WirelessProperties};
use crate::core::facet::{Facet, FacetCore, FacetSlot, Staged, start_monitor};
use crate::core::mirror::Field;
use crate::core::monitor::LostSender;
use crate::dbus::{BusHandle, PropertiesChanged, PropertyMap};
use crate::types::constants::{interface, property};
use crate::util::decode;

pub(crate) static WIRELESS_FIELDS: &[Field<WirelessProperties>] = &[
    Field::new(property::MODE, |s, v| {
        s.mode = decode::as_u32(property::MODE, v)?.into();
        Ok(())
    }),
    Field::new(property::BITRATE, |s, v| {
        s.bitrate = decode::as_u32(property::BITRATE, v)?;
        Ok(())
    }),
    Field::new(property::ACTIVE_ACCESS_POINT, |s, v| {
        s.active_access_point = decode::object_path(property::ACTIVE_ACCESS_POINT, v)?;
        Ok(())
    }),
];

pub(crate) static ACCESS_POINT_FIELDS: &[Field<AccessPointInfo>] = &[
    Field::new(property::SSID, |s, v| {
        let raw = decode::as_bytes(property::SSID, v)?;
        s.ssid = String::from_utf8_lossy(&raw).into_owned();
        Ok(())
    }),
    Field::new(property::STRENGTH, |s, v| {
        s.strength = decode::as_u8(property::STRENGTH, v)?;
        Ok(())
    }),
    Field::new(property::FREQUENCY, |s, v| {
        s.frequency = decode::as_u32(property::FREQUENCY, v)?;
        Ok(())
    }),
    Field::new(property::HW_ADDRESS, |s, v| {
        s.hw_address = decode::as_string(property::HW_ADDRESS, v)?;
        Ok(())
    }),
    Field::new(property::MODE, |s, v| {
        s.mode = decode::as_u32(property::MODE, v)?.into();
        Ok(())
    }),
];

type AccessPointFacet = FacetCore<AccessPointInfo>;

/// Live mirror of the wireless side of a Wi-Fi device.
///
/// Exists only while the owning interface reports a wireless device type.
/// Signal strength and SSID come from the access point the device is
/// associated with, and are absent while it is not associated.
pub struct WirelessFacet {
    core: FacetCore<WirelessProperties>,
    access_point: FacetSlot<AccessPointFacet>,
    children: LostSender,
}

impl WirelessFacet {
    /// Subscribes to the `Device.Wireless` interface of the device at `path`.
    pub(crate) async fn connect(
        bus: BusHandle,
        path: OwnedObjectPath,
        parent: LostSender,
    ) -> Result<Arc<Self>> {
        let (core, stream, snapshot) =
            FacetCore::subscribe(bus, path, interface::DEVICE_WIRELESS, WIRELESS_FIELDS).await?;
        let (children, lost) = mpsc::unbounded_channel();
        let facet = Arc::new(Self {
            core,
            access_point: FacetSlot::default(),
            children,
        });

        let initial = facet.core.mirror().stage(&snapshot, &PropertyMap::new());
        let ap = facet
            .access_point
            .prepare(initial.active_access_point.as_ref(), |p| {
                facet.open_access_point(p)
            })
            .await;
        facet.core.mirror().commit(initial);
        facet.access_point.install(ap);

        let monitor = start_monitor(&facet, stream, Some(lost), parent);
        facet.core.attachment().hold(monitor);
        debug!("Wireless facet attached at {}", facet.object_path().as_str());
        Ok(facet)
    }

    async fn open_access_point(&self, path: OwnedObjectPath) -> Result<Arc<AccessPointFacet>> {
        FacetCore::open_leaf(
            self.core.bus().clone(),
            path,
            interface::ACCESS_POINT,
            ACCESS_POINT_FIELDS,
            self.children.clone(),
        )
        .await
    }

    /// Object path of the device this facet belongs to.
    pub fn object_path(&self) -> &OwnedObjectPath {
        self.core.mirror().path()
    }

    /// `true` while owned by an interface and receiving updates.
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Operating mode of the device.
    pub fn mode(&self) -> WifiMode {
        self.core.mirror().read(|p| p.mode)
    }

    /// Current bitrate in kbit/s.
    pub fn bitrate(&self) -> u32 {
        self.core.mirror().read(|p| p.bitrate)
    }

    /// Path of the access point the device is associated with.
    pub fn active_access_point(&self) -> Option<OwnedObjectPath> {
        self.core.mirror().read(|p| p.active_access_point.clone())
    }

    /// The associated access point, if any.
    pub fn access_point(&self) -> Option<AccessPointInfo> {
        self.access_point.get().map(|ap| ap.mirror().snapshot())
    }

    /// SSID of the associated network.
    pub fn ssid(&self) -> Option<String> {
        self.access_point
            .get()
            .map(|ap| ap.mirror().read(|info| info.ssid.clone()))
    }

    /// Signal quality of the associated access point, in percent.
    pub fn strength(&self) -> Option<u8> {
        self.access_point
            .get()
            .map(|ap| ap.mirror().read(|info| info.strength))
    }

    /// All mirrored device properties at once.
    pub fn properties(&self) -> WirelessProperties {
        self.core.mirror().snapshot()
    }

    /// Notifies on every committed change of the wireless device properties.
    pub fn watch(&self) -> watch::Receiver<WirelessProperties> {
        self.core.mirror().watch()
    }
}

#[async_trait]
impl Facet for WirelessFacet {
    fn object_path(&self) -> &OwnedObjectPath {
        self.core.mirror().path()
    }

    fn mark_disconnected(&self) {
        if self.core.attachment().detach() {
            self.access_point.freeze();
            debug!("Wireless facet {} marked disconnected", self.object_path().as_str());
        }
    }

    async fn apply(&self, batch: &PropertiesChanged) -> Result<()> {
        let (_gate, next) = self.core.begin(batch).await?;

        let ap = if batch.touches(property::ACTIVE_ACCESS_POINT) {
            self.access_point
                .prepare(next.active_access_point.as_ref(), |p| {
                    self.open_access_point(p)
                })
                .await
        } else {
            Staged::Keep
        };

        let committed = self.core.attachment().commit_with(ap, |ap| {
            self.core.mirror().commit(next);
            self.access_point.install(ap);
        });
        committed.map_err(|ap| {
            ap.discard();
            self.core.not_synchronized()
        })
    }

    async fn read_all(&self) -> Result<PropertyMap> {
        self.core.fetch_all().await
    }

    async fn child_lost(&self, path: &OwnedObjectPath) {
        let _gate = self.core.lock().await;
        self.access_point.release_if(path);
    }
}

impl Drop for WirelessFacet {
    fn drop(&mut self) {
        self.mark_disconnected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mirror::{PropertyMirror, validate_table};
    use zvariant::{OwnedValue, Value};

    #[test]
    fn tables_are_valid() {
        assert!(validate_table(WIRELESS_FIELDS).is_ok());
        assert!(validate_table(ACCESS_POINT_FIELDS).is_ok());
    }

    #[test]
    fn access_point_ssid_is_decoded_lossily() {
        let mirror = PropertyMirror::new(
            OwnedObjectPath::try_from("/org/freedesktop/NetworkManager/AccessPoint/7").unwrap(),
            interface::ACCESS_POINT,
            ACCESS_POINT_FIELDS,
        );
        let props: PropertyMap = [
            ("Ssid", Value::from(vec![b'c', b'a', b'f', 0xff])),
            ("Strength", Value::from(72u8)),
            ("Frequency", Value::from(5180u32)),
            ("Mode", Value::from(2u32)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), OwnedValue::try_from(v).unwrap()))
        .collect();

        mirror.initialize(&props);
        let info = mirror.snapshot();
        assert_eq!(info.ssid, "caf\u{fffd}");
        assert_eq!(info.strength, 72);
        assert_eq!(info.frequency, 5180);
        assert_eq!(info.mode, WifiMode::Infrastructure);
    }
}
