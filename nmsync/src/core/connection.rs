//! Active connection mirroring.
//!
//! A [`ConnectionFacet`] mirrors one `Connection.Active` object and owns the
//! `IP4Config` / `IP6Config` objects it references, swapping them with the
//! same rules an interface applies to its active connection.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::{ActiveConnectionProperties, ActiveConnectionState, IpConfiguration};
use crate::core::facet::{Facet, FacetCore, FacetSlot, Staged, start_monitor};
use crate::core::mirror::Field;
use crate::core::monitor::LostSender;
use crate::dbus::{BusHandle, PropertiesChanged, PropertyMap};
use crate::types::constants::{interface, property};
use crate::util::decode::{self, Family};

pub(crate) static ACTIVE_CONNECTION_FIELDS: &[Field<ActiveConnectionProperties>] = &[
    Field::new(property::ID, |s, v| {
        s.id = decode::as_string(property::ID, v)?;
        Ok(())
    }),
    Field::new(property::UUID, |s, v| {
        s.uuid = decode::as_string(property::UUID, v)?;
        Ok(())
    }),
    Field::new(property::TYPE, |s, v| {
        s.connection_type = decode::as_string(property::TYPE, v)?;
        Ok(())
    }),
    Field::new(property::STATE, |s, v| {
        s.state = decode::as_u32(property::STATE, v)?.into();
        Ok(())
    }),
    Field::new(property::CONNECTION, |s, v| {
        s.settings_path = decode::object_path(property::CONNECTION, v)?;
        Ok(())
    }),
    Field::new(property::DEFAULT, |s, v| {
        s.default4 = decode::as_bool(property::DEFAULT, v)?;
        Ok(())
    }),
    Field::new(property::DEFAULT6, |s, v| {
        s.default6 = decode::as_bool(property::DEFAULT6, v)?;
        Ok(())
    }),
    Field::new(property::IP4_CONFIG, |s, v| {
        s.ip4_config = decode::object_path(property::IP4_CONFIG, v)?;
        Ok(())
    }),
    Field::new(property::IP6_CONFIG, |s, v| {
        s.ip6_config = decode::object_path(property::IP6_CONFIG, v)?;
        Ok(())
    }),
];

pub(crate) static IP4_FIELDS: &[Field<IpConfiguration>] = &[
    Field::new(property::ADDRESS_DATA, |s, v| {
        s.address = decode::address_data(property::ADDRESS_DATA, v, Family::V4)?;
        Ok(())
    }),
    Field::new(property::GATEWAY, |s, v| {
        s.gateway = decode::gateway(property::GATEWAY, v, Family::V4)?;
        Ok(())
    }),
    Field::new(property::NAMESERVER_DATA, |s, v| {
        s.nameservers = decode::nameserver_data(property::NAMESERVER_DATA, v, Family::V4)?;
        Ok(())
    }),
];

pub(crate) static IP6_FIELDS: &[Field<IpConfiguration>] = &[
    Field::new(property::ADDRESS_DATA, |s, v| {
        s.address = decode::address_data(property::ADDRESS_DATA, v, Family::V6)?;
        Ok(())
    }),
    Field::new(property::GATEWAY, |s, v| {
        s.gateway = decode::gateway(property::GATEWAY, v, Family::V6)?;
        Ok(())
    }),
    Field::new(property::NAMESERVERS, |s, v| {
        s.nameservers = decode::byte_addresses(property::NAMESERVERS, v, Family::V6)?;
        Ok(())
    }),
];

type IpConfigFacet = FacetCore<IpConfiguration>;

/// Live mirror of one active connection.
///
/// Owned by the [`NetworkInterface`](crate::NetworkInterface) whose
/// `ActiveConnection` property references it. Once the interface moves on to
/// another connection this object reports `is_connected() == false` and its
/// values stay frozen.
pub struct ConnectionFacet {
    core: FacetCore<ActiveConnectionProperties>,
    ipv4: FacetSlot<IpConfigFacet>,
    ipv6: FacetSlot<IpConfigFacet>,
    children: LostSender,
}

impl ConnectionFacet {
    /// Subscribes to the active connection at `path` and attaches its IP
    /// configuration objects.
    pub(crate) async fn connect(
        bus: BusHandle,
        path: OwnedObjectPath,
        parent: LostSender,
    ) -> Result<Arc<Self>> {
        let (core, stream, snapshot) = FacetCore::subscribe(
            bus,
            path,
            interface::ACTIVE_CONNECTION,
            ACTIVE_CONNECTION_FIELDS,
        )
        .await?;
        let (children, lost) = mpsc::unbounded_channel();
        let facet = Arc::new(Self {
            core,
            ipv4: FacetSlot::default(),
            ipv6: FacetSlot::default(),
            children,
        });

        let initial = facet.core.mirror().stage(&snapshot, &PropertyMap::new());
        let ip4 = facet
            .ipv4
            .prepare(initial.ip4_config.as_ref(), |p| facet.open_ip(p, Family::V4))
            .await;
        let ip6 = facet
            .ipv6
            .prepare(initial.ip6_config.as_ref(), |p| facet.open_ip(p, Family::V6))
            .await;
        facet.core.mirror().commit(initial);
        facet.ipv4.install(ip4);
        facet.ipv6.install(ip6);

        let monitor = start_monitor(&facet, stream, Some(lost), parent);
        facet.core.attachment().hold(monitor);
        debug!(
            "Connection {} attached at {}",
            facet.uuid(),
            facet.object_path().as_str()
        );
        Ok(facet)
    }

    async fn open_ip(&self, path: OwnedObjectPath, family: Family) -> Result<Arc<IpConfigFacet>> {
        let (iface, table) = match family {
            Family::V4 => (interface::IP4_CONFIG, IP4_FIELDS),
            Family::V6 => (interface::IP6_CONFIG, IP6_FIELDS),
        };
        FacetCore::open_leaf(
            self.core.bus().clone(),
            path,
            iface,
            table,
            self.children.clone(),
        )
        .await
    }

    /// Object path of the active connection.
    pub fn object_path(&self) -> &OwnedObjectPath {
        self.core.mirror().path()
    }

    /// `true` while owned by an interface and receiving updates.
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Profile UUID.
    pub fn uuid(&self) -> String {
        self.core.mirror().read(|p| p.uuid.clone())
    }

    /// Profile name.
    pub fn id(&self) -> String {
        self.core.mirror().read(|p| p.id.clone())
    }

    /// Profile type, e.g. `802-11-wireless`.
    pub fn connection_type(&self) -> String {
        self.core.mirror().read(|p| p.connection_type.clone())
    }

    /// Activation state. Codes without a named variant pass through as
    /// [`ActiveConnectionState::Other`].
    pub fn state(&self) -> ActiveConnectionState {
        self.core.mirror().read(|p| p.state)
    }

    /// Settings connection this was activated from.
    pub fn settings_path(&self) -> Option<OwnedObjectPath> {
        self.core.mirror().read(|p| p.settings_path.clone())
    }

    /// Whether this connection carries the IPv4 default route.
    pub fn is_default(&self) -> bool {
        self.core.mirror().read(|p| p.default4)
    }

    /// Whether this connection carries the IPv6 default route.
    pub fn is_default6(&self) -> bool {
        self.core.mirror().read(|p| p.default6)
    }

    /// IPv4 addressing. Empty when the connection has no IPv4 configuration.
    pub fn ipv4(&self) -> IpConfiguration {
        self.ipv4.get().map(|f| f.mirror().snapshot()).unwrap_or_default()
    }

    /// IPv6 addressing. Empty when the connection has no IPv6 configuration.
    pub fn ipv6(&self) -> IpConfiguration {
        self.ipv6.get().map(|f| f.mirror().snapshot()).unwrap_or_default()
    }

    /// All mirrored properties at once.
    pub fn properties(&self) -> ActiveConnectionProperties {
        self.core.mirror().snapshot()
    }

    /// Notifies on every committed change of the connection's own properties.
    pub fn watch(&self) -> watch::Receiver<ActiveConnectionProperties> {
        self.core.mirror().watch()
    }
}

#[async_trait]
impl Facet for ConnectionFacet {
    fn object_path(&self) -> &OwnedObjectPath {
        self.core.mirror().path()
    }

    fn mark_disconnected(&self) {
        if self.core.attachment().detach() {
            self.ipv4.freeze();
            self.ipv6.freeze();
            debug!("Connection {} marked disconnected", self.object_path().as_str());
        }
    }

    async fn apply(&self, batch: &PropertiesChanged) -> Result<()> {
        let (_gate, next) = self.core.begin(batch).await?;

        let ip4 = if batch.touches(property::IP4_CONFIG) {
            self.ipv4
                .prepare(next.ip4_config.as_ref(), |p| self.open_ip(p, Family::V4))
                .await
        } else {
            Staged::Keep
        };
        let ip6 = if batch.touches(property::IP6_CONFIG) {
            self.ipv6
                .prepare(next.ip6_config.as_ref(), |p| self.open_ip(p, Family::V6))
                .await
        } else {
            Staged::Keep
        };

        let committed = self.core.attachment().commit_with((ip4, ip6), |(ip4, ip6)| {
            self.core.mirror().commit(next);
            self.ipv4.install(ip4);
            self.ipv6.install(ip6);
        });
        committed.map_err(|(ip4, ip6)| {
            ip4.discard();
            ip6.discard();
            self.core.not_synchronized()
        })
    }

    async fn read_all(&self) -> Result<PropertyMap> {
        self.core.fetch_all().await
    }

    async fn child_lost(&self, path: &OwnedObjectPath) {
        let _gate = self.core.lock().await;
        if !self.ipv4.release_if(path) {
            self.ipv6.release_if(path);
        }
    }
}

impl Drop for ConnectionFacet {
    fn drop(&mut self) {
        self.mark_disconnected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mirror::validate_table;

    #[test]
    fn tables_are_valid() {
        assert!(validate_table(ACTIVE_CONNECTION_FIELDS).is_ok());
        assert!(validate_table(IP4_FIELDS).is_ok());
        assert!(validate_table(IP6_FIELDS).is_ok());
    }

    #[test]
    fn ip6_table_reads_byte_nameservers() {
        assert!(IP6_FIELDS.iter().any(|f| f.name == property::NAMESERVERS));
        assert!(!IP6_FIELDS.iter().any(|f| f.name == property::NAMESERVER_DATA));
    }
}
