//! Top-level mirror of one NetworkManager device.
//!
//! A [`NetworkInterface`] decides once, when connected, whether the device is
//! synchronized at all. Managed devices get a property subscription and own
//! up to two facets: the active connection and, for Wi-Fi devices, the
//! wireless state. Unmanaged devices are read once and left alone.
//!
//! Every change batch for the device runs under one gate. The batch is
//! re-read and staged, any facet it references is opened, and only then are
//! the new properties and facets published together.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::{
    DeviceProperties, DeviceState, DeviceType, MirrorError, SyncState,
};
use crate::core::connection::ConnectionFacet;
use crate::core::facet::{Attachment, FacetSlot, Staged};
use crate::core::mirror::{Field, PropertyMirror};
use crate::core::monitor::{LostReceiver, LostSender, MonitorEvent, PropertyMonitor};
use crate::core::settings::SettingsSnapshot;
use crate::core::wireless::WirelessFacet;
use crate::dbus::{BusHandle, PropertiesChanged, PropertyMap, PropertyStream};
use crate::types::constants::{interface, property};
use crate::util::decode;

pub(crate) static DEVICE_FIELDS: &[Field<DeviceProperties>] = &[
    Field::new(property::INTERFACE, |s, v| {
        s.name = decode::as_string(property::INTERFACE, v)?;
        Ok(())
    }),
    Field::new(property::DEVICE_TYPE, |s, v| {
        s.device_type = decode::as_u32(property::DEVICE_TYPE, v)?.into();
        Ok(())
    }),
    Field::new(property::MANAGED, |s, v| {
        s.managed = decode::as_bool(property::MANAGED, v)?;
        Ok(())
    }),
    Field::new(property::DRIVER, |s, v| {
        s.driver = decode::as_string(property::DRIVER, v)?;
        Ok(())
    }),
    Field::new(property::STATE, |s, v| {
        s.state = decode::as_u32(property::STATE, v)?.into();
        Ok(())
    }),
    Field::new(property::HW_ADDRESS, |s, v| {
        s.hw_address = decode::as_string(property::HW_ADDRESS, v)?;
        Ok(())
    }),
    Field::new(property::ACTIVE_CONNECTION, |s, v| {
        s.active_connection = decode::object_path(property::ACTIVE_CONNECTION, v)?;
        Ok(())
    }),
];

/// Live mirror of one network device.
///
/// Create it with [`new`](Self::new), then call [`connect`](Self::connect)
/// once. Accessors never block and return the last synchronized values.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use nmsync::{NetworkInterface, ZbusTransport};
///
/// # async fn example() -> nmsync::Result<()> {
/// let bus = Arc::new(ZbusTransport::new().await?);
/// let iface = NetworkInterface::new("/org/freedesktop/NetworkManager/Devices/2".try_into()?);
/// iface.connect(bus).await?;
///
/// if let Some(conn) = iface.connection() {
///     println!("{} is {} on {}", iface.name(), conn.state(), conn.id());
///     for addr in conn.ipv4().address {
///         println!("  {addr}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct NetworkInterface {
    mirror: PropertyMirror<DeviceProperties>,
    sync: watch::Sender<SyncState>,
    bus: Mutex<Option<BusHandle>>,
    attachment: Attachment,
    gate: AsyncMutex<()>,
    children: Mutex<Option<LostSender>>,
    connection: FacetSlot<ConnectionFacet>,
    wireless: FacetSlot<WirelessFacet>,
}

impl std::fmt::Debug for NetworkInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkInterface")
            .field("path", &self.object_path().as_str())
            .field("sync_state", &self.sync_state())
            .field("properties", &self.properties())
            .finish_non_exhaustive()
    }
}

impl NetworkInterface {
    /// Creates an unconnected mirror for the device at `path`.
    pub fn new(path: OwnedObjectPath) -> Arc<Self> {
        let (sync, _) = watch::channel(SyncState::Unsubscribed);
        Arc::new(Self {
            mirror: PropertyMirror::new(path, interface::DEVICE, DEVICE_FIELDS),
            sync,
            bus: Mutex::new(None),
            attachment: Attachment::default(),
            gate: AsyncMutex::new(()),
            children: Mutex::new(None),
            connection: FacetSlot::default(),
            wireless: FacetSlot::default(),
        })
    }

    /// Reads the device and, if NetworkManager manages it, starts
    /// synchronizing it.
    ///
    /// The managed decision is taken here, once. An unmanaged device is read
    /// but never subscribed to, and owns no facets. Calling this on an
    /// interface that is already connected does nothing.
    pub async fn connect(self: &Arc<Self>, bus: BusHandle) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.sync_state() != SyncState::Unsubscribed {
            debug!("{} is already connected", self.object_path().as_str());
            return Ok(());
        }

        let path = self.object_path();
        let snapshot = bus.get_all_properties(path, interface::DEVICE).await?;
        let first = self.mirror.stage(&snapshot, &PropertyMap::new());
        if !first.managed {
            info!(
                "{} ({}) is not managed, not synchronizing",
                first.name,
                path.as_str()
            );
            self.mirror.commit(first);
            self.sync.send_replace(SyncState::Unmanaged);
            return Ok(());
        }

        self.sync.send_replace(SyncState::Subscribing);
        let synced = self.subscribe(bus).await.and_then(|()| {
            self.attachment
                .while_connected(|| self.sync.send_replace(SyncState::Synced))
                .ok_or_else(|| self.not_synchronized())
        });
        match synced {
            Ok(_) => {
                debug!("{} synchronized", path.as_str());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to synchronize {}: {e}", path.as_str());
                self.teardown();
                Err(e)
            }
        }
    }

    async fn subscribe(self: &Arc<Self>, bus: BusHandle) -> Result<()> {
        let path = self.object_path();
        let stream = bus.subscribe(path, interface::DEVICE).await?;
        // Read again so nothing changed between the first read and the subscription is lost.
        let snapshot = bus.get_all_properties(path, interface::DEVICE).await?;

        *self.bus.lock().unwrap_or_else(PoisonError::into_inner) = Some(bus.clone());
        let (children, lost) = mpsc::unbounded_channel();
        *self.children.lock().unwrap_or_else(PoisonError::into_inner) = Some(children.clone());
        self.attachment.mark_connected();

        let initial = self.mirror.stage(&snapshot, &PropertyMap::new());
        let connection = self
            .connection
            .prepare(initial.active_connection.as_ref(), |p| {
                ConnectionFacet::connect(bus.clone(), p, children.clone())
            })
            .await;
        let wireless = self
            .wireless
            .prepare(self.wireless_target(&initial).as_ref(), |p| {
                WirelessFacet::connect(bus.clone(), p, children.clone())
            })
            .await;

        self.commit_facets(initial, connection, wireless)?;

        let monitor = self.start_monitor(stream, lost);
        self.attachment.hold(monitor);
        Ok(())
    }

    fn start_monitor(
        self: &Arc<Self>,
        stream: PropertyStream,
        lost: LostReceiver,
    ) -> PropertyMonitor {
        let weak = Arc::downgrade(self);
        PropertyMonitor::start(
            self.object_path().clone(),
            stream,
            Some(lost),
            None,
            move |event| {
                let weak = weak.clone();
                async move {
                    let Some(iface) = weak.upgrade() else {
                        return;
                    };
                    match event {
                        MonitorEvent::Batch(batch) => {
                            if let Err(e) = iface.apply_properties_changed(&batch).await {
                                debug!("Batch for {} not applied: {e}", iface.object_path().as_str());
                            }
                        }
                        MonitorEvent::ChildLost(path) => iface.child_lost(&path).await,
                        MonitorEvent::Lost => {
                            warn!("{} vanished, releasing its facets", iface.object_path().as_str());
                            iface.teardown();
                        }
                    }
                }
            },
        )
    }

    fn wireless_target(&self, props: &DeviceProperties) -> Option<OwnedObjectPath> {
        props
            .device_type
            .is_wireless()
            .then(|| self.object_path().clone())
    }

    fn not_synchronized(&self) -> MirrorError {
        MirrorError::NotSynchronized(self.object_path().to_string())
    }

    fn bus(&self) -> Option<BusHandle> {
        self.bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn child_sender(&self) -> Option<LostSender> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies one `PropertiesChanged` batch for the device.
    ///
    /// This is what the monitor task runs for every notification. It is
    /// rejected with [`MirrorError::NotSynchronized`] unless the interface is
    /// [`SyncState::Synced`]; an unmanaged device is never mutated this way.
    pub async fn apply_properties_changed(&self, batch: &PropertiesChanged) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.sync_state() != SyncState::Synced || !self.attachment.is_connected() {
            return Err(self.not_synchronized());
        }
        let (Some(bus), Some(children)) = (self.bus(), self.child_sender()) else {
            return Err(self.not_synchronized());
        };

        let refreshed = self.mirror.reread(bus.as_ref(), &batch.invalidated).await;
        let next = self.mirror.stage(&batch.changed, &refreshed);

        let connection = if batch.touches(property::ACTIVE_CONNECTION) {
            self.connection
                .prepare(next.active_connection.as_ref(), |p| {
                    ConnectionFacet::connect(bus.clone(), p, children.clone())
                })
                .await
        } else {
            Staged::Keep
        };
        let wireless = if batch.touches(property::DEVICE_TYPE) {
            self.wireless
                .prepare(self.wireless_target(&next).as_ref(), |p| {
                    WirelessFacet::connect(bus.clone(), p, children.clone())
                })
                .await
        } else {
            Staged::Keep
        };

        if self.mirror.read(|p| p.managed) && !next.managed {
            info!(
                "{} is no longer managed; synchronization continues until disconnected",
                self.object_path().as_str()
            );
        }

        self.commit_facets(next, connection, wireless)
    }

    /// Publishes `next` together with the staged facets, unless the interface
    /// was torn down meanwhile; then the staged facets are released instead.
    fn commit_facets(
        &self,
        next: DeviceProperties,
        connection: Staged<ConnectionFacet>,
        wireless: Staged<WirelessFacet>,
    ) -> Result<()> {
        let committed = self
            .attachment
            .commit_with((connection, wireless), |(connection, wireless)| {
                self.mirror.commit(next);
                self.connection.install(connection);
                self.wireless.install(wireless);
            });
        committed.map_err(|(connection, wireless)| {
            connection.discard();
            wireless.discard();
            self.not_synchronized()
        })
    }

    async fn child_lost(&self, path: &OwnedObjectPath) {
        let _gate = self.gate.lock().await;
        if !self.connection.release_if(path) {
            self.wireless.release_if(path);
        }
    }

    fn teardown(&self) {
        self.attachment.detach();
        self.connection.clear();
        self.wireless.clear();
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.sync.send_if_modified(|state| match state {
            SyncState::Subscribing | SyncState::Synced => {
                *state = SyncState::Unsubscribed;
                true
            }
            _ => false,
        });
    }

    /// Stops synchronizing and releases every owned facet.
    ///
    /// Batches already in flight are discarded. The last synchronized values
    /// stay readable; [`connect`](Self::connect) may be called again.
    pub fn disconnect(&self) {
        debug!("Disconnecting {}", self.object_path().as_str());
        self.teardown();
    }

    /// Object path of the device.
    pub fn object_path(&self) -> &OwnedObjectPath {
        self.mirror.path()
    }

    /// Kernel interface name.
    pub fn name(&self) -> String {
        self.mirror.read(|p| p.name.clone())
    }

    /// Device type.
    pub fn device_type(&self) -> DeviceType {
        self.mirror.read(|p| p.device_type)
    }

    /// Whether NetworkManager manages the device.
    pub fn managed(&self) -> bool {
        self.mirror.read(|p| p.managed)
    }

    /// Kernel driver.
    pub fn driver(&self) -> String {
        self.mirror.read(|p| p.driver.clone())
    }

    /// Device state.
    pub fn state(&self) -> DeviceState {
        self.mirror.read(|p| p.state)
    }

    /// Hardware address.
    pub fn hw_address(&self) -> String {
        self.mirror.read(|p| p.hw_address.clone())
    }

    /// Whether property changes are being synchronized.
    ///
    /// Follows the `Managed` value seen at connect time, not later changes.
    pub fn sync_properties(&self) -> bool {
        matches!(
            self.sync_state(),
            SyncState::Subscribing | SyncState::Synced
        )
    }

    /// Where the interface is in its lifecycle.
    pub fn sync_state(&self) -> SyncState {
        *self.sync.borrow()
    }

    /// All mirrored device properties at once.
    pub fn properties(&self) -> DeviceProperties {
        self.mirror.snapshot()
    }

    /// Notifies on every committed change of the device properties.
    pub fn watch(&self) -> watch::Receiver<DeviceProperties> {
        self.mirror.watch()
    }

    /// Notifies on lifecycle changes.
    pub fn watch_sync_state(&self) -> watch::Receiver<SyncState> {
        self.sync.subscribe()
    }

    /// The active connection currently owned, if any.
    ///
    /// Re-query after changes rather than holding on to the result: a
    /// replaced connection stays readable but reports `is_connected() == false`.
    pub fn connection(&self) -> Option<Arc<ConnectionFacet>> {
        self.connection.get()
    }

    /// The wireless facet, present only for Wi-Fi devices.
    pub fn wireless(&self) -> Option<Arc<WirelessFacet>> {
        self.wireless.get()
    }

    /// Reads the saved profile behind the current connection.
    ///
    /// Returns `Ok(None)` when there is no connection or it was not activated
    /// from a saved profile.
    pub async fn settings(&self) -> Result<Option<SettingsSnapshot>> {
        let Some(path) = self.connection().and_then(|c| c.settings_path()) else {
            return Ok(None);
        };
        let Some(bus) = self.bus() else {
            return Err(self.not_synchronized());
        };
        SettingsSnapshot::fetch(bus.as_ref(), &path).await.map(Some)
    }
}

impl Drop for NetworkInterface {
    fn drop(&mut self) {
        self.teardown();
    }
}
