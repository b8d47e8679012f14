//! Ownership of dependent objects.
//!
//! A facet is a mirrored object owned by exactly one parent. The parent keeps
//! it in a [`FacetSlot`] and swaps it when the property that references it
//! changes. A released facet stays a valid object for anyone still holding it;
//! it just reports `is_connected() == false` and stops applying updates.

use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::api::models::MirrorError;
use crate::core::mirror::{Field, MirrorState, PropertyMirror};
use crate::core::monitor::{LostReceiver, LostSender, MonitorEvent, PropertyMonitor};
use crate::dbus::{BusHandle, PropertiesChanged, PropertyMap, PropertyStream};

#[derive(Default)]
struct Attached {
    connected: bool,
    monitor: Option<PropertyMonitor>,
}

/// Connected flag plus the monitor task that keeps an object in sync.
///
/// Commits run under the same lock that [`detach`](Self::detach) takes, so a
/// batch is either fully applied before a release or not applied at all.
#[derive(Default)]
pub(crate) struct Attachment {
    inner: Mutex<Attached>,
}

impl Attachment {
    /// An attachment for an object that is about to start its monitor.
    pub(crate) fn connected() -> Self {
        Self {
            inner: Mutex::new(Attached {
                connected: true,
                monitor: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Attached> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_connected(&self) {
        self.lock().connected = true;
    }

    /// Takes ownership of the monitor. An object detached in the meantime
    /// stops it right away.
    pub(crate) fn hold(&self, monitor: PropertyMonitor) {
        let mut inner = self.lock();
        if inner.connected {
            inner.monitor = Some(monitor);
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Runs `commit` only while still connected.
    pub(crate) fn while_connected<R>(&self, commit: impl FnOnce() -> R) -> Option<R> {
        let inner = self.lock();
        inner.connected.then(commit)
    }

    /// Runs `commit` on `staged` only while still connected. A released
    /// object gets `staged` back untouched.
    pub(crate) fn commit_with<S, R>(
        &self,
        staged: S,
        commit: impl FnOnce(S) -> R,
    ) -> std::result::Result<R, S> {
        let inner = self.lock();
        if inner.connected {
            Ok(commit(staged))
        } else {
            Err(staged)
        }
    }

    /// Clears the connected flag and stops the monitor.
    ///
    /// Returns `false` if the object was already detached.
    pub(crate) fn detach(&self) -> bool {
        let (was_connected, monitor) = {
            let mut inner = self.lock();
            let was_connected = std::mem::replace(&mut inner.connected, false);
            (was_connected, inner.monitor.take())
        };
        drop(monitor);
        was_connected
    }
}

/// A mirrored object that can be owned by a parent.
#[async_trait]
pub(crate) trait Facet: Send + Sync + 'static {
    fn object_path(&self) -> &OwnedObjectPath;

    /// Stops synchronization for good, along with any children. Idempotent.
    fn mark_disconnected(&self);

    /// Applies one change batch for this object.
    async fn apply(&self, batch: &PropertiesChanged) -> Result<()>;

    /// Reads the full property set of this object.
    async fn read_all(&self) -> Result<PropertyMap>;

    /// The child mirroring `path` lost its subscription.
    async fn child_lost(&self, _path: &OwnedObjectPath) {}

    /// Re-reads every property after the parent re-announced the same path.
    async fn resync(&self) {
        match self.read_all().await {
            Ok(props) => {
                if let Err(e) = self.apply(&PropertiesChanged::changed(props)).await {
                    debug!("Resync of {} skipped: {e}", self.object_path().as_str());
                }
            }
            Err(e) => warn!("Failed to resync {}: {e}", self.object_path().as_str()),
        }
    }
}

/// Spawns the monitor of `facet`, routing events back through a weak reference
/// so the task never keeps its own facet alive.
pub(crate) fn start_monitor<F: Facet>(
    facet: &Arc<F>,
    stream: PropertyStream,
    children: Option<LostReceiver>,
    parent: LostSender,
) -> PropertyMonitor {
    let weak = Arc::downgrade(facet);
    PropertyMonitor::start(
        facet.object_path().clone(),
        stream,
        children,
        Some(parent),
        move |event| {
            let weak = weak.clone();
            async move {
                let Some(facet) = weak.upgrade() else {
                    return;
                };
                match event {
                    MonitorEvent::Batch(batch) => {
                        if let Err(e) = facet.apply(&batch).await {
                            debug!("Batch for {} not applied: {e}", facet.object_path().as_str());
                        }
                    }
                    MonitorEvent::ChildLost(path) => facet.child_lost(&path).await,
                    MonitorEvent::Lost => facet.mark_disconnected(),
                }
            }
        },
    )
}

/// What a slot should hold once the current batch is committed.
pub(crate) enum Staged<F> {
    /// Leave the slot as it is.
    Keep,
    /// Put this (or nothing) in the slot, releasing whatever was there.
    Install(Option<Arc<F>>),
}

impl<F: Facet> Staged<F> {
    /// Drops a staged decision whose batch was not committed.
    pub(crate) fn discard(self) {
        if let Staged::Install(Some(facet)) = self {
            facet.mark_disconnected();
        }
    }
}

/// Holder for the single facet of one kind a parent owns.
pub(crate) struct FacetSlot<F> {
    current: Mutex<Option<Arc<F>>>,
}

impl<F> Default for FacetSlot<F> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<F: Facet> FacetSlot<F> {
    pub(crate) fn get(&self) -> Option<Arc<F>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Works out what the slot must hold for `target`.
    ///
    /// The same path keeps (and resyncs) the current facet. A different path
    /// opens a new facet with `open`; if that fails the slot ends up empty
    /// rather than holding a facet for a path that is no longer referenced.
    pub(crate) async fn prepare<Fut>(
        &self,
        target: Option<&OwnedObjectPath>,
        open: impl FnOnce(OwnedObjectPath) -> Fut,
    ) -> Staged<F>
    where
        Fut: Future<Output = Result<Arc<F>>>,
    {
        let current = self.get();
        let Some(target) = target else {
            return match current {
                Some(_) => Staged::Install(None),
                None => Staged::Keep,
            };
        };

        if let Some(current) = current.filter(|c| c.object_path() == target) {
            current.resync().await;
            return Staged::Keep;
        }

        match open(target.clone()).await {
            Ok(facet) => Staged::Install(Some(facet)),
            Err(e) => {
                warn!("Failed to attach {}: {e}", target.as_str());
                Staged::Install(None)
            }
        }
    }

    /// Commits a staged decision, releasing the facet it replaces.
    pub(crate) fn install(&self, staged: Staged<F>) {
        let Staged::Install(next) = staged else {
            return;
        };
        let previous = std::mem::replace(
            &mut *self.current.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        if let Some(previous) = previous {
            debug!("Releasing {}", previous.object_path().as_str());
            previous.mark_disconnected();
        }
    }

    /// Releases the current facet if it mirrors `path`.
    pub(crate) fn release_if(&self, path: &OwnedObjectPath) -> bool {
        let released = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            match current.as_ref() {
                Some(facet) if facet.object_path() == path => current.take(),
                _ => None,
            }
        };
        match released {
            Some(facet) => {
                debug!("Releasing lost {}", path.as_str());
                facet.mark_disconnected();
                true
            }
            None => false,
        }
    }

    /// Releases whatever the slot holds.
    pub(crate) fn clear(&self) {
        self.install(Staged::Install(None));
    }

    /// Stops the current facet but keeps it in place, so its last values
    /// stay readable through the released owner.
    pub(crate) fn freeze(&self) {
        if let Some(current) = self.get() {
            current.mark_disconnected();
        }
    }
}

/// State shared by every facet: its mirror, its attachment and its gate.
///
/// On its own it is also the facet type for objects without children.
pub(crate) struct FacetCore<T: MirrorState> {
    bus: BusHandle,
    mirror: PropertyMirror<T>,
    attachment: Attachment,
    gate: AsyncMutex<()>,
}

/// Held while a batch is being staged; dropping it lets the next one in.
pub(crate) type Gate<'a> = tokio::sync::MutexGuard<'a, ()>;

impl<T: MirrorState> FacetCore<T> {
    /// Subscribes to `interface` on `path`, then reads its initial snapshot.
    ///
    /// The subscription comes first so nothing emitted between the two calls
    /// is missed. The returned core is connected but not yet initialized.
    pub(crate) async fn subscribe(
        bus: BusHandle,
        path: OwnedObjectPath,
        interface: &'static str,
        table: &'static [Field<T>],
    ) -> Result<(Self, PropertyStream, PropertyMap)> {
        let stream = bus.subscribe(&path, interface).await?;
        let snapshot = bus.get_all_properties(&path, interface).await?;
        let core = Self {
            bus,
            mirror: PropertyMirror::new(path, interface, table),
            attachment: Attachment::connected(),
            gate: AsyncMutex::new(()),
        };
        Ok((core, stream, snapshot))
    }

    /// Opens a facet with no children of its own.
    pub(crate) async fn open_leaf(
        bus: BusHandle,
        path: OwnedObjectPath,
        interface: &'static str,
        table: &'static [Field<T>],
        parent: LostSender,
    ) -> Result<Arc<Self>> {
        let (core, stream, snapshot) = Self::subscribe(bus, path, interface, table).await?;
        core.mirror.initialize(&snapshot);

        let core = Arc::new(core);
        let monitor = start_monitor(&core, stream, None, parent);
        core.attachment.hold(monitor);
        debug!("Attached {interface} at {}", core.mirror.path().as_str());
        Ok(core)
    }

    pub(crate) fn bus(&self) -> &BusHandle {
        &self.bus
    }

    pub(crate) fn mirror(&self) -> &PropertyMirror<T> {
        &self.mirror
    }

    pub(crate) fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.attachment.is_connected()
    }

    pub(crate) async fn lock(&self) -> Gate<'_> {
        self.gate.lock().await
    }

    pub(crate) fn not_synchronized(&self) -> MirrorError {
        MirrorError::NotSynchronized(self.mirror.path().to_string())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            debug!(
                "Discarding batch for released {}",
                self.mirror.path().as_str()
            );
            Err(self.not_synchronized())
        }
    }

    /// Takes the gate, re-reads invalidated properties and stages the batch.
    ///
    /// Fails with `NotSynchronized` if the facet was released before or
    /// during the re-read.
    pub(crate) async fn begin(&self, batch: &PropertiesChanged) -> Result<(Gate<'_>, T)> {
        let gate = self.lock().await;
        self.ensure_connected()?;
        let refreshed = self
            .mirror
            .reread(self.bus.as_ref(), &batch.invalidated)
            .await;
        self.ensure_connected()?;
        let next = self.mirror.stage(&batch.changed, &refreshed);
        Ok((gate, next))
    }

    /// Publishes `next` unless the facet was released in the meantime.
    pub(crate) fn commit(&self, next: T) -> Result<()> {
        self.attachment
            .while_connected(|| self.mirror.commit(next))
            .ok_or_else(|| self.not_synchronized())
    }

    /// Reads the full property set of the mirrored interface.
    pub(crate) async fn fetch_all(&self) -> Result<PropertyMap> {
        self.bus
            .get_all_properties(self.mirror.path(), self.mirror.interface())
            .await
    }
}

#[async_trait]
impl<T: MirrorState> Facet for FacetCore<T> {
    fn object_path(&self) -> &OwnedObjectPath {
        self.mirror.path()
    }

    fn mark_disconnected(&self) {
        if self.attachment.detach() {
            debug!("{} marked disconnected", self.mirror.path().as_str());
        }
    }

    async fn apply(&self, batch: &PropertiesChanged) -> Result<()> {
        let (_gate, next) = self.begin(batch).await?;
        self.commit(next)
    }

    async fn read_all(&self) -> Result<PropertyMap> {
        self.fetch_all().await
    }
}
