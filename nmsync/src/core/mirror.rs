//! Table-driven property mirroring.
//!
//! A [`PropertyMirror`] holds the decoded state of one remote D-Bus interface.
//! Which properties it understands, and how each one is decoded, is declared
//! up front in a static [`Field`] table; names not in the table are ignored.
//!
//! State lives in a `tokio::sync::watch` channel. Every update is staged on a
//! private copy and then committed with a single replace, so a reader never
//! sees half of one change batch and half of another.

use log::{debug, trace, warn};
use std::collections::HashSet;
use tokio::sync::watch;
use zvariant::{OwnedObjectPath, Value};

use crate::api::models::{DecodeError, MirrorError};
use crate::dbus::{Bus, PropertyMap};

/// Bounds shared by every mirrored state type.
pub(crate) trait MirrorState: Clone + Default + PartialEq + Send + Sync + 'static {}

impl<T: Clone + Default + PartialEq + Send + Sync + 'static> MirrorState for T {}

/// Decodes one property value into its field of `T`.
pub(crate) type Decoder<T> = fn(&mut T, &Value<'_>) -> Result<(), DecodeError>;

/// One row of a property table.
pub(crate) struct Field<T: 'static> {
    pub(crate) name: &'static str,
    pub(crate) decode: Decoder<T>,
}

impl<T> Field<T> {
    pub(crate) const fn new(name: &'static str, decode: Decoder<T>) -> Self {
        Self { name, decode }
    }
}

/// Checks a table for empty or duplicate property names.
pub(crate) fn validate_table<T>(table: &[Field<T>]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for field in table {
        if field.name.is_empty() {
            return Err("empty property name".to_string());
        }
        if !seen.insert(field.name) {
            return Err(format!("duplicate property {}", field.name));
        }
    }
    Ok(())
}

/// Decoded local copy of one remote interface's properties.
pub(crate) struct PropertyMirror<T: MirrorState> {
    path: OwnedObjectPath,
    interface: &'static str,
    table: &'static [Field<T>],
    state: watch::Sender<T>,
}

impl<T: MirrorState> PropertyMirror<T> {
    pub(crate) fn new(
        path: OwnedObjectPath,
        interface: &'static str,
        table: &'static [Field<T>],
    ) -> Self {
        debug_assert!(
            validate_table(table).is_ok(),
            "invalid property table for {interface}"
        );
        let (state, _) = watch::channel(T::default());
        Self {
            path,
            interface,
            table,
            state,
        }
    }

    pub(crate) fn path(&self) -> &OwnedObjectPath {
        &self.path
    }

    pub(crate) fn interface(&self) -> &'static str {
        self.interface
    }

    /// Runs `f` against the current state without cloning it.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.borrow())
    }

    pub(crate) fn snapshot(&self) -> T {
        self.state.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<T> {
        self.state.subscribe()
    }

    fn field(&self, name: &str) -> Option<&'static Field<T>> {
        self.table.iter().find(|f| f.name == name)
    }

    /// Decodes every known key of `props` into `target`.
    ///
    /// A value that fails to decode is logged and skipped; the field keeps
    /// whatever `target` already held.
    fn decode_into(&self, target: &mut T, props: &PropertyMap) {
        for (name, value) in props {
            let Some(field) = self.field(name) else {
                trace!("Ignoring unknown property {}.{name}", self.interface);
                continue;
            };
            if let Err(e) = (field.decode)(target, value) {
                warn!(
                    "Skipping undecodable value on {}: {}",
                    self.path.as_str(),
                    MirrorError::from(e)
                );
            }
        }
    }

    /// Replaces the state with a full snapshot from `GetAll`.
    pub(crate) fn initialize(&self, snapshot: &PropertyMap) {
        let mut next = self.snapshot();
        self.decode_into(&mut next, snapshot);
        self.commit(next);
    }

    /// Reads back the current values of invalidated properties.
    ///
    /// Only names this mirror knows are requested. If the read fails the
    /// result is empty, so those fields keep their last known values.
    pub(crate) async fn reread(&self, bus: &dyn Bus, invalidated: &[String]) -> PropertyMap {
        let wanted: Vec<&String> = invalidated
            .iter()
            .filter(|name| self.field(name).is_some())
            .collect();
        if wanted.is_empty() {
            return PropertyMap::new();
        }

        match bus.get_all_properties(&self.path, self.interface).await {
            Ok(mut fresh) => {
                fresh.retain(|name, _| wanted.contains(&name));
                if fresh.len() < wanted.len() {
                    debug!(
                        "Re-read of {} returned {} of {} invalidated properties",
                        self.path.as_str(),
                        fresh.len(),
                        wanted.len()
                    );
                }
                fresh
            }
            Err(e) => {
                warn!(
                    "Failed to re-read invalidated properties of {}: {e}",
                    self.path.as_str()
                );
                PropertyMap::new()
            }
        }
    }

    /// Builds the state that results from applying `changed` and then the
    /// re-read values of invalidated properties, without publishing it.
    pub(crate) fn stage(&self, changed: &PropertyMap, refreshed: &PropertyMap) -> T {
        let mut next = self.snapshot();
        self.decode_into(&mut next, changed);
        self.decode_into(&mut next, refreshed);
        next
    }

    /// Publishes a staged state. Watchers are only woken if something changed.
    pub(crate) fn commit(&self, next: T) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
