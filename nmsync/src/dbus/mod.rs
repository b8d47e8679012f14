//! The bus transport this crate mirrors objects through.
//!
//! Everything above this module talks to NetworkManager only through the
//! [`Bus`] trait: a full property read, a per-object `PropertiesChanged`
//! subscription, and the single method call needed for settings. The
//! production implementation is [`ZbusTransport`] over the system bus; tests
//! substitute an in-memory bus.

mod transport;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use zvariant::{ObjectPath, OwnedValue};

use crate::Result;

pub use transport::ZbusTransport;

/// Property name to value, as returned by `GetAll` or carried in a change batch.
pub type PropertyMap = HashMap<String, OwnedValue>;

/// Connection settings as returned by `GetSettings`: section name to key/value map.
pub type SettingsMap = HashMap<String, HashMap<String, OwnedValue>>;

/// Stream of change batches for one object and interface, in arrival order.
pub type PropertyStream = BoxStream<'static, PropertiesChanged>;

/// Shared handle to the transport, threaded into every mirrored object.
pub type BusHandle = Arc<dyn Bus>;

/// One `PropertiesChanged` notification for a single remote interface.
#[derive(Debug, Default)]
pub struct PropertiesChanged {
    /// Properties with their new values.
    pub changed: PropertyMap,
    /// Properties whose new value was not sent and must be read back on demand.
    pub invalidated: Vec<String>,
}

impl PropertiesChanged {
    /// Creates a batch carrying only changed values.
    pub fn changed(changed: PropertyMap) -> Self {
        Self {
            changed,
            invalidated: Vec::new(),
        }
    }

    /// Creates a batch carrying only invalidated names.
    pub fn invalidated<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            changed: PropertyMap::new(),
            invalidated: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the batch mentions `name`, as changed or invalidated.
    pub fn touches(&self, name: &str) -> bool {
        self.changed.contains_key(name) || self.invalidated.iter().any(|n| n == name)
    }
}

/// Transport operations the mirror consumes.
///
/// Implementations must deliver batches of one subscription in arrival order
/// and must bound every call in time. A subscription stream that ends means
/// the remote object is gone.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Reads every property of `interface` on the object at `path`.
    async fn get_all_properties(
        &self,
        path: &ObjectPath<'_>,
        interface: &str,
    ) -> Result<PropertyMap>;

    /// Subscribes to `PropertiesChanged` for `interface` on the object at `path`.
    async fn subscribe(&self, path: &ObjectPath<'_>, interface: &str) -> Result<PropertyStream>;

    /// Calls `GetSettings` on the settings connection at `path`.
    async fn get_settings(&self, path: &ObjectPath<'_>) -> Result<SettingsMap>;
}
