//! zbus implementation of the [`Bus`] transport.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt, select};
use futures_timer::Delay;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use zbus::Connection;
use zbus::proxy::CacheProperties;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue};

use super::{Bus, PropertiesChanged, PropertyMap, PropertyStream, SettingsMap};
use crate::Result;
use crate::api::config::TimeoutConfig;
use crate::api::models::MirrorError;
use crate::types::constants::{NM_SERVICE, interface, member};

/// Transport over a zbus [`Connection`] to NetworkManager.
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
/// println!("{} is {}", iface.name(), iface.device_type());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ZbusTransport {
    conn: Connection,
    config: TimeoutConfig,
}

impl std::fmt::Debug for ZbusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZbusTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ZbusTransport {
    /// Connects to the system bus with default timeouts.
    pub async fn new() -> Result<Self> {
        Self::with_config(TimeoutConfig::default()).await
    }

    /// Connects to the system bus with custom timeouts.
    pub async fn with_config(config: TimeoutConfig) -> Result<Self> {
        let conn = Connection::system().await?;
        Ok(Self { conn, config })
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection, config: TimeoutConfig) -> Self {
        Self { conn, config }
    }

    /// Returns the timeouts in use.
    pub fn timeout_config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Builds an uncached proxy for `interface` on the NetworkManager object at `path`.
    async fn nm_proxy(&self, path: &ObjectPath<'_>, interface: &str) -> Result<zbus::Proxy<'static>> {
        Ok(zbus::proxy::Builder::new(&self.conn)
            .destination(NM_SERVICE)?
            .path(OwnedObjectPath::from(path.clone()))?
            .interface(interface.to_string())?
            .cache_properties(CacheProperties::No)
            .build()
            .await?)
    }
}

/// Races `fut` against `limit`, the way every transport call is bounded.
async fn bounded<T, F>(limit: Duration, what: impl Display, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let mut fut = pin!(fut.fuse());
    let mut timeout = pin!(Delay::new(limit).fuse());

    select! {
        res = fut => res,
        _ = timeout => {
            warn!("{what} timed out after {limit:?}");
            Err(MirrorError::Timeout(what.to_string()))
        }
    }
}

fn remote_read(path: &ObjectPath<'_>) -> impl FnOnce(MirrorError) -> MirrorError + use<> {
    let path = path.to_string();
    move |e| match e {
        MirrorError::Timeout(_) => e,
        other => MirrorError::RemoteRead {
            path,
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl Bus for ZbusTransport {
    async fn get_all_properties(
        &self,
        path: &ObjectPath<'_>,
        iface: &str,
    ) -> Result<PropertyMap> {
        let read = async {
            let proxy = self.nm_proxy(path, interface::PROPERTIES).await?;
            let props: HashMap<String, OwnedValue> = proxy.call(member::GET_ALL, &(iface,)).await?;
            Ok(props)
        };

        bounded(self.config.read_timeout, format!("GetAll({iface}) on {path}"), read)
            .await
            .map_err(remote_read(path))
    }

    async fn subscribe(&self, path: &ObjectPath<'_>, iface: &str) -> Result<PropertyStream> {
        let setup = async {
            let proxy = self.nm_proxy(path, interface::PROPERTIES).await?;
            Ok(proxy.receive_signal(member::PROPERTIES_CHANGED).await?)
        };
        let signals = bounded(
            self.config.subscribe_timeout,
            format!("subscribe({iface}) on {path}"),
            setup,
        )
        .await?;
        debug!("Subscribed to PropertiesChanged for {iface} on {path}");

        let wanted = iface.to_string();
        let origin = path.to_string();
        let batches = signals.filter_map(move |msg| {
            let wanted = wanted.clone();
            let origin = origin.clone();
            async move {
                let body = msg.body();
                let decoded: zbus::Result<(String, PropertyMap, Vec<String>)> = body.deserialize();
                match decoded {
                    Ok((name, changed, invalidated)) if name == wanted => {
                        Some(PropertiesChanged {
                            changed,
                            invalidated,
                        })
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Failed to parse PropertiesChanged args from {origin}: {e}");
                        None
                    }
                }
            }
        });

        Ok(batches.boxed())
    }

    async fn get_settings(&self, path: &ObjectPath<'_>) -> Result<SettingsMap> {
        let read = async {
            let proxy = self.nm_proxy(path, interface::SETTINGS_CONNECTION).await?;
            let settings: SettingsMap = proxy.call(member::GET_SETTINGS, &()).await?;
            Ok(settings)
        };

        bounded(self.config.read_timeout, format!("GetSettings on {path}"), read)
            .await
            .map_err(remote_read(path))
    }
}
