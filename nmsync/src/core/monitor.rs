//! Per-object monitoring tasks.
//!
//! Every subscribed object gets exactly one task. The task consumes the
//! object's change stream in order and awaits each batch before taking the
//! next, so two batches for the same object never overlap. The same task also
//! receives "subscription lost" reports from the object's children.

use futures::StreamExt;
use log::{debug, warn};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zvariant::OwnedObjectPath;

use crate::api::models::MirrorError;
use crate::dbus::{PropertiesChanged, PropertyStream};

/// Where a child reports that its remote object went away.
pub(crate) type LostSender = mpsc::UnboundedSender<OwnedObjectPath>;
pub(crate) type LostReceiver = mpsc::UnboundedReceiver<OwnedObjectPath>;

/// Something the owning object has to react to.
pub(crate) enum MonitorEvent {
    /// A change batch for the object itself.
    Batch(PropertiesChanged),
    /// The child mirroring this path lost its subscription.
    ChildLost(OwnedObjectPath),
    /// The object's own subscription ended.
    Lost,
}

/// Handle to a monitoring task. Dropping it aborts the task.
pub(crate) struct PropertyMonitor {
    handle: JoinHandle<()>,
}

async fn next_lost(children: &mut Option<LostReceiver>) -> Option<OwnedObjectPath> {
    match children {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl PropertyMonitor {
    /// Spawns the task for the object at `path`.
    ///
    /// `children` receives loss reports from objects this one owns; `parent`
    /// is told when this object's own stream ends.
    pub(crate) fn start<H, Fut>(
        path: OwnedObjectPath,
        mut stream: PropertyStream,
        mut children: Option<LostReceiver>,
        parent: Option<LostSender>,
        mut handler: H,
    ) -> Self
    where
        H: FnMut(MonitorEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!("Starting property monitoring for {}", path.as_str());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    batch = stream.next() => match batch {
                        Some(batch) => handler(MonitorEvent::Batch(batch)).await,
                        None => break,
                    },
                    Some(child) = next_lost(&mut children) => {
                        handler(MonitorEvent::ChildLost(child)).await;
                    }
                }
            }

            warn!("{}", MirrorError::SubscriptionLost(path.to_string()));
            if let Some(parent) = parent {
                // The parent may already be gone; nothing left to notify then.
                let _ = parent.send(path.clone());
            }
            handler(MonitorEvent::Lost).await;
        });

        Self { handle }
    }
}

impl Drop for PropertyMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
