//! Example mirroring one NetworkManager device and printing every change.
//!
//! Pass the device object path as the first argument, e.g.
//! `/org/freedesktop/NetworkManager/Devices/3`. Reads are given a shorter
//! timeout than the default to show how the transport is configured.

use nmsync::{NetworkInterface, TimeoutConfig, ZbusTransport};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> nmsync::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/org/freedesktop/NetworkManager/Devices/1".to_string());

    let config = TimeoutConfig::new()
        .with_read_timeout(Duration::from_secs(2))
        .with_subscribe_timeout(Duration::from_secs(10));
    let bus = Arc::new(ZbusTransport::with_config(config).await?);

    let iface = NetworkInterface::new(path.as_str().try_into()?);
    iface.connect(bus).await?;

    println!(
        "{} ({}) driver={} managed={}",
        iface.name(),
        iface.device_type(),
        iface.driver(),
        iface.managed()
    );
    if !iface.sync_properties() {
        println!("Device is not managed; nothing to watch.");
        return Ok(());
    }

    if let Some(conn) = iface.connection() {
        println!("Active connection: {} ({})", conn.id(), conn.state());
        println!("  IPv4: {:?}", conn.ipv4().address);
        println!("  IPv6: {:?}", conn.ipv6().address);
        if let Some(settings) = iface.settings().await? {
            println!("  Profile: {} [{}]", settings.connection.id, settings.connection.uuid);
        }
    }
    if let Some(wifi) = iface.wireless() {
        println!("SSID {:?} at {:?}%", wifi.ssid(), wifi.strength());
    }

    let mut changes = iface.watch();
    while changes.changed().await.is_ok() {
        let props = changes.borrow_and_update().clone();
        println!("{}: state={} connection={:?}", props.name, props.state, props.active_connection);
    }

    Ok(())
}
