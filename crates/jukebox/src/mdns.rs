//! mDNS advertisement of the configuration web UI.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceInfo};

const SERVICE_TYPE: &str = "_http._tcp.local.";

pub(crate) struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

/// Register the HTTP API; `None` (logged) when mDNS is unavailable.
pub(crate) fn spawn_mdns_advertiser(http_bind: SocketAddr) -> Option<MdnsAdvertiser> {
    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "mdns: daemon start failed");
            return None;
        }
    };
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let instance = instance_name(&host);
    let host_label = format!("{}.local.", host.trim_end_matches(".local"));
    let ip = if http_bind.ip().is_unspecified() {
        local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    } else {
        http_bind.ip()
    };
    let properties: HashMap<String, String> = [
        ("path".to_string(), "/".to_string()),
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
    ]
    .into_iter()
    .collect();
    let info = match ServiceInfo::new(
        SERVICE_TYPE,
        &instance,
        &host_label,
        ip,
        http_bind.port(),
        properties,
    ) {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(error = %e, "mdns: invalid service info");
            return None;
        }
    };
    let fullname = info.get_fullname().to_string();
    if let Err(e) = daemon.register(info) {
        tracing::warn!(error = %e, "mdns: register failed");
        return None;
    }
    tracing::info!(
        instance = %instance,
        http_addr = %SocketAddr::new(ip, http_bind.port()),
        "mdns: advertised jukebox"
    );
    Some(MdnsAdvertiser { daemon, fullname })
}

impl MdnsAdvertiser {
    pub(crate) fn shutdown(&self) {
        if let Ok(rx) = self.daemon.unregister(&self.fullname) {
            let _ = rx.recv_timeout(Duration::from_secs(1));
        }
        if let Ok(rx) = self.daemon.shutdown() {
            let _ = rx.recv_timeout(Duration::from_secs(1));
        }
    }
}

fn instance_name(host: &str) -> String {
    let short = host.split('.').next().unwrap_or_default().trim();
    if short.is_empty() {
        "jukebox".to_string()
    } else {
        format!("jukebox-{short}")
    }
}

/// Best-effort address of the interface used for outbound traffic.
fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    if socket.connect("8.8.8.8:80").is_err() && socket.connect("1.1.1.1:80").is_err() {
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}
