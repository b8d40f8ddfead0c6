//! Local host facts baked into generated leaves.

use std::net::IpAddr;

use tracing::warn;

/// This machine's hostname, if it has a usable one.
pub fn local_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => name.into_string().ok().filter(|n| !n.is_empty()),
        Err(e) => {
            warn!(error = %e, "Failed to read hostname");
            None
        }
    }
}

/// Every IPv4 and IPv6 address on the local interfaces.
///
/// Enumeration failure yields an empty list; the leaf is still issued with
/// its name-based SANs.
#[cfg(unix)]
pub fn local_ip_addresses() -> Vec<IpAddr> {
    let addrs = match nix::ifaddrs::getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    let mut ips = Vec::new();
    for ifaddr in addrs {
        let Some(address) = ifaddr.address else {
            continue;
        };
        let ip = if let Some(v4) = address.as_sockaddr_in() {
            IpAddr::V4(v4.ip())
        } else if let Some(v6) = address.as_sockaddr_in6() {
            IpAddr::V6(v6.ip())
        } else {
            continue;
        };
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

#[cfg(not(unix))]
pub fn local_ip_addresses() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
        IpAddr::V6(std::net::Ipv6Addr::LOCALHOST),
    ]
}
