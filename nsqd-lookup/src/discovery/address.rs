//! Addresses other nodes should use to reach this one

use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

/// Announced first when the node listens on a wildcard or loopback address
pub const LOOPBACK_ADDR: &str = "127.0.0.1";

/// Resolve the ordered address list for a listen address.
///
/// Fails only if the machine hostname cannot be read, which leaves the node
/// with nothing to announce.
pub fn network_addrs(listen: &SocketAddr) -> Result<Vec<String>> {
    let hostname = hostname::get()
        .map_err(|e| Error::Hostname(format!("failed to get hostname: {e}")))?
        .into_string()
        .map_err(|raw| Error::Hostname(format!("hostname is not valid UTF-8: {raw:?}")))?;

    Ok(network_addrs_for(listen.ip(), &hostname))
}

/// Loopback first (when listening on any/loopback), hostname always last
#[must_use]
pub fn network_addrs_for(ip: IpAddr, hostname: &str) -> Vec<String> {
    let ip = ip.to_canonical();
    let mut addrs = Vec::with_capacity(2);

    if ip.is_unspecified() || ip.is_loopback() {
        addrs.push(LOOPBACK_ADDR.to_string());
    }
    addrs.push(hostname.to_string());

    addrs
}
