//! A thin DNS resolution façade (spec.md §1, §6).
//!
//! Per spec.md Non-goals, `store`/`event` never perform network I/O on
//! their own hot paths; this module exists only so a caller building a
//! traceroute target or a subprocess argument list has one place to turn a
//! hostname into addresses, rather than reaching for `std::net` ad hoc
//! throughout the crate.

use crate::error::{Error, Result};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Resolve `host` to its IPv4/IPv6 addresses using the OS resolver.
pub fn resolve(host: &str) -> Result<Vec<IpAddr>> {
    let addrs: Vec<IpAddr> = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| Error::Resolution(format!("{host}: {e}")))?
        .map(|s: SocketAddr| s.ip())
        .collect();
    if addrs.is_empty() {
        return Err(Error::Resolution(format!("{host}: no addresses returned")));
    }
    Ok(addrs)
}

/// Resolve `host` and return the first address, preferring IPv4.
pub fn resolve_one(host: &str) -> Result<IpAddr> {
    let addrs = resolve(host)?;
    Ok(addrs
        .iter()
        .find(|a| a.is_ipv4())
        .copied()
        .unwrap_or(addrs[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_localhost() {
        let addrs = resolve("localhost").expect("localhost should always resolve");
        assert!(!addrs.is_empty());
    }

    #[test]
    fn rejects_unresolvable_host() {
        let result = resolve("this-host-does-not-exist.invalid");
        assert!(result.is_err());
    }
}
