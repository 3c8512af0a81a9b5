//! A minimal threaded UDP traceroute (spec.md §1, §6).
//!
//! Per spec.md Non-goals, non-core-path network I/O is explicitly out of
//! scope for fidelity — `store` and `event` never depend on this module.
//! It exists only as the thin external collaborator named in spec.md §6:
//! one thread per hop, each sending a UDP probe with an increasing
//! time-to-live and measuring how long it takes to get *any* response
//! (including the `ConnectionRefused`/`PortUnreachable` a UDP socket sees
//! once a probe actually reaches the destination). This is not a
//! replacement for a real ICMP-based traceroute — reading TTL-exceeded
//! replies requires a raw socket, which needs elevated privileges and is
//! out of scope here.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// The outcome of probing a single hop.
#[derive(Debug, Clone)]
pub struct Hop {
    pub ttl: u32,
    pub rtt: Option<Duration>,
}

/// Probe `target` with `max_hops` increasing-TTL UDP datagrams, one thread
/// per hop, each bounded by `per_hop_timeout`. Returns one [`Hop`] per TTL
/// in order, regardless of which thread finishes first.
pub fn traceroute(
    target: impl ToSocketAddrs,
    max_hops: u32,
    per_hop_timeout: Duration,
) -> io::Result<Vec<Hop>> {
    let addr: SocketAddr = target
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "target did not resolve"))?;

    let (tx, rx) = mpsc::channel();
    for ttl in 1..=max_hops {
        let tx = tx.clone();
        thread::spawn(move || {
            let hop = probe_hop(addr, ttl, per_hop_timeout).unwrap_or(Hop { ttl, rtt: None });
            let _ = tx.send(hop);
        });
    }
    drop(tx);

    let mut hops: Vec<Hop> = rx.iter().take(max_hops as usize).collect();
    hops.sort_by_key(|h| h.ttl);
    Ok(hops)
}

fn probe_hop(target: SocketAddr, ttl: u32, timeout: Duration) -> io::Result<Hop> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_ttl(ttl)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.connect(target)?;

    let start = Instant::now();
    socket.send(&[0u8; 8])?;
    let mut buf = [0u8; 8];
    match socket.recv(&mut buf) {
        Ok(_) => Ok(Hop {
            ttl,
            rtt: Some(start.elapsed()),
        }),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(Hop {
            ttl,
            rtt: Some(start.elapsed()),
        }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
            Ok(Hop { ttl, rtt: None })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hops_come_back_in_ttl_order() {
        let hops = traceroute("127.0.0.1:9", 4, Duration::from_millis(100)).unwrap();
        let ttls: Vec<_> = hops.iter().map(|h| h.ttl).collect();
        assert_eq!(ttls, vec![1, 2, 3, 4]);
    }
}
