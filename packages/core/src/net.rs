//! Local address discovery for default server URLs.

use std::net::Ipv4Addr;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use snafu::ResultExt;

use crate::error::{Error, InterfacesSnafu, Result};

/// One interface address as seen by [`local_ip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    up: bool,
    loopback: bool,
    ip: Ipv4Addr,
}

fn pick(candidates: impl IntoIterator<Item = Candidate>) -> Option<Ipv4Addr> {
    candidates
        .into_iter()
        .find(|c| c.up && !c.loopback && !c.ip.is_loopback())
        .map(|c| c.ip)
}

/// Returns the first IPv4 address of an up, non-loopback interface.
pub fn local_ip() -> Result<Ipv4Addr> {
    let addrs = getifaddrs().context(InterfacesSnafu)?;
    let candidates = addrs.filter_map(|ifa| {
        let ip = ifa.address.as_ref()?.as_sockaddr_in()?.ip();
        Some(Candidate {
            up: ifa.flags.contains(InterfaceFlags::IFF_UP),
            loopback: ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK),
            ip,
        })
    });
    pick(candidates).ok_or(Error::NoNetwork)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(up: bool, loopback: bool, ip: [u8; 4]) -> Candidate {
        Candidate {
            up,
            loopback,
            ip: Ipv4Addr::from(ip),
        }
    }

    #[test]
    fn test_pick_skips_down_and_loopback() {
        let picked = pick(vec![
            candidate(true, true, [127, 0, 0, 1]),
            candidate(false, false, [10, 0, 0, 5]),
            candidate(true, false, [192, 168, 0, 9]),
            candidate(true, false, [172, 17, 0, 1]),
        ]);
        assert_eq!(picked, Some(Ipv4Addr::new(192, 168, 0, 9)));
    }

    #[test]
    fn test_pick_none() {
        assert_eq!(pick(vec![candidate(true, true, [127, 0, 0, 1])]), None);
    }
}
