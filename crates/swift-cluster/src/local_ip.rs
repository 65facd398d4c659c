use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Picks the address a member should register itself under, given the
/// set of addresses bound to this host's interfaces.
///
/// Rejects IPv6 link-local, multicast, and unique-local (site-local)
/// addresses, and Teredo tunneling addresses (`2001:0::/32`); rejects any
/// IPv4 address in `169.0.0.0/8` (the unreachable fallback some systems
/// bind when DHCP fails, not just `169.254.0.0/16`). Among what remains,
/// prefers a non-loopback address; returns the first such entry, falling
/// back to the first loopback entry if every candidate is loopback.
pub fn select_local_ip(candidates: &[IpAddr]) -> Option<IpAddr> {
    let usable: Vec<&IpAddr> = candidates.iter().filter(|addr| is_usable(addr)).collect();

    usable
        .iter()
        .find(|addr| !addr.is_loopback())
        .or_else(|| usable.first())
        .copied()
        .copied()
}

fn is_usable(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !is_169_prefixed(v4),
        IpAddr::V6(v6) => !(is_teredo(v6) || v6.is_multicast() || is_unicast_link_local(v6) || is_unique_local(v6)),
    }
}

fn is_169_prefixed(v4: &Ipv4Addr) -> bool {
    v4.octets()[0] == 169
}

fn is_teredo(v6: &Ipv6Addr) -> bool {
    v6.segments()[0] == 0x2001 && v6.segments()[1] == 0x0000
}

fn is_unicast_link_local(v6: &Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

fn is_unique_local(v6: &Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn prefers_non_loopback_ipv4() {
        let candidates = vec![v4("127.0.0.1"), v4("10.0.0.5")];
        assert_eq!(select_local_ip(&candidates), Some(v4("10.0.0.5")));
    }

    #[test]
    fn rejects_169_prefixed_addresses() {
        let candidates = vec![v4("169.254.1.1"), v4("169.1.2.3"), v4("10.0.0.7")];
        assert_eq!(select_local_ip(&candidates), Some(v4("10.0.0.7")));
    }

    #[test]
    fn rejects_ipv6_link_local_and_multicast_and_site_local() {
        let candidates = vec![
            v6("fe80::1"),
            v6("ff02::1"),
            v6("fc00::1"),
            v6("2001:db8::1"),
        ];
        assert_eq!(select_local_ip(&candidates), Some(v6("2001:db8::1")));
    }

    #[test]
    fn rejects_teredo() {
        let candidates = vec![v6("2001:0:4136:e378::1"), v6("2001:db8::1")];
        assert_eq!(select_local_ip(&candidates), Some(v6("2001:db8::1")));
    }

    #[test]
    fn falls_back_to_loopback_if_nothing_else_usable() {
        let candidates = vec![v4("127.0.0.1")];
        assert_eq!(select_local_ip(&candidates), Some(v4("127.0.0.1")));
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(select_local_ip(&[]), None);
    }
}
