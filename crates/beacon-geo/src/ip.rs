use std::net::IpAddr;

/// Addresses that can never be located: private ranges, loopback,
/// link-local, IPv6 unique-local, plus anything empty or unparseable.
pub fn is_unroutable(ip: &str) -> bool {
    let Ok(addr) = ip.trim().parse::<IpAddr>() else {
        return true;
    };

    match addr {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => match ipv6.to_ipv4_mapped() {
            Some(ipv4) => is_unroutable(&ipv4.to_string()),
            None => {
                ipv6.is_loopback()
                    || ipv6.is_unspecified()
                    || ipv6.is_unique_local()
                    || ipv6.is_unicast_link_local()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_and_local_addresses() {
        for ip in [
            "10.0.0.4",
            "172.16.5.1",
            "192.168.1.20",
            "127.0.0.1",
            "169.254.10.1",
            "::1",
            "fd12:3456::1",
            "fe80::1",
            "::ffff:192.168.0.1",
            "",
            "not-an-ip",
        ] {
            assert!(is_unroutable(ip), "{ip} should be unroutable");
        }
    }

    #[test]
    fn test_public_addresses() {
        for ip in ["8.8.8.8", "203.0.113.9", "2001:4860:4860::8888"] {
            assert!(!is_unroutable(ip), "{ip} should be routable");
        }
    }
}
