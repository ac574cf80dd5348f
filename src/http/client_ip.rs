//! Resolution of the client address used for rate limiting.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

use crate::config::ClientIpSource;

/// Pick the client address according to the configured source.
///
/// In header mode the header is honoured only when the connection itself
/// comes from a trusted proxy. The list is walked right to left, skipping
/// trusted hops, and the first remaining address is the client: entries to
/// its left were supplied by the client and cannot be trusted. A missing or
/// unparseable header, or one made only of trusted hops, falls back to the
/// peer address.
pub fn resolve_client_ip(source: &ClientIpSource, headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    match source {
        ClientIpSource::Peer => peer.ip(),
        ClientIpSource::Header {
            name,
            trusted_proxies,
        } => {
            let value = headers.get(name.as_str());

            if !trusted_proxies.contains(&peer.ip()) {
                if value.is_some() {
                    warn!(
                        header = %name,
                        peer = %peer,
                        "Ignoring forwarding header from untrusted peer"
                    );
                }
                return peer.ip();
            }

            value
                .and_then(|value| value.to_str().ok())
                .and_then(|value| nearest_untrusted_hop(value, trusted_proxies))
                .unwrap_or_else(|| {
                    debug!(header = %name, peer = %peer, "Client IP header unusable, using peer address");
                    peer.ip()
                })
        }
    }
}

fn nearest_untrusted_hop(value: &str, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    for entry in value.rsplit(',') {
        let ip: IpAddr = entry.trim().parse().ok()?;
        if !trusted_proxies.contains(&ip) {
            return Some(ip);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxy() -> SocketAddr {
        "10.0.0.1:51234".parse().unwrap()
    }

    fn outsider() -> SocketAddr {
        "192.0.2.10:51234".parse().unwrap()
    }

    fn header_source() -> ClientIpSource {
        ClientIpSource::Header {
            name: "x-forwarded-for".to_string(),
            trusted_proxies: vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()],
        }
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_peer_source_ignores_headers() {
        let headers = forwarded("203.0.113.1");

        let ip = resolve_client_ip(&ClientIpSource::Peer, &headers, outsider());
        assert_eq!(ip, outsider().ip());
    }

    #[test]
    fn test_header_source_uses_nearest_untrusted_hop() {
        let headers = forwarded(" 198.51.100.7 , 203.0.113.1, 10.0.0.2");

        let ip = resolve_client_ip(&header_source(), &headers, proxy());
        assert_eq!(ip, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forged_prefix_does_not_change_client() {
        let first = forwarded("198.51.100.1, 203.0.113.9");
        let second = forwarded("198.51.100.2, 203.0.113.9");

        let a = resolve_client_ip(&header_source(), &first, proxy());
        let b = resolve_client_ip(&header_source(), &second, proxy());
        assert_eq!(a, b);
        assert_eq!(a, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_header_from_untrusted_peer_is_ignored() {
        let headers = forwarded("203.0.113.1");

        let ip = resolve_client_ip(&header_source(), &headers, outsider());
        assert_eq!(ip, outsider().ip());
    }

    #[test]
    fn test_header_source_accepts_ipv6() {
        let headers = forwarded("2001:db8::1");

        let ip = resolve_client_ip(&header_source(), &headers, proxy());
        assert_eq!(ip, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_header_source_falls_back_to_peer() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&header_source(), &headers, proxy()), proxy().ip());

        let headers = forwarded("not-an-ip");
        assert_eq!(resolve_client_ip(&header_source(), &headers, proxy()), proxy().ip());

        // Garbage in the rightmost position is never skipped over
        let headers = forwarded("203.0.113.1, garbage");
        assert_eq!(resolve_client_ip(&header_source(), &headers, proxy()), proxy().ip());

        let headers = forwarded("10.0.0.2, 10.0.0.1");
        assert_eq!(resolve_client_ip(&header_source(), &headers, proxy()), proxy().ip());
    }
}
