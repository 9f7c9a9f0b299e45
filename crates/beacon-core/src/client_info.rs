//! Caller metadata extracted from request headers

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header::USER_AGENT, HeaderMap};

/// Headers consulted for the client address, most trusted first
const FORWARDING_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "true-client-ip",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            ip_address: client_ip(headers, peer),
            user_agent,
        }
    }
}

/// Resolve the caller's address from proxy headers, falling back to the peer.
///
/// `X-Forwarded-For` may carry a chain; the first hop is the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    FORWARDING_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(normalize_ip)
        .or_else(|| peer.map(|addr| normalize_ip(&addr.ip().to_string())))
}

/// Strip the IPv4-mapped IPv6 prefix (`::ffff:1.2.3.4` -> `1.2.3.4`).
pub fn normalize_ip(ip: &str) -> String {
    ip.strip_prefix("::ffff:").unwrap_or(ip).to_string()
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientInfo::from_parts(&parts.headers, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let map = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(client_ip(&map, None), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_header_precedence() {
        let map = headers(&[
            ("cf-connecting-ip", "198.51.100.2"),
            ("x-real-ip", "198.51.100.1"),
        ]);
        assert_eq!(client_ip(&map, None), Some("198.51.100.1".to_string()));
    }

    #[test]
    fn test_falls_back_to_peer_and_strips_mapped_prefix() {
        let peer: SocketAddr = "[::ffff:192.0.2.5]:4000".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)),
            Some("192.0.2.5".to_string())
        );
        assert_eq!(normalize_ip("::ffff:8.8.8.8"), "8.8.8.8");
    }

    #[test]
    fn test_no_source_yields_none() {
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_user_agent_defaults_to_empty() {
        let info = ClientInfo::from_parts(&headers(&[("x-real-ip", "1.1.1.1")]), None);
        assert_eq!(info.user_agent, "");
        assert_eq!(info.ip_address.as_deref(), Some("1.1.1.1"));
    }
}
