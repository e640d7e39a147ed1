use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

/// Set by Azure App Service in front of the app.
pub const AZURE_CLIENT_IP: &str = "x-azure-clientip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Resolve the originating client address.
///
/// Looks at the platform header first, then the leftmost `X-Forwarded-For`
/// entry, then `X-Real-IP`, and finally the transport peer. Never fails: an
/// empty string comes back when nothing is available.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let raw = header_str(headers, AZURE_CLIENT_IP)
        .or_else(|| {
            header_str(headers, X_FORWARDED_FOR)
                .and_then(|value| value.split(',').next())
                .map(str::trim)
        })
        .or_else(|| header_str(headers, X_REAL_IP))
        .map(str::to_string);

    match raw {
        Some(ip) => strip_port(&ip).to_string(),
        None => peer.map(|addr| addr.ip().to_string()).unwrap_or_default(),
    }
}

/// Drop a trailing `:port`. Bracketed IPv6 is left alone, as is anything that
/// already parses as an address.
pub fn strip_port(ip: &str) -> &str {
    if ip.parse::<IpAddr>().is_ok() || ip.starts_with('[') {
        return ip;
    }
    ip.split(':').next().unwrap_or(ip)
}

/// Blank or whitespace-only values count as absent, so the next source in
/// the chain is tried.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
}

/// Extractor wrapping [`resolve_client_ip`]. Works with or without
/// `into_make_service_with_connect_info`.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(resolve_client_ip(&parts.headers, peer)))
    }
}
