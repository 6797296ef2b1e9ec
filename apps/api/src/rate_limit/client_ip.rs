use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Placeholder identity when no client address can be determined.
/// The IP guard rejects it outright.
pub const UNKNOWN_IP: &str = "unknown";

/// Resolves the client IP for IP-keyed limits.
///
/// The first `X-Forwarded-For` entry wins (requests arrive through a proxy or
/// load balancer); otherwise the TCP peer address is used.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_IP.to_string(),
    }
}
