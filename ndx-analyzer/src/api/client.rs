//! Client identity for admission control
//!
//! First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer
//! address, else `127.0.0.1`.

use axum::http::HeaderMap;
use std::net::SocketAddr;

const DEFAULT_CLIENT: &str = "127.0.0.1";

pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| DEFAULT_CLIENT.to_string())
}
