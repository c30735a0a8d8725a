use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace};

/// Get the remote IP address of the caller, for logging webhook sources.
///
/// The first address in `X-Forwarded-For` is used iif `use_x_forwarded_for` is set in the configuration (i.e. the
/// server sits behind a trusted proxy). Otherwise, the peer address from the connection info is used.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool) -> Option<IpAddr> {
    let forwarded = use_x_forwarded_for
        .then(|| req.headers().get("X-Forwarded-For"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| IpAddr::from_str(s.trim()).ok());
    if let Some(ip) = forwarded {
        debug!("Using X-Forwarded-For header for remote address: {ip}");
        return Some(ip);
    }
    let peer_addr = req.peer_addr().map(|a| a.ip());
    trace!("Using peer address for remote address: {peer_addr:?}");
    peer_addr
}
