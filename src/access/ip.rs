//! Client address extraction.

use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;

use axum::extract::ConnectInfo;
use regex::Regex;

static HOST_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+):\d+$").expect("static host:port pattern"));

/// Trait for types that provide access to HTTP headers and extensions.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Proxy header carrying the original client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    XForwardedFor,
    XRealIp,
    CfConnectingIp,
}

/// Reads the client address from a proxy header instead of the socket peer.
#[derive(Clone, Debug)]
pub struct IpExtractor {
    pub header_name: &'static str,
    /// The header may hold a comma separated chain; the first entry is the client.
    first_of_list: bool,
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(header: ClientIpHeader) -> Self {
        match header {
            ClientIpHeader::XForwardedFor => Self {
                header_name: "x-forwarded-for",
                first_of_list: true,
            },
            ClientIpHeader::XRealIp => Self {
                header_name: "x-real-ip",
                first_of_list: false,
            },
            ClientIpHeader::CfConnectingIp => Self {
                header_name: "cf-connecting-ip",
                first_of_list: false,
            },
        }
    }
}

impl IpExtractor {
    /// Parse the header value into a bare IP address string.
    pub fn extract(&self, value: &str) -> Result<String, &'static str> {
        let candidate = if self.first_of_list {
            value.split(',').next().unwrap_or("")
        } else {
            value
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

/// Split a `host:port` peer address into its bare host.
///
/// Bracketed IPv6 hosts are returned without brackets. Returns `None` when
/// the address does not follow the `host:port` layout.
pub fn peer_host(remote_addr: &str) -> Option<String> {
    let captures = HOST_PORT.captures(remote_addr)?;
    let host = captures.get(1)?.as_str();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

/// Extract client IP address based on configuration.
///
/// If `ip_extractor` is set, extracts IP from the configured header and returns an error
/// if the header is missing or invalid (does NOT fall back to SocketAddr).
///
/// If `ip_extractor` is None, uses the peer address from ConnectInfo.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_extractor: Option<&IpExtractor>,
) -> Result<String, &'static str> {
    match ip_extractor {
        Some(extractor) => {
            let header_value = source
                .headers()
                .get(extractor.header_name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            extractor.extract(header_value)
        }
        None => {
            let peer = source
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .ok_or("No client IP available")?;
            peer_host(&peer.0.to_string()).ok_or("Address needs to match host:port layout")
        }
    }
}
