use std::fmt::{Display, Formatter};

use crate::error::{ProbeError, Result};
use serde::Serialize;

/// Transport scheme of a Flight location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    /// Plaintext gRPC, `grpc://` or `grpc+tcp://`
    Grpc,
    /// gRPC over TLS, `grpc+tls://`
    GrpcTls,
}

impl Scheme {
    fn from_uri_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "grpc" | "grpc+tcp" => Some(Scheme::Grpc),
            "grpc+tls" => Some(Scheme::GrpcTls),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Grpc => "grpc",
            Scheme::GrpcTls => "grpc+tls",
        }
    }

    pub fn is_tls(&self) -> bool {
        *self == Scheme::GrpcTls
    }
}

/// Address of a Flight service: transport scheme, host and port
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Location {
    /// Plaintext gRPC location
    pub fn for_grpc(host: &str, port: u16) -> Result<Self> {
        Self::new(Scheme::Grpc, host, port)
    }

    /// TLS gRPC location
    pub fn for_grpc_tls(host: &str, port: u16) -> Result<Self> {
        Self::new(Scheme::GrpcTls, host, port)
    }

    /// Parse a location uri such as `grpc+tls://host:port`
    pub fn for_uri(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
            ProbeError::InvalidLocation(format!("'{}' has no scheme", uri))
        })?;
        let scheme = Scheme::from_uri_scheme(scheme).ok_or_else(|| {
            ProbeError::InvalidLocation(format!(
                "unsupported scheme '{}' in '{}'",
                scheme, uri
            ))
        })?;
        // drop any path, Flight locations only carry the authority
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = split_host_port(authority).ok_or_else(|| {
            ProbeError::InvalidLocation(format!("'{}' should be host:port", authority))
        })?;
        let port = port.parse::<u16>().map_err(|_| {
            ProbeError::InvalidLocation(format!("invalid port '{}' in '{}'", port, uri))
        })?;
        Self::new(scheme, host, port)
    }

    fn new(scheme: Scheme, host: &str, port: u16) -> Result<Self> {
        let host = host.trim().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ProbeError::InvalidLocation("host is empty".to_owned()));
        }
        if port == 0 {
            return Err(ProbeError::InvalidLocation("port 0 is not valid".to_owned()));
        }
        Ok(Self {
            scheme,
            host: host.to_owned(),
            port,
        })
    }

    /// Uri handed to the gRPC transport
    pub fn endpoint_uri(&self) -> String {
        let scheme = if self.scheme.is_tls() { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority())
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())
    }
}

fn split_host_port(authority: &str) -> Option<(&str, &str)> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']')?;
        let port = rest.strip_prefix(':')?;
        Some((host, port))
    } else {
        let (host, port) = authority.rsplit_once(':')?;
        if host.contains(':') {
            // unbracketed IPv6
            None
        } else {
            Some((host, port))
        }
    }
}
