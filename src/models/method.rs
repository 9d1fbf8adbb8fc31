use std::fmt::{Display, Formatter};

use super::Location;
use crate::error::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The ways a location can be built and dialed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    /// TLS location from host and port, server verification disabled
    Tls,
    /// Plaintext location from host and port
    Insecure,
    /// TLS location parsed from a `grpc+tls://` uri
    UriTls,
    /// Plaintext location parsed from a `grpc://` uri
    UriInsecure,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Tls => "tls",
            MethodKind::Insecure => "insecure",
            MethodKind::UriTls => "uri-tls",
            MethodKind::UriInsecure => "uri-insecure",
        }
    }
}

impl Display for MethodKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionMethod {
    pub kind: MethodKind,
    /// Whether the server certificate is checked (TLS methods only)
    pub verify_server: bool,
}

impl ConnectionMethod {
    pub fn new(kind: MethodKind) -> Self {
        let verify_server = match kind {
            MethodKind::Tls => false,
            MethodKind::UriTls => true,
            MethodKind::Insecure | MethodKind::UriInsecure => false,
        };
        Self {
            kind,
            verify_server,
        }
    }

    /// All methods, in the order they are tried
    pub fn all() -> Vec<Self> {
        vec![
            Self::new(MethodKind::Tls),
            Self::new(MethodKind::Insecure),
            Self::new(MethodKind::UriTls),
            Self::new(MethodKind::UriInsecure),
        ]
    }

    /// Build the location the way this method prescribes
    pub fn location(&self, host: &str, port: u16) -> Result<Location> {
        match self.kind {
            MethodKind::Tls => Location::for_grpc_tls(host, port),
            MethodKind::Insecure => Location::for_grpc(host, port),
            MethodKind::UriTls => {
                Location::for_uri(&format!("grpc+tls://{}:{}", bracket(host), port))
            }
            MethodKind::UriInsecure => {
                Location::for_uri(&format!("grpc://{}:{}", bracket(host), port))
            }
        }
    }
}

fn bracket(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_owned()
    }
}
