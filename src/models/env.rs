use std::path::PathBuf;
use std::time::Duration;

use super::auth::{AuthScheme, Credentials};
use super::method::{ConnectionMethod, MethodKind};
use crate::config_err;
use crate::ensure;
use crate::error::Result;
use clap::ValueEnum;
use serde::Deserialize;

/// Prefix of the environment variables read by [ProbeSettings::from_env]
pub const ENV_PREFIX: &str = "FLIGHT_PROBE_";

/// Default Flight port of Dremio coordinators
pub const DEFAULT_FLIGHT_PORT: u16 = 32010;
pub const DEFAULT_QUERY: &str = "SELECT 1 as test_col";
/// Command used by the fallback connectivity check
pub const PING_COMMAND: &str = "SELECT 1";

/// Raw, possibly partial settings, as found in the environment or on the command line
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ProbeSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub auth_scheme: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub query: Option<String>,
    pub socket_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    /// comma separated list of method names
    pub methods: Option<String>,
    pub tls_root_cert: Option<PathBuf>,
}

/// Fully resolved configuration of a probe run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub query: String,
    pub socket_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub methods: Vec<ConnectionMethod>,
    /// extra CA certificate (PEM) trusted by verified TLS methods
    pub tls_root_cert: Option<PathBuf>,
}

impl ProbeConfig {
    /// Config with the default tuning for the given target
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            credentials: Credentials::None,
            query: DEFAULT_QUERY.to_owned(),
            socket_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            methods: ConnectionMethod::all(),
            tls_root_cert: None,
        }
    }
}

impl ProbeSettings {
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<ProbeSettings>()
            .map_err(|e| config_err!("{}", e))
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, ProbeSettings>(vars)
            .map_err(|e| config_err!("{}", e))
    }

    /// Fields set in `overrides` win over the ones in `self`
    pub fn merge(self, overrides: ProbeSettings) -> Self {
        Self {
            host: overrides.host.or(self.host),
            port: overrides.port.or(self.port),
            token: overrides.token.or(self.token),
            auth_scheme: overrides.auth_scheme.or(self.auth_scheme),
            username: overrides.username.or(self.username),
            password: overrides.password.or(self.password),
            query: overrides.query.or(self.query),
            socket_timeout_secs: overrides.socket_timeout_secs.or(self.socket_timeout_secs),
            request_timeout_secs: overrides
                .request_timeout_secs
                .or(self.request_timeout_secs),
            max_retries: overrides.max_retries.or(self.max_retries),
            retry_delay_secs: overrides.retry_delay_secs.or(self.retry_delay_secs),
            methods: overrides.methods.or(self.methods),
            tls_root_cert: overrides.tls_root_cert.or(self.tls_root_cert),
        }
    }

    pub fn resolve(self) -> Result<ProbeConfig> {
        let host = self
            .host
            .map(|h| h.trim().to_owned())
            .filter(|h| !h.trim_start_matches('[').trim_end_matches(']').is_empty())
            .ok_or_else(|| {
                config_err!("host is required (--host or {}HOST)", ENV_PREFIX)
            })?;
        let port = self.port.unwrap_or(DEFAULT_FLIGHT_PORT);
        ensure!(port != 0, "port must be in 1..=65535");

        let mut config = ProbeConfig::new(&host, port);
        config.credentials = credentials(
            self.auth_scheme.as_deref(),
            self.token,
            self.username,
            self.password,
        )?;
        if let Some(query) = self.query {
            ensure!(!query.trim().is_empty(), "query must not be empty");
            config.query = query;
        }
        if let Some(secs) = self.socket_timeout_secs {
            ensure!(secs > 0, "socket timeout must be positive");
            config.socket_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout_secs {
            ensure!(secs > 0, "request timeout must be positive");
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.max_retries {
            ensure!(retries >= 1, "at least one client creation attempt is needed");
            config.max_retries = retries;
        }
        if let Some(secs) = self.retry_delay_secs {
            config.retry_delay = Duration::from_secs(secs);
        }
        if let Some(methods) = self.methods {
            config.methods = parse_methods(&methods)?;
        }
        config.tls_root_cert = self.tls_root_cert;
        Ok(config)
    }
}

fn credentials(
    scheme: Option<&str>,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials> {
    let scheme = match scheme {
        Some(name) => AuthScheme::from_str(name, true)
            .map_err(|_| config_err!("unknown auth scheme '{}'", name))?,
        None if username.is_some() => AuthScheme::Basic,
        None => AuthScheme::default(),
    };
    let credentials = match scheme {
        AuthScheme::Token | AuthScheme::Bearer => {
            let token = token.filter(|t| !t.is_empty());
            match (scheme, token) {
                (_, None) => Credentials::None,
                (AuthScheme::Bearer, Some(pat)) => Credentials::Bearer(pat),
                (_, Some(pat)) => Credentials::Token(pat),
            }
        }
        AuthScheme::Basic => match (username, password) {
            (Some(username), Some(password)) => Credentials::Basic { username, password },
            _ => return Err(config_err!("basic auth needs both a username and a password")),
        },
    };
    // must be usable as a header before anything is sent
    credentials.metadata_value()?;
    Ok(credentials)
}

fn parse_methods(list: &str) -> Result<Vec<ConnectionMethod>> {
    let mut methods = vec![];
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind = MethodKind::from_str(name, true)
            .map_err(|_| config_err!("unknown connection method '{}'", name))?;
        let method = ConnectionMethod::new(kind);
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    ensure!(!methods.is_empty(), "at least one connection method is needed");
    Ok(methods)
}
