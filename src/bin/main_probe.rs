use std::error::Error;
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, ValueEnum};
use flight_probe::clients::TonicConnector;
use flight_probe::models::auth::AuthScheme;
use flight_probe::models::env::ProbeSettings;
use flight_probe::models::MethodKind;
use flight_probe::services::probe::{ConsoleReporter, NoopReporter, ProbeService, Reporter};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Diagnose connectivity to an Arrow Flight service.
///
/// Every option can also be set with a FLIGHT_PROBE_* environment variable
/// (e.g. FLIGHT_PROBE_HOST, FLIGHT_PROBE_TOKEN), flags win.
#[derive(Parser, Debug)]
#[command(name = "flight_probe", version)]
struct Args {
    /// Flight server host name or IP address
    #[arg(long)]
    host: Option<String>,
    /// Flight server port [default: 32010]
    #[arg(long)]
    port: Option<u16>,
    /// Personal access token
    #[arg(long)]
    token: Option<String>,
    /// How the credentials are sent in the authorization header
    #[arg(long, value_enum)]
    auth_scheme: Option<AuthScheme>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// Test query [default: SELECT 1 as test_col]
    #[arg(long)]
    query: Option<String>,
    /// Seconds to wait for the raw TCP check [default: 5]
    #[arg(long)]
    socket_timeout: Option<u64>,
    /// Seconds allowed for each connection or call [default: 30]
    #[arg(long)]
    request_timeout: Option<u64>,
    /// Client creation attempts per method [default: 3]
    #[arg(long)]
    max_retries: Option<u32>,
    /// Seconds between client creation attempts [default: 2]
    #[arg(long)]
    retry_delay: Option<u64>,
    /// Only try these methods, in this order [default: all]
    #[arg(long = "method", value_enum)]
    methods: Vec<MethodKind>,
    /// Extra CA certificate (PEM) for the verified TLS method
    #[arg(long)]
    tls_root_cert: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl Args {
    fn settings(&self) -> ProbeSettings {
        let methods = if self.methods.is_empty() {
            None
        } else {
            Some(
                self.methods
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };
        ProbeSettings {
            host: self.host.clone(),
            port: self.port,
            token: self.token.clone(),
            auth_scheme: self
                .auth_scheme
                .and_then(|s| s.to_possible_value())
                .map(|v| v.get_name().to_owned()),
            username: self.username.clone(),
            password: self.password.clone(),
            query: self.query.clone(),
            socket_timeout_secs: self.socket_timeout,
            request_timeout_secs: self.request_timeout,
            max_retries: self.max_retries,
            retry_delay_secs: self.retry_delay,
            methods,
            tls_root_cert: self.tls_root_cert.clone(),
        }
    }
}

/// Returns whether a connection method worked
async fn run(args: Args) -> Result<bool, Box<dyn Error>> {
    let config = ProbeSettings::from_env()?.merge(args.settings()).resolve()?;
    let reporter: Box<dyn Reporter> = match args.format {
        OutputFormat::Text => Box::new(ConsoleReporter {}),
        OutputFormat::Json => Box::new(NoopReporter {}),
    };
    let connector = TonicConnector::new(
        &config.credentials,
        config.request_timeout,
        config.tls_root_cert.clone(),
    )?;
    let report = ProbeService::new(config, Box::new(connector), reporter)
        .run()
        .await;
    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(report.is_success())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(Args::parse()).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("[probe] {}", e);
            2
        }
    };
    exit(code);
}
