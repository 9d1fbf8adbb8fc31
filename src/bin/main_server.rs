use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use flight_probe::models::Credentials;
use flight_probe::services::server::FlightServiceImpl;
use tracing_subscriber::EnvFilter;

/// Local Arrow Flight server answering the probe's calls
#[derive(Parser, Debug)]
#[command(name = "flight_server")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,
    #[arg(long, default_value_t = 32010)]
    port: u16,
    /// Require `authorization: token <TOKEN>` on every call
    #[arg(long)]
    token: Option<String>,
    /// Answer ListFlights with `unimplemented`
    #[arg(long)]
    no_list_flights: bool,
    /// PEM certificate chain, serves TLS together with --tls-key
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    /// PEM private key of --tls-cert
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

async fn start_flight_server(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = match args.token {
        Some(token) => Credentials::Token(token),
        None => Credentials::None,
    };
    let mut flight_service = FlightServiceImpl::new(&credentials);
    if args.no_list_flights {
        flight_service = flight_service.without_list_flights();
    }
    let scheme = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            let cert = tokio::fs::read(cert).await?;
            let key = tokio::fs::read(key).await?;
            flight_service = flight_service.with_tls(cert, key);
            "grpc+tls"
        }
        _ => "grpc",
    };
    let (addr, server_handle) = flight_service
        .start(SocketAddr::new(args.bind, args.port))
        .await?;
    println!("[server] serving flights on {}://{}", scheme, addr);
    server_handle.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    start_flight_server(Args::parse()).await
}
