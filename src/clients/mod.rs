//! modules that help connecting to the outside world

pub mod flight_client;
pub mod socket;
pub mod tls;

pub use flight_client::{FlightConnector, ProbeClient, TonicConnector};
