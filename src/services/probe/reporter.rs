use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::models::report::{EndpointSummary, SocketOutcome};
use crate::models::{Location, MethodKind};

/// Progress of a probe run, in the order things happen
#[derive(Debug)]
pub enum ProbeEvent<'a> {
    SocketStart { host: &'a str, port: u16 },
    SocketDone { host: &'a str, port: u16, outcome: &'a SocketOutcome },
    ConnectionsStart,
    MethodStart(MethodKind),
    LocationFailed { method: MethodKind, reason: &'a str },
    LocationBuilt(&'a Location),
    ClientCreated { attempt: u32 },
    ClientFailed { attempt: u32, reason: &'a str },
    Retrying(Duration),
    TestingConnection,
    ListFlightsOk(usize),
    ListFlightsFailed(&'a str),
    FlightInfoOk(usize),
    FlightInfoFailed(&'a str),
    WorkingConnection(MethodKind),
    NoWorkingCall,
    QueryStart(&'a str),
    Endpoints(&'a [EndpointSummary]),
    QueryOk { rows: usize, table: &'a str },
    QueryFailed(&'a str),
    Recommendations(&'a [String]),
}

impl Display for ProbeEvent<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeEvent::SocketStart { host, port } => {
                write!(f, "Testing basic network connectivity to {}:{}", host, port)
            }
            ProbeEvent::SocketDone { host, port, outcome } => match &outcome.error {
                None => write!(f, "Port {} is open on {}", port, host),
                Some(error) => write!(
                    f,
                    "Port {} is not accessible on {} ({})\n\
                     This may indicate a firewall issue or the server isn't listening on this port",
                    port, host, error
                ),
            },
            ProbeEvent::ConnectionsStart => write!(
                f,
                "\nAttempting Arrow Flight connection with various configurations..."
            ),
            ProbeEvent::MethodStart(method) => write!(f, "\nTrying {} connection...", method),
            ProbeEvent::LocationFailed { method, reason } => {
                write!(f, "Could not create location for {}: {}", method, reason)
            }
            ProbeEvent::LocationBuilt(location) => {
                write!(f, "Creating Flight client with location: {}", location)
            }
            ProbeEvent::ClientCreated { attempt } => {
                write!(f, "Successfully created Flight client on attempt {}", attempt)
            }
            ProbeEvent::ClientFailed { attempt, reason } => {
                write!(f, "Failed to create client on attempt {}: {}", attempt, reason)
            }
            ProbeEvent::Retrying(delay) => {
                write!(f, "Retrying in {} seconds...", delay.as_secs_f32())
            }
            ProbeEvent::TestingConnection => {
                write!(f, "Testing connection with a simple action...")
            }
            ProbeEvent::ListFlightsOk(count) => {
                write!(f, "Connection successful! Found {} flights", count)
            }
            ProbeEvent::ListFlightsFailed(reason) => {
                write!(f, "List flights failed: {}", reason)
            }
            ProbeEvent::FlightInfoOk(endpoints) => write!(
                f,
                "Get flight info successful! Got {} endpoint(s)",
                endpoints
            ),
            ProbeEvent::FlightInfoFailed(reason) => {
                write!(f, "Get flight info failed: {}", reason)
            }
            ProbeEvent::WorkingConnection(method) => {
                write!(f, "Found a working connection using {} method", method)
            }
            ProbeEvent::NoWorkingCall => write!(
                f,
                "No metadata call went through, trying the test query anyway"
            ),
            ProbeEvent::QueryStart(query) => write!(f, "Executing test query: {}", query),
            ProbeEvent::Endpoints(endpoints) => {
                write!(f, "Flight info has {} endpoints", endpoints.len())?;
                for endpoint in endpoints.iter() {
                    write!(
                        f,
                        "\nEndpoint {}:\n  Ticket: {}\n  Locations: {:?}",
                        endpoint.index, endpoint.ticket, endpoint.locations
                    )?;
                }
                Ok(())
            }
            ProbeEvent::QueryOk { rows, table } => {
                write!(f, "Query successful! ({} rows)\n{}", rows, table)
            }
            ProbeEvent::QueryFailed(reason) => {
                write!(f, "Error executing test query: {}", reason)
            }
            ProbeEvent::Recommendations(items) => {
                write!(f, "\nAll connection methods failed. Recommendations:")?;
                for (i, item) in items.iter().enumerate() {
                    write!(f, "\n{}. {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: &ProbeEvent<'_>);
}

/// Prints the narrative on stdout
pub struct ConsoleReporter {}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &ProbeEvent<'_>) {
        println!("{}", event);
    }
}

pub struct NoopReporter {}

impl Reporter for NoopReporter {
    fn report(&self, _event: &ProbeEvent<'_>) {}
}
