mod probe_service;
mod recommendations;
mod reporter;

pub use probe_service::ProbeService;
pub use recommendations::recommendations;
pub use reporter::{ConsoleReporter, NoopReporter, ProbeEvent, Reporter};
