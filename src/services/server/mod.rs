mod flight_service;
#[cfg(test)]
pub(crate) mod test_certs;

pub use flight_service::FlightServiceImpl;
