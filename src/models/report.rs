//! Outcomes of a probe run, serializable for `--format json`

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Location, MethodKind};

#[derive(Debug, Clone, Serialize)]
pub struct SocketOutcome {
    pub open: bool,
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

/// One client construction attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptOutcome {
    /// 1-based
    pub attempt: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeStep {
    Ok(String),
    Failed(String),
    #[default]
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSummary {
    pub index: usize,
    pub ticket: String,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodOutcome {
    pub method: MethodKind,
    pub location: Option<Location>,
    pub location_error: Option<String>,
    pub attempts: Vec<AttemptOutcome>,
    pub client_created: bool,
    pub list_flights: ProbeStep,
    pub flight_info: ProbeStep,
    /// a metadata call (list flights or flight info) went through
    pub connected: bool,
    pub endpoints: Vec<EndpointSummary>,
    pub query: ProbeStep,
    pub rows: Option<usize>,
    /// pretty printed result of the test query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub succeeded: bool,
}

impl MethodOutcome {
    pub fn new(method: MethodKind) -> Self {
        Self {
            method,
            location: None,
            location_error: None,
            attempts: vec![],
            client_created: false,
            list_flights: ProbeStep::Skipped,
            flight_info: ProbeStep::Skipped,
            connected: false,
            endpoints: vec![],
            query: ProbeStep::Skipped,
            rows: None,
            table: None,
            succeeded: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub started_at: DateTime<Utc>,
    pub host: String,
    pub port: u16,
    pub socket: Option<SocketOutcome>,
    pub methods: Vec<MethodOutcome>,
    pub succeeded_with: Option<MethodKind>,
    pub recommendations: Vec<String>,
}

impl ProbeReport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            started_at: Utc::now(),
            host: host.to_owned(),
            port,
            socket: None,
            methods: vec![],
            succeeded_with: None,
            recommendations: vec![],
        }
    }

    pub fn is_success(&self) -> bool {
        self.succeeded_with.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_steps_with_status() {
        let mut outcome = MethodOutcome::new(MethodKind::UriInsecure);
        outcome.list_flights = ProbeStep::Failed("Unimplemented: nope".to_owned());
        outcome.flight_info = ProbeStep::Ok("1 endpoint".to_owned());
        let mut report = ProbeReport::new("dremio", 32010);
        report.methods.push(outcome);

        let json = serde_json::to_value(&report).unwrap();
        let method = &json["methods"][0];
        assert_eq!(method["method"], "uri-insecure");
        assert_eq!(method["list_flights"]["status"], "failed");
        assert_eq!(method["flight_info"]["detail"], "1 endpoint");
        assert_eq!(method["query"]["status"], "skipped");
        assert!(method.get("table").is_none());
        assert_eq!(json["succeeded_with"], serde_json::Value::Null);
        assert!(!report.is_success());
    }
}
