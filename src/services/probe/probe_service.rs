use std::time::Instant;

use super::recommendations::recommendations;
use super::reporter::{ProbeEvent, Reporter};
use crate::clients::socket;
use crate::clients::{FlightConnector, ProbeClient};
use crate::flight_utils;
use crate::models::env::{ProbeConfig, PING_COMMAND};
use crate::models::report::{AttemptOutcome, MethodOutcome, ProbeReport, ProbeStep};
use crate::models::{ConnectionMethod, Location};
use arrow::util::pretty;
use tracing::{debug, info, warn};

/// Runs the connectivity checks one after the other
pub struct ProbeService {
    config: ProbeConfig,
    connector: Box<dyn FlightConnector>,
    reporter: Box<dyn Reporter>,
}

impl ProbeService {
    pub fn new(
        config: ProbeConfig,
        connector: Box<dyn FlightConnector>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        ProbeService {
            config,
            connector,
            reporter,
        }
    }

    /// Probe the socket, then each method until one runs the test query.
    /// Failures are recorded in the report, never returned.
    pub async fn run(&self) -> ProbeReport {
        let start = Instant::now();
        let host = self.config.host.as_str();
        let port = self.config.port;
        let mut report = ProbeReport::new(host, port);

        self.reporter.report(&ProbeEvent::SocketStart { host, port });
        let socket = socket::probe_port(host, port, self.config.socket_timeout).await;
        self.reporter.report(&ProbeEvent::SocketDone {
            host,
            port,
            outcome: &socket,
        });
        report.socket = Some(socket);

        self.reporter.report(&ProbeEvent::ConnectionsStart);
        for method in &self.config.methods {
            let outcome = self.try_method(method).await;
            let succeeded = outcome.succeeded;
            report.methods.push(outcome);
            if succeeded {
                info!(
                    method = %method.kind,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "probe succeeded"
                );
                report.succeeded_with = Some(method.kind);
                return report;
            }
        }

        warn!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "no connection method worked"
        );
        report.recommendations = recommendations(&self.config, &report);
        self.reporter
            .report(&ProbeEvent::Recommendations(&report.recommendations));
        report
    }

    async fn try_method(&self, method: &ConnectionMethod) -> MethodOutcome {
        let mut outcome = MethodOutcome::new(method.kind);
        self.reporter.report(&ProbeEvent::MethodStart(method.kind));

        let location = match method.location(&self.config.host, self.config.port) {
            Ok(location) => location,
            Err(e) => {
                let reason = e.reason();
                self.reporter.report(&ProbeEvent::LocationFailed {
                    method: method.kind,
                    reason: &reason,
                });
                outcome.location_error = Some(reason);
                return outcome;
            }
        };
        self.reporter.report(&ProbeEvent::LocationBuilt(&location));
        outcome.location = Some(location.clone());

        let mut client = match self
            .create_client(&location, method.verify_server, &mut outcome)
            .await
        {
            Some(client) => client,
            None => return outcome,
        };

        self.check_connection(&mut client, &mut outcome).await;
        if outcome.connected {
            self.reporter
                .report(&ProbeEvent::WorkingConnection(method.kind));
        } else {
            self.reporter.report(&ProbeEvent::NoWorkingCall);
        }
        self.run_query(&mut client, &mut outcome).await;
        outcome
    }

    /// Only the client creation is retried, with a fixed delay
    async fn create_client(
        &self,
        location: &Location,
        verify_server: bool,
        outcome: &mut MethodOutcome,
    ) -> Option<ProbeClient> {
        let max_retries = self.config.max_retries.max(1);
        for attempt in 1..=max_retries {
            match self.connector.connect(location, verify_server).await {
                Ok(client) => {
                    outcome.attempts.push(AttemptOutcome {
                        attempt,
                        error: None,
                    });
                    outcome.client_created = true;
                    self.reporter.report(&ProbeEvent::ClientCreated { attempt });
                    return Some(client);
                }
                Err(e) => {
                    let reason = e.reason();
                    debug!(%location, attempt, "client creation failed: {:?}", e);
                    self.reporter.report(&ProbeEvent::ClientFailed {
                        attempt,
                        reason: &reason,
                    });
                    outcome.attempts.push(AttemptOutcome {
                        attempt,
                        error: Some(reason),
                    });
                    if attempt < max_retries {
                        self.reporter
                            .report(&ProbeEvent::Retrying(self.config.retry_delay));
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        None
    }

    /// List flights, falling back to a flight info for a trivial command
    async fn check_connection(&self, client: &mut ProbeClient, outcome: &mut MethodOutcome) {
        self.reporter.report(&ProbeEvent::TestingConnection);
        match client.list_flights().await {
            Ok(flights) => {
                self.reporter.report(&ProbeEvent::ListFlightsOk(flights.len()));
                outcome.list_flights = ProbeStep::Ok(format!("{} flights", flights.len()));
                outcome.connected = true;
                return;
            }
            Err(e) => {
                let reason = e.reason();
                self.reporter.report(&ProbeEvent::ListFlightsFailed(&reason));
                outcome.list_flights = ProbeStep::Failed(reason);
            }
        }
        match client.get_flight_info(PING_COMMAND).await {
            Ok(info) => {
                self.reporter
                    .report(&ProbeEvent::FlightInfoOk(info.endpoint.len()));
                outcome.flight_info =
                    ProbeStep::Ok(format!("{} endpoint(s)", info.endpoint.len()));
                outcome.connected = true;
            }
            Err(e) => {
                let reason = e.reason();
                self.reporter.report(&ProbeEvent::FlightInfoFailed(&reason));
                outcome.flight_info = ProbeStep::Failed(reason);
            }
        }
    }

    /// Plan the test query and read the first endpoint back
    async fn run_query(&self, client: &mut ProbeClient, outcome: &mut MethodOutcome) {
        let query = self.config.query.as_str();
        self.reporter.report(&ProbeEvent::QueryStart(query));
        let info = match client.get_flight_info(query).await {
            Ok(info) => info,
            Err(e) => return self.query_failed(outcome, e.reason()),
        };
        outcome.endpoints = flight_utils::summarize_endpoints(&info.endpoint);
        self.reporter.report(&ProbeEvent::Endpoints(&outcome.endpoints));

        let ticket = match info.endpoint.first() {
            None => return self.query_failed(outcome, "no endpoint returned".to_owned()),
            Some(endpoint) => match &endpoint.ticket {
                None => {
                    return self
                        .query_failed(outcome, "first endpoint has no ticket".to_owned())
                }
                Some(ticket) => ticket.clone(),
            },
        };
        let batches = match client.do_get(ticket).await {
            Ok(batches) => batches,
            Err(e) => return self.query_failed(outcome, e.reason()),
        };
        let rows = batches.iter().map(|b| b.num_rows()).sum::<usize>();
        let table = match pretty::pretty_format_batches(&batches) {
            Ok(table) => table.to_string(),
            Err(e) => return self.query_failed(outcome, format!("{}", e)),
        };
        self.reporter.report(&ProbeEvent::QueryOk {
            rows,
            table: &table,
        });
        outcome.query = ProbeStep::Ok(format!("{} rows", rows));
        outcome.rows = Some(rows);
        outcome.table = Some(table);
        outcome.succeeded = true;
    }

    fn query_failed(&self, outcome: &mut MethodOutcome, reason: String) {
        self.reporter.report(&ProbeEvent::QueryFailed(&reason));
        outcome.query = ProbeStep::Failed(reason);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::clients::TonicConnector;
    use crate::error::{ProbeError, Result};
    use crate::models::{Credentials, MethodKind};
    use crate::services::probe::NoopReporter;
    use crate::services::server::{test_certs, FlightServiceImpl};
    use async_trait::async_trait;

    #[tokio::test]
    async fn insecure_method_runs_the_query() {
        let token = Credentials::Token("pat".to_owned());
        let port = start_server(FlightServiceImpl::new(&token)).await;
        let config = test_config(port, token, vec![MethodKind::Insecure]);

        let report = service(config).run().await;

        assert!(report.socket.as_ref().unwrap().open);
        assert_eq!(report.succeeded_with, Some(MethodKind::Insecure));
        let method = &report.methods[0];
        assert!(method.client_created);
        assert_eq!(method.attempts.len(), 1);
        assert!(method.connected);
        assert_eq!(method.list_flights, ProbeStep::Ok("1 flights".to_owned()));
        assert_eq!(method.flight_info, ProbeStep::Skipped);
        assert_eq!(method.endpoints.len(), 1);
        assert_eq!(method.endpoints[0].ticket, "SELECT 1 as test_col");
        assert_eq!(
            method.endpoints[0].locations,
            vec![format!("grpc://127.0.0.1:{}", port)]
        );
        assert_eq!(method.rows, Some(1));
        assert!(method.table.as_ref().unwrap().contains("test_col"));
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn stops_at_first_successful_method() {
        let port = start_server(FlightServiceImpl::new(&Credentials::None)).await;
        let config = test_config(
            port,
            Credentials::None,
            vec![MethodKind::UriInsecure, MethodKind::Insecure],
        );
        let report = service(config).run().await;
        assert_eq!(report.methods.len(), 1);
        assert_eq!(report.succeeded_with, Some(MethodKind::UriInsecure));
    }

    #[tokio::test]
    async fn tls_methods_fail_against_plaintext_server() {
        let port = start_server(FlightServiceImpl::new(&Credentials::None)).await;
        let config = test_config(
            port,
            Credentials::None,
            vec![MethodKind::Tls, MethodKind::UriTls, MethodKind::Insecure],
        );
        let report = service(config).run().await;

        assert_eq!(report.methods.len(), 3);
        for method in &report.methods[..2] {
            assert!(!method.client_created, "{} should fail", method.method);
            assert_eq!(method.attempts.len(), 2);
            assert_eq!(method.query, ProbeStep::Skipped);
        }
        assert_eq!(report.succeeded_with, Some(MethodKind::Insecure));
    }

    #[tokio::test]
    async fn tls_method_accepts_self_signed_server() {
        let certs = test_certs::generate();
        let server =
            FlightServiceImpl::new(&Credentials::None).with_tls(&certs.cert_pem, &certs.key_pem);
        let port = start_server(server).await;
        let config = test_config(port, Credentials::None, vec![MethodKind::Tls]);

        let report = service(config).run().await;

        assert_eq!(report.succeeded_with, Some(MethodKind::Tls));
        let method = &report.methods[0];
        assert_eq!(method.attempts.len(), 1);
        assert!(method.connected);
        assert_eq!(
            method.endpoints[0].locations,
            vec![format!("grpc+tls://127.0.0.1:{}", port)]
        );
        assert_eq!(method.rows, Some(1));
    }

    #[tokio::test]
    async fn verified_tls_trusts_the_extra_ca() {
        let certs = test_certs::generate();
        let server =
            FlightServiceImpl::new(&Credentials::None).with_tls(&certs.cert_pem, &certs.key_pem);
        let port = start_server(server).await;

        let config = test_config(port, Credentials::None, vec![MethodKind::UriTls]);
        let report = service(config).run().await;
        assert!(!report.is_success());
        assert!(!report.methods[0].client_created);

        let mut ca_file = tempfile::NamedTempFile::new().unwrap();
        ca_file.write_all(certs.ca_pem.as_bytes()).unwrap();
        let mut config = test_config(port, Credentials::None, vec![MethodKind::UriTls]);
        config.tls_root_cert = Some(ca_file.path().to_owned());
        let report = service(config).run().await;
        assert_eq!(report.succeeded_with, Some(MethodKind::UriTls));
        assert_eq!(report.methods[0].rows, Some(1));
    }

    #[tokio::test]
    async fn wrong_token_fails_every_step() {
        let server = FlightServiceImpl::new(&Credentials::Token("right".to_owned()));
        let port = start_server(server).await;
        let config = test_config(
            port,
            Credentials::Token("wrong".to_owned()),
            vec![MethodKind::Insecure],
        );
        let report = service(config).run().await;

        assert!(!report.is_success());
        let method = &report.methods[0];
        assert!(method.client_created);
        assert!(!method.connected);
        assert!(
            matches!(&method.list_flights, ProbeStep::Failed(r) if r.starts_with("Unauthenticated"))
        );
        assert!(matches!(&method.flight_info, ProbeStep::Failed(_)));
        assert!(matches!(&method.query, ProbeStep::Failed(_)));
        assert_eq!(report.recommendations.len(), 6);
    }

    #[tokio::test]
    async fn falls_back_to_flight_info() {
        let server = FlightServiceImpl::new(&Credentials::None).without_list_flights();
        let port = start_server(server).await;
        let config = test_config(port, Credentials::None, vec![MethodKind::Insecure]);
        let report = service(config).run().await;

        let method = &report.methods[0];
        assert!(
            matches!(&method.list_flights, ProbeStep::Failed(r) if r.starts_with("Unimplemented"))
        );
        assert_eq!(method.flight_info, ProbeStep::Ok("1 endpoint(s)".to_owned()));
        assert!(method.connected);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn no_endpoint_is_not_a_success() {
        let server = FlightServiceImpl::new(&Credentials::None).without_endpoints();
        let port = start_server(server).await;
        let config = test_config(
            port,
            Credentials::None,
            vec![MethodKind::Insecure, MethodKind::UriInsecure],
        );
        let report = service(config).run().await;

        assert_eq!(report.methods.len(), 2);
        for method in &report.methods {
            assert!(method.connected);
            assert!(method.endpoints.is_empty());
            assert_eq!(
                method.query,
                ProbeStep::Failed("no endpoint returned".to_owned())
            );
        }
        assert!(!report.is_success());
        assert_eq!(report.recommendations.len(), 5);
    }

    #[tokio::test]
    async fn closed_port_reports_everything_failed() {
        let port = unused_port().await;
        let config = test_config(port, Credentials::None, vec![MethodKind::Insecure]);
        let report = service(config).run().await;

        let socket = report.socket.as_ref().unwrap();
        assert!(!socket.open);
        let method = &report.methods[0];
        assert!(!method.client_created);
        assert_eq!(method.attempts.len(), 2);
        assert!(method.attempts.iter().all(|a| a.error.is_some()));
        assert!(report.recommendations[2].contains("did not accept a TCP connection"));
    }

    #[tokio::test]
    async fn invalid_host_fails_location() {
        let mut config = test_config(1, Credentials::None, vec![MethodKind::UriInsecure]);
        config.host = "bad/host".to_owned();
        let report = service(config).run().await;
        let method = &report.methods[0];
        assert!(method.location.is_none());
        assert!(method.location_error.is_some());
        assert!(method.attempts.is_empty());
    }

    #[tokio::test]
    async fn retries_until_the_connector_succeeds() {
        let port = start_server(FlightServiceImpl::new(&Credentials::None)).await;
        let mut config = test_config(port, Credentials::None, vec![MethodKind::Insecure]);
        config.max_retries = 3;
        let connector = FlakyConnector {
            failures: 2,
            calls: AtomicU32::new(0),
            inner: TonicConnector::new(&Credentials::None, Duration::from_secs(5), None).unwrap(),
        };
        let events = Arc::new(Mutex::new(vec![]));
        let reporter = RecordingReporter {
            events: Arc::clone(&events),
        };
        let report = ProbeService::new(config, Box::new(connector), Box::new(reporter))
            .run()
            .await;

        let method = &report.methods[0];
        assert_eq!(method.attempts.len(), 3);
        assert!(method.attempts[0].error.is_some());
        assert!(method.attempts[2].error.is_none());
        assert!(report.is_success());

        let events = events.lock().unwrap();
        assert_eq!(
            events.iter().filter(|e| e.starts_with("Retrying in")).count(),
            2
        );
        assert!(events.contains(&"Successfully created Flight client on attempt 3".to_owned()));
    }

    #[tokio::test]
    async fn no_retry_delay_after_last_attempt() {
        let mut config = test_config(1, Credentials::None, vec![MethodKind::Insecure]);
        config.max_retries = 1;
        config.retry_delay = Duration::from_secs(3600);
        let connector = FlakyConnector {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            inner: TonicConnector::new(&Credentials::None, Duration::from_secs(5), None).unwrap(),
        };
        let report = tokio::time::timeout(
            Duration::from_secs(30),
            ProbeService::new(config, Box::new(connector), Box::new(NoopReporter {})).run(),
        )
        .await
        .expect("a single attempt should not wait for the retry delay");
        assert_eq!(report.methods[0].attempts.len(), 1);
    }

    //// Test Fixtures: ////

    fn test_config(port: u16, credentials: Credentials, methods: Vec<MethodKind>) -> ProbeConfig {
        let mut config = ProbeConfig::new("127.0.0.1", port);
        config.credentials = credentials;
        config.socket_timeout = Duration::from_secs(2);
        config.request_timeout = Duration::from_secs(5);
        config.max_retries = 2;
        config.retry_delay = Duration::from_millis(10);
        config.methods = methods.into_iter().map(ConnectionMethod::new).collect();
        config
    }

    fn service(config: ProbeConfig) -> ProbeService {
        let connector = TonicConnector::new(
            &config.credentials,
            config.request_timeout,
            config.tls_root_cert.clone(),
        )
        .unwrap();
        ProbeService::new(config, Box::new(connector), Box::new(NoopReporter {}))
    }

    async fn start_server(server: FlightServiceImpl) -> u16 {
        let (addr, _handle) = server
            .start("127.0.0.1:0".parse().unwrap())
            .await
            .expect("test server should bind");
        addr.port()
    }

    /// A port nothing listens on
    async fn unused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Fails the first `failures` connections, then delegates
    struct FlakyConnector {
        failures: u32,
        calls: AtomicU32,
        inner: TonicConnector,
    }

    #[async_trait]
    impl FlightConnector for FlakyConnector {
        async fn connect(&self, location: &Location, verify_server: bool) -> Result<ProbeClient> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ProbeError::Timeout(format!("simulated failure {}", call + 1)))
            } else {
                self.inner.connect(location, verify_server).await
            }
        }
    }

    struct RecordingReporter {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Reporter for RecordingReporter {
        fn report(&self, event: &ProbeEvent<'_>) {
            self.events.lock().unwrap().push(event.to_string());
        }
    }
}
