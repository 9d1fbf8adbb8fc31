use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::Result;
use crate::flight_utils;
use crate::models::env::DEFAULT_QUERY;
use crate::models::Credentials;
use arrow::array::Int32Array;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint,
    FlightInfo, HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult,
    Ticket,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info};

/// A small Flight server answering the calls the probe makes.
/// Every query returns a single `test_col` Int32 column holding `1`.
#[derive(Clone)]
pub struct FlightServiceImpl {
    expected_authorization: Option<String>,
    list_flights: bool,
    endpoints: bool,
    location: Option<String>,
    tls_identity: Option<Identity>,
    schema: SchemaRef,
}

impl FlightServiceImpl {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            expected_authorization: credentials.header_value(),
            list_flights: true,
            endpoints: true,
            location: None,
            tls_identity: None,
            schema: Arc::new(Schema::new(vec![Field::new(
                "test_col",
                DataType::Int32,
                false,
            )])),
        }
    }

    /// Answer ListFlights with `unimplemented`, like some coordinators do
    pub fn without_list_flights(mut self) -> Self {
        self.list_flights = false;
        self
    }

    /// Return flight infos with no endpoint
    pub fn without_endpoints(mut self) -> Self {
        self.endpoints = false;
        self
    }

    /// Serve over TLS with the given PEM certificate chain and key
    pub fn with_tls(mut self, cert_pem: impl AsRef<[u8]>, key_pem: impl AsRef<[u8]>) -> Self {
        self.tls_identity = Some(Identity::from_pem(cert_pem, key_pem));
        self
    }

    /// Serve on `addr` in a background task.
    /// Returns the bound address, useful when binding port 0.
    pub async fn start(&self, addr: SocketAddr) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let mut builder = Server::builder();
        let scheme = match &self.tls_identity {
            Some(identity) => {
                builder = builder.tls_config(ServerTlsConfig::new().identity(identity.clone()))?;
                "grpc+tls"
            }
            None => "grpc",
        };
        let service = Self {
            location: Some(format!("{}://{}", scheme, local_addr)),
            ..self.clone()
        };
        let svc = FlightServiceServer::new(service);
        let handle = tokio::spawn(async move {
            info!("Listening on {:?}", local_addr);
            let res = builder
                .add_service(svc)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;
            if let Err(e) = res {
                error!("flight server stopped: {}", e);
            }
        });
        Ok((local_addr, handle))
    }

    fn check_auth<T>(&self, request: &Request<T>) -> std::result::Result<(), Status> {
        let expected = match &self.expected_authorization {
            Some(expected) => expected,
            None => return Ok(()),
        };
        let provided = request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        match provided {
            Some(provided) if provided == expected => Ok(()),
            Some(_) => Err(Status::unauthenticated("invalid credentials")),
            None => Err(Status::unauthenticated("missing authorization header")),
        }
    }

    fn flight_info(&self, cmd: &str) -> std::result::Result<FlightInfo, Status> {
        let mut info = FlightInfo::new()
            .try_with_schema(&self.schema)
            .map_err(|e| Status::internal(format!("{}", e)))?
            .with_descriptor(flight_utils::cmd_to_descriptor(cmd))
            .with_total_records(1);
        if self.endpoints {
            let mut endpoint = FlightEndpoint::new().with_ticket(Ticket::new(cmd.to_owned()));
            if let Some(location) = &self.location {
                endpoint = endpoint.with_location(location.clone());
            }
            info = info.with_endpoint(endpoint);
        }
        Ok(info)
    }

    fn result_batch(&self) -> std::result::Result<RecordBatch, Status> {
        RecordBatch::try_new(
            Arc::clone(&self.schema),
            vec![Arc::new(Int32Array::from(vec![1]))],
        )
        .map_err(|e| Status::internal(format!("{}", e)))
    }
}

fn is_query(cmd: &str) -> bool {
    cmd.trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
}

#[tonic::async_trait]
impl FlightService for FlightServiceImpl {
    type HandshakeStream = BoxStream<'static, std::result::Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, std::result::Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, std::result::Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, std::result::Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, std::result::Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, std::result::Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, std::result::Result<FlightData, Status>>;

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> std::result::Result<Response<Self::DoGetStream>, Status> {
        self.check_auth(&request)?;
        let ticket = request.into_inner();
        let cmd = String::from_utf8(ticket.ticket.to_vec())
            .map_err(|_| Status::invalid_argument("ticket should be utf-8"))?;
        if !is_query(&cmd) {
            return Err(Status::invalid_argument(format!("unknown ticket '{}'", cmd)));
        }
        debug!(cmd, "do_get");
        let batch = self.result_batch()?;
        let stream = flight_utils::batches_to_flight(Arc::clone(&self.schema), vec![batch]);
        Ok(Response::new(stream.boxed()))
    }

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> std::result::Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> std::result::Result<Response<Self::ListFlightsStream>, Status> {
        self.check_auth(&request)?;
        if !self.list_flights {
            return Err(Status::unimplemented("ListFlights is not supported"));
        }
        let info = self.flight_info(DEFAULT_QUERY)?;
        let output = futures::stream::iter(vec![Ok(info)]);
        Ok(Response::new(output.boxed()))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<FlightInfo>, Status> {
        self.check_auth(&request)?;
        let cmd = flight_utils::descriptor_to_cmd(Some(request.into_inner()))
            .map_err(|e| Status::invalid_argument(e.reason()))?;
        if !is_query(&cmd) {
            return Err(Status::invalid_argument(format!("cannot plan '{}'", cmd)));
        }
        debug!(cmd, "get_flight_info");
        Ok(Response::new(self.flight_info(&cmd)?))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> std::result::Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> std::result::Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> std::result::Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("Not yet implemented"))
    }
}
