use std::path::PathBuf;
use std::time::Duration;

use super::tls;
use crate::error::{ProbeError, Result};
use crate::flight_utils;
use crate::models::{Credentials, Location};
use arrow::record_batch::RecordBatch;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Criteria, FlightInfo, Ticket};
use async_trait::async_trait;
use futures::TryStreamExt;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::debug;

#[async_trait]
pub trait FlightConnector: Send + Sync {
    /// Open a channel to the location and wrap it into a client.
    async fn connect(&self, location: &Location, verify_server: bool) -> Result<ProbeClient>;
}

/// Connects through tonic, with rustls for the TLS locations
pub struct TonicConnector {
    authorization: Option<MetadataValue<Ascii>>,
    timeout: Duration,
    tls_root_cert: Option<PathBuf>,
}

impl TonicConnector {
    /// Fails if the credentials cannot be sent as a header
    pub fn new(
        credentials: &Credentials,
        timeout: Duration,
        tls_root_cert: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            authorization: credentials.metadata_value()?,
            timeout,
            tls_root_cert,
        })
    }

    async fn channel(&self, location: &Location, verify_server: bool) -> Result<Channel> {
        if !location.scheme.is_tls() {
            let endpoint = self.endpoint(location.endpoint_uri())?;
            return Ok(endpoint.connect().await?);
        }
        if verify_server {
            let tls_config =
                tls::verified_tls_config(location, self.tls_root_cert.as_deref()).await?;
            let endpoint = self
                .endpoint(location.endpoint_uri())?
                .tls_config(tls_config)?;
            Ok(endpoint.connect().await?)
        } else {
            // the handshake is done by the connector, tonic sees a plain stream
            let config = tls::unverified_client_config()?;
            let endpoint = self.endpoint(format!("http://{}", location.authority()))?;
            let connector = tower::service_fn(move |uri| tls::connect_tls(config.clone(), uri));
            Ok(endpoint.connect_with_connector(connector).await?)
        }
    }

    fn endpoint(&self, uri: String) -> Result<Endpoint> {
        Ok(Endpoint::from_shared(uri)?
            .connect_timeout(self.timeout)
            .timeout(self.timeout))
    }
}

#[async_trait]
impl FlightConnector for TonicConnector {
    async fn connect(&self, location: &Location, verify_server: bool) -> Result<ProbeClient> {
        debug!(%location, verify_server, "opening flight channel");
        let channel = tokio::time::timeout(self.timeout, self.channel(location, verify_server))
            .await
            .map_err(|_| {
                ProbeError::Timeout(format!(
                    "no channel to {} after {}s",
                    location,
                    self.timeout.as_secs_f32()
                ))
            })??;
        Ok(ProbeClient::new(
            channel,
            self.authorization.clone(),
            self.timeout,
        ))
    }
}

/// Flight client that adds the credentials to every call
pub struct ProbeClient {
    client: FlightServiceClient<Channel>,
    authorization: Option<MetadataValue<Ascii>>,
    timeout: Duration,
}

impl ProbeClient {
    pub fn new(
        channel: Channel,
        authorization: Option<MetadataValue<Ascii>>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: FlightServiceClient::new(channel),
            authorization,
            timeout,
        }
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(self.timeout);
        if let Some(authorization) = &self.authorization {
            request
                .metadata_mut()
                .insert("authorization", authorization.clone());
        }
        request
    }

    pub async fn list_flights(&mut self) -> Result<Vec<FlightInfo>> {
        let request = self.request(Criteria::default());
        let flights = self
            .client
            .list_flights(request)
            .await?
            .into_inner()
            .try_collect::<Vec<_>>()
            .await?;
        Ok(flights)
    }

    pub async fn get_flight_info(&mut self, cmd: &str) -> Result<FlightInfo> {
        let request = self.request(flight_utils::cmd_to_descriptor(cmd));
        let info = self.client.get_flight_info(request).await?.into_inner();
        Ok(info)
    }

    /// Fetch and decode the whole stream behind the ticket
    pub async fn do_get(&mut self, ticket: Ticket) -> Result<Vec<RecordBatch>> {
        let request = self.request(ticket);
        let stream = self.client.do_get(request).await?.into_inner();
        flight_utils::flight_to_batches(stream).await
    }
}
