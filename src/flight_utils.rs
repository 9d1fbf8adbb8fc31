//! Utils to convert flight objects to and from record batches

use std::sync::Arc;

use crate::error::{ProbeError, Result};
use crate::internal_err;
use crate::models::report::EndpointSummary;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::{flight_descriptor, FlightData, FlightDescriptor, FlightEndpoint};
use futures::{Stream, TryStreamExt};
use tonic::Status;

/// Drain a flight stream into record batches, the first message carrying the schema
pub async fn flight_to_batches(
    flights: impl Stream<Item = std::result::Result<FlightData, Status>> + Send + 'static,
) -> Result<Vec<RecordBatch>> {
    let batches = FlightRecordBatchStream::new_from_flight_data(
        flights.map_err(FlightError::from),
    )
    .try_collect::<Vec<_>>()
    .await
    .map_err(from_flight_error)?;
    Ok(batches)
}

/// Convert a vector of RecordBatches to a stream of flights.
/// If there are no batches (empty vec), a flight with the given schema is still sent
pub fn batches_to_flight(
    schema: Arc<Schema>,
    batches: Vec<RecordBatch>,
) -> impl Stream<Item = std::result::Result<FlightData, Status>> + Send + 'static {
    let input = futures::stream::iter(batches.into_iter().map(Ok));
    FlightDataEncoderBuilder::new()
        .with_schema(schema)
        .build(input)
        .map_err(Status::from)
}

pub fn cmd_to_descriptor(cmd: &str) -> FlightDescriptor {
    FlightDescriptor::new_cmd(cmd.as_bytes().to_owned())
}

pub fn descriptor_to_cmd(descriptor: Option<FlightDescriptor>) -> Result<String> {
    let descriptor =
        descriptor.ok_or_else(|| internal_err!("Descriptor not found in request"))?;
    if descriptor.r#type != flight_descriptor::DescriptorType::Cmd as i32 {
        Err(internal_err!("Descriptor type should be cmd"))
    } else {
        String::from_utf8(descriptor.cmd.to_vec())
            .map_err(|_| internal_err!("Descriptor cmd is not valid utf-8"))
    }
}

/// Render endpoints the way they are shown in the report
pub fn summarize_endpoints(endpoints: &[FlightEndpoint]) -> Vec<EndpointSummary> {
    endpoints
        .iter()
        .enumerate()
        .map(|(index, endpoint)| EndpointSummary {
            index,
            ticket: endpoint
                .ticket
                .as_ref()
                .map(|t| t.ticket.escape_ascii().to_string())
                .unwrap_or_default(),
            locations: endpoint.location.iter().map(|l| l.uri.clone()).collect(),
        })
        .collect()
}

fn from_flight_error(err: FlightError) -> ProbeError {
    match err {
        FlightError::Arrow(e) => ProbeError::ArrowError(e),
        FlightError::Tonic(status) => ProbeError::FlightError(status),
        other => internal_err!("{}", other),
    }
}
