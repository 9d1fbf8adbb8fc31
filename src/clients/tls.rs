//! TLS setups for the Flight channel.
//!
//! Verified TLS is left to tonic. Unverified TLS needs a custom rustls
//! verifier, so the handshake is done here and the encrypted stream is
//! handed to tonic through `Endpoint::connect_with_connector`.

use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ProbeError, Result};
use crate::models::Location;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Certificate, ClientTlsConfig, Uri};

/// Accepts any server certificate.
/// Handshake signatures are still checked so the session itself is sound.
#[derive(Debug)]
pub struct NoServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// rustls config that skips server verification and negotiates h2
pub fn unverified_client_config() -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(format!("{}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoServerVerification(provider)))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(Arc::new(config))
}

/// Dial the uri's authority and run the TLS handshake with the given config.
/// Meant to be wrapped in a `tower::service_fn` for tonic.
pub async fn connect_tls(
    config: Arc<ClientConfig>,
    uri: Uri,
) -> io::Result<TokioIo<TlsStream<TcpStream>>> {
    let host = uri
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "uri has no host"))?;
    let port = uri.port_u16().unwrap_or(443);
    let server_name = ServerName::try_from(host.clone())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let tcp = TcpStream::connect((host.as_str(), port)).await?;
    let tls = TlsConnector::from(config).connect(server_name, tcp).await?;
    Ok(TokioIo::new(tls))
}

/// tonic TLS config checking the server against the native roots,
/// plus an optional extra CA
pub async fn verified_tls_config(
    location: &Location,
    extra_root: Option<&Path>,
) -> Result<ClientTlsConfig> {
    let mut config = ClientTlsConfig::new()
        .domain_name(location.host.clone())
        .with_native_roots();
    if let Some(path) = extra_root {
        let pem = tokio::fs::read(path).await.map_err(|e| {
            ProbeError::Tls(format!("could not read CA '{}': {}", path.display(), e))
        })?;
        config = config.ca_certificate(Certificate::from_pem(pem));
    }
    Ok(config)
}
