//! TLS connectors for the push gateway and the feedback service.
//!
//! The connection core accepts any open byte stream; these helpers build
//! that stream the way production deployments do: TCP dial under a
//! timeout, then a client-certificate rustls handshake with SNI set to
//! the gateway host.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use apns_core::{ApnsConfig, ConfigError, FeedbackConfig};

/// Connector failures.
#[derive(Debug)]
pub enum TlsError {
    Config(ConfigError),
    /// The PEM material could not be parsed.
    Pem(std::io::Error),
    /// The key PEM held no private key.
    NoPrivateKey,
    /// The gateway host is not a valid SNI name.
    InvalidServerName,
    /// Certificate/key pair rejected by rustls.
    Tls(rustls::Error),
    /// TCP connect or TLS handshake I/O failure.
    Connect(std::io::Error),
    Timeout { operation: &'static str },
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Pem(e) => write!(f, "failed to parse PEM material: {e}"),
            Self::NoPrivateKey => write!(f, "no private key found in key PEM"),
            Self::InvalidServerName => write!(f, "gateway host is not a valid server name"),
            Self::Tls(e) => write!(f, "TLS configuration rejected: {e}"),
            Self::Connect(e) => write!(f, "connection failed: {e}"),
            Self::Timeout { operation } => write!(f, "{operation} timed out"),
        }
    }
}

impl std::error::Error for TlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Pem(e) => Some(e),
            Self::Tls(e) => Some(e),
            Self::Connect(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for TlsError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Dial the push gateway with the config's endpoint, credentials, and
/// timeouts.
pub async fn connect_gateway(config: &ApnsConfig) -> Result<TlsStream<TcpStream>, TlsError> {
    config.validate_credentials()?;
    connect(
        &config.gateway_host,
        config.gateway_port,
        config.socket_timeout,
        config.tls_timeout,
        &config.certificate_pem,
        &config.key_pem,
    )
    .await
}

/// Dial the feedback service.
pub async fn connect_feedback(config: &FeedbackConfig) -> Result<TlsStream<TcpStream>, TlsError> {
    config.validate_credentials()?;
    connect(
        &config.gateway_host,
        config.gateway_port,
        Some(config.socket_timeout),
        config.tls_timeout,
        &config.certificate_pem,
        &config.key_pem,
    )
    .await
}

fn client_config(certificate_pem: &[u8], key_pem: &[u8]) -> Result<ClientConfig, TlsError> {
    let certs = rustls_pemfile::certs(&mut &certificate_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(TlsError::Tls)
}

async fn connect(
    host: &str,
    port: u16,
    socket_timeout: Option<Duration>,
    tls_timeout: Duration,
    certificate_pem: &[u8],
    key_pem: &[u8],
) -> Result<TlsStream<TcpStream>, TlsError> {
    let tls_config = client_config(certificate_pem, key_pem)?;

    let tcp = match socket_timeout {
        Some(limit) => timeout(limit, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TlsError::Timeout {
                operation: "TCP connect",
            })?,
        None => TcpStream::connect((host, port)).await,
    }
    .map_err(TlsError::Connect)?;

    let server_name =
        ServerName::try_from(host.to_owned()).map_err(|_| TlsError::InvalidServerName)?;
    let connector = TlsConnector::from(Arc::new(tls_config));

    let stream = timeout(tls_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| TlsError::Timeout {
            operation: "TLS handshake",
        })?
        .map_err(TlsError::Connect)?;

    tracing::debug!(host, port, "TLS connection established");
    Ok(stream)
}
