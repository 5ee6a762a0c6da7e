use http::StatusCode;
use thiserror::Error;

/// Problems found while building a sink, the sink is unusable afterwards.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no endpoint configured")]
    MissingEndpoint,
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: http::uri::InvalidUri,
    },
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("build TLS config failed: {0}")]
    Tls(#[from] rustls::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("serialize payload failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compress payload failed: {0}")]
    Compress(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP request: {0}")]
    BuildRequest(#[from] http::Error),
    #[error("Failed to make HTTP(S) request: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("Failed to read response: {0}")]
    ReadResponse(#[from] hyper::Error),
    #[error("Server responded with an error: {status}, {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

/// Why a batch could not be delivered.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("encode failed, {0}")]
    Encode(#[from] EncodeError),
    #[error("send failed, {0}")]
    Transport(#[from] TransportError),
}
