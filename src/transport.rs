use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::encoder::EncodedPayload;
use crate::error::TransportError;

const USER_AGENT_VALUE: &str = concat!("loki-output/", env!("CARGO_PKG_VERSION"));

/// Delivers encoded payloads to Loki.
///
/// Implementations must be safe to share between concurrent batches, and
/// must not retry: a single call is a single request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the payload to the push endpoint. Only 2xx responses are `Ok`.
    ///
    /// `headers` are the sink's default headers (auth, tenant and the
    /// configured extras), attached to the request before payload headers.
    async fn post(
        &self,
        headers: &HeaderMap,
        payload: EncodedPayload,
    ) -> Result<StatusCode, TransportError>;

    /// Probe the readiness endpoint of the Loki instance.
    async fn ready(&self, headers: &HeaderMap) -> Result<(), TransportError>;
}

/// How server certificates are checked.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TlsMode {
    /// Certificates must chain up to a trusted native root.
    #[default]
    Verified,
    /// Any certificate is accepted.
    Insecure,
}

impl TlsMode {
    pub fn client_config(self) -> Result<ClientConfig, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let config = match self {
            TlsMode::Verified => builder
                .with_root_certificates(native_root_store())
                .with_no_client_auth(),
            TlsMode::Insecure => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
                .with_no_client_auth(),
        };

        Ok(config)
    }
}

fn native_root_store() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();
    if !result.errors.is_empty() {
        warn!(
            message = "native root CA certificate loading errors",
            errs = ?result.errors
        );
    }

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(result.certs);
    debug!(message = "loaded native root certificates", added, ignored);

    store
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Pooled HTTP(S) client bound to one Loki endpoint.
///
/// Cloning is cheap, clones share the connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    endpoint: Uri,
}

impl HttpTransport {
    pub fn new(endpoint: Uri, tls: TlsMode) -> Result<Self, rustls::Error> {
        if tls == TlsMode::Insecure {
            warn!(
                message = "TLS certificate verification is disabled",
                endpoint = %endpoint
            );
        }

        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let https = HttpsConnector::from((http, tls.client_config()?));
        let client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self { client, endpoint })
    }

    fn request(&self, headers: &HeaderMap, mut req: Request<Full<Bytes>>) -> Request<Full<Bytes>> {
        let mut headers = headers.clone();
        // per request headers win over the configured ones
        for (name, value) in req.headers_mut().drain() {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }

        default_request_headers(&mut headers);
        *req.headers_mut() = headers;
        req
    }

    async fn call(
        &self,
        headers: &HeaderMap,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, TransportError> {
        let req = self.request(headers, req);
        let uri = req.uri().clone();

        let resp = self.client.request(req).await.inspect_err(|err| {
            debug!(message = "HTTP request failed", %uri, %err);
        })?;

        debug!(
            message = "HTTP response received",
            %uri,
            status = %resp.status(),
            version = ?resp.version(),
        );

        Ok(resp)
    }
}

fn default_request_headers(headers: &mut HeaderMap) {
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    }

    if !headers.contains_key(ACCEPT_ENCODING) {
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }
}

async fn read_body(resp: Response<Incoming>) -> Result<Bytes, TransportError> {
    Ok(resp.into_body().collect().await?.to_bytes())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        headers: &HeaderMap,
        payload: EncodedPayload,
    ) -> Result<StatusCode, TransportError> {
        let mut builder =
            Request::post(self.endpoint.clone()).header(CONTENT_TYPE, "application/json");
        if let Some(ce) = payload.content_encoding {
            builder = builder.header(CONTENT_ENCODING, ce);
        }
        let req = builder.body(Full::new(payload.body))?;

        let resp = self.call(headers, req).await?;
        let status = resp.status();
        // the body is always drained, so the connection can be reused
        let body = read_body(resp).await?;

        if status.is_success() {
            Ok(status)
        } else {
            Err(TransportError::UnexpectedStatus {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }

    async fn ready(&self, headers: &HeaderMap) -> Result<(), TransportError> {
        let mut parts = self.endpoint.clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::from_static("/ready"));
        let uri = Uri::from_parts(parts).map_err(http::Error::from)?;

        let req = Request::get(uri).body(Full::default())?;
        let resp = self.call(headers, req).await?;
        let status = resp.status();
        let body = read_body(resp).await?;

        match status {
            StatusCode::OK => Ok(()),
            _ => Err(TransportError::UnexpectedStatus {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
