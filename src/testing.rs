use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::encoder::EncodedPayload;
use crate::error::TransportError;
use crate::transport::Transport;

pub type Received = (http::request::Parts, Bytes);

pub async fn build_test_server() -> (SocketAddr, mpsc::UnboundedReceiver<Received>) {
    build_test_server_status(StatusCode::OK).await
}

/// Serve HTTP/1 on a random local port, answer every request with `status`
/// and forward the request head and body to the returned receiver.
pub async fn build_test_server_status(
    status: StatusCode,
) -> (SocketAddr, mpsc::UnboundedReceiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (conn, _peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(message = "accept connection failed", ?err);
                    continue;
                }
            };

            let tx = tx.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                let tx = tx.clone();
                async move {
                    let (parts, incoming) = req.into_parts();
                    let data = incoming.collect().await?.to_bytes();
                    let _ = tx.send((parts, data));

                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(status)
                            .body(Empty::<Bytes>::new())
                            .unwrap(),
                    )
                }
            });

            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(conn), service)
                    .await
                {
                    warn!(message = "failed to serve connection", ?err);
                }
            });
        }
    });

    (addr, rx)
}

/// A `Transport` that records payloads and headers instead of sending them.
#[derive(Debug, Default)]
pub struct MockTransport {
    fail_with: Option<StatusCode>,
    calls: AtomicUsize,
    payloads: Mutex<Vec<EncodedPayload>>,
    headers: Mutex<Vec<HeaderMap>>,
}

impl MockTransport {
    pub fn failing(status: StatusCode) -> Self {
        Self {
            fail_with: Some(status),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<EncodedPayload> {
        self.payloads.lock().unwrap().clone()
    }

    /// Headers of every `post` and `ready` call, in call order.
    pub fn headers(&self) -> Vec<HeaderMap> {
        self.headers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        headers: &HeaderMap,
        payload: EncodedPayload,
    ) -> Result<StatusCode, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.headers.lock().unwrap().push(headers.clone());
        self.payloads.lock().unwrap().push(payload);

        match self.fail_with {
            Some(status) => Err(TransportError::UnexpectedStatus {
                status,
                body: "mock failure".to_string(),
            }),
            None => Ok(StatusCode::NO_CONTENT),
        }
    }

    async fn ready(&self, headers: &HeaderMap) -> Result<(), TransportError> {
        self.headers.lock().unwrap().push(headers.clone());
        Ok(())
    }
}
