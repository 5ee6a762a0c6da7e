#![allow(dead_code)]

mod trace;

use std::net::SocketAddr;
use std::sync::Mutex;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use loki_output::{HealthContext, HealthReporter};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub use trace::trace_init;

pub type Received = (http::request::Parts, Bytes);

/// A fake Loki answering every push with `status`.
pub async fn start_loki(status: StatusCode) -> (SocketAddr, mpsc::UnboundedReceiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((conn, _peer)) = listener.accept().await {
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
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(conn), service)
                    .await;
            });
        }
    });

    (addr, rx)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Report {
    Healthy,
    Warning(String, HealthContext),
    Problem(String, HealthContext),
}

#[derive(Debug, Default)]
pub struct Reports(Mutex<Vec<Report>>);

impl Reports {
    pub fn all(&self) -> Vec<Report> {
        self.0.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|report| match report {
                Report::Warning(message, _) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl HealthReporter for Reports {
    fn report_healthy(&self, _message: Option<&str>) {
        self.0.lock().unwrap().push(Report::Healthy);
    }

    fn report_warning(&self, message: &str, context: HealthContext) {
        self.0
            .lock()
            .unwrap()
            .push(Report::Warning(message.to_string(), context));
    }

    fn report_problem(&self, message: &str, context: HealthContext) {
        self.0
            .lock()
            .unwrap()
            .push(Report::Problem(message.to_string(), context));
    }
}
