use std::collections::HashSet;
use std::sync::Arc;

use headers::{Authorization, HeaderMapExt};
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use tokio_util::sync::CancellationToken;

use crate::config::LokiConfig;
use crate::encoder::PayloadEncoder;
use crate::error::{ConfigError, SendError, TransportError};
use crate::event::Event;
use crate::formatter::{EventFormatter, Labels, RandomSuffix, SuffixSource};
use crate::grouper::StreamGrouper;
use crate::health::{HealthContext, HealthReporter};
use crate::transport::{HttpTransport, TlsMode, Transport};

const SCOPE_ORG_ID: HeaderName = HeaderName::from_static("x-scope-orgid");

/// What happened to a batch that did not fail.
#[derive(Debug, Eq, PartialEq)]
enum BatchOutcome {
    Empty,
    Cancelled { formatted: usize },
    Delivered { streams: usize, status: StatusCode },
}

/// Ships batches of events to Loki.
///
/// A sink is cheap to clone and `send` may be called concurrently, every call
/// allocates its own scratch state and only the transport is shared.
#[derive(Clone)]
pub struct LokiSink {
    formatter: EventFormatter,
    static_labels: Labels,
    encoder: PayloadEncoder,
    headers: HeaderMap,
    transport: Arc<dyn Transport>,
    health: Arc<dyn HealthReporter>,
}

impl LokiSink {
    /// Builds a sink that talks to the configured endpoint over HTTP(S).
    pub fn new(config: &LokiConfig, health: Arc<dyn HealthReporter>) -> Result<Self, ConfigError> {
        let endpoint = parse_endpoint(config, health.as_ref())?;
        let headers = build_headers(config, health.as_ref())?;
        let tls = if config.tls_insecure_skip_verify {
            TlsMode::Insecure
        } else {
            TlsMode::Verified
        };

        let transport = HttpTransport::new(endpoint, tls).map_err(|err| {
            let err = ConfigError::from(err);
            health.report_problem(&format!("LokiSink: {err}"), HealthContext::Configuration);
            err
        })?;

        Ok(Self::build(config, headers, health, Arc::new(transport)))
    }

    /// Builds a sink on top of an existing transport.
    ///
    /// Endpoint and headers are validated the same way `new` does, and the
    /// resulting headers are handed to the transport with every request. TLS
    /// settings are the transport's business.
    pub fn with_transport(
        config: &LokiConfig,
        health: Arc<dyn HealthReporter>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        parse_endpoint(config, health.as_ref())?;
        let headers = build_headers(config, health.as_ref())?;

        Ok(Self::build(config, headers, health, transport))
    }

    /// Binds a YAML document to `LokiConfig` and builds a sink from it.
    pub fn from_yaml(text: &str, health: Arc<dyn HealthReporter>) -> Result<Self, ConfigError> {
        let config = LokiConfig::from_yaml(text).map_err(|err| {
            health.report_problem(
                &format!("LokiSink: invalid configuration encountered, {err}"),
                HealthContext::Configuration,
            );
            ConfigError::Parse(err)
        })?;

        Self::new(&config, health)
    }

    fn build(
        config: &LokiConfig,
        headers: HeaderMap,
        health: Arc<dyn HealthReporter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            formatter: EventFormatter::new(
                config.labels.clone(),
                config.skip_fields.iter().cloned(),
                Arc::new(RandomSuffix),
            ),
            static_labels: config.static_labels.clone(),
            encoder: PayloadEncoder::new(config.compression()),
            headers,
            transport,
            health,
        }
    }

    /// Replaces the source of suffixes used to rename colliding log line keys.
    pub fn with_suffix_source(mut self, suffix: Arc<dyn SuffixSource>) -> Self {
        self.formatter = self.formatter.with_suffix(suffix);
        self
    }

    /// Checks that Loki is ready to accept pushes.
    pub async fn healthcheck(&self) -> Result<(), TransportError> {
        self.transport.ready(&self.headers).await
    }

    /// Delivers one batch.
    ///
    /// Failures never reach the caller, they are reported to the health
    /// reporter as a warning and the batch is dropped.
    pub async fn send(&self, events: &[Event], sequence: i64, cancel: &CancellationToken) {
        match self.process(events, sequence, cancel).await {
            Ok(BatchOutcome::Empty) => {}
            Ok(BatchOutcome::Cancelled { formatted }) => {
                debug!(
                    message = "batch cancelled, dropping formatted events",
                    sequence,
                    formatted,
                    total = events.len(),
                );
            }
            Ok(BatchOutcome::Delivered { streams, status }) => {
                debug!(
                    message = "batch delivered",
                    sequence,
                    events = events.len(),
                    streams,
                    %status,
                );
                self.health.report_healthy(None);
            }
            Err(err) => {
                self.health.report_warning(
                    &format!("LokiSink: diagnostic data upload failed: {err}"),
                    HealthContext::Output,
                );
            }
        }
    }

    async fn process(
        &self,
        events: &[Event],
        sequence: i64,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, SendError> {
        if events.is_empty() {
            return Ok(BatchOutcome::Empty);
        }

        trace!(message = "formatting", sequence, events = events.len());
        let mut used_keys = HashSet::new();
        let mut items = Vec::with_capacity(events.len());
        for event in events {
            if cancel.is_cancelled() {
                return Ok(BatchOutcome::Cancelled {
                    formatted: items.len(),
                });
            }

            items.push(self.formatter.format(event, &mut used_keys));
        }

        trace!(message = "grouping", sequence);
        let streams = StreamGrouper::group(items, &self.static_labels);

        trace!(message = "encoding", sequence, streams = streams.len());
        let payload = self.encoder.encode(&streams)?;

        trace!(message = "sending", sequence, bytes = payload.body.len());
        let status = self.transport.post(&self.headers, payload).await?;

        Ok(BatchOutcome::Delivered {
            streams: streams.len(),
            status,
        })
    }
}

fn parse_endpoint(config: &LokiConfig, health: &dyn HealthReporter) -> Result<Uri, ConfigError> {
    let endpoint = config.endpoint.trim();
    let result = if endpoint.is_empty() {
        Err(ConfigError::MissingEndpoint)
    } else {
        endpoint
            .parse::<Uri>()
            .map_err(|source| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })
    };

    result.inspect_err(|err| {
        health.report_problem(&format!("LokiSink: {err}"), HealthContext::Configuration);
    })
}

/// Headers attached to every request of the sink's lifetime.
fn build_headers(config: &LokiConfig, health: &dyn HealthReporter) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();

    if config.auth.is_incomplete() {
        health.report_warning(
            "LokiSink: for basic authentication to work both user name and password must be specified",
            HealthContext::Configuration,
        );
    } else if let Some((user, password)) = config.auth.credentials() {
        headers.typed_insert(Authorization::basic(user, password));
        if let Some(value) = headers.get_mut(AUTHORIZATION) {
            value.set_sensitive(true);
        }
    }

    if let Some(tenant) = config.tenant_id() {
        headers.insert(SCOPE_ORG_ID, header_value(SCOPE_ORG_ID.as_str(), tenant, health)?);
    }

    for (name, value) in &config.headers {
        let header_name = HeaderName::try_from(name.as_str()).map_err(|err| {
            invalid_header(name, err.to_string(), health)
        })?;

        headers.append(header_name, header_value(name, value, health)?);
    }

    Ok(headers)
}

fn header_value(
    name: &str,
    value: &str,
    health: &dyn HealthReporter,
) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|err| invalid_header(name, err.to_string(), health))
}

fn invalid_header(name: &str, reason: String, health: &dyn HealthReporter) -> ConfigError {
    let err = ConfigError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    health.report_problem(&format!("LokiSink: {err}"), HealthContext::Configuration);
    err
}
