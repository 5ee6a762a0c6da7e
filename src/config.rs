use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::encoder::Compression;

pub const fn default_true() -> bool {
    true
}

/// Basic authentication credentials, both parts must be set to take effect.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl BasicAuth {
    /// Returns `(user, password)` when both are non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (non_blank(&self.user), non_blank(&self.password)) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }

    /// Exactly one of user or password is set.
    pub fn is_incomplete(&self) -> bool {
        non_blank(&self.user).is_some() ^ non_blank(&self.password).is_some()
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LokiConfig {
    /// The push endpoint, e.g. `http://loki:3100/loki/api/v1/push`
    pub endpoint: String,

    #[serde(default)]
    pub auth: BasicAuth,

    /// Sent as `X-Scope-OrgID`.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Extra headers attached to every request verbatim.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    #[serde(default = "default_true")]
    pub gzip: bool,

    /// Payload fields promoted to labels, in this order.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Payload fields left out of the log line.
    #[serde(default)]
    pub skip_fields: Vec<String>,

    /// Labels attached to every stream.
    #[serde(default)]
    pub static_labels: IndexMap<String, String>,

    /// Accept any server certificate.
    ///
    /// Do NOT set this to true unless you understand the risks of not verifying
    /// the validity of certificates.
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
}

impl LokiConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth: BasicAuth::default(),
            tenant_id: None,
            headers: IndexMap::new(),
            gzip: true,
            labels: Vec::new(),
            skip_fields: Vec::new(),
            static_labels: IndexMap::new(),
            tls_insecure_skip_verify: false,
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn compression(&self) -> Compression {
        Compression::from(self.gzip)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        non_blank(&self.tenant_id)
    }

    pub fn generate_config() -> String {
        r#"
# The Loki push endpoint.
#
endpoint: http://loki.example.com:3100/loki/api/v1/push

# Basic authentication. Both user and password must be set, when
# only one of them is provided, neither is used.
#
# auth:
#   user: username
#   password: some_password

# The tenant id sent with every request as "X-Scope-OrgID". This is
# not required when a proxy sets the header or multi-tenancy is
# disabled.
#
# tenant_id: some_tenant_id

# Additional headers sent with every request.
#
# headers:
#   X-Custom: value

# Compress the request body with gzip.
#
# gzip: true

# Payload fields promoted to stream labels. A label is only added
# when the field is present in the event. Note: high cardinality
# values can cause drastic performance issues with Loki.
#
# labels:
#   - node
#   - project

# Payload fields left out of the log line.
#
# skip_fields:
#   - password

# Labels attached to every stream, these win over labels taken
# from events.
#
# static_labels:
#   app: my-app

# Accept any certificate presented by the server.
#
# Do NOT set this to true unless you understand the risks of not
# verifying the validity of certificates.
#
# tls_insecure_skip_verify: false
"#
        .to_string()
    }
}
