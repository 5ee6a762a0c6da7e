use std::fmt;

/// Where a reported health event originated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HealthContext {
    Configuration,
    Output,
}

impl HealthContext {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HealthContext::Configuration => "configuration",
            HealthContext::Output => "output",
        }
    }
}

impl fmt::Display for HealthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives the outcome of sink construction and of every batch.
pub trait HealthReporter: Send + Sync {
    fn report_healthy(&self, message: Option<&str>);

    fn report_warning(&self, message: &str, context: HealthContext);

    fn report_problem(&self, message: &str, context: HealthContext);
}

/// Forwards health events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingHealthReporter;

impl HealthReporter for TracingHealthReporter {
    fn report_healthy(&self, message: Option<&str>) {
        debug!(message = message.unwrap_or("Loki output is healthy"));
    }

    fn report_warning(&self, message: &str, context: HealthContext) {
        warn!(message = %message, %context);
    }

    fn report_problem(&self, message: &str, context: HealthContext) {
        error!(message = %message, %context);
    }
}
