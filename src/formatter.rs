use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Serialize, Serializer, ser::SerializeSeq};

use crate::event::Event;

pub type Labels = IndexMap<String, String>;

const NANOS_PER_MILLI: i64 = 1_000_000;
const LEVEL_KEY: &str = "level";

/// Produces the numeric suffixes used to rename colliding log line keys.
pub trait SuffixSource: Send + Sync {
    fn next_suffix(&self) -> u64;
}

/// Random suffixes, the default for a running sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_suffix(&self) -> u64 {
        rand::random_range(0..100_000)
    }
}

/// Monotonic suffixes starting at 1, which makes rendered lines predictable.
#[derive(Debug)]
pub struct SequentialSuffix(AtomicU64);

impl Default for SequentialSuffix {
    fn default() -> Self {
        Self(AtomicU64::new(1))
    }
}

impl SuffixSource for SequentialSuffix {
    fn next_suffix(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// One `[timestamp, line]` entry of a stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sample {
    pub timestamp: String,
    pub line: String,
}

impl Serialize for Sample {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.line)?;
        seq.end()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormattedItem {
    pub labels: Labels,
    pub sample: Sample,
}

/// Turns events into labels plus a logfmt style line.
#[derive(Clone)]
pub struct EventFormatter {
    label_fields: Vec<String>,
    skip_fields: HashSet<String>,
    suffix: Arc<dyn SuffixSource>,
}

impl EventFormatter {
    pub fn new(
        label_fields: Vec<String>,
        skip_fields: impl IntoIterator<Item = String>,
        suffix: Arc<dyn SuffixSource>,
    ) -> Self {
        Self {
            label_fields,
            skip_fields: skip_fields.into_iter().collect(),
            suffix,
        }
    }

    pub fn with_suffix(mut self, suffix: Arc<dyn SuffixSource>) -> Self {
        self.suffix = suffix;
        self
    }

    /// Format one event.
    ///
    /// `used_keys` is scratch space owned by the caller, it is cleared before
    /// use so one set can be reused across the events of a batch.
    pub fn format(&self, event: &Event, used_keys: &mut HashSet<String>) -> FormattedItem {
        FormattedItem {
            labels: self.build_labels(event),
            sample: Sample {
                timestamp: timestamp_token(event),
                line: self.build_line(event, used_keys),
            },
        }
    }

    fn build_labels(&self, event: &Event) -> Labels {
        self.label_fields
            .iter()
            .filter_map(|name| {
                event.get_field(name).map(|value| {
                    let value = value.as_str().map(|s| s.into_owned()).unwrap_or_default();
                    (name.clone(), value)
                })
            })
            .collect()
    }

    fn build_line(&self, event: &Event, used_keys: &mut HashSet<String>) -> String {
        used_keys.clear();
        used_keys.insert(LEVEL_KEY.to_string());

        let mut line = String::with_capacity(64);
        line.push_str(LEVEL_KEY);
        line.push('=');
        line.push_str(event.level.as_str());

        for (key, value) in &event.payload {
            if self.skip_fields.contains(key) {
                continue;
            }

            let rendered = value.render();
            if rendered.trim().is_empty() {
                continue;
            }

            let key = self.unique_key(strip_double_quotes(key), used_keys);
            let value = strip_double_quotes(&rendered);

            line.push(' ');
            line.push_str(&key);
            line.push_str("=\"");
            line.push_str(&value);
            line.push('"');
        }

        line
    }

    fn unique_key(&self, key: String, used_keys: &mut HashSet<String>) -> String {
        if used_keys.insert(key.clone()) {
            return key;
        }

        loop {
            let alternate = format!("{key}_{}", self.suffix.next_suffix());
            if used_keys.insert(alternate.clone()) {
                return alternate;
            }
        }
    }
}

/// Milliseconds since the epoch scaled up to nanoseconds, so sub-millisecond
/// precision is always zero. Times outside the i64 nanosecond range
/// (before 1677 or after 2262) are clamped to its bounds.
fn timestamp_token(event: &Event) -> String {
    let millis = event.timestamp.timestamp_millis();
    let nanos = millis.checked_mul(NANOS_PER_MILLI).unwrap_or(if millis < 0 {
        i64::MIN
    } else {
        i64::MAX
    });

    nanos.to_string()
}

fn strip_double_quotes(s: &str) -> String {
    s.replace("\"\"", "")
}
