use std::collections::HashMap;

use serde::Serialize;

use crate::formatter::{FormattedItem, Labels, Sample};

/// All samples sharing one identical label set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stream {
    #[serde(rename = "stream")]
    pub labels: Labels,
    #[serde(rename = "values")]
    pub samples: Vec<Sample>,
}

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct PartitionKey(String);

impl PartitionKey {
    fn new(labels: &Labels) -> Self {
        // Labels are joined in their own order, callers are expected to build
        // them in a stable order. The separators are unlikely to show up in
        // either name or value, so `{ab: c}` and `{a: bc}` stay apart.
        PartitionKey(
            labels
                .iter()
                .flat_map(|(k, v)| [k.as_str(), "→", v.as_str(), "∇"])
                .collect(),
        )
    }
}

pub struct StreamGrouper;

impl StreamGrouper {
    /// Partition items into streams keyed by their label set.
    ///
    /// Static labels are merged into every new stream and win over dynamic
    /// labels with the same name. Streams come out in first-seen order and
    /// samples keep their arrival order.
    pub fn group(items: Vec<FormattedItem>, static_labels: &Labels) -> Vec<Stream> {
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();
        let mut streams: Vec<Stream> = Vec::new();

        for FormattedItem { labels, sample } in items {
            let key = PartitionKey::new(&labels);

            match index.get(&key) {
                Some(&pos) => streams[pos].samples.push(sample),
                None => {
                    let mut labels = labels;
                    labels.extend(static_labels.iter().map(|(k, v)| (k.clone(), v.clone())));

                    index.insert(key, streams.len());
                    streams.push(Stream {
                        labels,
                        samples: vec![sample],
                    });
                }
            }
        }

        streams
    }
}
