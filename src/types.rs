use std::collections::BTreeSet;

use crate::ConfigError;

/// A topic the bootstrap sequence must provision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSpec {
    name: String,
    partitions: u32,
    replication_factor: u32,
}

impl TopicSpec {
    /// Builds a spec; the name is trimmed and counts must be at least 1.
    pub fn new(
        name: impl AsRef<str>,
        partitions: u32,
        replication_factor: u32,
    ) -> Result<Self, ConfigError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidTopic("topic name is empty".to_owned()));
        }
        if partitions == 0 {
            return Err(ConfigError::InvalidTopic(format!(
                "topic '{name}' needs at least one partition"
            )));
        }
        if replication_factor == 0 {
            return Err(ConfigError::InvalidTopic(format!(
                "topic '{name}' needs a replication factor of at least 1"
            )));
        }
        Ok(Self {
            name: name.to_owned(),
            partitions,
            replication_factor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn replication_factor(&self) -> u32 {
        self.replication_factor
    }
}

/// Snapshot of the topic names known to the broker at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicListing {
    names: BTreeSet<String>,
}

impl TopicListing {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Case-insensitive membership test.
    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|known| known.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for TopicListing {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Proof that the broker and the schema registry are ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ready {
    /// Topics confirmed visible, in configured order.
    pub topics: Vec<String>,
    /// Status code of the successful registry probe.
    pub registry_status: u16,
}
