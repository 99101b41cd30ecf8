//! Stream identity and configured catalog types.
//!
//! A [`ConfiguredCatalog`] is the snapshot of streams a job was created
//! with. It is immutable for the life of the job and drives both the stats
//! merge rules and the shape of progress views.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a stream: name plus optional namespace.
///
/// An absent namespace and an empty namespace are different streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StreamDescriptor {
    /// Descriptor without a namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Descriptor with a namespace.
    #[must_use]
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// How a stream is read from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Rewritten from scratch on every attempt.
    FullRefresh,
    /// Cursor-based reads resuming from the last checkpoint.
    Incremental,
    /// Change data capture via database replication.
    Cdc,
}

impl SyncMode {
    /// Whether a later attempt supersedes the counts of earlier ones.
    ///
    /// Only full refresh restarts a stream; every resumable mode
    /// accumulates across attempts.
    #[must_use]
    pub fn replaces_prior_attempts(self) -> bool {
        matches!(self, Self::FullRefresh)
    }
}

/// A stream as configured for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredStream {
    pub stream: StreamDescriptor,
    pub sync_mode: SyncMode,
}

/// Ordered set of streams enabled for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

impl ConfiguredCatalog {
    /// Sync mode of every configured stream, keyed by descriptor. The first
    /// entry wins if a descriptor is listed twice.
    #[must_use]
    pub fn sync_modes(&self) -> HashMap<&StreamDescriptor, SyncMode> {
        let mut modes = HashMap::with_capacity(self.streams.len());
        for s in &self.streams {
            modes.entry(&s.stream).or_insert(s.sync_mode);
        }
        modes
    }

    /// Enabled stream descriptors in catalog order.
    pub fn descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().map(|s| &s.stream)
    }
}
