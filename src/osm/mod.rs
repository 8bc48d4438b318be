//! Raw map element model.
//!
//! These are the boundary types between the raw-map parser and the
//! preprocessing pipeline. The parser (see [`reader`]) classifies input
//! buffers into these records; everything downstream is format-agnostic.

pub mod reader;

use crate::ExternalNodeId;

/// Key/value tags attached to a raw element.
#[derive(Debug, Clone, Default)]
pub struct RawTags(Vec<(String, String)>);

impl RawTags {
    pub fn new(tags: Vec<(String, String)>) -> Self {
        Self(tags)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for RawTags {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A point of the raw map, before profile classification.
#[derive(Debug, Clone)]
pub struct RawNode {
    pub id: ExternalNodeId,
    pub lat: f64,
    pub lon: f64,
    pub tags: RawTags,
}

/// An ordered sequence of node references forming a road (or other) way.
#[derive(Debug, Clone)]
pub struct RawWay {
    pub id: u64,
    pub node_refs: Vec<ExternalNodeId>,
    pub tags: RawTags,
}

/// A turn restriction as it appears in the input: the via node plus the two
/// way ids it connects. The pipeline resolves ways to the adjacent node on
/// each side of the via node once way geometry is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRestriction {
    pub via_node: ExternalNodeId,
    pub from_way: u64,
    pub to_way: u64,
    pub is_only: bool,
}

#[derive(Debug, Clone)]
pub enum RawElement {
    Node(RawNode),
    Way(RawWay),
    Restriction(InputRestriction),
}

/// Sequential source of raw-map buffers.
///
/// Buffers are consumed in input order; elements within one buffer may be
/// classified in parallel but are committed in input order by the caller.
pub trait MapSource {
    /// Replication timestamp of the input, if the container carries one.
    fn timestamp(&self) -> Option<String>;

    /// The next buffer of elements, or `None` at end of input.
    fn next_buffer(&mut self) -> anyhow::Result<Option<Vec<RawElement>>>;
}

/// In-memory source, used by tests and by callers that already hold parsed
/// elements. Yields the whole element list as a single buffer.
pub struct VecSource {
    elements: Option<Vec<RawElement>>,
    timestamp: Option<String>,
}

impl VecSource {
    pub fn new(elements: Vec<RawElement>) -> Self {
        Self {
            elements: Some(elements),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

impl MapSource for VecSource {
    fn timestamp(&self) -> Option<String> {
        self.timestamp.clone()
    }

    fn next_buffer(&mut self) -> anyhow::Result<Option<Vec<RawElement>>> {
        Ok(self.elements.take())
    }
}
