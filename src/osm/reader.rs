//! PBF-backed raw map source.
//!
//! Decodes one blob per buffer, preserving blob order. Restriction relations
//! are reduced to (via node, from way, to way) triples here; everything else
//! about relations is dropped.

use anyhow::{Context, Result};
use osmpbf::{BlobDecode, BlobReader};
use std::path::Path;

use super::{InputRestriction, MapSource, RawElement, RawNode, RawTags, RawWay};

pub struct PbfSource {
    reader: BlobReader<std::io::BufReader<std::fs::File>>,
}

impl PbfSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BlobReader::from_path(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
        Ok(Self { reader })
    }
}

impl MapSource for PbfSource {
    fn timestamp(&self) -> Option<String> {
        // The PBF header does not carry a replication timestamp we can rely
        // on; the driver falls back to "n/a".
        None
    }

    fn next_buffer(&mut self) -> Result<Option<Vec<RawElement>>> {
        loop {
            let blob = match self.reader.next() {
                Some(blob) => blob?,
                None => return Ok(None),
            };

            let block = match blob.decode()? {
                BlobDecode::OsmData(block) => block,
                BlobDecode::OsmHeader(_) | BlobDecode::Unknown(_) => continue,
            };

            let mut elements = Vec::new();
            for element in block.elements() {
                match element {
                    osmpbf::Element::Node(node) => {
                        elements.push(RawElement::Node(RawNode {
                            id: node.id() as u64,
                            lat: node.lat(),
                            lon: node.lon(),
                            tags: node
                                .tags()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                        }));
                    }
                    osmpbf::Element::DenseNode(node) => {
                        elements.push(RawElement::Node(RawNode {
                            id: node.id() as u64,
                            lat: node.lat(),
                            lon: node.lon(),
                            tags: node
                                .tags()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                        }));
                    }
                    osmpbf::Element::Way(way) => {
                        elements.push(RawElement::Way(RawWay {
                            id: way.id() as u64,
                            node_refs: way.refs().map(|r| r as u64).collect(),
                            tags: way
                                .tags()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                        }));
                    }
                    osmpbf::Element::Relation(relation) => {
                        let tags: RawTags = relation
                            .tags()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect();
                        if let Some(restriction) = parse_restriction(&relation, &tags) {
                            elements.push(RawElement::Restriction(restriction));
                        }
                    }
                }
            }

            return Ok(Some(elements));
        }
    }
}

/// Reduce a relation to a turn restriction, if it is one.
fn parse_restriction(relation: &osmpbf::Relation, tags: &RawTags) -> Option<InputRestriction> {
    if tags.get("type") != Some("restriction") {
        return None;
    }
    let kind = tags.get("restriction")?;
    let is_only = if kind.starts_with("only_") {
        true
    } else if kind.starts_with("no_") {
        false
    } else {
        return None;
    };

    let mut via_node = None;
    let mut from_way = None;
    let mut to_way = None;
    for member in relation.members() {
        let role = member.role().ok()?;
        match (member.member_type, role) {
            (osmpbf::RelMemberType::Node, "via") => via_node = Some(member.member_id as u64),
            (osmpbf::RelMemberType::Way, "from") => from_way = Some(member.member_id as u64),
            (osmpbf::RelMemberType::Way, "to") => to_way = Some(member.member_id as u64),
            _ => {}
        }
    }

    Some(InputRestriction {
        via_node: via_node?,
        from_way: from_way?,
        to_way: to_way?,
        is_only,
    })
}
