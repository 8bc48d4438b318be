//! Turn restriction index.
//!
//! Restrictions are stored as internal-node triples (from, via, to) plus the
//! only/no kind. Lookups are keyed by via node; the compressor remaps the
//! from/to endpoints when it collapses a node adjacent to a via node.

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::fingerprint::Fingerprint;
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRestriction {
    pub from: NodeId,
    pub via: NodeId,
    pub to: NodeId,
    pub is_only: bool,
}

const RESTRICTION_RECORD_SIZE: usize = 13;

pub fn write_restrictions<P: AsRef<Path>>(path: P, restrictions: &[TurnRestriction]) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    let mut writer = BufWriter::new(file);
    Fingerprint::valid().write_to(&mut writer)?;
    writer.write_all(&(restrictions.len() as u32).to_le_bytes())?;
    for restriction in restrictions {
        writer.write_all(&restriction.from.to_le_bytes())?;
        writer.write_all(&restriction.via.to_le_bytes())?;
        writer.write_all(&restriction.to.to_le_bytes())?;
        writer.write_all(&[restriction.is_only as u8])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_restrictions<P: AsRef<Path>>(path: P) -> Result<Vec<TurnRestriction>> {
    let label = path.as_ref().display().to_string();
    let file = File::open(path.as_ref()).with_context(|| format!("Failed to open {}", label))?;
    let mut reader = BufReader::new(file);
    Fingerprint::read_and_check(&mut reader, &label)?;

    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4);

    let mut restrictions = Vec::with_capacity(count as usize);
    let mut record = [0u8; RESTRICTION_RECORD_SIZE];
    for _ in 0..count {
        reader.read_exact(&mut record)?;
        restrictions.push(TurnRestriction {
            from: u32::from_le_bytes(record[0..4].try_into().unwrap()),
            via: u32::from_le_bytes(record[4..8].try_into().unwrap()),
            to: u32::from_le_bytes(record[8..12].try_into().unwrap()),
            is_only: record[12] != 0,
        });
    }
    Ok(restrictions)
}

#[derive(Debug, Default)]
pub struct RestrictionMap {
    restrictions: Vec<TurnRestriction>,
    by_via: FxHashMap<NodeId, Vec<usize>>,
    via_nodes: FxHashSet<NodeId>,
}

impl RestrictionMap {
    pub fn new(restrictions: Vec<TurnRestriction>) -> Self {
        let mut by_via: FxHashMap<NodeId, Vec<usize>> = FxHashMap::default();
        let mut via_nodes = FxHashSet::default();
        for (index, restriction) in restrictions.iter().enumerate() {
            by_via.entry(restriction.via).or_default().push(index);
            via_nodes.insert(restriction.via);
        }
        Self {
            restrictions,
            by_via,
            via_nodes,
        }
    }

    pub fn len(&self) -> usize {
        self.restrictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restrictions.is_empty()
    }

    pub fn is_via_node(&self, node: NodeId) -> bool {
        self.via_nodes.contains(&node)
    }

    /// Is the turn from→via→to forbidden? Either an explicit `no` triple, or
    /// an `only` restriction at (from, via) pointing elsewhere.
    pub fn is_turn_restricted(&self, from: NodeId, via: NodeId, to: NodeId) -> bool {
        let Some(indices) = self.by_via.get(&via) else {
            return false;
        };
        for &index in indices {
            let r = &self.restrictions[index];
            if r.from != from {
                continue;
            }
            if r.is_only {
                if r.to != to {
                    return true;
                }
            } else if r.to == to {
                return true;
            }
        }
        false
    }

    /// The chain `new_from → old_from → via` was collapsed; restrictions
    /// starting at old_from now start at new_from.
    pub fn fixup_starting(&mut self, new_from: NodeId, old_from: NodeId, via: NodeId) {
        if let Some(indices) = self.by_via.get(&via) {
            for &index in indices {
                let r = &mut self.restrictions[index];
                if r.from == old_from {
                    r.from = new_from;
                }
            }
        }
    }

    /// The chain `via → old_to → new_to` was collapsed; restrictions ending
    /// at old_to now end at new_to.
    pub fn fixup_arriving(&mut self, via: NodeId, old_to: NodeId, new_to: NodeId) {
        if let Some(indices) = self.by_via.get(&via) {
            for &index in indices {
                let r = &mut self.restrictions[index];
                if r.to == old_to {
                    r.to = new_to;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_restriction_blocks_exact_triple() {
        let map = RestrictionMap::new(vec![TurnRestriction {
            from: 1,
            via: 2,
            to: 3,
            is_only: false,
        }]);
        assert!(map.is_turn_restricted(1, 2, 3));
        assert!(!map.is_turn_restricted(1, 2, 4));
        assert!(map.is_via_node(2));
        assert!(!map.is_via_node(1));
    }

    #[test]
    fn only_restriction_blocks_everything_else() {
        let map = RestrictionMap::new(vec![TurnRestriction {
            from: 1,
            via: 2,
            to: 3,
            is_only: true,
        }]);
        assert!(!map.is_turn_restricted(1, 2, 3));
        assert!(map.is_turn_restricted(1, 2, 4));
        assert!(!map.is_turn_restricted(5, 2, 4), "other approaches are free");
    }

    #[test]
    fn fixup_remaps_endpoints() {
        let mut map = RestrictionMap::new(vec![TurnRestriction {
            from: 1,
            via: 2,
            to: 3,
            is_only: false,
        }]);
        map.fixup_starting(9, 1, 2);
        assert!(map.is_turn_restricted(9, 2, 3));
        map.fixup_arriving(2, 3, 7);
        assert!(map.is_turn_restricted(9, 2, 7));
    }

    #[test]
    fn restrictions_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.restrictions");
        let restrictions = vec![
            TurnRestriction {
                from: 1,
                via: 2,
                to: 3,
                is_only: false,
            },
            TurnRestriction {
                from: 4,
                via: 5,
                to: 6,
                is_only: true,
            },
        ];
        write_restrictions(&path, &restrictions).unwrap();
        assert_eq!(read_restrictions(&path).unwrap(), restrictions);
    }
}
