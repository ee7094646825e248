use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    graph::AttachmentGraph,
    part::PartKind,
    types::InstanceId,
};

/// How a recorded entry relates to the root object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parentage {
    /// Attached directly into a slot on the root object.
    RootDirect,
    /// Attached into a slot provided by another attachment.
    NestedAttachment,
}

/// One capability-bearing attachment in a serialized tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub slot_name: String,
    pub kind: PartKind,
    pub offset: f32,
    pub parentage: Parentage,
}

/// A complete attachment-tree preset: the root kind plus every recorded
/// attachment in depth-first pre-order, root-adjacent entries first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeDescription {
    pub root_kind: PartKind,
    pub entries: Vec<TreeEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("no attachment tree is registered for {instance}")]
    MissingTree { instance: InstanceId },
    #[error("part kind '{kind}' has no attachment capability")]
    NoCapability { kind: PartKind },
    #[error("tree description could not be parsed: {reason}")]
    MalformedDescription { reason: String },
    #[error("tree reconstruction requires authority")]
    NoAuthority,
    #[error("unknown root kind '{kind}'")]
    UnknownRootKind { kind: PartKind },
    #[error("tree description io failed")]
    Io(#[from] std::io::Error),
}

/// Walk `root`'s flattened cache and record every attached instance: slot
/// name, part kind, raw current offset and parentage.
pub fn describe(graph: &mut AttachmentGraph, root: InstanceId) -> Result<TreeDescription, SerializeError> {
    let root_record = graph
        .record(root)
        .ok_or(SerializeError::MissingTree { instance: root })?;
    let root_kind = root_record.kind().clone();
    if !root_record.has_capability() {
        return Err(SerializeError::NoCapability { kind: root_kind });
    }

    graph.rebuild_now(root);
    let tree = graph
        .tree(root)
        .ok_or(SerializeError::MissingTree { instance: root })?;

    let mut entries = Vec::new();
    for slot_id in tree.flattened() {
        let Some(slot) = graph.slot(*slot_id) else { continue };
        let Some(instance) = slot.current() else { continue };
        let Some(record) = graph.record(instance) else { continue };
        let parentage = if slot.owner() == root {
            Parentage::RootDirect
        } else {
            Parentage::NestedAttachment
        };
        entries.push(TreeEntry {
            slot_name: slot.name().to_string(),
            kind: record.kind().clone(),
            offset: record.offset().current(),
            parentage,
        });
    }

    Ok(TreeDescription { root_kind, entries })
}

/// Serialize a description to pretty-printed JSON.
pub fn to_json(description: &TreeDescription) -> Result<String, SerializeError> {
    serde_json::to_string_pretty(description).map_err(|source| {
        SerializeError::MalformedDescription {
            reason: source.to_string(),
        }
    })
}

/// Parse a description from JSON. Nothing is constructed; a malformed
/// document fails cleanly.
pub fn from_json(json: &str) -> Result<TreeDescription, SerializeError> {
    serde_json::from_str(json).map_err(|source| SerializeError::MalformedDescription {
        reason: source.to_string(),
    })
}

/// Rebuild a full attachment tree from a description on the authoritative
/// graph.
///
/// The root spawns without its default parts; entries then attach in
/// recorded order, re-resolving slots by name against a fresh flatten so
/// slots contributed by earlier entries are found. Entries naming an
/// unknown slot or part kind are skipped with a warning; the rest of the
/// preset still loads.
pub fn reconstruct(
    graph: &mut AttachmentGraph,
    description: &TreeDescription,
) -> Result<InstanceId, SerializeError> {
    if !graph.has_authority() {
        return Err(SerializeError::NoAuthority);
    }
    let root = graph
        .spawn_root_preset(&description.root_kind)
        .ok_or_else(|| SerializeError::UnknownRootKind {
            kind: description.root_kind.clone(),
        })?;

    for entry in &description.entries {
        graph.rebuild_now(root);
        let slot_id = graph
            .tree(root)
            .map(|tree| tree.flattened().to_vec())
            .unwrap_or_default()
            .into_iter()
            .find(|slot_id| {
                graph
                    .slot(*slot_id)
                    .map(|slot| slot.name() == entry.slot_name)
                    .unwrap_or(false)
            });
        let Some(slot_id) = slot_id else {
            warn!("preset slot '{}' not present on reconstructed tree", entry.slot_name);
            continue;
        };
        let Some(instance) = graph.attach(slot_id, &entry.kind, true) else {
            warn!("preset part '{}' could not be attached", entry.kind);
            continue;
        };
        // The recorded offset is the raw replicated value; parts with the
        // inverted flag store it negated, and set_offset negates again on
        // the way in. The flip must use the same flag set_offset does, or
        // negative-bounds slots would reject the restored value.
        let offset = match graph.record(instance) {
            Some(record) if record.offset().inverted() => -entry.offset,
            _ => entry.offset,
        };
        graph.set_offset(instance, offset);
    }

    graph.rebuild_now(root);
    Ok(root)
}

/// Write a description to disk as JSON.
pub fn save_to_file(description: &TreeDescription, path: &Path) -> Result<(), SerializeError> {
    let json = to_json(description)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a description from a JSON file.
pub fn load_from_file(path: &Path) -> Result<TreeDescription, SerializeError> {
    let json = fs::read_to_string(path)?;
    from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_is_an_error() {
        let result = from_json("{\"root_kind\": ");
        assert!(matches!(
            result,
            Err(SerializeError::MalformedDescription { .. })
        ));
    }

    #[test]
    fn description_round_trips_through_json() {
        let description = TreeDescription {
            root_kind: PartKind::of("rifle"),
            entries: vec![TreeEntry {
                slot_name: "rail".to_string(),
                kind: PartKind::of("sight"),
                offset: 3.0,
                parentage: Parentage::RootDirect,
            }],
        };
        let json = to_json(&description).unwrap();
        let parsed = from_json(&json).unwrap();
        assert_eq!(parsed, description);
    }
}
