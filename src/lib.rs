//! # Modrail
//! A server-authoritative modular attachment graph: root objects expose
//! named slots, parts attach into them (and may expose slots of their own),
//! offsets move along snap-quantized rails, and the whole tree replicates
//! from one authoritative host to observing replicas and round-trips
//! through JSON presets.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod backends;
mod catalog;
mod command;
mod events;
mod graph;
mod offset;
mod part;
mod serialize;
mod slot;
mod tree;
mod types;

pub use backends::Timer;
pub use catalog::{CompatibilityCatalog, CompatibilityEntry};
pub use command::{CommitUpdate, SlotRequest};
pub use events::GraphEvent;
pub use graph::{AttachmentGraph, InstanceRecord, MAX_ATTACHMENT_DEPTH};
pub use offset::OffsetController;
pub use part::{
    AttachmentSpec, Capability, DefaultChoice, PartBlueprint, PartKind, PartRegistry,
    RandomDefault, SlotTemplate,
};
pub use serialize::{
    describe, from_json, load_from_file, reconstruct, save_to_file, to_json, Parentage,
    SerializeError, TreeDescription, TreeEntry,
};
pub use slot::{AttachmentSlot, OverlapEntry, SlotState};
pub use tree::{AttachmentTree, TreeConfig};
pub use types::{DormancyState, HostType, InstanceId, SlotId, Transform};
