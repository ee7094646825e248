use crate::{
    part::PartKind,
    types::{DormancyState, InstanceId, SlotId},
};

/// Notification drained by the embedding simulation after graph mutations.
///
/// The graph never calls back into the embedder; it queues events and the
/// owner of the simulation thread drains them once per frame.
#[derive(Clone, PartialEq, Debug)]
pub enum GraphEvent {
    /// A part instance entered the world; the embedder should create its
    /// visual/physical counterpart.
    InstanceSpawned { instance: InstanceId, kind: PartKind },
    /// A part instance left the world.
    InstanceDestroyed { instance: InstanceId, kind: PartKind },
    /// A slot's attached instance changed (attach, replace, or detach).
    AttachmentChanged {
        slot: SlotId,
        instance: Option<InstanceId>,
    },
    /// A tree finished rebuilding its flattened cache.
    TreeUpdated {
        owner: InstanceId,
        essential_complete: bool,
    },
    /// Overlap ghosting: hide or show a set of parts while dragging.
    OverlapVisibility {
        instance: InstanceId,
        hidden: bool,
    },
    /// The authority changed an instance's dormancy state.
    DormancyChanged {
        instance: InstanceId,
        state: DormancyState,
    },
}
