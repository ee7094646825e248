use crate::{
    part::PartKind,
    types::{DormancyState, InstanceId, SlotId},
};

/// Mutation request sent by a non-authoritative replica to the authority.
///
/// Requests are fire-and-forget: the transport may drop them, and the server
/// validates each one before committing, so a request that never arrives (or
/// fails validation) simply never happened.
#[derive(Clone, PartialEq, Debug)]
pub enum SlotRequest {
    Attach {
        slot: SlotId,
        kind: PartKind,
        replace: bool,
    },
    AttachExisting {
        slot: SlotId,
        instance: InstanceId,
        replace: bool,
    },
    Detach {
        slot: SlotId,
    },
    /// Final offset commit at the end of a client-side drag.
    CommitOffset {
        instance: InstanceId,
        offset: f32,
    },
    SetDormancy {
        slot: SlotId,
        state: DormancyState,
    },
    FlushDormancy {
        slot: SlotId,
    },
}

impl SlotRequest {
    /// The slot a request targets, when it targets one directly.
    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Self::Attach { slot, .. }
            | Self::AttachExisting { slot, .. }
            | Self::Detach { slot }
            | Self::SetDormancy { slot, .. }
            | Self::FlushDormancy { slot } => Some(*slot),
            Self::CommitOffset { .. } => None,
        }
    }
}

/// Committed state change broadcast by the authority to every observer.
///
/// Observers apply these in order; identifiers stay aligned across replicas
/// because allocation only ever happens while applying the same committed
/// sequence.
#[derive(Clone, PartialEq, Debug)]
pub enum CommitUpdate {
    /// A new root object entered the replicated world.
    RootSpawned {
        instance: InstanceId,
        kind: PartKind,
        /// Suppresses default-part auto-spawn on observers, mirroring the
        /// authority's preset-loaded state.
        spawn_defaults: bool,
    },
    Attached {
        slot: SlotId,
        instance: InstanceId,
        kind: PartKind,
        /// Raw committed offset carried so replacements keep their rail
        /// position on every replica.
        offset: f32,
    },
    Detached {
        slot: SlotId,
    },
    OffsetCommitted {
        instance: InstanceId,
        offset: f32,
    },
    DormancyChanged {
        instance: InstanceId,
        state: DormancyState,
    },
}

impl CommitUpdate {
    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Self::Attached { slot, .. } | Self::Detached { slot } => Some(*slot),
            _ => None,
        }
    }
}
