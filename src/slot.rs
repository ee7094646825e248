use crate::{
    catalog::{CompatibilityCatalog, CompatibilityEntry},
    part::{PartKind, SlotTemplate},
    types::{InstanceId, SlotId},
};

/// Lifecycle of a slot as seen by one replica.
///
/// `Attaching` is only ever observable on a non-authoritative replica while
/// an attach request is in flight; on the authority, attach is atomic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Attaching,
    Attached,
}

/// Proximity record used to hide/show parts that physically overlap a
/// candidate while it is being dragged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapEntry {
    pub candidate: InstanceId,
    pub overlapping: bool,
}

/// One named attachment point, holding at most one instance.
///
/// The slot is a data record plus pure checks; mutations that span
/// registries (attach, detach, dormancy) live on [`AttachmentGraph`].
///
/// [`AttachmentGraph`]: crate::AttachmentGraph
#[derive(Clone, Debug)]
pub struct AttachmentSlot {
    pub(crate) id: SlotId,
    /// Unique within the owning tree; serialization matches on it.
    pub(crate) name: String,
    /// The instance carrying this slot (the tree root is itself an instance).
    pub(crate) owner: InstanceId,
    pub(crate) current: Option<InstanceId>,
    pub(crate) minimum: f32,
    pub(crate) maximum: f32,
    pub(crate) snap_distance: f32,
    pub(crate) essential: bool,
    pub(crate) allow_client_change: bool,
    pub(crate) reference_location: [f32; 3],
    pub(crate) initial_offset: Option<f32>,
    pub(crate) initial_offset_used: bool,
    pub(crate) catalogs: Vec<CompatibilityCatalog>,
    pub(crate) overlaps: Vec<OverlapEntry>,
    /// Set on a non-authoritative replica while an attach round trip is
    /// outstanding; cleared by any committed update for this slot.
    pub(crate) pending_attach: bool,
}

impl AttachmentSlot {
    pub(crate) fn from_template(id: SlotId, owner: InstanceId, template: &SlotTemplate) -> Self {
        Self {
            id,
            name: template.name.clone(),
            owner,
            current: None,
            minimum: template.minimum,
            maximum: template.maximum,
            snap_distance: template.snap_distance,
            essential: template.essential,
            allow_client_change: template.allow_client_change,
            reference_location: template.reference_location,
            initial_offset: template.initial_offset,
            initial_offset_used: false,
            catalogs: template.catalogs.clone(),
            overlaps: Vec::new(),
            pending_attach: false,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    pub fn current(&self) -> Option<InstanceId> {
        self.current
    }

    pub fn has_attachment(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_essential(&self) -> bool {
        self.essential
    }

    pub fn minimum(&self) -> f32 {
        self.minimum
    }

    pub fn maximum(&self) -> f32 {
        self.maximum
    }

    pub fn snap_distance(&self) -> f32 {
        self.snap_distance
    }

    pub fn state(&self) -> SlotState {
        if self.current.is_some() {
            SlotState::Attached
        } else if self.pending_attach {
            SlotState::Attaching
        } else {
            SlotState::Empty
        }
    }

    /// Union compatibility across every assigned catalog: one enabled match
    /// anywhere suffices.
    pub fn is_compatible(&self, kind: &PartKind) -> bool {
        self.catalogs
            .iter()
            .any(|catalog| catalog.is_compatible(kind))
    }

    /// Flip an entry's enabled flag in whichever assigned catalog holds it.
    pub fn set_entry_enabled(&mut self, entry: &CompatibilityEntry, enabled: bool) -> bool {
        self.catalogs
            .iter_mut()
            .any(|catalog| catalog.set_enabled(entry, enabled))
    }

    /// Upsert an overlap record keyed by candidate identity, pruning stale
    /// entries (candidates no longer alive) in the same pass.
    pub(crate) fn record_overlap(
        &mut self,
        candidate: InstanceId,
        overlapping: bool,
        alive: impl Fn(InstanceId) -> bool,
    ) {
        let mut matched = false;
        self.overlaps.retain_mut(|entry| {
            if entry.candidate == candidate {
                matched = true;
                entry.overlapping = overlapping;
            }
            alive(entry.candidate)
        });

        if !matched && alive(candidate) {
            self.overlaps.push(OverlapEntry {
                candidate,
                overlapping,
            });
        }
    }

    pub fn overlaps(&self) -> &[OverlapEntry] {
        &self.overlaps
    }
}
