use std::collections::HashMap;
use std::time::Duration;

use log::{trace, warn};

use crate::{
    catalog::CompatibilityEntry,
    command::{CommitUpdate, SlotRequest},
    events::GraphEvent,
    offset::OffsetController,
    part::{DefaultChoice, PartKind, PartRegistry},
    slot::AttachmentSlot,
    tree::{AttachmentTree, TreeConfig},
    types::{DormancyState, HostType, InstanceId, SlotId, Transform},
};

/// Bound on attachment-stack depth; trees deeper than this stop flattening
/// and default spawning rather than recurse without limit.
pub const MAX_ATTACHMENT_DEPTH: usize = 10;

/// Live state of one spawned part instance.
#[derive(Debug)]
pub struct InstanceRecord {
    kind: PartKind,
    owning_slot: Option<SlotId>,
    offset: OffsetController,
    transform: Transform,
    dormancy: DormancyState,
    has_capability: bool,
    /// Root-only: whether freshly created slots auto-spawn their default
    /// parts. Cleared for preset-loaded roots.
    spawn_defaults: bool,
}

impl InstanceRecord {
    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    pub fn owning_slot(&self) -> Option<SlotId> {
        self.owning_slot
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn dormancy(&self) -> DormancyState {
        self.dormancy
    }

    pub fn has_capability(&self) -> bool {
        self.has_capability
    }

    pub fn offset(&self) -> &OffsetController {
        &self.offset
    }
}

/// One replica's view of every attachment tree in the world.
///
/// Registries for instances, slots and trees live here; slot mutations are
/// authority-gated: the server commits and broadcasts, clients forward
/// requests and apply committed updates. All access happens on the owning
/// simulation thread; nothing blocks.
pub struct AttachmentGraph {
    host_type: HostType,
    registry: PartRegistry,
    tree_config: TreeConfig,
    instances: HashMap<InstanceId, InstanceRecord>,
    slots: HashMap<SlotId, AttachmentSlot>,
    trees: HashMap<InstanceId, AttachmentTree>,
    roots: Vec<InstanceId>,
    next_instance: u64,
    next_slot: u64,
    outbound_requests: Vec<SlotRequest>,
    outbound_commits: Vec<CommitUpdate>,
    events: Vec<GraphEvent>,
}

impl AttachmentGraph {
    pub fn new(host_type: HostType, registry: PartRegistry) -> Self {
        Self::with_config(host_type, registry, TreeConfig::default())
    }

    pub fn with_config(host_type: HostType, registry: PartRegistry, tree_config: TreeConfig) -> Self {
        Self {
            host_type,
            registry,
            tree_config,
            instances: HashMap::new(),
            slots: HashMap::new(),
            trees: HashMap::new(),
            roots: Vec::new(),
            next_instance: 1,
            next_slot: 1,
            outbound_requests: Vec::new(),
            outbound_commits: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn has_authority(&self) -> bool {
        self.host_type == HostType::Server
    }

    // Accessors

    pub fn record(&self, instance: InstanceId) -> Option<&InstanceRecord> {
        self.instances.get(&instance)
    }

    pub fn slot(&self, slot: SlotId) -> Option<&AttachmentSlot> {
        self.slots.get(&slot)
    }

    pub fn tree(&self, owner: InstanceId) -> Option<&AttachmentTree> {
        self.trees.get(&owner)
    }

    pub fn roots(&self) -> &[InstanceId] {
        &self.roots
    }

    /// The root instance at the top of `instance`'s ownership chain.
    pub fn root_of(&self, instance: InstanceId) -> InstanceId {
        let mut current = instance;
        for _ in 0..MAX_ATTACHMENT_DEPTH {
            let Some(slot_id) = self.instances.get(&current).and_then(|r| r.owning_slot) else {
                return current;
            };
            match self.slots.get(&slot_id) {
                Some(slot) => current = slot.owner,
                None => return current,
            }
        }
        current
    }

    fn stack_depth(&self, instance: InstanceId) -> usize {
        let mut depth = 0;
        let mut current = instance;
        while depth < MAX_ATTACHMENT_DEPTH {
            let Some(slot_id) = self.instances.get(&current).and_then(|r| r.owning_slot) else {
                break;
            };
            match self.slots.get(&slot_id) {
                Some(slot) => {
                    current = slot.owner;
                    depth += 1;
                }
                None => break,
            }
        }
        depth
    }

    // Spawning

    /// Spawn a root object (authoritative only), auto-spawning default
    /// parts into its slots. Broadcasts the spawn to observers.
    pub fn spawn_root(&mut self, kind: &PartKind) -> Option<InstanceId> {
        self.spawn_root_inner(kind, true)
    }

    /// Spawn a root object without default parts; used when a serialized
    /// preset is about to populate the slots instead.
    pub fn spawn_root_preset(&mut self, kind: &PartKind) -> Option<InstanceId> {
        self.spawn_root_inner(kind, false)
    }

    fn spawn_root_inner(&mut self, kind: &PartKind, spawn_defaults: bool) -> Option<InstanceId> {
        if !self.has_authority() {
            warn!("spawn_root without authority is ignored");
            return None;
        }
        if !self.registry.contains(kind) {
            warn!("spawn_root: unknown part kind '{kind}'");
            return None;
        }

        let root = self.create_instance(kind, spawn_defaults);
        self.roots.push(root);
        self.outbound_commits.push(CommitUpdate::RootSpawned {
            instance: root,
            kind: kind.clone(),
            spawn_defaults,
        });
        self.spawn_slot_defaults(root);
        Some(root)
    }

    /// Create an instance record plus, for capability-bearing kinds, its
    /// tree and slot records. Default parts are spawned separately so the
    /// commit stream stays ordered parent-before-child.
    fn create_instance(&mut self, kind: &PartKind, spawn_defaults: bool) -> InstanceId {
        let blueprint = self
            .registry
            .get(kind)
            .expect("create_instance requires a registered kind");
        let has_capability = blueprint.capability.spec().is_some();
        let inverted = blueprint.inverted_movement;
        let attach_location = blueprint.attach_location;
        let templates: Vec<_> = blueprint.slot_templates().to_vec();

        let id = InstanceId::from_u64(self.next_instance);
        self.next_instance += 1;

        self.instances.insert(
            id,
            InstanceRecord {
                kind: kind.clone(),
                owning_slot: None,
                offset: OffsetController::new(inverted, attach_location),
                transform: Transform::default(),
                dormancy: DormancyState::Awake,
                has_capability,
                spawn_defaults,
            },
        );
        self.events.push(GraphEvent::InstanceSpawned {
            instance: id,
            kind: kind.clone(),
        });

        if has_capability {
            self.trees
                .insert(id, AttachmentTree::new(id, self.tree_config.clone()));
            for template in &templates {
                let slot_id = SlotId::from_u64(self.next_slot);
                self.next_slot += 1;
                self.slots
                    .insert(slot_id, AttachmentSlot::from_template(slot_id, id, template));
                if let Some(tree) = self.trees.get_mut(&id) {
                    tree.direct_slots.push(slot_id);
                }
            }
            self.request_rebuild(id, Duration::ZERO);
        }

        id
    }

    /// Authoritative default-part auto-spawn for every empty slot of a
    /// freshly created instance.
    fn spawn_slot_defaults(&mut self, owner: InstanceId) {
        if !self.has_authority() {
            return;
        }
        let root = self.root_of(owner);
        let defaults_enabled = self
            .instances
            .get(&root)
            .map(|record| record.spawn_defaults)
            .unwrap_or(false);
        if !defaults_enabled {
            return;
        }
        if self.stack_depth(owner) >= MAX_ATTACHMENT_DEPTH {
            warn!("default spawn stopped: attachment stack too deep under {owner}");
            return;
        }

        let slot_ids: Vec<SlotId> = self
            .trees
            .get(&owner)
            .map(|tree| tree.direct_slots.clone())
            .unwrap_or_default();
        for slot_id in slot_ids {
            let choice = {
                let Some(slot) = self.slots.get(&slot_id) else { continue };
                if slot.current.is_some() {
                    continue;
                }
                // Rebuild a template view for selection: the slot keeps its
                // catalogs, the blueprint keeps the default settings.
                let owner_kind = self.instances[&owner].kind.clone();
                let Some(blueprint) = self.registry.get(&owner_kind) else { continue };
                let Some(template) = blueprint
                    .slot_templates()
                    .iter()
                    .find(|template| template.name == slot.name)
                else {
                    continue;
                };
                template.resolve_default()
            };
            match choice {
                DefaultChoice::Part(kind) => {
                    self.attach(slot_id, &kind, true);
                }
                DefaultChoice::NoSpawn | DefaultChoice::NoEntries => {}
            }
        }
    }

    // Slot mutations

    /// Attach a newly spawned instance of `kind` into `slot`.
    ///
    /// Incompatible kinds are a silent no-op returning the current
    /// occupant. Without authority the request is forwarded (when the slot
    /// allows client changes) and the pre-mutation occupant is returned;
    /// the committed result arrives later through the replicated state.
    /// With `replace` the prior occupant's offset is carried onto the
    /// replacement and its subtree is destroyed first; the new instance is
    /// returned. Without `replace` an occupied slot is left untouched and
    /// the prior occupant (if any) is returned.
    pub fn attach(&mut self, slot_id: SlotId, kind: &PartKind, replace: bool) -> Option<InstanceId> {
        let Some(slot) = self.slots.get(&slot_id) else {
            warn!("attach: {slot_id} not found");
            return None;
        };
        let prior = slot.current;
        if !slot.is_compatible(kind) || !self.registry.contains(kind) {
            trace!("attach: '{kind}' rejected by {slot_id} compatibility");
            return prior;
        }

        if !self.has_authority() {
            if slot.allow_client_change {
                self.outbound_requests.push(SlotRequest::Attach {
                    slot: slot_id,
                    kind: kind.clone(),
                    replace,
                });
                if let Some(slot) = self.slots.get_mut(&slot_id) {
                    slot.pending_attach = true;
                }
            } else {
                trace!("attach: {slot_id} does not allow client changes");
            }
            return prior;
        }

        if !replace && prior.is_some() {
            return prior;
        }

        let carried_offset = prior
            .and_then(|old| self.instances.get(&old))
            .map(|record| record.offset.current())
            .unwrap_or(0.0);
        if let Some(old) = prior {
            self.destroy_instance_deep(old);
            if let Some(slot) = self.slots.get_mut(&slot_id) {
                slot.current = None;
            }
        }

        let instance = self.create_instance(kind, false);
        self.mount(slot_id, instance, carried_offset);
        self.outbound_commits.push(CommitUpdate::Attached {
            slot: slot_id,
            instance,
            kind: kind.clone(),
            offset: self.instances[&instance].offset.current(),
        });
        self.spawn_slot_defaults(instance);
        self.after_slot_change(slot_id, Some(instance));

        if replace {
            Some(instance)
        } else {
            prior
        }
    }

    /// Attach an already-spawned, currently unowned instance. The hand-off
    /// is atomic: the replaced occupant is detached and destroyed before
    /// the new instance gains an owning slot.
    pub fn attach_existing(
        &mut self,
        slot_id: SlotId,
        instance: InstanceId,
        replace: bool,
    ) -> Option<InstanceId> {
        let Some(slot) = self.slots.get(&slot_id) else {
            warn!("attach_existing: {slot_id} not found");
            return None;
        };
        let prior = slot.current;
        let Some(record) = self.instances.get(&instance) else {
            return prior;
        };
        if record.owning_slot.is_some() {
            warn!("attach_existing: {instance} already owned by a slot");
            return prior;
        }
        let kind = record.kind.clone();
        if !slot.is_compatible(&kind) {
            trace!("attach_existing: '{kind}' rejected by {slot_id} compatibility");
            return prior;
        }

        if !self.has_authority() {
            if slot.allow_client_change {
                self.outbound_requests.push(SlotRequest::AttachExisting {
                    slot: slot_id,
                    instance,
                    replace,
                });
                if let Some(slot) = self.slots.get_mut(&slot_id) {
                    slot.pending_attach = true;
                }
            }
            return prior;
        }

        if !replace && prior.is_some() {
            return prior;
        }

        let carried_offset = prior
            .and_then(|old| self.instances.get(&old))
            .map(|record| record.offset.current())
            .unwrap_or(0.0);
        if let Some(old) = prior {
            self.destroy_instance_deep(old);
            if let Some(slot) = self.slots.get_mut(&slot_id) {
                slot.current = None;
            }
        }

        self.mount(slot_id, instance, carried_offset);
        self.outbound_commits.push(CommitUpdate::Attached {
            slot: slot_id,
            instance,
            kind,
            offset: self.instances[&instance].offset.current(),
        });
        self.after_slot_change(slot_id, Some(instance));

        if replace {
            Some(instance)
        } else {
            prior
        }
    }

    /// Take ownership of `instance`, position it at the slot's reference
    /// point and prime its offset controller with the slot's bounds.
    fn mount(&mut self, slot_id: SlotId, instance: InstanceId, carried_offset: f32) {
        let (minimum, maximum, snap, reference, initial) = {
            let slot = self.slots.get_mut(&slot_id).expect("mount: slot exists");
            slot.current = Some(instance);
            slot.pending_attach = false;
            let initial = if slot.initial_offset_used {
                None
            } else {
                match slot.initial_offset {
                    Some(value) if value >= slot.minimum && value <= slot.maximum => {
                        slot.initial_offset_used = true;
                        Some(value)
                    }
                    _ => None,
                }
            };
            (
                slot.minimum,
                slot.maximum,
                slot.snap_distance,
                slot.reference_location,
                initial,
            )
        };

        // An instance with an owning slot is no longer a root.
        self.roots.retain(|root| *root != instance);

        let record = self
            .instances
            .get_mut(&instance)
            .expect("mount: instance exists");
        record.owning_slot = Some(slot_id);
        record.transform = Transform::new(reference);
        record.offset.reset();
        record.offset.prime(minimum, maximum, snap);
        record.offset.set_offset(initial.unwrap_or(carried_offset));
        self.apply_placement(instance);
    }

    /// Detach and destroy the slot's occupant along with everything
    /// attached beneath it. Non-authoritative callers forward the request.
    pub fn detach(&mut self, slot_id: SlotId) {
        let Some(slot) = self.slots.get(&slot_id) else {
            return;
        };
        if !self.has_authority() {
            if slot.allow_client_change {
                self.outbound_requests.push(SlotRequest::Detach { slot: slot_id });
            }
            return;
        }
        if slot.current.is_none() {
            return;
        }

        self.detach_internal(slot_id);
        self.outbound_commits.push(CommitUpdate::Detached { slot: slot_id });
        self.after_slot_change(slot_id, None);
    }

    fn detach_internal(&mut self, slot_id: SlotId) {
        let Some(current) = self.slots.get(&slot_id).and_then(|slot| slot.current) else {
            return;
        };
        self.destroy_instance_deep(current);
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.current = None;
            slot.pending_attach = false;
        }
    }

    /// Destroy an instance and, bottom-up, every instance attached in its
    /// descendant slots, removing all of their slot and tree records.
    fn destroy_instance_deep(&mut self, instance: InstanceId) {
        let child_slots: Vec<SlotId> = self
            .trees
            .get(&instance)
            .map(|tree| tree.direct_slots.clone())
            .unwrap_or_default();
        for slot_id in child_slots {
            if let Some(child) = self.slots.get(&slot_id).and_then(|slot| slot.current) {
                self.destroy_instance_deep(child);
            }
        }
        self.remove_instance_record(instance);
    }

    /// Remove one instance record (no descent) plus its own slots/tree.
    fn remove_instance_record(&mut self, instance: InstanceId) {
        let Some(record) = self.instances.remove(&instance) else {
            return;
        };
        if let Some(tree) = self.trees.remove(&instance) {
            for slot_id in tree.direct_slots {
                self.slots.remove(&slot_id);
            }
        }
        if let Some(owning) = record.owning_slot {
            if let Some(slot) = self.slots.get_mut(&owning) {
                if slot.current == Some(instance) {
                    slot.current = None;
                }
            }
        }
        self.roots.retain(|root| *root != instance);
        self.events.push(GraphEvent::InstanceDestroyed {
            instance,
            kind: record.kind,
        });
    }

    /// Authoritative teardown of every attachment in `root`'s tree.
    ///
    /// The attached instances are snapshotted from a fresh flatten before
    /// anything is destroyed, so destruction side effects (including
    /// reentrant rebuild triggers) never mutate a collection mid-iteration.
    pub fn destroy_all_attachments(&mut self, root: InstanceId) {
        if !self.has_authority() {
            warn!("destroy_all_attachments without authority is ignored");
            return;
        }
        if !self.trees.contains_key(&root) {
            return;
        }

        self.rebuild_now(root);
        let snapshot: Vec<InstanceId> = self
            .trees
            .get(&root)
            .map(|tree| {
                tree.flattened
                    .iter()
                    .filter_map(|slot_id| self.slots.get(slot_id).and_then(|slot| slot.current))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(tree) = self.trees.get_mut(&root) {
            for slot_id in std::mem::take(&mut tree.direct_slots) {
                self.slots.remove(&slot_id);
            }
            tree.flattened.clear();
            tree.essential.clear();
            tree.essential_complete = false;
        }

        for instance in snapshot {
            self.remove_instance_record(instance);
        }
    }

    /// Linear scan of `owner`'s direct slots for occupants of an exact kind.
    pub fn attachments_of_kind(&self, owner: InstanceId, kind: &PartKind) -> Vec<InstanceId> {
        let Some(tree) = self.trees.get(&owner) else {
            return Vec::new();
        };
        tree.direct_slots
            .iter()
            .filter_map(|slot_id| self.slots.get(slot_id).and_then(|slot| slot.current))
            .filter(|instance| {
                self.instances
                    .get(instance)
                    .map(|record| record.kind == *kind)
                    .unwrap_or(false)
            })
            .collect()
    }

    // Offset movement

    /// Continuous/quantized drag input; runs locally on every replica so
    /// the dragging client gets immediate feedback. Returns true when the
    /// offset changed.
    pub fn add_offset(&mut self, instance: InstanceId, delta: f32) -> bool {
        let Some(record) = self.instances.get_mut(&instance) else {
            return false;
        };
        let moved = record.offset.add_offset(delta);
        if moved {
            self.apply_placement(instance);
        }
        moved
    }

    /// Exact offset restore, no snapping. Returns true when the value was
    /// out of bounds and the offset was left unchanged.
    pub fn set_offset(&mut self, instance: InstanceId, value: f32) -> bool {
        let Some(record) = self.instances.get_mut(&instance) else {
            return true;
        };
        let clamped = record.offset.set_offset(value);
        self.apply_placement(instance);
        clamped
    }

    /// End of drag: discard the sub-snap remainder and commit the final
    /// offset, forwarding to the authority when run on a client.
    pub fn finish_moving(&mut self, instance: InstanceId) {
        let Some(record) = self.instances.get_mut(&instance) else {
            return;
        };
        record.offset.finish_moving();
        let offset = record.offset.current();
        if self.has_authority() {
            self.outbound_commits
                .push(CommitUpdate::OffsetCommitted { instance, offset });
        } else {
            self.outbound_requests
                .push(SlotRequest::CommitOffset { instance, offset });
        }
        self.apply_placement(instance);
    }

    /// Jump whole snap indices; clamped at the sequence ends.
    pub fn move_position(&mut self, instance: InstanceId, steps: i32) {
        if let Some(record) = self.instances.get_mut(&instance) {
            record.offset.move_position(steps);
            self.apply_placement(instance);
        }
    }

    pub fn snap_points(&mut self, instance: InstanceId) -> Vec<f32> {
        self.instances
            .get_mut(&instance)
            .map(|record| record.offset.snap_points().to_vec())
            .unwrap_or_default()
    }

    /// Snap index of the slot's occupant, or -1 while the slot is empty.
    pub fn current_snap_index(&self, slot_id: SlotId) -> i32 {
        let Some(instance) = self.slots.get(&slot_id).and_then(|slot| slot.current) else {
            return -1;
        };
        self.instances
            .get(&instance)
            .map(|record| record.offset.current_snap_index())
            .unwrap_or(-1)
    }

    fn apply_placement(&mut self, instance: InstanceId) {
        let Some(record) = self.instances.get(&instance) else {
            return;
        };
        let Some(slot_id) = record.owning_slot else {
            return;
        };
        let Some(slot) = self.slots.get(&slot_id) else {
            return;
        };
        let relative = record.offset.relative_location();
        let location = [
            slot.reference_location[0] + relative[0],
            slot.reference_location[1] + relative[1],
            slot.reference_location[2] + relative[2],
        ];
        if let Some(record) = self.instances.get_mut(&instance) {
            record.transform = Transform::new(location);
        }
    }

    // Overlap ghosting

    /// Record an overlap between a slot's drag candidate and an existing
    /// part; stale records are pruned in the same pass.
    pub fn record_overlap(&mut self, slot_id: SlotId, candidate: InstanceId, overlapping: bool) {
        let instances = &self.instances;
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.record_overlap(candidate, overlapping, |id| instances.contains_key(&id));
        }
    }

    /// Emit hide/show notifications for every recorded overlap.
    pub fn apply_overlap_visibility(&mut self, slot_id: SlotId) {
        let entries: Vec<_> = self
            .slots
            .get(&slot_id)
            .map(|slot| slot.overlaps.clone())
            .unwrap_or_default();
        for entry in entries {
            self.events.push(GraphEvent::OverlapVisibility {
                instance: entry.candidate,
                hidden: entry.overlapping,
            });
        }
    }

    // Dormancy

    /// Change the update-frequency state of a slot's occupant. The actual
    /// throttling belongs to the transport; the graph records and
    /// broadcasts. Non-authoritative callers forward.
    pub fn set_dormancy(&mut self, slot_id: SlotId, state: DormancyState) {
        let Some(instance) = self.slots.get(&slot_id).and_then(|slot| slot.current) else {
            return;
        };
        if self
            .instances
            .get(&instance)
            .map(|record| record.dormancy == state)
            .unwrap_or(true)
        {
            return;
        }
        if !self.has_authority() {
            self.outbound_requests
                .push(SlotRequest::SetDormancy { slot: slot_id, state });
            return;
        }
        if let Some(record) = self.instances.get_mut(&instance) {
            record.dormancy = state;
        }
        self.outbound_commits
            .push(CommitUpdate::DormancyChanged { instance, state });
        self.events
            .push(GraphEvent::DormancyChanged { instance, state });
    }

    /// Force one replication update for a dormant occupant.
    pub fn flush_dormancy(&mut self, slot_id: SlotId) {
        let Some(instance) = self.slots.get(&slot_id).and_then(|slot| slot.current) else {
            return;
        };
        if !self.has_authority() {
            self.outbound_requests
                .push(SlotRequest::FlushDormancy { slot: slot_id });
            return;
        }
        let state = self
            .instances
            .get(&instance)
            .map(|record| record.dormancy)
            .unwrap_or(DormancyState::Awake);
        self.events
            .push(GraphEvent::DormancyChanged { instance, state });
    }

    // Compatibility

    pub fn set_slot_entry_enabled(
        &mut self,
        slot_id: SlotId,
        entry: &CompatibilityEntry,
        enabled: bool,
    ) -> bool {
        self.slots
            .get_mut(&slot_id)
            .map(|slot| slot.set_entry_enabled(entry, enabled))
            .unwrap_or(false)
    }

    // Cache rebuilds

    fn request_rebuild(&mut self, owner: InstanceId, override_delay: Duration) {
        let root = self.root_of(owner);
        let rebuild_now = match self.trees.get_mut(&root) {
            Some(tree) => tree.schedule_rebuild(override_delay),
            None => return,
        };
        if rebuild_now {
            self.rebuild_now(root);
        }
    }

    /// Rebuild `root`'s flattened cache synchronously, from scratch, along
    /// with every descendant tree's cache.
    pub fn rebuild_now(&mut self, root: InstanceId) {
        self.rebuild_recursive(root, 0);
    }

    fn rebuild_recursive(&mut self, owner: InstanceId, depth: usize) {
        if depth >= MAX_ATTACHMENT_DEPTH {
            warn!("flatten stopped: attachment stack too deep under {owner}");
            return;
        }
        let direct: Vec<SlotId> = match self.trees.get(&owner) {
            Some(tree) => tree.direct_slots.clone(),
            None => return,
        };

        let mut flattened = Vec::with_capacity(direct.len());
        for slot_id in direct {
            flattened.push(slot_id);
            let Some(child) = self.slots.get(&slot_id).and_then(|slot| slot.current) else {
                continue;
            };
            let child_has_tree = self
                .instances
                .get(&child)
                .map(|record| record.has_capability)
                .unwrap_or(false)
                && self.trees.contains_key(&child);
            if child_has_tree {
                self.rebuild_recursive(child, depth + 1);
                if let Some(child_tree) = self.trees.get(&child) {
                    flattened.extend(child_tree.flattened.iter().copied());
                }
            }
        }

        let essential: Vec<SlotId> = flattened
            .iter()
            .copied()
            .filter(|slot_id| {
                self.slots
                    .get(slot_id)
                    .map(|slot| slot.essential)
                    .unwrap_or(false)
            })
            .collect();
        let essential_complete = essential.iter().all(|slot_id| {
            self.slots
                .get(slot_id)
                .map(|slot| slot.current.is_some())
                .unwrap_or(false)
        });

        if let Some(tree) = self.trees.get_mut(&owner) {
            tree.flattened = flattened;
            tree.essential = essential;
            tree.essential_complete = essential_complete;
            tree.init_done = true;
            tree.pending_rebuild = None;
        }

        if depth == 0 {
            trace!("rebuilt attachment cache for {owner}");
            self.events.push(GraphEvent::TreeUpdated {
                owner,
                essential_complete,
            });
        }
    }

    /// Cheap essential revalidation after one slot changed, plus a
    /// (possibly debounced) full rebuild request.
    fn after_slot_change(&mut self, slot_id: SlotId, instance: Option<InstanceId>) {
        self.events.push(GraphEvent::AttachmentChanged {
            slot: slot_id,
            instance,
        });

        let Some(owner) = self.slots.get(&slot_id).map(|slot| slot.owner) else {
            return;
        };
        let root = self.root_of(owner);
        if let Some(tree) = self.trees.get(&root) {
            if tree.essential.contains(&slot_id) {
                let complete = if instance.is_some() {
                    tree.essential.iter().all(|id| {
                        self.slots
                            .get(id)
                            .map(|slot| slot.current.is_some())
                            .unwrap_or(false)
                    })
                } else {
                    false
                };
                if let Some(tree) = self.trees.get_mut(&root) {
                    tree.essential_complete = complete;
                }
            }
        }
        self.request_rebuild(root, Duration::ZERO);
    }

    /// Fire any debounce timers that have elapsed. Call once per frame on
    /// the tree's owning thread.
    pub fn tick(&mut self) {
        let due: Vec<InstanceId> = self
            .trees
            .iter()
            .filter(|(_, tree)| tree.pending_rebuild_ringing())
            .map(|(owner, _)| *owner)
            .collect();
        for owner in due {
            if let Some(tree) = self.trees.get_mut(&owner) {
                tree.pending_rebuild = None;
            }
            self.rebuild_now(owner);
        }
    }

    // Replication plumbing

    /// Take the queued fire-and-forget requests bound for the authority.
    pub fn drain_requests(&mut self) -> Vec<SlotRequest> {
        std::mem::take(&mut self.outbound_requests)
    }

    /// Take the committed updates bound for every observer.
    pub fn drain_commits(&mut self) -> Vec<CommitUpdate> {
        std::mem::take(&mut self.outbound_commits)
    }

    /// Take the queued embedder notifications.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// Authoritative handling of one client request. Every request is
    /// re-validated here; a request that fails validation never happened.
    pub fn apply_request(&mut self, request: SlotRequest) {
        if !self.has_authority() {
            warn!("apply_request on a non-authoritative graph is ignored");
            return;
        }
        let slot_allows_change = |graph: &Self, slot_id: SlotId| {
            graph
                .slots
                .get(&slot_id)
                .map(|slot| slot.allow_client_change)
                .unwrap_or(false)
        };
        match request {
            SlotRequest::Attach { slot, kind, replace } => {
                if slot_allows_change(self, slot) {
                    self.attach(slot, &kind, replace);
                }
            }
            SlotRequest::AttachExisting {
                slot,
                instance,
                replace,
            } => {
                if slot_allows_change(self, slot) {
                    self.attach_existing(slot, instance, replace);
                }
            }
            SlotRequest::Detach { slot } => {
                if slot_allows_change(self, slot) {
                    self.detach(slot);
                }
            }
            SlotRequest::CommitOffset { instance, offset } => {
                if let Some(record) = self.instances.get_mut(&instance) {
                    record.offset.restore(offset);
                    self.apply_placement(instance);
                    self.outbound_commits
                        .push(CommitUpdate::OffsetCommitted { instance, offset });
                }
            }
            SlotRequest::SetDormancy { slot, state } => {
                self.set_dormancy(slot, state);
            }
            SlotRequest::FlushDormancy { slot } => {
                self.flush_dormancy(slot);
            }
        }
    }

    /// Observer-side application of one committed update.
    ///
    /// Identifier allocation happens in committed order only, which keeps
    /// instance and slot ids aligned with the authority without an id
    /// translation table.
    pub fn apply_commit(&mut self, update: CommitUpdate) {
        if self.has_authority() {
            warn!("apply_commit on the authoritative graph is ignored");
            return;
        }
        match update {
            CommitUpdate::RootSpawned {
                instance,
                kind,
                spawn_defaults,
            } => {
                if !self.registry.contains(&kind) {
                    warn!("commit for unknown root kind '{kind}' dropped");
                    return;
                }
                self.next_instance = self.next_instance.max(instance.to_u64());
                let created = self.create_instance(&kind, spawn_defaults);
                debug_assert_eq!(created, instance, "replica instance ids diverged");
                self.roots.push(created);
            }
            CommitUpdate::Attached {
                slot,
                instance,
                kind,
                offset,
            } => {
                if !self.registry.contains(&kind) {
                    warn!("commit for unknown part kind '{kind}' dropped");
                    return;
                }
                if !self.slots.contains_key(&slot) {
                    warn!("commit for unknown {slot} dropped");
                    return;
                }
                if let Some(old) = self.slots.get(&slot).and_then(|s| s.current) {
                    if old != instance {
                        self.destroy_instance_deep(old);
                        if let Some(slot) = self.slots.get_mut(&slot) {
                            slot.current = None;
                        }
                    }
                }
                let created = if self.instances.contains_key(&instance) {
                    instance
                } else {
                    self.next_instance = self.next_instance.max(instance.to_u64());
                    let created = self.create_instance(&kind, false);
                    debug_assert_eq!(created, instance, "replica instance ids diverged");
                    created
                };
                self.mount(slot, created, 0.0);
                if let Some(record) = self.instances.get_mut(&created) {
                    record.offset.restore(offset);
                }
                self.apply_placement(created);
                self.after_slot_change(slot, Some(created));
            }
            CommitUpdate::Detached { slot } => {
                if self.slots.get(&slot).and_then(|s| s.current).is_some() {
                    self.detach_internal(slot);
                    self.after_slot_change(slot, None);
                } else if let Some(slot) = self.slots.get_mut(&slot) {
                    slot.pending_attach = false;
                }
            }
            CommitUpdate::OffsetCommitted { instance, offset } => {
                if let Some(record) = self.instances.get_mut(&instance) {
                    record.offset.restore(offset);
                    self.apply_placement(instance);
                }
            }
            CommitUpdate::DormancyChanged { instance, state } => {
                if let Some(record) = self.instances.get_mut(&instance) {
                    record.dormancy = state;
                    self.events
                        .push(GraphEvent::DormancyChanged { instance, state });
                }
            }
        }
    }
}
