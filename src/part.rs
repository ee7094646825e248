use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::CompatibilityCatalog;

/// Identifier for a spawnable part type (the data-driven stand-in for an
/// engine asset class). Used as the serialization key for attached types.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PartKind(String);

impl PartKind {
    pub fn of(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a part type participates in the attachment contract.
///
/// Graph operations branch on this and treat `None` as a cheap no-op rather
/// than a lookup failure: a part without the capability simply carries no
/// slots and contributes nothing to flattened caches or serialization.
#[derive(Clone, Debug, Default)]
pub enum Capability {
    #[default]
    None,
    Attachment(AttachmentSpec),
}

impl Capability {
    pub fn spec(&self) -> Option<&AttachmentSpec> {
        match self {
            Capability::None => None,
            Capability::Attachment(spec) => Some(spec),
        }
    }
}

/// The slots a capability-bearing part exposes once spawned.
#[derive(Clone, Debug, Default)]
pub struct AttachmentSpec {
    pub slots: Vec<SlotTemplate>,
}

/// Random default-part selection settings for one slot template.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomDefault {
    pub randomize: bool,
    /// When set, "spawn nothing" is one of the random outcomes, distinct
    /// from picking the first catalog entry.
    pub allow_no_spawn: bool,
}

/// Outcome of default-part selection for a freshly created slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefaultChoice {
    /// Nothing to pick from: no configured default and no enabled entries.
    NoEntries,
    /// The explicit "spawn nothing" outcome was rolled.
    NoSpawn,
    /// A concrete part type was chosen.
    Part(PartKind),
}

/// Static description of one attachment slot, instantiated into a live slot
/// record whenever its owning part spawns.
#[derive(Clone, Debug)]
pub struct SlotTemplate {
    /// Unique within the owning tree; serialization round trips match on it.
    pub name: String,
    pub minimum: f32,
    pub maximum: f32,
    /// 0 = continuous movement, > 0 = quantization step.
    pub snap_distance: f32,
    pub essential: bool,
    /// Whether non-authoritative replicas may request mutations of this slot.
    pub allow_client_change: bool,
    pub catalogs: Vec<CompatibilityCatalog>,
    /// Placement of the slot's reference point on the owning part.
    pub reference_location: [f32; 3],
    pub default_part: Option<PartKind>,
    pub random_default: RandomDefault,
    /// Offset primed onto the first instance attached to this slot.
    pub initial_offset: Option<f32>,
}

impl SlotTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            minimum: 0.0,
            maximum: 0.0,
            snap_distance: 0.0,
            essential: false,
            allow_client_change: true,
            catalogs: Vec::new(),
            reference_location: [0.0; 3],
            default_part: None,
            random_default: RandomDefault::default(),
            initial_offset: None,
        }
    }

    /// Pick the default part for a new slot instance.
    ///
    /// Non-randomized templates resolve to the configured default (or
    /// `NoEntries` when none is configured). Randomized templates roll over
    /// the union of enabled catalog entries, with explicit "no spawn" as an
    /// extra outcome when allowed.
    pub fn resolve_default(&self) -> DefaultChoice {
        if !self.random_default.randomize {
            return match &self.default_part {
                Some(kind) => DefaultChoice::Part(kind.clone()),
                None => DefaultChoice::NoEntries,
            };
        }

        let pool: Vec<&PartKind> = self
            .catalogs
            .iter()
            .flat_map(|catalog| catalog.enabled_kinds())
            .collect();
        if pool.is_empty() {
            return DefaultChoice::NoEntries;
        }

        let start: i32 = if self.random_default.allow_no_spawn { -1 } else { 0 };
        let index = fastrand::i32(start..pool.len() as i32);
        if index < 0 {
            DefaultChoice::NoSpawn
        } else {
            DefaultChoice::Part(pool[index as usize].clone())
        }
    }
}

/// Static description of one spawnable part type.
#[derive(Clone, Debug)]
pub struct PartBlueprint {
    pub kind: PartKind,
    pub capability: Capability,
    /// Positive offset input moves the instance toward `minimum` instead of
    /// `maximum` (sliding parts mounted back-to-front).
    pub inverted_movement: bool,
    /// Base relative placement of the part on its slot's reference point.
    pub attach_location: [f32; 3],
    /// Whether this part participates in overlap ghosting checks.
    pub overlap_checked: bool,
}

impl PartBlueprint {
    pub fn new(kind: PartKind) -> Self {
        Self {
            kind,
            capability: Capability::None,
            inverted_movement: false,
            attach_location: [0.0; 3],
            overlap_checked: false,
        }
    }

    pub fn with_capability(mut self, spec: AttachmentSpec) -> Self {
        self.capability = Capability::Attachment(spec);
        self
    }

    pub fn with_inverted_movement(mut self) -> Self {
        self.inverted_movement = true;
        self
    }

    pub fn slot_templates(&self) -> &[SlotTemplate] {
        match &self.capability {
            Capability::None => &[],
            Capability::Attachment(spec) => &spec.slots,
        }
    }
}

/// All part types known to a graph, keyed by kind.
///
/// Both replicas of a graph must be built from the same registry; the
/// registry itself never changes at runtime.
#[derive(Clone, Debug, Default)]
pub struct PartRegistry {
    blueprints: HashMap<PartKind, PartBlueprint>,
}

impl PartRegistry {
    pub fn new() -> Self {
        Self {
            blueprints: HashMap::new(),
        }
    }

    pub fn add(&mut self, blueprint: PartBlueprint) -> &mut Self {
        self.blueprints.insert(blueprint.kind.clone(), blueprint);
        self
    }

    pub fn get(&self, kind: &PartKind) -> Option<&PartBlueprint> {
        self.blueprints.get(kind)
    }

    pub fn contains(&self, kind: &PartKind) -> bool {
        self.blueprints.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CompatibilityEntry;

    #[test]
    fn non_random_default_resolves_to_configured_part() {
        let mut template = SlotTemplate::new("rail");
        template.default_part = Some(PartKind::of("sight_a"));
        assert_eq!(
            template.resolve_default(),
            DefaultChoice::Part(PartKind::of("sight_a"))
        );
    }

    #[test]
    fn non_random_default_without_part_is_no_entries() {
        let template = SlotTemplate::new("rail");
        assert_eq!(template.resolve_default(), DefaultChoice::NoEntries);
    }

    #[test]
    fn random_default_with_empty_pool_is_no_entries() {
        let mut template = SlotTemplate::new("rail");
        template.random_default.randomize = true;
        template.random_default.allow_no_spawn = true;
        assert_eq!(template.resolve_default(), DefaultChoice::NoEntries);
    }

    #[test]
    fn random_default_covers_all_three_outcomes() {
        let mut template = SlotTemplate::new("rail");
        template.random_default.randomize = true;
        template.random_default.allow_no_spawn = true;
        template.catalogs.push(CompatibilityCatalog::new(vec![
            CompatibilityEntry::enabled(PartKind::of("sight_a")),
        ]));

        let mut saw_no_spawn = false;
        let mut saw_part = false;
        for seed in 0..200 {
            fastrand::seed(seed);
            match template.resolve_default() {
                DefaultChoice::NoSpawn => saw_no_spawn = true,
                DefaultChoice::Part(kind) => {
                    assert_eq!(kind, PartKind::of("sight_a"));
                    saw_part = true;
                }
                DefaultChoice::NoEntries => panic!("pool is non-empty"),
            }
        }
        assert!(saw_no_spawn && saw_part);
    }
}
