use crate::part::PartKind;

/// One (part type, enabled) pair inside a compatibility catalog.
///
/// Equality covers both fields; `CompatibilityCatalog::set_enabled` matches
/// entries by this value equality, so a caller must name the entry's prior
/// enabled state to flip it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CompatibilityEntry {
    pub kind: PartKind,
    pub enabled: bool,
}

impl CompatibilityEntry {
    pub fn enabled(kind: PartKind) -> Self {
        Self { kind, enabled: true }
    }

    pub fn disabled(kind: PartKind) -> Self {
        Self {
            kind,
            enabled: false,
        }
    }
}

/// Data-driven list of part types a slot may hold.
///
/// A slot may be assigned several catalogs; its allowed set is the union of
/// enabled entries across all of them, so a kind disabled in one catalog can
/// still match through another.
#[derive(Clone, Debug, Default)]
pub struct CompatibilityCatalog {
    entries: Vec<CompatibilityEntry>,
}

impl CompatibilityCatalog {
    pub fn new(entries: Vec<CompatibilityEntry>) -> Self {
        Self { entries }
    }

    /// True iff some entry names `kind` and is enabled. Disabled entries
    /// never match.
    pub fn is_compatible(&self, kind: &PartKind) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.enabled && entry.kind == *kind)
    }

    /// Flip the enabled flag of the entry matching `entry` by value
    /// equality. Returns false (and mutates nothing) when no entry matches.
    pub fn set_enabled(&mut self, entry: &CompatibilityEntry, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|candidate| *candidate == entry) {
            Some(found) => {
                found.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[CompatibilityEntry] {
        &self.entries
    }

    pub fn enabled_kinds(&self) -> impl Iterator<Item = &PartKind> {
        self.entries
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| &entry.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(name: &str) -> PartKind {
        PartKind::of(name)
    }

    #[test]
    fn disabled_entries_never_match() {
        let catalog =
            CompatibilityCatalog::new(vec![CompatibilityEntry::disabled(kind("suppressor"))]);
        assert!(!catalog.is_compatible(&kind("suppressor")));
    }

    #[test]
    fn set_enabled_matches_by_value_equality() {
        let mut catalog =
            CompatibilityCatalog::new(vec![CompatibilityEntry::disabled(kind("suppressor"))]);

        // Wrong prior flag: no match, no side effect.
        assert!(!catalog.set_enabled(&CompatibilityEntry::enabled(kind("suppressor")), true));
        assert!(!catalog.is_compatible(&kind("suppressor")));

        assert!(catalog.set_enabled(&CompatibilityEntry::disabled(kind("suppressor")), true));
        assert!(catalog.is_compatible(&kind("suppressor")));
    }

    #[test]
    fn set_enabled_miss_returns_false() {
        let mut catalog = CompatibilityCatalog::default();
        assert!(!catalog.set_enabled(&CompatibilityEntry::enabled(kind("laser")), false));
    }
}
