use std::time::Duration;

use crate::{
    backends::Timer,
    types::{InstanceId, SlotId},
};

/// Tuning knobs for one attachment tree.
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// Rebuilds requested before the first completed rebuild are deferred by
    /// at least this long, coalescing construction bursts (spawning a preset
    /// with a dozen default parts triggers one rebuild, not a dozen).
    pub initial_rebuild_delay: Duration,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            initial_rebuild_delay: Duration::from_millis(250),
        }
    }
}

/// Aggregates the slots belonging to one owner and derives the flattened
/// view of the whole descendant tree.
///
/// The flattened cache is always rebuilt from scratch, never patched
/// incrementally; the tree's depth and shape can change at any node and
/// stale slot references are not worth the savings.
#[derive(Debug)]
pub struct AttachmentTree {
    pub(crate) owner: InstanceId,
    pub(crate) direct_slots: Vec<SlotId>,
    pub(crate) flattened: Vec<SlotId>,
    pub(crate) essential: Vec<SlotId>,
    pub(crate) essential_complete: bool,
    pub(crate) init_done: bool,
    pub(crate) config: TreeConfig,
    pub(crate) pending_rebuild: Option<Timer>,
}

impl AttachmentTree {
    pub(crate) fn new(owner: InstanceId, config: TreeConfig) -> Self {
        Self {
            owner,
            direct_slots: Vec::new(),
            flattened: Vec::new(),
            essential: Vec::new(),
            essential_complete: false,
            init_done: false,
            config,
            pending_rebuild: None,
        }
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    /// Direct slots only, in registration order.
    pub fn direct_slots(&self) -> &[SlotId] {
        &self.direct_slots
    }

    /// Self slots plus recursively all descendant slots, depth-first
    /// pre-order, as of the last completed rebuild.
    pub fn flattened(&self) -> &[SlotId] {
        &self.flattened
    }

    pub fn essential_slots(&self) -> &[SlotId] {
        &self.essential
    }

    /// True when every essential slot in the tree is populated.
    pub fn essential_complete(&self) -> bool {
        self.essential_complete
    }

    pub fn rebuild_pending(&self) -> bool {
        self.pending_rebuild.is_some()
    }

    /// Decide whether a rebuild request runs now or is deferred.
    ///
    /// Before the first completed rebuild, requests are coalesced behind a
    /// single timer armed with `max(override_delay, configured delay)`;
    /// re-arming replaces the prior deadline. Afterwards requests rebuild
    /// synchronously. Returns true when the caller should rebuild now.
    pub(crate) fn schedule_rebuild(&mut self, override_delay: Duration) -> bool {
        let configured = self.config.initial_rebuild_delay;
        if !self.init_done && (!override_delay.is_zero() || !configured.is_zero()) {
            let delay = override_delay.max(configured);
            match &mut self.pending_rebuild {
                Some(timer) => timer.reset_with(delay),
                None => self.pending_rebuild = Some(Timer::new(delay)),
            }
            false
        } else {
            true
        }
    }

    pub(crate) fn pending_rebuild_ringing(&self) -> bool {
        self.pending_rebuild
            .as_ref()
            .map(Timer::ringing)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceId;

    #[test]
    fn first_rebuild_is_deferred_then_synchronous() {
        let mut tree = AttachmentTree::new(InstanceId::from_u64(1), TreeConfig::default());
        assert!(!tree.schedule_rebuild(Duration::ZERO));
        assert!(tree.rebuild_pending());

        tree.init_done = true;
        tree.pending_rebuild = None;
        assert!(tree.schedule_rebuild(Duration::ZERO));
    }

    #[test]
    fn override_delay_extends_the_configured_one() {
        let mut tree = AttachmentTree::new(
            InstanceId::from_u64(1),
            TreeConfig {
                initial_rebuild_delay: Duration::from_millis(10),
            },
        );
        assert!(!tree.schedule_rebuild(Duration::from_millis(500)));
        let timer = tree.pending_rebuild.as_ref().unwrap();
        assert_eq!(timer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn zero_delays_rebuild_immediately_even_before_init() {
        let mut tree = AttachmentTree::new(
            InstanceId::from_u64(1),
            TreeConfig {
                initial_rebuild_delay: Duration::ZERO,
            },
        );
        assert!(tree.schedule_rebuild(Duration::ZERO));
        assert!(!tree.rebuild_pending());
    }
}
