/// Per-attached-instance state machine for continuous or snap-quantized
/// movement along one axis.
///
/// Numeric policy: all arithmetic is `f32`. Truncation is used only for the
/// snap-point element count; the current snap index rounds. Sub-snap input
/// is batched in `accumulated` and committed as whole `snap_distance` steps,
/// which turns continuous drag input into discrete clicks.
#[derive(Clone, Debug, Default)]
pub struct OffsetController {
    current: f32,
    accumulated: f32,
    minimum: f32,
    maximum: f32,
    snap_distance: f32,
    /// Positive input moves toward `minimum` instead of `maximum`.
    inverted: bool,
    /// Base relative placement the axis offset is added to (Y axis).
    attach_location: [f32; 3],
    cached_snap_points: Vec<f32>,
}

impl OffsetController {
    pub fn new(inverted: bool, attach_location: [f32; 3]) -> Self {
        Self {
            inverted,
            attach_location,
            ..Default::default()
        }
    }

    /// Configure bounds and snap distance, called by the owning slot on
    /// attach. A positive snap distance trims `maximum` down to a whole
    /// snap multiple so the last click lands exactly on the bound.
    pub fn prime(&mut self, minimum: f32, maximum: f32, snap_distance: f32) {
        self.minimum = minimum;
        self.maximum = maximum;
        self.snap_distance = snap_distance;
        if snap_distance > 0.0 {
            self.maximum -= self.maximum % snap_distance;
        }
        self.cached_snap_points.clear();
    }

    /// Set the offset exactly, bypassing snapping. Used for restores.
    ///
    /// Returns true when the (direction-adjusted) value falls outside the
    /// bounds; the current offset is then left unchanged.
    pub fn set_offset(&mut self, mut value: f32) -> bool {
        if self.inverted {
            value = -value;
        }
        if value > self.maximum || value < self.minimum {
            return true;
        }
        self.current = value;
        false
    }

    /// Apply a movement delta.
    ///
    /// Continuous mode (`snap_distance == 0`) adds and clamps. Snap mode
    /// accumulates until a whole step is reached, then commits one
    /// `±snap_distance` step, but only when that direction still has room.
    /// Returns true when the current offset changed.
    pub fn add_offset(&mut self, mut delta: f32) -> bool {
        if self.inverted {
            delta = -delta;
        }

        if self.snap_distance > 0.0 {
            let increase = if delta > 0.0 {
                true
            } else if delta < 0.0 {
                false
            } else {
                return false;
            };

            self.accumulated += delta;
            if increase && self.current < self.maximum && self.accumulated >= self.snap_distance {
                self.accumulated = 0.0;
                self.current += self.snap_distance;
            } else if !increase
                && self.current > self.minimum
                && self.accumulated <= -self.snap_distance
            {
                self.accumulated = 0.0;
                self.current -= self.snap_distance;
            } else {
                return false;
            }
        } else {
            self.current += delta;
        }

        self.current = self.current.clamp(self.minimum, self.maximum);
        true
    }

    /// Drop any sub-step remainder at the end of a drag. The authoritative
    /// commit of the final offset is the graph's concern.
    pub fn finish_moving(&mut self) {
        self.accumulated = 0.0;
    }

    /// Jump whole snap indices forward (positive) or backward (negative),
    /// clamped to the ends of the snap-point sequence.
    pub fn move_position(&mut self, steps: i32) {
        let current_index = self.current_snap_index();
        let points = self.snap_points();
        if points.is_empty() {
            return;
        }
        let new_index = (current_index + steps).clamp(0, points.len() as i32 - 1);
        let target = points[new_index as usize];
        self.current = target;
    }

    /// Lazily computed snap-point sequence. Point 0 is always included;
    /// subsequent points step by `snap_distance` toward whichever bound the
    /// movement direction points at. Empty when snapping is off.
    pub fn snap_points(&mut self) -> &[f32] {
        if self.cached_snap_points.is_empty() && self.snap_distance > 0.0 {
            let range = if self.movement_inverted() {
                -self.minimum
            } else {
                self.maximum
            };
            let count = (range / self.snap_distance) as usize;

            self.cached_snap_points.reserve(count + 1);
            self.cached_snap_points.push(0.0);
            let step = if self.movement_inverted() {
                -self.snap_distance
            } else {
                self.snap_distance
            };
            let mut offset = 0.0;
            for _ in 0..count {
                offset += step;
                self.cached_snap_points.push(offset);
            }
        }
        &self.cached_snap_points
    }

    /// Index of the nearest snap point, sign-flipped for inverted movement
    /// so the caller always sees a non-negative position on the rail.
    pub fn current_snap_index(&self) -> i32 {
        if self.snap_distance <= 0.0 {
            return 0;
        }
        let index = (self.current / self.snap_distance).round() as i32;
        if self.movement_inverted() {
            -index
        } else {
            index
        }
    }

    /// The part's own inversion flag; the predicate `set_offset` and
    /// `add_offset` flip their input on.
    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// Inverted either by the part's own flag or, absent one, by a negative
    /// minimum bound. Drives snap-point direction, not input flipping.
    pub fn movement_inverted(&self) -> bool {
        self.inverted || self.minimum < 0.0 && self.maximum <= 0.0
    }

    /// Restore a raw committed offset from the authority, no direction flip
    /// and no bounds rejection.
    pub(crate) fn restore(&mut self, raw: f32) {
        self.current = raw;
    }

    /// Reset on detach.
    pub(crate) fn reset(&mut self) {
        self.current = 0.0;
        self.accumulated = 0.0;
        self.cached_snap_points.clear();
    }

    /// Relative placement with the axis offset applied (Y axis).
    pub fn relative_location(&self) -> [f32; 3] {
        [
            self.attach_location[0],
            self.attach_location[1] + self.current,
            self.attach_location[2],
        ]
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn accumulated(&self) -> f32 {
        self.accumulated
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
}
