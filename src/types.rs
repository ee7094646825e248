use std::fmt;

/// Which side of the replicated simulation a graph lives on.
///
/// Exactly one replica (the server) may commit mutations; every other
/// replica only observes committed state and may request mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }
}

/// Handle to a spawned part instance. Owned by exactly one slot at a time.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(value: u64) -> Self {
        InstanceId(value)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Handle to an attachment slot record.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct SlotId(u64);

impl SlotId {
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(value: u64) -> Self {
        SlotId(value)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Network update-frequency state of an attached instance.
///
/// The actual throttling is the transport layer's concern; the graph only
/// records the requested state and forwards non-authoritative requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DormancyState {
    Awake,
    Dormant,
    NeverDormant,
}

/// Minimal placement type. The embedding engine owns real transforms; the
/// graph only tracks the base location an axis offset is applied to.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Transform {
    pub location: [f32; 3],
}

impl Transform {
    pub fn new(location: [f32; 3]) -> Self {
        Self { location }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_type_inverts() {
        assert_eq!(HostType::Server.invert(), HostType::Client);
        assert_eq!(HostType::Client.invert(), HostType::Server);
    }

    #[test]
    fn ids_round_trip_through_u64() {
        let id = InstanceId::from_u64(42);
        assert_eq!(id.to_u64(), 42);
        let slot = SlotId::from_u64(7);
        assert_eq!(slot.to_u64(), 7);
    }
}
