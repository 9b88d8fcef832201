//! Identifiers for targets, pointers and requests

use core::fmt;

use serde::{Deserialize, Serialize};

/// A registered paint target
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// One input contact (mouse or a finger)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointerId(pub u32);

impl PointerId {
    /// Conventional id for the mouse
    pub const MOUSE: Self = Self(0);
}

/// Monotonically increasing request id, unique per controller
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self.0)
    }
}

impl fmt::Debug for PointerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({})", self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.0)
    }
}

/// Handle returned to callers for polling one raycast
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    pub id: RequestId,
    pub target: TargetId,
    pub pointer: PointerId,
}

impl RequestHandle {
    /// Key used for per-pointer de-duplication
    #[inline]
    pub fn key(&self) -> (TargetId, PointerId) {
        (self.target, self.pointer)
    }
}
