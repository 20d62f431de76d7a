use crate::{collision::contact::ContactManifold, core::rigidbody::BodyHandle};

/// Unordered body pair stored as (min, max) so (A, B) and (B, A) are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    first: BodyHandle,
    second: BodyHandle,
}

impl PairKey {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> BodyHandle {
        self.first
    }

    pub fn second(&self) -> BodyHandle {
        self.second
    }

    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.first, self.second)
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        self.first == body || self.second == body
    }

    /// The partner of `body` in this pair, if `body` belongs to it.
    pub fn other(&self, body: BodyHandle) -> Option<BodyHandle> {
        if self.first == body {
            Some(self.second)
        } else if self.second == body {
            Some(self.first)
        } else {
            None
        }
    }
}

/// State kept for a broad-phase pair between its creation and destruction.
#[derive(Debug, Clone)]
pub struct OverlappingPair {
    pub key: PairKey,
    pub manifold: ContactManifold,
    /// Whether the manifold held points at the end of the previous step.
    pub(crate) was_touching: bool,
}

impl OverlappingPair {
    pub fn new(key: PairKey) -> Self {
        Self {
            key,
            manifold: ContactManifold::new(key.first(), key.second()),
            was_touching: false,
        }
    }

    pub fn is_touching(&self) -> bool {
        !self.manifold.is_empty()
    }

    /// True when contacts appeared during the last narrow-phase pass.
    pub fn contact_started(&self) -> bool {
        self.is_touching() && !self.was_touching
    }
}
