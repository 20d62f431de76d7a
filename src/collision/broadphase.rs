use std::collections::{BTreeSet, HashSet};

use crate::{
    collision::{dynamic_tree::DynamicTree, pair::PairKey},
    core::{aabb::Aabb, rigidbody::BodyHandle},
    utils::logging::ScopedTimer,
};

/// Pair changes produced by one [`BroadPhase::update_pairs`] call, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadPhaseEvents {
    pub added: Vec<PairKey>,
    pub removed: Vec<PairKey>,
}

impl BroadPhaseEvents {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Broad phase driver: a dynamic AABB tree plus the set of pairs whose fat
/// AABBs currently overlap.
#[derive(Debug, Default)]
pub struct BroadPhase {
    tree: DynamicTree,
    /// Bodies inserted or re-inserted since the last pair update.
    moved: HashSet<BodyHandle>,
    pairs: BTreeSet<PairKey>,
}

impl BroadPhase {
    pub fn new(aabb_margin: f32) -> Self {
        Self {
            tree: DynamicTree::new(aabb_margin),
            moved: HashSet::new(),
            pairs: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, body: BodyHandle, aabb: Aabb) {
        self.tree.insert(body, aabb);
        self.moved.insert(body);
    }

    /// Removes `body` and returns the tracked pairs that referenced it.
    pub fn remove(&mut self, body: BodyHandle) -> Vec<PairKey> {
        self.tree.remove(body);
        self.moved.remove(&body);
        let removed: Vec<PairKey> = self
            .pairs
            .iter()
            .filter(|key| key.involves(body))
            .copied()
            .collect();
        for key in &removed {
            self.pairs.remove(key);
        }
        removed
    }

    /// Feeds the current tight AABB of `body`. Only an escape from the fat
    /// AABB marks the body as moved.
    pub fn update(&mut self, body: BodyHandle, aabb: Aabb) {
        if self.tree.update(body, aabb) {
            self.moved.insert(body);
        }
    }

    pub fn contains(&self, body: BodyHandle) -> bool {
        self.tree.contains(body)
    }

    pub fn fat_aabb(&self, body: BodyHandle) -> Option<Aabb> {
        self.tree.fat_aabb(body)
    }

    /// Whether the fat AABBs of the two bodies overlap.
    pub fn test_overlap(&self, a: BodyHandle, b: BodyHandle) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(a), Some(b)) => a.intersects(&b),
            _ => false,
        }
    }

    /// Bodies whose fat AABB overlaps `aabb`.
    pub fn query(&self, aabb: &Aabb) -> Vec<BodyHandle> {
        let mut found = Vec::new();
        self.tree.query(aabb, |body| found.push(body));
        found
    }

    pub fn pairs(&self) -> impl Iterator<Item = PairKey> + '_ {
        self.pairs.iter().copied()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn contains_pair(&self, key: PairKey) -> bool {
        self.pairs.contains(&key)
    }

    pub fn body_count(&self) -> usize {
        self.tree.len()
    }

    /// Diffs the tracked pair set against the tree. Only moved bodies are
    /// re-queried, and only tracked pairs touching a moved body can be retired.
    pub fn update_pairs(&mut self) -> BroadPhaseEvents {
        let _timer = ScopedTimer::new("broad_phase_update_pairs");
        if self.moved.is_empty() {
            return BroadPhaseEvents::default();
        }

        let mut removed = Vec::new();
        for key in &self.pairs {
            let (a, b) = key.bodies();
            if (self.moved.contains(&a) || self.moved.contains(&b)) && !self.test_overlap(a, b) {
                removed.push(*key);
            }
        }
        for key in &removed {
            self.pairs.remove(key);
        }

        let mut added = BTreeSet::new();
        for &body in &self.moved {
            let Some(fat) = self.tree.fat_aabb(body) else {
                continue;
            };
            self.tree.query(&fat, |other| {
                if other != body {
                    let key = PairKey::new(body, other);
                    if !self.pairs.contains(&key) {
                        added.insert(key);
                    }
                }
            });
        }
        self.pairs.extend(added.iter().copied());
        self.moved.clear();

        removed.sort_unstable();
        BroadPhaseEvents {
            added: added.into_iter().collect(),
            removed,
        }
    }
}
