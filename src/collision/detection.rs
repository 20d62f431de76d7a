use std::collections::{BTreeMap, HashSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::{
        broadphase::BroadPhase,
        contact::{ContactManifold, ContactPointInfo},
        narrowphase::NarrowPhase,
        pair::{OverlappingPair, PairKey},
    },
    config::WorldConfig,
    core::{aabb::Aabb, rigidbody::{BodyHandle, RigidBody}},
    utils::{allocator::Arena, logging::ScopedTimer},
};

/// Receives pair lifecycle notifications from [`CollisionDetection`].
pub trait CollisionEventListener: Send + Sync {
    fn pair_added(&mut self, _pair: PairKey) {}
    fn pair_removed(&mut self, _pair: PairKey) {}
    /// Called when a pair's manifold goes from empty to non-empty.
    fn contact_started(&mut self, _pair: PairKey, _manifold: &ContactManifold) {}
}

/// Settings the narrow phase reads for every pair.
#[derive(Debug, Clone, Copy)]
struct ContactSettings {
    contact_margin: f32,
    persistent_threshold: f32,
}

/// Owns the broad phase, the overlapping pairs and the no-collision set, and
/// runs broad phase then narrow phase once per step.
pub struct CollisionDetection {
    broad_phase: BroadPhase,
    pairs: BTreeMap<PairKey, OverlappingPair>,
    no_collision: HashSet<PairKey>,
    settings: ContactSettings,
    listener: Option<Box<dyn CollisionEventListener>>,
}

impl Default for CollisionDetection {
    fn default() -> Self {
        Self::new(&WorldConfig::default())
    }
}

impl CollisionDetection {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            broad_phase: BroadPhase::new(config.aabb_margin),
            pairs: BTreeMap::new(),
            no_collision: HashSet::new(),
            settings: ContactSettings {
                contact_margin: config.contact_margin,
                persistent_threshold: config.persistent_contact_threshold,
            },
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn CollisionEventListener>) {
        self.listener = Some(listener);
    }

    pub fn take_listener(&mut self) -> Option<Box<dyn CollisionEventListener>> {
        self.listener.take()
    }

    pub fn broad_phase(&self) -> &BroadPhase {
        &self.broad_phase
    }

    pub fn add_body(&mut self, body: BodyHandle, aabb: Aabb) {
        self.broad_phase.insert(body, aabb);
    }

    pub fn update_body(&mut self, body: BodyHandle, aabb: Aabb) {
        self.broad_phase.update(body, aabb);
    }

    /// Removes `body` from the broad phase and purges every pair and
    /// no-collision entry that references it.
    pub fn remove_body(&mut self, body: BodyHandle) {
        let mut removed = self.broad_phase.remove(body);
        removed.extend(
            self.pairs
                .keys()
                .filter(|key| key.involves(body))
                .copied()
                .collect::<Vec<_>>(),
        );
        removed.sort_unstable();
        removed.dedup();
        for key in removed {
            if self.pairs.remove(&key).is_some() {
                if let Some(listener) = self.listener.as_mut() {
                    listener.pair_removed(key);
                }
            }
        }
        self.no_collision.retain(|key| !key.involves(body));
        log::debug!("removed body {body:?} from collision detection");
    }

    pub fn add_no_collision_pair(&mut self, a: BodyHandle, b: BodyHandle) {
        self.no_collision.insert(PairKey::new(a, b));
    }

    pub fn remove_no_collision_pair(&mut self, a: BodyHandle, b: BodyHandle) {
        self.no_collision.remove(&PairKey::new(a, b));
    }

    pub fn is_no_collision_pair(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.no_collision.contains(&PairKey::new(a, b))
    }

    pub fn no_collision_count(&self) -> usize {
        self.no_collision.len()
    }

    pub fn pair(&self, key: PairKey) -> Option<&OverlappingPair> {
        self.pairs.get(&key)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &OverlappingPair> {
        self.pairs.values()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Manifolds that currently hold at least one point.
    pub fn manifolds(&self) -> impl Iterator<Item = &ContactManifold> {
        self.pairs
            .values()
            .filter(|pair| pair.is_touching())
            .map(|pair| &pair.manifold)
    }

    pub fn manifold_mut(&mut self, key: PairKey) -> Option<&mut ContactManifold> {
        self.pairs.get_mut(&key).map(|pair| &mut pair.manifold)
    }

    /// One full broad + narrow phase pass over `bodies`. Returns the
    /// manifolds that hold contacts after the pass.
    pub fn compute_collision_detection(
        &mut self,
        bodies: &Arena<RigidBody>,
    ) -> impl Iterator<Item = &ContactManifold> {
        let _timer = ScopedTimer::new("collision_detection");
        self.compute_broad_phase(bodies);
        self.compute_narrow_phase(bodies);
        self.manifolds()
    }

    fn compute_broad_phase(&mut self, bodies: &Arena<RigidBody>) {
        for (handle, body) in bodies.iter() {
            if self.broad_phase.contains(handle) {
                self.broad_phase.update(handle, body.aabb());
            }
        }

        let events = self.broad_phase.update_pairs();
        for key in events.removed {
            self.pairs.remove(&key);
            if let Some(listener) = self.listener.as_mut() {
                listener.pair_removed(key);
            }
        }
        for key in events.added {
            self.pairs.insert(key, OverlappingPair::new(key));
            if let Some(listener) = self.listener.as_mut() {
                listener.pair_added(key);
            }
        }
        log::trace!("{} overlapping pairs tracked", self.pairs.len());
    }

    fn compute_narrow_phase(&mut self, bodies: &Arena<RigidBody>) {
        let _timer = ScopedTimer::new("narrow_phase");
        let settings = self.settings;
        let no_collision = &self.no_collision;

        #[cfg(feature = "parallel")]
        self.pairs
            .par_iter_mut()
            .for_each_init(Vec::new, |scratch, (key, pair)| {
                let excluded = no_collision.contains(key);
                update_pair(pair, bodies, excluded, settings, scratch);
            });

        #[cfg(not(feature = "parallel"))]
        {
            let mut scratch = Vec::new();
            for (key, pair) in self.pairs.iter_mut() {
                let excluded = no_collision.contains(key);
                update_pair(pair, bodies, excluded, settings, &mut scratch);
            }
        }

        if let Some(listener) = self.listener.as_mut() {
            for pair in self.pairs.values().filter(|pair| pair.contact_started()) {
                listener.contact_started(pair.key, &pair.manifold);
            }
        }
    }
}

/// Narrow phase for one pair: refresh cached points, collide the shapes, and
/// merge the new points into the manifold.
fn update_pair(
    pair: &mut OverlappingPair,
    bodies: &Arena<RigidBody>,
    excluded: bool,
    settings: ContactSettings,
    scratch: &mut Vec<ContactPointInfo>,
) {
    pair.was_touching = pair.is_touching();
    if excluded {
        pair.manifold.clear();
        return;
    }

    let (first, second) = pair.key.bodies();
    let (Some(body1), Some(body2)) = (bodies.get(first), bodies.get(second)) else {
        log::warn!("pair {:?} references a removed body", pair.key);
        pair.manifold.clear();
        return;
    };
    if !body1.is_motion_enabled() && !body2.is_motion_enabled() {
        pair.manifold.clear();
        return;
    }

    let threshold = settings.persistent_threshold;
    pair.manifold
        .refresh(&body1.transform, &body2.transform, threshold);

    // Hysteresis: touching pairs keep contacts while within the margin.
    let margin = if pair.was_touching {
        settings.contact_margin
    } else {
        0.0
    };
    scratch.clear();
    if !NarrowPhase::collide(
        body1.shape(),
        &body1.transform,
        body2.shape(),
        &body2.transform,
        margin,
        scratch,
    ) {
        pair.manifold.clear();
        return;
    }
    for info in scratch.iter() {
        pair.manifold
            .add_point(info, &body1.transform, &body2.transform, threshold);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use glam::Vec3;

    use super::*;
    use crate::core::shape::CollisionShape;

    fn sphere_at(bodies: &mut Arena<RigidBody>, x: f32) -> BodyHandle {
        bodies.insert(
            RigidBody::builder(CollisionShape::sphere(1.0))
                .position(Vec3::new(x, 0.0, 0.0))
                .build(),
        )
    }

    fn detection_with(bodies: &Arena<RigidBody>) -> CollisionDetection {
        let mut detection = CollisionDetection::default();
        for (handle, body) in bodies.iter() {
            detection.add_body(handle, body.aabb());
        }
        detection
    }

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl CollisionEventListener for Recorder {
        fn pair_added(&mut self, _pair: PairKey) {
            self.0.lock().unwrap().push("added".into());
        }
        fn pair_removed(&mut self, _pair: PairKey) {
            self.0.lock().unwrap().push("removed".into());
        }
        fn contact_started(&mut self, _pair: PairKey, manifold: &ContactManifold) {
            assert!(!manifold.is_empty());
            self.0.lock().unwrap().push("started".into());
        }
    }

    #[test]
    fn overlapping_spheres_give_one_manifold() {
        let mut bodies = Arena::new();
        sphere_at(&mut bodies, 0.0);
        sphere_at(&mut bodies, 1.5);
        let mut detection = detection_with(&bodies);

        let manifolds: Vec<&ContactManifold> =
            detection.compute_collision_detection(&bodies).collect();
        assert_eq!(manifolds.len(), 1);
        let point = manifolds[0].points()[0];
        assert!((point.depth - 0.5).abs() < 1e-5);
        assert!((point.normal - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn no_collision_pair_suppresses_contacts() {
        let mut bodies = Arena::new();
        let a = sphere_at(&mut bodies, 0.0);
        let b = sphere_at(&mut bodies, 1.5);
        let mut detection = detection_with(&bodies);

        detection.add_no_collision_pair(b, a);
        assert_eq!(detection.compute_collision_detection(&bodies).count(), 0);
        assert!(detection.is_no_collision_pair(a, b));

        detection.remove_no_collision_pair(a, b);
        assert_eq!(detection.compute_collision_detection(&bodies).count(), 1);
    }

    #[test]
    fn removing_body_purges_pairs_and_exclusions() {
        let mut bodies = Arena::new();
        let a = sphere_at(&mut bodies, 0.0);
        let b = sphere_at(&mut bodies, 1.5);
        let c = sphere_at(&mut bodies, -1.5);
        let mut detection = detection_with(&bodies);
        let log = Arc::new(Mutex::new(Vec::new()));
        detection.set_listener(Box::new(Recorder(log.clone())));

        detection.add_no_collision_pair(a, b);
        assert_eq!(detection.compute_collision_detection(&bodies).count(), 1);
        assert_eq!(detection.pair_count(), 2);

        detection.remove_body(b);
        bodies.remove(b);
        assert_eq!(detection.no_collision_count(), 0);
        assert!(detection.pairs().all(|pair| !pair.key.involves(b)));
        let manifolds: Vec<_> = detection.compute_collision_detection(&bodies).collect();
        assert_eq!(manifolds.len(), 1);
        assert!(manifolds.iter().all(|m| m.body1 != b && m.body2 != b));

        let events = log.lock().unwrap().clone();
        assert_eq!(events, vec!["added", "added", "started", "removed"]);
        let _ = c;
    }

    #[test]
    fn touching_pair_survives_small_gap() {
        let mut bodies = Arena::new();
        let cube = CollisionShape::cuboid(Vec3::splat(0.5));
        let a = bodies.insert(RigidBody::builder(cube.clone()).build());
        let b = bodies.insert(
            RigidBody::builder(cube)
                .position(Vec3::new(0.99, 0.0, 0.0))
                .build(),
        );
        let mut detection = detection_with(&bodies);
        assert_eq!(detection.compute_collision_detection(&bodies).count(), 1);

        if let Some(body) = bodies.get_mut(b) {
            body.transform.position.x = 1.01;
            body.update_aabb();
        }
        assert_eq!(detection.compute_collision_detection(&bodies).count(), 1);
        let depth = detection.manifolds().next().map(|m| m.max_depth()).unwrap();
        assert!(depth < 0.0);

        if let Some(body) = bodies.get_mut(b) {
            body.transform.position.x = 1.2;
            body.update_aabb();
        }
        assert_eq!(detection.compute_collision_detection(&bodies).count(), 0);
        let _ = a;
    }
}
